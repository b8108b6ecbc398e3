//! Transaction extraction from bank alert emails.
//!
//! Pure string parsing. The subject's first word names the direction and
//! the body carries the amount as `INR 1,234.56`.

use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use rust_decimal::Decimal;

use crate::error::ParseError;
use crate::pipeline::types::{Transaction, TransactionKind};

static AMOUNT_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"INR\s+([\d,]+(?:\.\d{2})?)").unwrap());

/// Parse a transaction out of a subject line and one plain-text body.
pub fn extract_transaction(subject: &str, body: &str) -> Result<Transaction, ParseError> {
    let kind = match subject.split_whitespace().next() {
        Some("Debit") => TransactionKind::Debit,
        Some("Credit") => TransactionKind::Credit,
        other => return Err(ParseError::UnknownType(other.unwrap_or_default().to_string())),
    };

    let raw = AMOUNT_RE
        .captures(body)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
        .ok_or(ParseError::AmountNotFound)?;

    let digits = raw.replace(',', "");
    let amount =
        Decimal::from_str(&digits).map_err(|_| ParseError::InvalidAmount(raw.to_string()))?;

    Ok(Transaction { kind, amount })
}

#[cfg(test)]
mod tests {
    use rust_decimal_macros::dec;

    use super::*;

    #[test]
    fn debit_with_thousands_separator() {
        let txn = extract_transaction(
            "Debit charge",
            "Your account was debited INR 1,234.56 on 01-02-2026.",
        )
        .unwrap();
        assert_eq!(txn.kind, TransactionKind::Debit);
        assert_eq!(txn.amount, dec!(1234.56));
    }

    #[test]
    fn credit_without_decimals() {
        let txn = extract_transaction("Credit alert", "Received INR 10 from ACME").unwrap();
        assert_eq!(txn.kind, TransactionKind::Credit);
        assert_eq!(txn.amount, dec!(10));
    }

    #[test]
    fn unknown_type_rejected() {
        assert_eq!(
            extract_transaction("Refund", "INR 5.00"),
            Err(ParseError::UnknownType("Refund".into()))
        );
    }

    #[test]
    fn type_is_case_sensitive() {
        assert!(matches!(
            extract_transaction("debit charge", "INR 5.00"),
            Err(ParseError::UnknownType(_))
        ));
        assert!(matches!(
            extract_transaction("Debited today", "INR 5.00"),
            Err(ParseError::UnknownType(_))
        ));
    }

    #[test]
    fn empty_subject_rejected() {
        assert_eq!(
            extract_transaction("   ", "INR 5.00"),
            Err(ParseError::UnknownType(String::new()))
        );
    }

    #[test]
    fn missing_amount() {
        assert_eq!(
            extract_transaction("Credit note", "no amount here"),
            Err(ParseError::AmountNotFound)
        );
    }

    #[test]
    fn currency_without_whitespace_not_matched() {
        assert_eq!(
            extract_transaction("Debit", "INR1,000.00"),
            Err(ParseError::AmountNotFound)
        );
    }

    #[test]
    fn separators_only_is_invalid() {
        assert_eq!(
            extract_transaction("Debit", "INR ,,, today"),
            Err(ParseError::InvalidAmount(",,,".into()))
        );
    }

    #[test]
    fn first_amount_wins() {
        let txn = extract_transaction(
            "Debit card used",
            "Spent INR 250.00. Available balance INR 9,750.00",
        )
        .unwrap();
        assert_eq!(txn.amount, dec!(250.00));
    }

    #[test]
    fn amount_across_newline_whitespace() {
        let txn = extract_transaction("Credit", "Amount: INR\n  2,00,000.50").unwrap();
        assert_eq!(txn.amount, dec!(200000.50));
    }
}
