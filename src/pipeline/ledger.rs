//! Ledger aggregation: add one transaction to its running-total cell.
//!
//! Read-modify-write with no concurrency check: an external edit to the
//! same cell between the read and the write is overwritten.

use std::str::FromStr;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use rust_decimal::Decimal;
use tracing::info;

use crate::config::LedgerConfig;
use crate::error::LedgerError;
use crate::pipeline::types::{Transaction, TransactionKind};
use crate::providers::LedgerCells;

/// Applies transactions to the configured debit/credit cells.
pub struct LedgerAggregator {
    cells: Arc<dyn LedgerCells>,
    config: LedgerConfig,
}

impl LedgerAggregator {
    pub fn new(cells: Arc<dyn LedgerCells>, config: LedgerConfig) -> Self {
        Self { cells, config }
    }

    /// Cell address holding the running total for `kind`.
    pub fn cell_for(&self, kind: TransactionKind) -> &str {
        match kind {
            TransactionKind::Debit => &self.config.debit_cell,
            TransactionKind::Credit => &self.config.credit_cell,
        }
    }

    /// Add `txn.amount` to its cell and return the new total.
    pub async fn apply(&self, txn: &Transaction) -> Result<Decimal, LedgerError> {
        let sheet = self.config.sheet_name.as_str();
        let cell = self.cell_for(txn.kind);

        let raw = self.cells.read_cell(sheet, cell).await?;
        let current = match raw.as_deref() {
            None => Decimal::ZERO,
            Some(raw) => parse_cell_value(raw).ok_or_else(|| LedgerError::Read {
                sheet: sheet.to_string(),
                cell: cell.to_string(),
                reason: format!("existing value {raw:?} is not numeric"),
            })?,
        };

        let updated = current
            .checked_add(txn.amount)
            .ok_or_else(|| LedgerError::Overflow {
                sheet: sheet.to_string(),
                cell: cell.to_string(),
            })?;
        self.cells.write_cell(sheet, cell, updated).await?;

        info!(
            kind = txn.kind.label(),
            amount = %txn.amount,
            cell = %cell,
            previous = %current,
            total = %updated,
            "Ledger updated"
        );
        Ok(updated)
    }
}

/// Thousands (`1,234,567`) or lakh (`12,34,567`) grouping of the integer part.
static GROUPED_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[+-]?(?:\d{1,3}(?:,\d{3})+|\d{1,2}(?:,\d{2})*,\d{3})(?:\.\d+)?$").unwrap()
});

/// Parse a cell's text as a decimal. Commas are accepted only as digit
/// grouping; blank text counts as zero.
pub fn parse_cell_value(raw: &str) -> Option<Decimal> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Some(Decimal::ZERO);
    }
    let cleaned = if trimmed.contains(',') {
        if !GROUPED_RE.is_match(trimmed) {
            return None;
        }
        trimmed.replace(',', "")
    } else {
        trimmed.to_string()
    };
    Decimal::from_str(&cleaned)
        .or_else(|_| Decimal::from_scientific(&cleaned))
        .ok()
}
