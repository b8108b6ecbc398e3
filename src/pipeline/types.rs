//! Core types shared across the reconciliation pipeline.

use std::collections::HashMap;
use std::fmt;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Position in the provider's change log (Gmail `historyId`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Cursor(pub u64);

impl fmt::Display for Cursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Bounds of one delta query: changes after `previous`, up to `current`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CursorWindow {
    pub previous: Cursor,
    pub current: Cursor,
}

impl CursorWindow {
    pub fn new(previous: Cursor, current: Cursor) -> Self {
        Self { previous, current }
    }

    /// True when the provider delivered a cursor older than the one before it.
    pub fn is_regressing(&self) -> bool {
        self.current < self.previous
    }
}

impl fmt::Display for CursorWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.previous, self.current)
    }
}

/// A "message added" event surfaced by a delta query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageAdded {
    pub message_id: String,
    pub thread_id: Option<String>,
}

impl MessageAdded {
    pub fn new(message_id: impl Into<String>) -> Self {
        Self {
            message_id: message_id.into(),
            thread_id: None,
        }
    }
}

/// A fetched message reduced to what the pipeline inspects.
#[derive(Debug, Clone, Default)]
pub struct MailMessage {
    pub id: String,
    /// Header name → value. First occurrence wins.
    pub headers: HashMap<String, String>,
    /// Decoded `text/plain` parts, in message order.
    pub text_parts: Vec<String>,
}

impl MailMessage {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.entry(name.into()).or_insert_with(|| value.into());
        self
    }

    pub fn with_text_part(mut self, text: impl Into<String>) -> Self {
        self.text_parts.push(text.into());
        self
    }

    /// Look up a header by name, ignoring ASCII case.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Direction of a bank transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TransactionKind {
    Debit,
    Credit,
}

impl TransactionKind {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Debit => "Debit",
            Self::Credit => "Credit",
        }
    }
}

/// A transaction extracted from one message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub kind: TransactionKind,
    pub amount: Decimal,
}
