//! Inbox Ledger turns bank alert emails into running spreadsheet totals.

pub mod config;
pub mod error;
pub mod pipeline;
pub mod providers;
pub mod webhook;
