//! Message fetcher: retrieve one message, filter by sender, extract and
//! record its transactions.

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::error::FetchError;
use crate::pipeline::extractor::extract_transaction;
use crate::pipeline::ledger::LedgerAggregator;
use crate::providers::MailSource;

/// What happened to a fetched message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MessageOutcome {
    /// `From` header did not contain the expected sender.
    SenderMismatch,
    /// No `From` header at all.
    MissingSender,
    MissingSubject,
    NoTextParts,
    /// Text parts were run through extraction.
    Processed {
        /// Transactions written to the ledger.
        applied: usize,
        /// Parts that failed extraction or the ledger update.
        rejected: usize,
    },
}

/// Check the `From` header against the expected sender (case-sensitive substring).
pub fn is_from_expected_sender(from: &str, expected: &str) -> bool {
    from.contains(expected)
}

/// Fetches messages and feeds matching ones to extraction and the ledger.
pub struct MessageFetcher {
    mail: Arc<dyn MailSource>,
    ledger: LedgerAggregator,
    expected_sender: String,
}

impl MessageFetcher {
    pub fn new(
        mail: Arc<dyn MailSource>,
        ledger: LedgerAggregator,
        expected_sender: impl Into<String>,
    ) -> Self {
        Self {
            mail,
            ledger,
            expected_sender: expected_sender.into(),
        }
    }

    /// Process one message id. Only the fetch itself is an error; filtered
    /// or unparseable content is reported through [`MessageOutcome`].
    pub async fn process(&self, message_id: &str) -> Result<MessageOutcome, FetchError> {
        let message = self.mail.fetch_message(message_id).await?;

        let Some(from) = message.header("From") else {
            info!(message_id, "Message has no From header, skipping");
            return Ok(MessageOutcome::MissingSender);
        };
        if !is_from_expected_sender(from, &self.expected_sender) {
            debug!(message_id, from, "Message is from another sender, skipping");
            return Ok(MessageOutcome::SenderMismatch);
        }

        let Some(subject) = message.header("Subject") else {
            info!(message_id, "Message has no Subject, skipping");
            return Ok(MessageOutcome::MissingSubject);
        };
        if message.text_parts.is_empty() {
            info!(message_id, "Message has no plain-text part, skipping");
            return Ok(MessageOutcome::NoTextParts);
        }

        let mut applied = 0;
        let mut rejected = 0;
        for body in &message.text_parts {
            let txn = match extract_transaction(subject, body) {
                Ok(txn) => txn,
                Err(e) => {
                    warn!(message_id, subject, error = %e, "Could not extract transaction");
                    rejected += 1;
                    continue;
                }
            };
            match self.ledger.apply(&txn).await {
                Ok(_) => applied += 1,
                Err(e) => {
                    warn!(
                        message_id,
                        kind = txn.kind.label(),
                        amount = %txn.amount,
                        error = %e,
                        "Ledger update failed, transaction dropped"
                    );
                    rejected += 1;
                }
            }
        }

        Ok(MessageOutcome::Processed { applied, rejected })
    }
}
