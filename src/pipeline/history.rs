//! History deduplicator: turn one cursor window into at-most-once
//! message dispatches.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::error::FetchError;
use crate::pipeline::fetcher::{MessageFetcher, MessageOutcome};
use crate::pipeline::seen::SeenSet;
use crate::pipeline::types::CursorWindow;
use crate::providers::MailSource;

/// Counts for one reconciled window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeltaSummary {
    /// Message-added events returned by the delta query.
    pub surfaced: usize,
    /// Events skipped because the id was already seen.
    pub duplicates: usize,
    /// Messages handed to the fetcher.
    pub dispatched: usize,
    /// Dispatched messages whose fetch failed.
    pub failed: usize,
    /// Transactions written to the ledger.
    pub applied: usize,
}

/// Owns the seen-message set. Must only be driven by one task at a time,
/// which `&mut self` on [`reconcile`](Self::reconcile) enforces.
pub struct HistoryDeduplicator {
    mail: Arc<dyn MailSource>,
    fetcher: MessageFetcher,
    seen: SeenSet,
}

impl HistoryDeduplicator {
    pub fn new(mail: Arc<dyn MailSource>, fetcher: MessageFetcher, seen_capacity: usize) -> Self {
        Self {
            mail,
            fetcher,
            seen: SeenSet::with_capacity(seen_capacity),
        }
    }

    /// Number of message ids currently remembered.
    pub fn seen_len(&self) -> usize {
        self.seen.len()
    }

    /// Fetch the window's delta and dispatch every not-yet-seen message.
    ///
    /// Fails only if the delta query fails, in which case nothing in the
    /// window is dispatched. Per-message failures are logged and counted.
    pub async fn reconcile(&mut self, window: CursorWindow) -> Result<DeltaSummary, FetchError> {
        let added = self.mail.fetch_history_delta(window).await?;

        let mut summary = DeltaSummary {
            surfaced: added.len(),
            ..Default::default()
        };

        for event in added {
            let id = event.message_id;
            if !self.seen.insert(&id) {
                debug!(message_id = %id, "Message already seen, skipping");
                summary.duplicates += 1;
                continue;
            }

            summary.dispatched += 1;
            match self.fetcher.process(&id).await {
                Ok(MessageOutcome::Processed { applied, .. }) => summary.applied += applied,
                Ok(outcome) => debug!(message_id = %id, outcome = ?outcome, "Message skipped"),
                Err(e) => {
                    warn!(message_id = %id, error = %e, "Error processing message");
                    summary.failed += 1;
                }
            }
        }

        Ok(summary)
    }
}
