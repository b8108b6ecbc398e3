//! Notification reconciliation pipeline.
//!
//! Every notification cursor flows through:
//! 1. `SequencerHandle::enqueue()`: non-blocking handoff from the webhook
//! 2. `CursorSequencer`: single worker pairing consecutive cursors into windows
//! 3. `HistoryDeduplicator::reconcile()`: delta query + seen-id filter
//! 4. `MessageFetcher::process()`: fetch, sender filter, extraction
//! 5. `LedgerAggregator::apply()`: read-add-write of the running total
//!
//! State is in memory only. A restart returns the sequencer to `Idle` and
//! empties the seen set; windows acknowledged but not yet processed are lost.

pub mod extractor;
pub mod fetcher;
pub mod history;
pub mod ledger;
pub mod seen;
pub mod sequencer;
pub mod types;

use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::config::RelayConfig;
use crate::providers::{LedgerCells, MailSource};

pub use fetcher::{MessageFetcher, MessageOutcome};
pub use history::{DeltaSummary, HistoryDeduplicator};
pub use ledger::LedgerAggregator;
pub use sequencer::{CursorSequencer, SequencerHandle, SequencerState};

/// Wire the pipeline together and spawn the sequencer worker.
pub fn spawn_pipeline(
    config: &RelayConfig,
    mail: Arc<dyn MailSource>,
    ledger: Arc<dyn LedgerCells>,
) -> (SequencerHandle, JoinHandle<()>) {
    let aggregator = LedgerAggregator::new(ledger, config.ledger.clone());
    let fetcher = MessageFetcher::new(Arc::clone(&mail), aggregator, config.expected_sender.clone());
    let dedup = HistoryDeduplicator::new(mail, fetcher, config.seen_capacity);
    CursorSequencer::new(dedup).spawn(config.queue_capacity)
}
