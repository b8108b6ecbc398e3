//! Cursor sequencer: the single consumer of incoming notification cursors.
//!
//! Webhook handlers enqueue cursors through a [`SequencerHandle`]; one
//! spawned task drains the queue in order and turns each consecutive pair
//! of cursors into a delta window for the [`HistoryDeduplicator`]. The prior
//! cursor and the seen-message set live inside that task, so no two windows
//! are ever reconciled concurrently.
//!
//! Failed windows are logged and skipped: the prior cursor always advances.

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{Instrument, info, info_span, warn};

use crate::error::PipelineError;
use crate::pipeline::history::HistoryDeduplicator;
use crate::pipeline::types::{Cursor, CursorWindow};

/// Sequencer state between notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SequencerState {
    /// No cursor received yet.
    Idle,
    /// Holding the cursor of the last processed notification.
    Tracking { prior: Cursor },
}

/// Cloneable sender side of the cursor queue.
#[derive(Debug, Clone)]
pub struct SequencerHandle {
    tx: mpsc::Sender<Cursor>,
}

impl SequencerHandle {
    /// Queue a cursor. Waits only while the queue is full.
    pub async fn enqueue(&self, cursor: Cursor) -> Result<(), PipelineError> {
        self.tx
            .send(cursor)
            .await
            .map_err(|_| PipelineError::SequencerClosed)
    }
}

/// A handle wired to a bare receiver, for exercising enqueue callers.
#[cfg(test)]
pub(crate) fn test_handle(capacity: usize) -> (SequencerHandle, mpsc::Receiver<Cursor>) {
    let (tx, rx) = mpsc::channel(capacity);
    (SequencerHandle { tx }, rx)
}

/// Orders cursors into windows and drives reconciliation.
pub struct CursorSequencer {
    state: SequencerState,
    dedup: HistoryDeduplicator,
}

impl CursorSequencer {
    pub fn new(dedup: HistoryDeduplicator) -> Self {
        Self {
            state: SequencerState::Idle,
            dedup,
        }
    }

    pub fn state(&self) -> SequencerState {
        self.state
    }

    /// Consume one cursor. Returns the window that was reconciled, or
    /// `None` for the first cursor, which only primes the state.
    pub async fn advance(&mut self, cursor: Cursor) -> Option<CursorWindow> {
        let prior = match self.state {
            SequencerState::Idle => {
                info!(cursor = %cursor, "First cursor received, tracking from here");
                self.state = SequencerState::Tracking { prior: cursor };
                return None;
            }
            SequencerState::Tracking { prior } => prior,
        };

        let window = CursorWindow::new(prior, cursor);
        if window.is_regressing() {
            warn!(window = %window, "Cursor went backwards, querying as received");
        }

        let span = info_span!("window", previous = %window.previous, current = %window.current);
        match self.dedup.reconcile(window).instrument(span).await {
            Ok(summary) => info!(
                window = %window,
                surfaced = summary.surfaced,
                duplicates = summary.duplicates,
                dispatched = summary.dispatched,
                failed = summary.failed,
                applied = summary.applied,
                "Window reconciled"
            ),
            Err(e) => warn!(window = %window, error = %e, "Error retrieving history, window skipped"),
        }

        self.state = SequencerState::Tracking { prior: cursor };
        Some(window)
    }

    /// Spawn the worker task. It runs until every handle is dropped.
    pub fn spawn(mut self, capacity: usize) -> (SequencerHandle, JoinHandle<()>) {
        let (tx, mut rx) = mpsc::channel(capacity.max(1));

        let handle = tokio::spawn(async move {
            info!(capacity, "Cursor sequencer started");
            while let Some(cursor) = rx.recv().await {
                self.advance(cursor).await;
            }
            info!(state = ?self.state, "Cursor sequencer shutting down");
        });

        (SequencerHandle { tx }, handle)
    }
}
