//! Message state machine for the queue.

use serde::{Deserialize, Serialize};

/// Message state.
///
/// State transitions:
/// - Queued -> Leased -> (deleted)
/// - Queued -> Leased -> RetryScheduled -> Queued (loop until max_attempts)
/// - Queued -> Leased -> Dead (when max_attempts exceeded)
///
/// A message that was handled successfully is deleted from the queue, so it
/// has no state of its own; the queue only counts it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageState {
    /// Ready to be delivered.
    Queued,

    /// Delivered to a worker, waiting for delete or release.
    Leased,

    /// Waiting for redelivery (delayed due to backoff).
    RetryScheduled,

    /// Failed permanently (max_attempts exceeded).
    Dead,
}

impl MessageState {
    pub fn is_terminal(self) -> bool {
        matches!(self, MessageState::Dead)
    }

    pub fn is_deliverable(self) -> bool {
        matches!(self, MessageState::Queued)
    }
}

/// Snapshot of how many messages sit in each state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct QueueCounts {
    pub queued: usize,
    pub leased: usize,
    pub retry_scheduled: usize,
    pub dead: usize,
    pub deleted: usize,
}

impl QueueCounts {
    /// Messages that may still be delivered.
    pub fn pending(&self) -> usize {
        self.queued + self.leased + self.retry_scheduled
    }
}
