//! Message record: delivery metadata + message.

use tokio::time::Instant;

use super::{Message, MessageState};

/// Metadata + message for an entry in the queue.
///
/// - This is the "single source of truth" for message state.
/// - Queue structures (ready/scheduled) hold MessageId only.
#[derive(Debug, Clone)]
pub struct MessageRecord {
    pub message: Message,
    pub state: MessageState,

    /// Number of deliveries so far (including the current one if Leased).
    pub attempts: u32,

    pub max_attempts: u32,

    pub last_error: Option<String>,

    /// When to redeliver (for RetryScheduled state).
    pub next_run_at: Option<Instant>,

    pub created_at: Instant,
    pub updated_at: Instant,
}

impl MessageRecord {
    pub fn new(message: Message, max_attempts: u32) -> Self {
        let now = Instant::now();
        Self {
            message,
            state: MessageState::Queued,
            attempts: 0,
            max_attempts,
            last_error: None,
            next_run_at: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Mark as delivered (increment attempts).
    pub fn lease(&mut self) {
        self.state = MessageState::Leased;
        self.attempts += 1;
        self.updated_at = Instant::now();
    }

    pub fn is_exhausted(&self) -> bool {
        self.attempts >= self.max_attempts
    }

    pub fn mark_dead(&mut self, error: String) {
        self.state = MessageState::Dead;
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    pub fn schedule_retry(&mut self, next_run_at: Instant, error: String) {
        self.state = MessageState::RetryScheduled;
        self.next_run_at = Some(next_run_at);
        self.last_error = Some(error);
        self.updated_at = Instant::now();
    }

    /// Move from RetryScheduled back to Queued.
    pub fn requeue(&mut self) {
        self.state = MessageState::Queued;
        self.next_run_at = None;
        self.updated_at = Instant::now();
    }
}
