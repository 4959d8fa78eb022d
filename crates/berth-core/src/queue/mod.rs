//! Queue module: action messages, delivery state, retry logic, and the
//! in-memory transport.

mod memory;
mod message;
mod record;
mod retry;
mod state;

pub use memory::InMemoryQueue;
pub use message::{Action, Message, UnknownAction};
pub use record::MessageRecord;
pub use retry::{MAX_BACKOFF, RetryPolicy};
pub use state::{MessageState, QueueCounts};

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::MessageId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueueError {
    #[error("message {0} is not leased")]
    NotLeased(MessageId),

    #[error("queue transport failed: {0}")]
    Transport(String),
}

/// A delivered message.
/// The worker owns this delivery and must either `delete` or `release` it.
///
/// - Queue manages state transitions (Queued -> Leased -> ...).
/// - Worker/Runtime executes side effects and reports the result.
#[async_trait]
pub trait Delivery: Send {
    fn message(&self) -> &Message;

    /// 1 for the first delivery.
    fn attempt(&self) -> u32;

    /// Handling succeeded: remove the message for good.
    async fn delete(self: Box<Self>) -> Result<(), QueueError>;

    /// Handling failed: the queue decides between redelivery and dead.
    async fn release(self: Box<Self>, error: String) -> Result<(), QueueError>;
}

/// Queue port (interface).
///
/// At-least-once: a message is only removed through [`Delivery::delete`].
#[async_trait]
pub trait Queue: Send + Sync {
    async fn put(&self, action: Action, args: Vec<String>) -> Result<MessageId, QueueError>;

    /// Wait up to `timeout` for a message. `Ok(None)` when nothing arrived.
    async fn get(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError>;

    async fn counts_by_state(&self) -> Result<QueueCounts, QueueError>;
}
