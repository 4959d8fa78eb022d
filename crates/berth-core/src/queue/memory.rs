//! In-memory queue implementation.

use std::collections::{BinaryHeap, HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;

use super::{
    Action, Delivery, Message, MessageRecord, MessageState, Queue, QueueCounts, QueueError,
    RetryPolicy,
};
use crate::config::QueueConfig;
use crate::domain::MessageId;
use crate::ports::IdGenerator;

/// Scheduled message entry for the retry heap.
///
/// Reverse ordering so BinaryHeap acts as a min-heap (earliest first).
#[derive(Debug, Clone, PartialEq, Eq)]
struct ScheduledMessage {
    next_run_at: Instant,
    id: MessageId,
}

impl PartialOrd for ScheduledMessage {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for ScheduledMessage {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        other
            .next_run_at
            .cmp(&self.next_run_at)
            .then_with(|| other.id.cmp(&self.id))
    }
}

struct InMemoryQueueState {
    /// All live records (single source of truth).
    records: HashMap<MessageId, MessageRecord>,

    /// Ready queue (ids only).
    ready: VecDeque<MessageId>,

    /// Redelivery backoff.
    scheduled: BinaryHeap<ScheduledMessage>,

    deleted: usize,

    retry_policy: RetryPolicy,
    max_attempts: u32,
}

impl InMemoryQueueState {
    fn new(retry_policy: RetryPolicy, max_attempts: u32) -> Self {
        Self {
            records: HashMap::new(),
            ready: VecDeque::new(),
            scheduled: BinaryHeap::new(),
            deleted: 0,
            retry_policy,
            max_attempts,
        }
    }

    /// Move messages from scheduled to ready once their time has come.
    fn promote_scheduled(&mut self) {
        let now = Instant::now();
        while let Some(entry) = self.scheduled.peek() {
            if entry.next_run_at > now {
                break;
            }
            let Some(entry) = self.scheduled.pop() else {
                break;
            };
            if let Some(record) = self.records.get_mut(&entry.id)
                && record.state == MessageState::RetryScheduled
            {
                record.requeue();
                self.ready.push_back(entry.id);
            }
        }
    }

    fn lease_next(&mut self) -> Option<(MessageId, Message, u32)> {
        while let Some(id) = self.ready.pop_front() {
            if let Some(record) = self.records.get_mut(&id)
                && record.state.is_deliverable()
            {
                record.lease();
                return Some((id, record.message.clone(), record.attempts));
            }
        }
        None
    }

    fn counts_by_state(&self) -> QueueCounts {
        let mut counts = QueueCounts {
            deleted: self.deleted,
            ..QueueCounts::default()
        };
        for record in self.records.values() {
            match record.state {
                MessageState::Queued => counts.queued += 1,
                MessageState::Leased => counts.leased += 1,
                MessageState::RetryScheduled => counts.retry_scheduled += 1,
                MessageState::Dead => counts.dead += 1,
            }
        }
        counts
    }
}

/// In-memory queue implementation.
///
/// Delivers in FIFO order; failed deliveries come back after the retry
/// policy's backoff until `max_attempts` is reached, then the message is
/// marked dead and kept for inspection.
pub struct InMemoryQueue {
    state: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
    ids: Arc<dyn IdGenerator>,
}

impl InMemoryQueue {
    pub fn new(retry_policy: RetryPolicy, max_attempts: u32, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            state: Arc::new(Mutex::new(InMemoryQueueState::new(
                retry_policy,
                max_attempts.max(1),
            ))),
            notify: Arc::new(Notify::new()),
            ids,
        }
    }

    pub fn from_config(config: &QueueConfig, ids: Arc<dyn IdGenerator>) -> Self {
        Self::new(RetryPolicy::from_config(config), config.max_attempts, ids)
    }

    /// Messages that are still in the queue, oldest first, with their state.
    pub async fn snapshot(&self) -> Vec<(Message, MessageState)> {
        let state = self.state.lock().await;
        let mut records: Vec<&MessageRecord> = state.records.values().collect();
        records.sort_by_key(|record| record.message.id());
        records
            .into_iter()
            .map(|record| (record.message.clone(), record.state))
            .collect()
    }

    /// Messages that were dead-lettered together with their last error.
    pub async fn dead_letters(&self) -> Vec<(Message, Option<String>)> {
        self.snapshot_where(MessageState::Dead).await
    }

    async fn snapshot_where(&self, wanted: MessageState) -> Vec<(Message, Option<String>)> {
        let state = self.state.lock().await;
        let mut records: Vec<&MessageRecord> = state
            .records
            .values()
            .filter(|record| record.state == wanted)
            .collect();
        records.sort_by_key(|record| record.message.id());
        records
            .into_iter()
            .map(|record| (record.message.clone(), record.last_error.clone()))
            .collect()
    }
}

#[async_trait]
impl Queue for InMemoryQueue {
    async fn put(&self, action: Action, args: Vec<String>) -> Result<MessageId, QueueError> {
        let id = self.ids.generate_message_id();
        {
            let mut state = self.state.lock().await;
            let record = MessageRecord::new(Message::new(id, action, args), state.max_attempts);
            state.records.insert(id, record);
            state.ready.push_back(id);
        }
        self.notify.notify_one();
        Ok(id)
    }

    async fn get(&self, timeout: Duration) -> Result<Option<Box<dyn Delivery>>, QueueError> {
        let deadline = Instant::now() + timeout;
        loop {
            let next_wake = {
                let mut state = self.state.lock().await;
                state.promote_scheduled();

                if let Some((id, message, attempt)) = state.lease_next() {
                    let delivery = InMemoryDelivery {
                        id,
                        message,
                        attempt,
                        queue: Arc::clone(&self.state),
                        notify: Arc::clone(&self.notify),
                    };
                    return Ok(Some(Box::new(delivery)));
                }

                state.scheduled.peek().map(|entry| entry.next_run_at)
            };

            if Instant::now() >= deadline {
                return Ok(None);
            }

            // Wait for a put, the next scheduled redelivery or the deadline.
            let wake_at = match next_wake {
                Some(at) if at < deadline => at,
                _ => deadline,
            };
            tokio::select! {
                _ = self.notify.notified() => {},
                _ = tokio::time::sleep_until(wake_at) => {},
            }
        }
    }

    async fn counts_by_state(&self) -> Result<QueueCounts, QueueError> {
        let state = self.state.lock().await;
        Ok(state.counts_by_state())
    }
}

struct InMemoryDelivery {
    id: MessageId,
    message: Message,
    attempt: u32,
    queue: Arc<Mutex<InMemoryQueueState>>,
    notify: Arc<Notify>,
}

#[async_trait]
impl Delivery for InMemoryDelivery {
    fn message(&self) -> &Message {
        &self.message
    }

    fn attempt(&self) -> u32 {
        self.attempt
    }

    async fn delete(self: Box<Self>) -> Result<(), QueueError> {
        let mut state = self.queue.lock().await;
        match state.records.get(&self.id) {
            Some(record) if record.state == MessageState::Leased => {
                state.records.remove(&self.id);
                state.deleted += 1;
                Ok(())
            }
            _ => Err(QueueError::NotLeased(self.id)),
        }
    }

    async fn release(self: Box<Self>, error: String) -> Result<(), QueueError> {
        let scheduled = {
            let mut state = self.queue.lock().await;
            let delay = state.retry_policy.next_delay(self.attempt);

            let Some(record) = state.records.get_mut(&self.id) else {
                return Err(QueueError::NotLeased(self.id));
            };
            if record.state != MessageState::Leased {
                return Err(QueueError::NotLeased(self.id));
            }

            if record.is_exhausted() {
                tracing::error!(
                    message_id = %self.id,
                    action = %self.message.action(),
                    args = ?self.message.args(),
                    attempts = record.attempts,
                    error = %error,
                    "message dead-lettered"
                );
                record.mark_dead(error);
                false
            } else {
                let now = Instant::now();
                let next_run_at = now.checked_add(delay).unwrap_or(now);
                record.schedule_retry(next_run_at, error);
                state.scheduled.push(ScheduledMessage {
                    next_run_at,
                    id: self.id,
                });
                true
            }
        };

        // Notify outside the lock so a waiting worker recomputes its wake time.
        if scheduled {
            self.notify.notify_one();
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{SystemClock, UlidGenerator};

    fn queue(max_attempts: u32) -> InMemoryQueue {
        let policy = RetryPolicy {
            base_delay: Duration::from_millis(10),
            multiplier: 1.0,
        };
        InMemoryQueue::new(
            policy,
            max_attempts,
            Arc::new(UlidGenerator::new(SystemClock)),
        )
    }

    const WAIT: Duration = Duration::from_millis(200);

    #[tokio::test]
    async fn put_and_counts() {
        let queue = queue(5);

        queue
            .put(Action::RegenerateApprc, vec!["myapp".into()])
            .await
            .unwrap();

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.queued, 1);
        assert_eq!(counts.leased, 0);
    }

    #[tokio::test]
    async fn get_returns_none_after_timeout() {
        let queue = queue(5);

        let delivery = queue.get(Duration::from_millis(20)).await.unwrap();

        assert!(delivery.is_none());
    }

    #[tokio::test]
    async fn get_delivers_in_fifo_order() {
        let queue = queue(5);
        queue
            .put(Action::RegenerateApprc, vec!["first".into()])
            .await
            .unwrap();
        queue
            .put(Action::DestroyApp, vec!["second".into()])
            .await
            .unwrap();

        let first = queue.get(WAIT).await.unwrap().unwrap();
        let second = queue.get(WAIT).await.unwrap().unwrap();

        assert_eq!(first.message().arg(0), Some("first"));
        assert_eq!(second.message().action(), Action::DestroyApp);
        assert_eq!(first.attempt(), 1);
    }

    #[tokio::test]
    async fn get_wakes_up_on_put() {
        let queue = Arc::new(queue(5));
        let waiter = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.get(Duration::from_secs(5)).await })
        };

        tokio::time::sleep(Duration::from_millis(20)).await;
        queue
            .put(Action::BindService, vec!["myapp".into(), "myapp/0".into()])
            .await
            .unwrap();

        let delivery = waiter.await.unwrap().unwrap().unwrap();
        assert_eq!(delivery.message().action(), Action::BindService);
    }

    #[tokio::test]
    async fn delete_removes_the_message() {
        let queue = queue(5);
        queue
            .put(Action::RegenerateApprc, vec!["myapp".into()])
            .await
            .unwrap();

        let delivery = queue.get(WAIT).await.unwrap().unwrap();
        delivery.delete().await.unwrap();

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.deleted, 1);
        assert_eq!(counts.pending(), 0);
        assert!(queue.snapshot().await.is_empty());
    }

    #[tokio::test]
    async fn released_message_is_redelivered_after_backoff() {
        let queue = queue(5);
        queue
            .put(Action::RegenerateApprc, vec!["myapp".into()])
            .await
            .unwrap();

        let delivery = queue.get(WAIT).await.unwrap().unwrap();
        delivery.release("boom".into()).await.unwrap();

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.retry_scheduled, 1);

        let again = queue.get(WAIT).await.unwrap().unwrap();
        assert_eq!(again.message().arg(0), Some("myapp"));
        assert_eq!(again.attempt(), 2);
    }

    #[tokio::test]
    async fn message_is_dead_lettered_after_max_attempts() {
        let queue = queue(2);
        queue
            .put(Action::DestroyApp, vec!["myapp".into()])
            .await
            .unwrap();

        let first = queue.get(WAIT).await.unwrap().unwrap();
        first.release("err1".into()).await.unwrap();
        let second = queue.get(WAIT).await.unwrap().unwrap();
        second.release("err2".into()).await.unwrap();

        assert!(queue.get(Duration::from_millis(50)).await.unwrap().is_none());

        let dead = queue.dead_letters().await;
        assert_eq!(dead.len(), 1);
        assert_eq!(dead[0].0.action(), Action::DestroyApp);
        assert_eq!(dead[0].1.as_deref(), Some("err2"));
    }

    #[tokio::test]
    async fn runaway_backoff_is_still_scheduled() {
        let queue = InMemoryQueue::new(
            RetryPolicy {
                base_delay: Duration::from_secs(2),
                multiplier: 1e300,
            },
            100,
            Arc::new(UlidGenerator::new(SystemClock)),
        );
        queue
            .put(Action::RegenerateApprc, vec!["myapp".into()])
            .await
            .unwrap();

        for _ in 0..3 {
            let delivery = queue.get(WAIT).await.unwrap().unwrap();
            delivery.release("boom".into()).await.unwrap();
            // skip the capped backoff
            let mut state = queue.state.lock().await;
            let mut entry = state.scheduled.pop().unwrap();
            entry.next_run_at = Instant::now();
            state.scheduled.push(entry);
        }

        let counts = queue.counts_by_state().await.unwrap();
        assert_eq!(counts.retry_scheduled, 1);
        assert_eq!(counts.leased, 0);
    }

    #[tokio::test]
    async fn delete_of_vanished_message_is_rejected() {
        let queue = queue(5);
        let id = queue
            .put(Action::RegenerateApprc, vec!["myapp".into()])
            .await
            .unwrap();

        let delivery = queue.get(WAIT).await.unwrap().unwrap();
        {
            let mut state = queue.state.lock().await;
            state.records.remove(&id);
        }

        assert_eq!(delivery.delete().await, Err(QueueError::NotLeased(id)));
    }
}
