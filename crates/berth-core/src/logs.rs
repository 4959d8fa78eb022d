//! Live log fan-out.
//!
//! Every listener owns a bounded buffer. Publishing never waits: when a
//! listener's buffer is full the record is dropped for that listener only.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tokio::sync::mpsc;

use crate::domain::{Applog, ListenerId};
use crate::ports::IdGenerator;

struct Subscriber {
    id: ListenerId,
    tx: mpsc::Sender<Applog>,
}

pub struct LogBroadcaster {
    listeners: Mutex<HashMap<String, Vec<Subscriber>>>,
    buffer: usize,
    ids: Arc<dyn IdGenerator>,
}

impl LogBroadcaster {
    pub fn new(buffer: usize, ids: Arc<dyn IdGenerator>) -> Arc<Self> {
        Arc::new(Self {
            listeners: Mutex::new(HashMap::new()),
            buffer: buffer.max(1),
            ids,
        })
    }

    pub fn subscribe(self: &Arc<Self>, app: &str) -> LogListener {
        let (tx, rx) = mpsc::channel(self.buffer);
        let id = self.ids.generate_listener_id();
        self.lock()
            .entry(app.to_string())
            .or_default()
            .push(Subscriber { id, tx });
        tracing::debug!(app, listener = %id, "log listener subscribed");
        LogListener {
            id,
            app: app.to_string(),
            rx,
            hub: Arc::downgrade(self),
            closed: false,
        }
    }

    /// Hands `log` to every listener of its app.
    pub fn publish(&self, log: &Applog) {
        let mut listeners = self.lock();
        let Some(subscribers) = listeners.get_mut(&log.app) else {
            return;
        };
        subscribers.retain(|subscriber| match subscriber.tx.try_send(log.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                tracing::trace!(app = %log.app, listener = %subscriber.id, "listener is full, record dropped");
                true
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });
        if subscribers.is_empty() {
            listeners.remove(&log.app);
        }
    }

    pub fn listener_count(&self, app: &str) -> usize {
        self.lock().get(app).map_or(0, Vec::len)
    }

    fn unsubscribe(&self, app: &str, id: ListenerId) {
        let mut listeners = self.lock();
        if let Some(subscribers) = listeners.get_mut(app) {
            subscribers.retain(|subscriber| subscriber.id != id);
            if subscribers.is_empty() {
                listeners.remove(app);
            }
        }
    }

    // Publishing must keep working even if a holder of the lock panicked.
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Vec<Subscriber>>> {
        self.listeners.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// A live subscription to one app's log. Dropping it closes it.
pub struct LogListener {
    id: ListenerId,
    app: String,
    rx: mpsc::Receiver<Applog>,
    hub: Weak<LogBroadcaster>,
    closed: bool,
}

impl LogListener {
    pub fn id(&self) -> ListenerId {
        self.id
    }

    pub fn app(&self) -> &str {
        &self.app
    }

    /// Next record, or `None` once the listener is closed.
    pub async fn recv(&mut self) -> Option<Applog> {
        if self.closed {
            return None;
        }
        self.rx.recv().await
    }

    pub fn try_recv(&mut self) -> Option<Applog> {
        if self.closed {
            return None;
        }
        self.rx.try_recv().ok()
    }

    /// Stops delivery; buffered records are discarded.
    pub fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        if let Some(hub) = self.hub.upgrade() {
            hub.unsubscribe(&self.app, self.id);
        }
        self.rx.close();
        while self.rx.try_recv().is_ok() {}
        tracing::debug!(app = %self.app, listener = %self.id, "log listener closed");
    }
}

impl Drop for LogListener {
    fn drop(&mut self) {
        self.close();
    }
}
