use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::queue::Queue;
use crate::runtime::Runtime;

/// Worker group handle.
/// - `request_shutdown` でワーカー全体が新しいメッセージを取らなくなる
/// - `shutdown_and_join` で全ワーカーの終了を待てる
pub struct WorkerGroup {
    shutdown_tx: watch::Sender<bool>,
    joins: Vec<JoinHandle<()>>,
}

impl WorkerGroup {
    /// Spawn `n` workers, each waiting up to `poll_timeout` per `get`.
    pub fn spawn(
        n: usize,
        queue: Arc<dyn Queue>,
        runtime: Arc<Runtime>,
        poll_timeout: Duration,
    ) -> Self {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);

        let mut joins = Vec::with_capacity(n);
        for worker_id in 0..n {
            let q = Arc::clone(&queue);
            let rt = Arc::clone(&runtime);
            let mut rx = shutdown_rx.clone();

            let join = tokio::spawn(async move {
                worker_loop(worker_id, q, rt, poll_timeout, &mut rx).await;
            });
            joins.push(join);
        }
        tracing::info!(workers = n, "worker group started");

        Self { shutdown_tx, joins }
    }

    pub fn len(&self) -> usize {
        self.joins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.joins.is_empty()
    }

    /// Request shutdown for all workers.
    /// In-flight handlers run to completion; no new messages are taken.
    pub fn request_shutdown(&self) {
        // receivers may already be dropped
        let _ = self.shutdown_tx.send(true);
    }

    /// Shutdown and wait for all workers.
    pub async fn shutdown_and_join(self) {
        self.request_shutdown();
        for join in self.joins {
            if let Err(err) = join.await {
                tracing::error!(error = %err, "worker panicked");
            }
        }
        tracing::info!("worker group stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn Queue>,
    runtime: Arc<Runtime>,
    poll_timeout: Duration,
    shutdown_rx: &mut watch::Receiver<bool>,
) {
    loop {
        if *shutdown_rx.borrow() {
            break;
        }

        // get は待つので shutdown と競合させる
        let delivery = tokio::select! {
            _ = shutdown_rx.changed() => continue,
            delivery = queue.get(poll_timeout) => delivery,
        };

        let delivery = match delivery {
            Ok(Some(delivery)) => delivery,
            Ok(None) => continue,
            Err(err) => {
                tracing::warn!(worker = worker_id, error = %err, "queue get failed");
                tokio::time::sleep(poll_timeout).await;
                continue;
            }
        };

        // handler 実行に必要な分だけ owned にする
        let message = delivery.message().clone();
        let attempt = delivery.attempt();
        let action = message.action();

        match runtime.execute(&message).await {
            Ok(()) => {
                tracing::debug!(worker = worker_id, %action, attempt, "message handled");
                if let Err(err) = delivery.delete().await {
                    tracing::warn!(worker = worker_id, %action, error = %err, "delete failed");
                }
            }
            Err(err) => {
                if err.is_retryable() {
                    tracing::warn!(worker = worker_id, %action, attempt, args = ?message.args(), error = %err, "handler failed");
                } else {
                    tracing::error!(worker = worker_id, %action, attempt, args = ?message.args(), error = %err, "handler failed");
                }
                // queue が再配送か dead かを決める
                if let Err(err) = delivery.release(err.to_string()).await {
                    tracing::warn!(worker = worker_id, %action, error = %err, "release failed");
                }
            }
        }
    }
}
