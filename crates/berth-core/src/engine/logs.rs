//! App logs: persisted first, then fanned out to live listeners.

use super::Orchestrator;
use crate::domain::{Applog, split_log_lines};
use crate::error::EngineError;
use crate::logs::LogListener;

impl Orchestrator {
    /// Appends one record per non-blank line of `message`.
    pub async fn log(&self, name: &str, message: &str, source: &str) -> Result<(), EngineError> {
        let records = split_log_lines(name, message, source, self.clock.now());
        if records.is_empty() {
            return Ok(());
        }
        self.logs
            .append(&records)
            .await
            .map_err(|err| EngineError::collaborator("Failed to store log", err))?;
        for record in &records {
            self.broadcaster.publish(record);
        }
        Ok(())
    }

    /// The `n` most recent records, oldest first, optionally of one source.
    pub async fn last_logs(
        &self,
        name: &str,
        n: usize,
        source: Option<&str>,
    ) -> Result<Vec<Applog>, EngineError> {
        self.logs
            .last(name, n, source)
            .await
            .map_err(|err| EngineError::collaborator("Failed to read logs", err))
    }

    /// Subscribes to every record logged for the app from now on.
    pub fn new_log_listener(&self, name: &str) -> LogListener {
        self.broadcaster.subscribe(name)
    }
}
