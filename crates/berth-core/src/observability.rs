use std::collections::BTreeMap;

use serde::Serialize;

use crate::engine::Orchestrator;
use crate::error::EngineError;
use crate::queue::QueueCounts;

/// Point-in-time view of the engine: stored apps, their units by status,
/// and the queue.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct EngineStatus {
    pub apps: usize,
    pub units: BTreeMap<String, usize>,
    pub queue: QueueCounts,
}

impl Orchestrator {
    pub async fn status(&self) -> Result<EngineStatus, EngineError> {
        let apps = self
            .apps
            .list()
            .await
            .map_err(|err| EngineError::collaborator("Failed to list apps", err))?;
        let mut units = BTreeMap::new();
        for unit in apps.iter().flat_map(|app| &app.units) {
            *units.entry(unit.status.to_string()).or_insert(0) += 1;
        }
        Ok(EngineStatus {
            apps: apps.len(),
            units,
            queue: self.queue.counts_by_state().await?,
        })
    }
}
