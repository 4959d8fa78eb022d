//! Scaling: adding, removing and refreshing units.

use std::collections::BTreeMap;

use super::Orchestrator;
use crate::domain::{Unit, select_units_for_removal, validate_removal};
use crate::error::EngineError;
use crate::queue::Action;

impl Orchestrator {
    /// Adds `n` units. Each new unit gets its apprc written and is started,
    /// then bound to the app's service instances.
    pub async fn add_units(&self, name: &str, n: usize) -> Result<Vec<Unit>, EngineError> {
        if n == 0 {
            return Err(EngineError::Validation("Cannot add zero units.".into()));
        }
        let mut app = self.get(name).await?;
        if app.units.is_empty() {
            return Err(EngineError::PreconditionFailed(
                "App is not provisioned.".into(),
            ));
        }

        let units = self.provisioner.add_units(&app, n).await?;
        for unit in &units {
            app.append_or_update(unit.clone());
        }
        self.save(&app).await?;

        for unit in &units {
            self.enqueue(Action::RegenerateApprcAndStart, [name, unit.name.as_str()])
                .await?;
            self.enqueue(Action::BindService, [name, unit.name.as_str()])
                .await?;
        }
        tracing::info!(app = name, added = units.len(), total = app.units.len(), "units added");
        Ok(units)
    }

    /// Removes `n` units, failing ones first.
    ///
    /// Units are deprovisioned one by one; the first failure stops the
    /// removal and is returned as is. Units already deprovisioned by then
    /// stay removed from the record.
    pub async fn remove_units(&self, name: &str, n: usize) -> Result<(), EngineError> {
        let mut app = self.get(name).await?;
        validate_removal(n, app.units.len())?;

        let mut removed = Vec::with_capacity(n);
        let mut failure = None;
        for index in select_units_for_removal(&app.units, n) {
            match self.provisioner.remove_unit(&app, &app.units[index].name).await {
                Ok(()) => removed.push(index),
                Err(err) => {
                    tracing::warn!(
                        app = name,
                        unit = %app.units[index].name,
                        error = %err,
                        "failed to remove unit"
                    );
                    failure = Some(err);
                    break;
                }
            }
        }

        if !removed.is_empty() {
            let gone: Vec<Unit> = removed.iter().map(|&i| app.units[i].clone()).collect();
            app.remove_units_at(&removed);
            self.save(&app).await?;
            for unit in &gone {
                self.enqueue(
                    Action::UnbindUnit,
                    [name, unit.name.as_str(), unit.ip.as_str()],
                )
                .await?;
            }
            tracing::info!(app = name, removed = gone.len(), total = app.units.len(), "units removed");
        }

        match failure {
            Some(err) => Err(err.into()),
            None => Ok(()),
        }
    }

    /// Removes one unit, found by display name or instance id.
    pub async fn remove_unit(&self, name: &str, id: &str) -> Result<(), EngineError> {
        let mut app = self.get(name).await?;
        let index = app
            .find_unit(id)
            .ok_or_else(|| EngineError::NotFound("Unit not found.".into()))?;
        let unit = app.units[index].clone();

        self.provisioner.remove_unit(&app, &unit.name).await?;
        app.remove_units_at(&[index]);
        self.save(&app).await?;
        self.enqueue(
            Action::UnbindUnit,
            [name, unit.name.as_str(), unit.ip.as_str()],
        )
        .await?;
        tracing::info!(app = name, unit = %unit.name, "unit removed");
        Ok(())
    }

    /// Applies what the provisioner observes to the stored apps.
    /// Returns how many apps were updated.
    pub async fn collect_status(&self) -> Result<usize, EngineError> {
        let mut by_app: BTreeMap<String, Vec<Unit>> = BTreeMap::new();
        for report in self.provisioner.collect_status().await? {
            by_app.entry(report.app).or_default().push(report.unit);
        }

        let mut updated = 0;
        for (name, units) in by_app {
            let mut app = match self.get(&name).await {
                Ok(app) => app,
                Err(EngineError::NotFound(_)) => {
                    tracing::debug!(app = %name, "status for unknown app ignored");
                    continue;
                }
                Err(err) => return Err(err),
            };
            for unit in units {
                app.append_or_update(unit);
            }
            self.save(&app).await?;
            updated += 1;
        }
        Ok(updated)
    }
}
