//! Environment variables and service bindings.

use std::collections::BTreeMap;

use super::Orchestrator;
use crate::domain::{App, EnvMap, EnvVar, merge_envs, remove_envs, render_apprc};
use crate::error::EngineError;
use crate::ports::{PortError, ProvisionError};
use crate::queue::Action;

impl Orchestrator {
    /// Sets `vars` on the app and queues apprc regeneration.
    pub async fn set_envs(
        &self,
        name: &str,
        vars: Vec<EnvVar>,
        public_only: bool,
    ) -> Result<Vec<String>, EngineError> {
        self.set_envs_to_app(name, vars, public_only, true).await
    }

    /// Merges `vars` into the stored env and returns the names written.
    ///
    /// With `public_only`, existing private variables keep their value.
    /// `write_env_file` queues a `regenerate-apprc` when anything changed.
    pub async fn set_envs_to_app(
        &self,
        name: &str,
        vars: Vec<EnvVar>,
        public_only: bool,
        write_env_file: bool,
    ) -> Result<Vec<String>, EngineError> {
        for var in &vars {
            EnvVar::validate_name(&var.name)?;
        }
        let mut app = self.get(name).await?;
        let written = merge_envs(&mut app.env, vars, public_only);
        if written.is_empty() {
            return Ok(written);
        }
        self.save(&app).await?;
        if write_env_file {
            self.enqueue(Action::RegenerateApprc, [name]).await?;
        }
        tracing::debug!(app = name, vars = ?written, "env vars set");
        Ok(written)
    }

    /// Removes `names` from the app. With `public_only`, private variables
    /// survive.
    pub async fn unset_envs(
        &self,
        name: &str,
        names: &[String],
        public_only: bool,
    ) -> Result<Vec<String>, EngineError> {
        let mut app = self.get(name).await?;
        let removed = remove_envs(&mut app.env, names, public_only);
        if removed.is_empty() {
            return Ok(removed);
        }
        self.save(&app).await?;
        self.enqueue(Action::RegenerateApprc, [name]).await?;
        tracing::debug!(app = name, vars = ?removed, "env vars unset");
        Ok(removed)
    }

    /// Display form of the requested variables, or of all of them when
    /// `names` is empty. Private values are masked.
    pub async fn get_env(
        &self,
        name: &str,
        names: &[String],
    ) -> Result<BTreeMap<String, String>, EngineError> {
        let app = self.get(name).await?;
        Ok(app
            .env
            .values()
            .filter(|var| names.is_empty() || names.contains(&var.name))
            .map(|var| (var.name.clone(), var.to_string()))
            .collect())
    }

    /// Variables owned by one service instance.
    pub async fn instance_env(&self, name: &str, instance: &str) -> Result<EnvMap, EngineError> {
        let app = self.get(name).await?;
        Ok(crate::domain::instance_env(&app.env, instance))
    }

    /// Binds the app to a service instance and stores the variables the
    /// instance hands back, scoped to it.
    pub async fn bind_service(&self, instance: &str, name: &str) -> Result<(), EngineError> {
        let app = self.get(name).await?;
        let vars = self
            .services
            .bind_app(instance, &app)
            .await
            .map_err(|err| service_error(instance, "Failed to bind the instance", err))?;
        let vars: Vec<EnvVar> = vars.into_iter().map(|var| var.scoped(instance)).collect();
        self.set_envs_to_app(name, vars, false, true).await?;
        tracing::info!(app = name, instance, "service bound");
        Ok(())
    }

    /// Unbinds the app and drops the variables the instance owned.
    pub async fn unbind_service(&self, instance: &str, name: &str) -> Result<(), EngineError> {
        let mut app = self.get(name).await?;
        self.services
            .unbind_app(instance, &app)
            .await
            .map_err(|err| service_error(instance, "Failed to unbind the instance", err))?;

        let owned: Vec<String> = crate::domain::instance_env(&app.env, instance)
            .into_keys()
            .collect();
        remove_envs(&mut app.env, &owned, false);
        self.save(&app).await?;
        self.enqueue(Action::RegenerateApprc, [name]).await?;
        tracing::info!(app = name, instance, "service unbound");
        Ok(())
    }

    /// Writes the apprc file onto the app's units.
    pub(crate) async fn serialize_env_vars(&self, app: &App) -> Result<(), EngineError> {
        if !app.available() {
            return Err(EngineError::PreconditionFailed(
                "Failed to write env vars: App must be available to run commands.".into(),
            ));
        }
        let cmd = render_apprc(&app.env, &self.config.unit.apprc, self.clock.now());
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        if let Err(err) = self
            .provisioner
            .execute_command(&mut stdout, &mut stderr, app, &cmd, &[])
            .await
        {
            stdout.extend_from_slice(&stderr);
            let output = String::from_utf8_lossy(&stdout);
            return Err(ProvisionError::new(format!(
                "Failed to write env vars ({err}): {}.",
                output.trim()
            ))
            .into());
        }
        Ok(())
    }
}

fn service_error(instance: &str, context: &str, err: PortError) -> EngineError {
    if err.is_not_found() {
        EngineError::NotFound(format!("Service instance {instance} not found."))
    } else {
        EngineError::collaborator(context, err)
    }
}
