//! App creation and its compensations.

use rand::RngCore;

use super::Orchestrator;
use crate::domain::env::{
    APP_NAME_VAR, APP_TOKEN_VAR, HOST_VAR, S3_ACCESS_KEY_VAR, S3_BUCKET_VAR, S3_ENDPOINT_VAR,
    S3_LOCATION_CONSTRAINT_VAR, S3_SECRET_KEY_VAR, STORAGE_INSTANCE,
};
use crate::domain::{App, EnvVar, Team, merge_envs, members};
use crate::error::EngineError;
use crate::ports::{BucketCredentials, PortError};
use crate::queue::Action;

/// App name plus a random hex suffix, cut to `max_len`.
pub(crate) fn bucket_name(app: &str, max_len: usize) -> String {
    let mut suffix = [0u8; 32];
    rand::thread_rng().fill_bytes(&mut suffix);
    let mut name = format!("{app}{}", hex::encode(suffix));
    name.truncate(max_len);
    name
}

fn storage_envs(credentials: &BucketCredentials) -> Vec<EnvVar> {
    [
        (S3_ENDPOINT_VAR, credentials.endpoint.clone()),
        (
            S3_LOCATION_CONSTRAINT_VAR,
            credentials.location_constraint.to_string(),
        ),
        (S3_ACCESS_KEY_VAR, credentials.access_key.clone()),
        (S3_SECRET_KEY_VAR, credentials.secret_key.clone()),
        (S3_BUCKET_VAR, credentials.bucket.clone()),
    ]
    .into_iter()
    .map(|(name, value)| EnvVar::private(name, value).scoped(STORAGE_INSTANCE))
    .collect()
}

impl Orchestrator {
    /// Creates an app owned by `teams` with `units` units.
    ///
    /// On success the app is persisted and provisioned, and apprc
    /// regeneration plus per-unit start and service binding are queued.
    /// Any failure after the repository step rolls back what was created
    /// and queues `destroy-app`.
    pub async fn create_app(
        &self,
        name: &str,
        platform: &str,
        units: usize,
        teams: &[Team],
    ) -> Result<App, EngineError> {
        if units == 0 {
            return Err(EngineError::Validation(
                "Cannot create app with 0 units.".into(),
            ));
        }
        if teams.is_empty() {
            return Err(EngineError::NoTeams);
        }
        App::validate_name(name)?;
        match self.apps.get(name).await {
            Ok(_) => {
                return Err(EngineError::AlreadyExists {
                    app: name.to_string(),
                });
            }
            Err(PortError::NotFound(_)) => {}
            Err(err) => return Err(EngineError::collaborator("Failed to access app store", err)),
        }

        let mut app = App::new(name, platform);
        app.set_teams(teams);

        if self.config.bucket_support {
            let bucket = bucket_name(name, self.config.bucket.max_name_len);
            match self.storage.create_bucket(name, &bucket).await {
                Ok(credentials) => {
                    merge_envs(&mut app.env, storage_envs(&credentials), false);
                }
                Err(err) => {
                    // an existing bucket belongs to someone else
                    if !matches!(err, PortError::AlreadyExists(_)) {
                        self.enqueue_best_effort(Action::DestroyApp, [name]).await;
                    }
                    return Err(EngineError::creation_failed(
                        name,
                        EngineError::collaborator("Failed to create the bucket", err),
                    ));
                }
            }
        }

        let token = match self.tokens.create_app_token(name).await {
            Ok(token) => token,
            Err(err) => {
                self.enqueue_best_effort(Action::DestroyApp, [name]).await;
                return Err(EngineError::creation_failed(
                    name,
                    EngineError::collaborator("Failed to create the app token", err),
                ));
            }
        };
        merge_envs(
            &mut app.env,
            [
                EnvVar::private(APP_NAME_VAR, name),
                EnvVar::private(HOST_VAR, self.config.host.clone()),
                EnvVar::private(APP_TOKEN_VAR, token.token.clone()),
            ],
            false,
        );

        if let Err(err) = self
            .repository
            .create_repository(name, &members(teams))
            .await
        {
            self.discard_token(&app).await;
            self.enqueue_best_effort(Action::DestroyApp, [name]).await;
            return Err(EngineError::creation_failed(
                name,
                EngineError::collaborator("Failed to create the repository", err),
            ));
        }

        if let Err(err) = self.apps.insert(&app).await {
            self.discard_token(&app).await;
            self.discard_repository(&app).await;
            self.enqueue_best_effort(Action::DestroyApp, [name]).await;
            return Err(match err {
                PortError::AlreadyExists(_) => EngineError::AlreadyExists {
                    app: name.to_string(),
                },
                err => EngineError::collaborator("Failed to access app store", err),
            });
        }

        if let Err(err) = self.provision_units(&mut app, units).await {
            self.roll_back_creation(&app).await;
            return Err(EngineError::creation_failed(name, err.into()));
        }
        self.save(&app).await?;

        self.enqueue(Action::RegenerateApprc, [name]).await?;
        for unit in &app.units {
            self.enqueue(Action::RegenerateApprcAndStart, [name, unit.name.as_str()])
                .await?;
            self.enqueue(Action::BindService, [name, unit.name.as_str()])
                .await?;
        }
        tracing::info!(app = name, platform, units = app.units.len(), "app created");
        Ok(app)
    }

    async fn provision_units(
        &self,
        app: &mut App,
        units: usize,
    ) -> Result<(), crate::ports::ProvisionError> {
        for unit in self.provisioner.provision(app).await? {
            app.append_or_update(unit);
        }
        if units > app.units.len() {
            let missing = units - app.units.len();
            for unit in self.provisioner.add_units(app, missing).await? {
                app.append_or_update(unit);
            }
        }
        Ok(())
    }

    async fn roll_back_creation(&self, app: &App) {
        tracing::warn!(app = %app.name, "provisioning failed, rolling back");
        if let Err(err) = self.provisioner.destroy(app).await {
            tracing::warn!(app = %app.name, error = %err, "failed to release provisioned units");
        }
        if let Err(err) = self.apps.delete(&app.name).await {
            tracing::warn!(app = %app.name, error = %err, "failed to delete app record");
        }
        if self.config.bucket_support
            && let Err(err) = self.storage.destroy_bucket(&app.name).await
            && !err.is_not_found()
        {
            tracing::warn!(app = %app.name, error = %err, "failed to destroy bucket");
        }
        self.discard_token(app).await;
        self.discard_repository(app).await;
        self.enqueue_best_effort(Action::DestroyApp, [app.name.as_str()])
            .await;
    }

    async fn discard_token(&self, app: &App) {
        if let Some(token) = app.env_value(APP_TOKEN_VAR)
            && let Err(err) = self.tokens.delete_token(token).await
        {
            tracing::warn!(app = %app.name, error = %err, "failed to delete app token");
        }
    }

    async fn discard_repository(&self, app: &App) {
        if let Err(err) = self.repository.remove_repository(&app.name).await
            && !err.is_not_found()
        {
            tracing::warn!(app = %app.name, error = %err, "failed to remove repository");
        }
    }
}
