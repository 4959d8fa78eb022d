//! Orchestrator - アプリのライフサイクル操作の入口
//!
//! # 設計原則
//! - ストアが正本。操作のたびに読み直し、変更して、書き戻す（last-writer-wins）
//! - 遅い・失敗しうる副作用はキューに積み、ワーカーに任せる
//! - 各操作は `create.rs` / `scale.rs` / `access.rs` / `env.rs` /
//!   `command.rs` / `logs.rs` に分けて `impl Orchestrator` を足していく

use std::sync::Arc;

use serde::Serialize;

use crate::config::Config;
use crate::domain::{App, Unit, User, members};
use crate::error::EngineError;
use crate::logs::LogBroadcaster;
use crate::ports::{
    AppStore, Clock, IdGenerator, LogStore, PortError, Provisioner, RepositoryHost,
    ServiceCatalog, StorageIssuer, TeamDirectory, TokenIssuer,
};
use crate::queue::{Action, Queue};

/// Everything the orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub apps: Arc<dyn AppStore>,
    pub logs: Arc<dyn LogStore>,
    pub provisioner: Arc<dyn Provisioner>,
    pub repository: Arc<dyn RepositoryHost>,
    pub storage: Arc<dyn StorageIssuer>,
    pub services: Arc<dyn ServiceCatalog>,
    pub teams: Arc<dyn TeamDirectory>,
    pub tokens: Arc<dyn TokenIssuer>,
    pub queue: Arc<dyn Queue>,
    pub clock: Arc<dyn Clock>,
    pub ids: Arc<dyn IdGenerator>,
}

pub struct Orchestrator {
    pub(crate) config: Arc<Config>,
    pub(crate) apps: Arc<dyn AppStore>,
    pub(crate) logs: Arc<dyn LogStore>,
    pub(crate) provisioner: Arc<dyn Provisioner>,
    pub(crate) repository: Arc<dyn RepositoryHost>,
    pub(crate) storage: Arc<dyn StorageIssuer>,
    pub(crate) services: Arc<dyn ServiceCatalog>,
    pub(crate) teams: Arc<dyn TeamDirectory>,
    pub(crate) tokens: Arc<dyn TokenIssuer>,
    pub(crate) queue: Arc<dyn Queue>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) broadcaster: Arc<LogBroadcaster>,
}

/// Read-only view of an app handed to API clients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AppInfo {
    pub name: String,
    pub platform: String,
    pub repository: String,
    pub teams: Vec<String>,
    pub units: Vec<Unit>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ip: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cname: Option<String>,
}

impl Orchestrator {
    pub fn new(config: Arc<Config>, collaborators: Collaborators) -> Self {
        let broadcaster =
            LogBroadcaster::new(config.logs.listener_buffer, Arc::clone(&collaborators.ids));
        Self {
            config,
            apps: collaborators.apps,
            logs: collaborators.logs,
            provisioner: collaborators.provisioner,
            repository: collaborators.repository,
            storage: collaborators.storage,
            services: collaborators.services,
            teams: collaborators.teams,
            tokens: collaborators.tokens,
            queue: collaborators.queue,
            clock: collaborators.clock,
            broadcaster,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn queue(&self) -> &Arc<dyn Queue> {
        &self.queue
    }

    pub async fn get(&self, name: &str) -> Result<App, EngineError> {
        self.apps
            .get(name)
            .await
            .map_err(|err| app_store_error(name, err))
    }

    /// Like [`get`](Self::get), but only for users of an owning team (or admins).
    pub async fn get_for_user(&self, name: &str, user: &User) -> Result<App, EngineError> {
        let app = self.get(name).await?;
        if self.is_admin(user).await? {
            return Ok(app);
        }
        let teams = self
            .teams
            .teams_for_user(user)
            .await
            .map_err(|err| EngineError::collaborator("Failed to load user teams", err))?;
        if teams.iter().any(|team| app.has_team(&team.name)) {
            Ok(app)
        } else {
            Err(EngineError::Forbidden(
                "User does not have access to this app".into(),
            ))
        }
    }

    /// Apps visible to `user`: every app for admins, otherwise the apps of
    /// the user's teams.
    pub async fn list(&self, user: &User) -> Result<Vec<App>, EngineError> {
        let result = if self.is_admin(user).await? {
            self.apps.list().await
        } else {
            let teams = self
                .teams
                .teams_for_user(user)
                .await
                .map_err(|err| EngineError::collaborator("Failed to load user teams", err))?;
            let names: Vec<String> = teams.into_iter().map(|team| team.name).collect();
            self.apps.list_by_teams(&names).await
        };
        result.map_err(|err| EngineError::collaborator("Failed to list apps", err))
    }

    pub async fn info(&self, name: &str) -> Result<AppInfo, EngineError> {
        let app = self.get(name).await?;
        Ok(AppInfo {
            repository: self.repository.repository_url(&app.name),
            name: app.name,
            platform: app.platform,
            teams: app.teams,
            units: app.units,
            ip: app.ip,
            cname: app.cname,
        })
    }

    /// Deprovisions the app, removes its repository, token and logs, deletes
    /// the record and leaves storage cleanup to the `destroy-app` action.
    pub async fn force_destroy(&self, name: &str) -> Result<(), EngineError> {
        let app = self.get(name).await?;

        if !app.units.is_empty() {
            self.provisioner.destroy(&app).await?;
        }
        if let Err(err) = self.repository.remove_repository(&app.name).await
            && !err.is_not_found()
        {
            tracing::warn!(app = %app.name, error = %err, "failed to remove repository");
        }
        if let Some(token) = app.env_value(crate::domain::env::APP_TOKEN_VAR)
            && let Err(err) = self.tokens.delete_token(token).await
            && !err.is_not_found()
        {
            tracing::warn!(app = %app.name, error = %err, "failed to delete app token");
        }
        if let Err(err) = self.logs.delete_app(&app.name).await {
            tracing::warn!(app = %app.name, error = %err, "failed to delete app logs");
        }
        self.apps
            .delete(&app.name)
            .await
            .map_err(|err| app_store_error(&app.name, err))?;

        self.enqueue(Action::DestroyApp, [app.name.as_str()]).await?;
        tracing::info!(app = %app.name, "app destroyed");
        Ok(())
    }

    pub(crate) async fn save(&self, app: &App) -> Result<(), EngineError> {
        self.apps
            .update(app)
            .await
            .map_err(|err| app_store_error(&app.name, err))
    }

    pub(crate) async fn enqueue<const N: usize>(
        &self,
        action: Action,
        args: [&str; N],
    ) -> Result<(), EngineError> {
        let args: Vec<String> = args.iter().map(|arg| arg.to_string()).collect();
        let id = self.queue.put(action, args).await?;
        tracing::debug!(%action, message_id = %id, "action enqueued");
        Ok(())
    }

    /// For compensation paths: a failed enqueue is logged, not returned.
    pub(crate) async fn enqueue_best_effort<const N: usize>(&self, action: Action, args: [&str; N]) {
        if let Err(err) = self.enqueue(action, args).await {
            tracing::warn!(%action, ?args, error = %err, "failed to enqueue action");
        }
    }

    pub(crate) async fn is_admin(&self, user: &User) -> Result<bool, EngineError> {
        self.teams
            .is_admin(user)
            .await
            .map_err(|err| EngineError::collaborator("Failed to check admin access", err))
    }

    /// Users that can reach the app through any of its teams.
    pub(crate) async fn team_members(&self, team_names: &[String]) -> Result<Vec<String>, EngineError> {
        let mut teams = Vec::with_capacity(team_names.len());
        for name in team_names {
            match self.teams.get_team(name).await {
                Ok(team) => teams.push(team),
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(EngineError::collaborator("Failed to load team", err));
                }
            }
        }
        Ok(members(&teams))
    }
}

pub(crate) fn app_store_error(name: &str, err: PortError) -> EngineError {
    match err {
        PortError::NotFound(_) => EngineError::NotFound(format!("App {name} not found.")),
        PortError::AlreadyExists(_) => EngineError::AlreadyExists {
            app: name.to_string(),
        },
        err => EngineError::collaborator("Failed to access app store", err),
    }
}
