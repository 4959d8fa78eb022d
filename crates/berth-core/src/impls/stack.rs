//! InMemoryStack - 全 port のインメモリ実装をまとめて組み立てる
//!
//! CLI のデモとテストで使います。各フィールドは具象型のまま公開し、
//! テストからは失敗注入や状態確認に使えるようにしています。

use std::sync::Arc;
use std::time::Duration;

use crate::config::{Config, ConfigError};
use crate::domain::{Team, User};
use crate::engine::{Collaborators, Orchestrator};
use crate::ports::{IdGenerator, SystemClock, UlidGenerator};
use crate::queue::{InMemoryQueue, Message, Queue};

use super::{
    FakeProvisioner, InMemoryAppStore, InMemoryLogStore, InMemoryRepositoryHost,
    InMemoryServiceCatalog, InMemoryStorageIssuer, InMemoryTeamDirectory, KeyedTokenIssuer,
};

const DEMO_TEAM: &str = "cobrateam";
const DEMO_USER: &str = "cobra@example.com";
const ADMIN_TEAM: &str = "admin";

pub struct InMemoryStack {
    pub config: Arc<Config>,
    pub apps: Arc<InMemoryAppStore>,
    pub logs: Arc<InMemoryLogStore>,
    pub provisioner: Arc<FakeProvisioner>,
    pub repository: Arc<InMemoryRepositoryHost>,
    pub storage: Arc<InMemoryStorageIssuer>,
    pub services: Arc<InMemoryServiceCatalog>,
    pub teams: Arc<InMemoryTeamDirectory>,
    pub tokens: Arc<KeyedTokenIssuer>,
    pub queue: Arc<InMemoryQueue>,
    pub clock: Arc<SystemClock>,
    pub ids: Arc<dyn IdGenerator>,
}

impl InMemoryStack {
    pub fn new(config: Config) -> Result<Self, ConfigError> {
        config.validate()?;
        let clock = Arc::new(SystemClock);
        let ids: Arc<dyn IdGenerator> = Arc::new(UlidGenerator::new(SystemClock));
        let tokens = KeyedTokenIssuer::new(&config.auth, clock.clone())?;
        Ok(Self {
            apps: Arc::new(InMemoryAppStore::new()),
            logs: Arc::new(InMemoryLogStore::new()),
            provisioner: Arc::new(FakeProvisioner::new()),
            repository: Arc::new(InMemoryRepositoryHost::new(&config.repository)),
            storage: Arc::new(InMemoryStorageIssuer::new(&config.bucket)),
            services: Arc::new(InMemoryServiceCatalog::new()),
            teams: Arc::new(InMemoryTeamDirectory::new(ADMIN_TEAM)),
            tokens: Arc::new(tokens),
            queue: Arc::new(InMemoryQueue::from_config(&config.queue, Arc::clone(&ids))),
            clock,
            ids,
            config: Arc::new(config),
        })
    }

    /// Default configuration with a token key and short queue delays.
    pub fn demo_config() -> Config {
        let mut config = Config::default();
        config.auth.token_key = Some("berth-demo-key".to_string());
        config.queue.poll_timeout_ms = 50;
        config.queue.base_delay_ms = 10;
        config.queue.max_attempts = 3;
        config
    }

    /// A stack with one team, `cobrateam`, whose only member is
    /// `cobra@example.com`.
    pub fn demo() -> Result<Self, ConfigError> {
        let stack = Self::new(Self::demo_config())?;
        stack.teams.add_team(Team::new(DEMO_TEAM, [DEMO_USER]));
        Ok(stack)
    }

    pub fn team(&self) -> Team {
        Team::new(DEMO_TEAM, [DEMO_USER])
    }

    pub fn user(&self) -> User {
        User::new(DEMO_USER)
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            apps: self.apps.clone(),
            logs: self.logs.clone(),
            provisioner: self.provisioner.clone(),
            repository: self.repository.clone(),
            storage: self.storage.clone(),
            services: self.services.clone(),
            teams: self.teams.clone(),
            tokens: self.tokens.clone(),
            queue: self.queue.clone(),
            clock: self.clock.clone(),
            ids: Arc::clone(&self.ids),
        }
    }

    pub fn orchestrator(&self) -> Arc<Orchestrator> {
        Arc::new(Orchestrator::new(
            Arc::clone(&self.config),
            self.collaborators(),
        ))
    }

    /// Takes every message that is ready right now, deleting each one.
    pub async fn drain_queue(&self) -> Vec<Message> {
        let mut messages = Vec::new();
        while let Ok(Some(delivery)) = self.queue.get(Duration::ZERO).await {
            messages.push(delivery.message().clone());
            if let Err(err) = delivery.delete().await {
                tracing::warn!(error = %err, "failed to delete drained message");
            }
        }
        messages
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::TeamDirectory;

    #[tokio::test]
    async fn demo_stack_knows_its_team() {
        let stack = InMemoryStack::demo().unwrap();

        let teams = stack.teams.teams_for_user(&stack.user()).await.unwrap();

        assert_eq!(teams, [stack.team()]);
    }

    #[test]
    fn stack_rejects_a_config_without_token_key() {
        let config = Config {
            auth: Default::default(),
            ..InMemoryStack::demo_config()
        };

        assert!(InMemoryStack::new(config).is_err());
    }
}
