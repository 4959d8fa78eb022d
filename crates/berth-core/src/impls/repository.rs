//! InMemoryRepositoryHost - 開発用のリポジトリホスト

use std::collections::{BTreeMap, BTreeSet};
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use crate::config::RepositoryConfig;
use crate::domain::App;
use crate::ports::{OutputWriter, PortError, RepositoryHost};

#[derive(Default)]
struct RepositoryState {
    /// repository -> users with write access
    repositories: BTreeMap<String, BTreeSet<String>>,
    fail_next: Option<PortError>,
    pulls: Vec<String>,
}

pub struct InMemoryRepositoryHost {
    base_url: String,
    state: Mutex<RepositoryState>,
}

impl InMemoryRepositoryHost {
    pub fn new(config: &RepositoryConfig) -> Self {
        Self {
            base_url: config.base_url.clone(),
            state: Mutex::new(RepositoryState::default()),
        }
    }

    /// The next call fails with `error`.
    pub fn prepare_failure(&self, error: PortError) {
        self.lock().fail_next = Some(error);
    }

    pub fn exists(&self, app: &str) -> bool {
        self.lock().repositories.contains_key(app)
    }

    pub fn users(&self, app: &str) -> Vec<String> {
        self.lock()
            .repositories
            .get(app)
            .map(|users| users.iter().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pulls(&self) -> Vec<String> {
        self.lock().pulls.clone()
    }

    fn lock(&self) -> MutexGuard<'_, RepositoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn check(state: &mut RepositoryState) -> Result<(), PortError> {
        match state.fail_next.take() {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl RepositoryHost for InMemoryRepositoryHost {
    async fn create_repository(&self, app: &str, users: &[String]) -> Result<(), PortError> {
        let mut state = self.lock();
        Self::check(&mut state)?;
        if state.repositories.contains_key(app) {
            return Err(PortError::AlreadyExists(format!("repository {app}")));
        }
        state
            .repositories
            .insert(app.to_string(), users.iter().cloned().collect());
        Ok(())
    }

    async fn remove_repository(&self, app: &str) -> Result<(), PortError> {
        let mut state = self.lock();
        Self::check(&mut state)?;
        state
            .repositories
            .remove(app)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound(format!("repository {app}")))
    }

    fn repository_url(&self, app: &str) -> String {
        format!("{}:{app}.git", self.base_url)
    }

    async fn clone_or_pull(&self, app: &App, out: OutputWriter<'_>) -> Result<(), PortError> {
        {
            let mut state = self.lock();
            Self::check(&mut state)?;
            if !state.repositories.contains_key(&app.name) {
                return Err(PortError::NotFound(format!("repository {}", app.name)));
            }
            state.pulls.push(app.name.clone());
        }
        let line = format!(" ---> Updating code from {}\n", self.repository_url(&app.name));
        out.write_all(line.as_bytes())
            .await
            .map_err(|e| PortError::Failed(e.to_string()))
    }

    async fn grant_access(&self, apps: &[String], users: &[String]) -> Result<(), PortError> {
        let mut state = self.lock();
        Self::check(&mut state)?;
        for app in apps {
            if let Some(members) = state.repositories.get_mut(app) {
                members.extend(users.iter().cloned());
            }
        }
        Ok(())
    }

    async fn revoke_access(&self, apps: &[String], users: &[String]) -> Result<(), PortError> {
        let mut state = self.lock();
        Self::check(&mut state)?;
        for app in apps {
            if let Some(members) = state.repositories.get_mut(app) {
                for user in users {
                    members.remove(user);
                }
            }
        }
        Ok(())
    }
}
