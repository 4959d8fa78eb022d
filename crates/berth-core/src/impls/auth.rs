//! InMemoryTeamDirectory / KeyedTokenIssuer - 認証まわりの実装
//!
//! KeyedTokenIssuer は設定（`AuthConfig`）を構築時に受け取ります。
//! グローバル状態から遅延読み込みしないこと。

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use chrono::Duration;
use sha2::{Digest, Sha256};

use crate::config::{AuthConfig, ConfigError};
use crate::domain::{AppToken, Team, User};
use crate::ports::{Clock, PortError, TeamDirectory, TokenIssuer};

fn recover<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

pub struct InMemoryTeamDirectory {
    teams: Mutex<BTreeMap<String, Team>>,
    admin_team: String,
}

impl InMemoryTeamDirectory {
    /// Members of `admin_team` see every app.
    pub fn new(admin_team: impl Into<String>) -> Self {
        Self {
            teams: Mutex::new(BTreeMap::new()),
            admin_team: admin_team.into(),
        }
    }

    pub fn add_team(&self, team: Team) {
        recover(&self.teams).insert(team.name.clone(), team);
    }
}

#[async_trait]
impl TeamDirectory for InMemoryTeamDirectory {
    async fn get_team(&self, name: &str) -> Result<Team, PortError> {
        recover(&self.teams)
            .get(name)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("team {name}")))
    }

    async fn teams_for_user(&self, user: &User) -> Result<Vec<Team>, PortError> {
        Ok(recover(&self.teams)
            .values()
            .filter(|team| team.contains(&user.email))
            .cloned()
            .collect())
    }

    async fn is_admin(&self, user: &User) -> Result<bool, PortError> {
        Ok(recover(&self.teams)
            .get(&self.admin_team)
            .is_some_and(|team| team.contains(&user.email)))
    }
}

/// Issues app tokens as `sha256(app + key + timestamp + nonce)`.
pub struct KeyedTokenIssuer {
    key: String,
    expire: Duration,
    clock: Arc<dyn Clock>,
    tokens: Mutex<HashMap<String, AppToken>>,
}

impl KeyedTokenIssuer {
    pub fn new(config: &AuthConfig, clock: Arc<dyn Clock>) -> Result<Self, ConfigError> {
        let key = config
            .token_key
            .clone()
            .filter(|key| !key.is_empty())
            .ok_or(ConfigError::Missing {
                key: "auth.token_key",
            })?;
        Ok(Self {
            key,
            expire: Duration::days(config.token_expire_days),
            clock,
            tokens: Mutex::new(HashMap::new()),
        })
    }

    fn token_for(&self, data: &str) -> String {
        let now = self.clock.now();
        let mut hasher = Sha256::new();
        hasher.update(data.as_bytes());
        hasher.update(self.key.as_bytes());
        hasher.update(now.to_rfc3339().as_bytes());
        hasher.update(rand::random::<u64>().to_be_bytes());
        hex::encode(hasher.finalize())
    }
}

#[async_trait]
impl TokenIssuer for KeyedTokenIssuer {
    async fn create_app_token(&self, app: &str) -> Result<AppToken, PortError> {
        let token = AppToken {
            token: self.token_for(app),
            app: app.to_string(),
            valid_until: self.clock.now() + self.expire,
        };
        recover(&self.tokens).insert(token.token.clone(), token.clone());
        Ok(token)
    }

    async fn get_token(&self, token: &str) -> Result<AppToken, PortError> {
        let stored = recover(&self.tokens)
            .get(token)
            .cloned()
            .ok_or_else(|| PortError::NotFound("token".into()))?;
        if stored.is_expired(self.clock.now()) {
            return Err(PortError::Failed("Token has expired".into()));
        }
        Ok(stored)
    }

    async fn delete_token(&self, token: &str) -> Result<(), PortError> {
        recover(&self.tokens)
            .remove(token)
            .map(|_| ())
            .ok_or_else(|| PortError::NotFound("token".into()))
    }
}
