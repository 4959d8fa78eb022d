//! Teams, users and app tokens as seen by the engine.
//!
//! Their lifecycle belongs to the auth provider; apps only keep team names.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub email: String,
}

impl User {
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            email: email.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Team {
    pub name: String,
    /// Member emails.
    #[serde(default)]
    pub users: Vec<String>,
}

impl Team {
    pub fn new(name: impl Into<String>, users: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            name: name.into(),
            users: users.into_iter().map(Into::into).collect(),
        }
    }

    pub fn contains(&self, email: &str) -> bool {
        self.users.iter().any(|user| user == email)
    }
}

/// Members of every team, sorted and without duplicates.
pub fn members<'a>(teams: impl IntoIterator<Item = &'a Team>) -> Vec<String> {
    teams
        .into_iter()
        .flat_map(|team| team.users.iter().cloned())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Credential issued to an app so its units can call back into the platform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppToken {
    pub token: String,
    pub app: String,
    pub valid_until: DateTime<Utc>,
}

impl AppToken {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.valid_until
    }
}
