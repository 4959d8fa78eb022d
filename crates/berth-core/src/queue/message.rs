//! Queue message: a named action with ordered string arguments.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::domain::MessageId;

/// Actions the orchestrator defers to the worker pool.
///
/// Every action is re-fetched by app (and unit) name when handled, so a
/// message that is delivered twice converges to the same state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Action {
    /// `[app]`: rewrite the apprc file on every unit.
    RegenerateApprc,
    /// `[app, unit]`: rewrite the apprc file, then restart the app.
    RegenerateApprcAndStart,
    /// `[app, unit]`: notify bound service instances about a new unit.
    BindService,
    /// `[app, unit, ip]`: notify bound service instances about a removed unit.
    UnbindUnit,
    /// `[app]`: release bucket and credentials of a destroyed app.
    DestroyApp,
}

impl Action {
    pub const ALL: [Action; 5] = [
        Action::RegenerateApprc,
        Action::RegenerateApprcAndStart,
        Action::BindService,
        Action::UnbindUnit,
        Action::DestroyApp,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Action::RegenerateApprc => "regenerate-apprc",
            Action::RegenerateApprcAndStart => "regenerate-apprc-and-start",
            Action::BindService => "bind-service",
            Action::UnbindUnit => "unbind-unit",
            Action::DestroyApp => "destroy-app",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown action: {0}")]
pub struct UnknownAction(pub String);

impl FromStr for Action {
    type Err = UnknownAction;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Action::ALL
            .into_iter()
            .find(|action| action.as_str() == s)
            .ok_or_else(|| UnknownAction(s.to_string()))
    }
}

/// Immutable unit of work carried by the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    id: MessageId,
    action: Action,
    args: Vec<String>,
}

impl Message {
    pub fn new(id: MessageId, action: Action, args: Vec<String>) -> Self {
        Self { id, action, args }
    }

    pub fn id(&self) -> MessageId {
        self.id
    }

    pub fn action(&self) -> Action {
        self.action
    }

    pub fn args(&self) -> &[String] {
        &self.args
    }

    pub fn arg(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }
}

impl fmt::Display for Message {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.action, self.args.join(" "))
    }
}
