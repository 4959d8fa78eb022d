//! Unit: one provisioned execution instance of an app.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Lifecycle status reported by the provisioner.
///
/// The engine never moves a unit between statuses itself; it only stores
/// what the provisioner reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Creating,
    Installing,
    Started,
    Down,
    Error,
    Stopped,
}

impl UnitStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            UnitStatus::Pending => "pending",
            UnitStatus::Creating => "creating",
            UnitStatus::Installing => "installing",
            UnitStatus::Started => "started",
            UnitStatus::Down => "down",
            UnitStatus::Error => "error",
            UnitStatus::Stopped => "stopped",
        }
    }

    /// Rank used when choosing units to remove: lower goes first.
    ///
    /// `stopped` has no rank of its own and shares the front of the line
    /// with `error`.
    pub fn removal_rank(self) -> u8 {
        match self {
            UnitStatus::Error | UnitStatus::Stopped => 0,
            UnitStatus::Down => 1,
            UnitStatus::Pending => 2,
            UnitStatus::Creating => 3,
            UnitStatus::Installing => 4,
            UnitStatus::Started => 5,
        }
    }
}

impl fmt::Display for UnitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    /// Display name, `{app}/{index}`.
    pub name: String,
    /// Backend instance identifier.
    pub instance_id: String,
    pub ip: String,
    pub status: UnitStatus,
}

impl Unit {
    pub fn new(
        name: impl Into<String>,
        instance_id: impl Into<String>,
        ip: impl Into<String>,
        status: UnitStatus,
    ) -> Self {
        Self {
            name: name.into(),
            instance_id: instance_id.into(),
            ip: ip.into(),
            status,
        }
    }

    pub fn is_available(&self) -> bool {
        self.status == UnitStatus::Started
    }

    /// Matches by display name or backend instance id.
    pub fn matches(&self, id: &str) -> bool {
        self.name == id || (!self.instance_id.is_empty() && self.instance_id == id)
    }

    /// Same backend instance; falls back to the display name when the
    /// backend did not report an instance id.
    pub fn same_instance(&self, other: &Unit) -> bool {
        if !self.instance_id.is_empty() && !other.instance_id.is_empty() {
            self.instance_id == other.instance_id
        } else {
            self.name == other.name
        }
    }
}

pub fn unit_name(app: &str, index: usize) -> String {
    format!("{app}/{index}")
}
