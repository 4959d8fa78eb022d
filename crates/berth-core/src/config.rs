//! Engine configuration, loaded from YAML.
//!
//! Every section has defaults, so an empty file is a valid configuration.
//! The loaded `Config` is handed explicitly to the orchestrator, the queue
//! and the token issuer.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("setting {key:?} is undefined")]
    Missing { key: &'static str },

    #[error("invalid value for {key:?}: {reason}")]
    Invalid { key: &'static str, reason: String },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Public address of the platform API, handed to units.
    pub host: String,
    /// Whether apps get an object-storage bucket on create.
    pub bucket_support: bool,
    pub bucket: BucketConfig,
    pub unit: UnitConfig,
    pub repository: RepositoryConfig,
    pub queue: QueueConfig,
    pub logs: LogConfig,
    pub auth: AuthConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "http://localhost:8080".to_string(),
            bucket_support: true,
            bucket: BucketConfig::default(),
            unit: UnitConfig::default(),
            repository: RepositoryConfig::default(),
            queue: QueueConfig::default(),
            logs: LogConfig::default(),
            auth: AuthConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BucketConfig {
    pub endpoint: String,
    pub location_constraint: bool,
    /// Bucket names are truncated to this length.
    pub max_name_len: usize,
}

impl Default for BucketConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://s3.amazonaws.com".to_string(),
            location_constraint: true,
            max_name_len: 63,
        }
    }
}

/// Paths on the units.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct UnitConfig {
    pub app_dir: String,
    pub apprc: String,
    pub deps_hook: String,
    /// Where single-word hook commands are looked up.
    pub unit_repo: String,
}

impl Default for UnitConfig {
    fn default() -> Self {
        Self {
            app_dir: "/home/application/current".to_string(),
            apprc: "/home/application/apprc".to_string(),
            deps_hook: "/var/lib/berth/hooks/dependencies".to_string(),
            unit_repo: "/home/application/current".to_string(),
        }
    }
}

impl UnitConfig {
    pub fn app_descriptor(&self) -> String {
        format!("{}/app.yaml", self.app_dir.trim_end_matches('/'))
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RepositoryConfig {
    /// Prefix of repository URLs, e.g. `git@git.example.com`.
    pub base_url: String,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            base_url: "git@localhost".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    pub workers: usize,
    pub poll_timeout_ms: u64,
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub multiplier: f64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_timeout_ms: 1_000,
            max_attempts: 5,
            base_delay_ms: 2_000,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Records buffered per live listener before new ones are dropped.
    pub listener_buffer: usize,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            listener_buffer: 64,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AuthConfig {
    /// Secret mixed into issued tokens. Required by the token issuer.
    pub token_key: Option<String>,
    pub token_expire_days: i64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_key: None,
            token_expire_days: 7,
        }
    }
}

impl Config {
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        let config: Config = if yaml.trim().is_empty() {
            Config::default()
        } else {
            serde_yaml::from_str(yaml)?
        };
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_yaml_str(&content)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.bucket.max_name_len == 0 {
            return Err(ConfigError::Invalid {
                key: "bucket.max_name_len",
                reason: "must be greater than zero".into(),
            });
        }
        if self.queue.workers == 0 {
            return Err(ConfigError::Invalid {
                key: "queue.workers",
                reason: "must be greater than zero".into(),
            });
        }
        if self.queue.max_attempts == 0 {
            return Err(ConfigError::Invalid {
                key: "queue.max_attempts",
                reason: "must be greater than zero".into(),
            });
        }
        if !self.queue.multiplier.is_finite() {
            return Err(ConfigError::Invalid {
                key: "queue.multiplier",
                reason: "must be a finite number".into(),
            });
        }
        if self.queue.multiplier < 1.0 {
            return Err(ConfigError::Invalid {
                key: "queue.multiplier",
                reason: format!("{} would shrink the backoff", self.queue.multiplier),
            });
        }
        if self.logs.listener_buffer == 0 {
            return Err(ConfigError::Invalid {
                key: "logs.listener_buffer",
                reason: "must be greater than zero".into(),
            });
        }
        if self.auth.token_expire_days <= 0 {
            return Err(ConfigError::Invalid {
                key: "auth.token_expire_days",
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }
}
