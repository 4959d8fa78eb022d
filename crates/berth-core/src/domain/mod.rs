//! Domain model: apps, units, environment, logs, hooks, ids.
//!
//! Pure types and functions; nothing in here talks to a collaborator.

pub mod app;
pub mod applog;
pub mod env;
pub mod hooks;
pub mod ids;
pub mod selection;
pub mod team;
pub mod unit;

pub use app::{App, MAX_APP_NAME_LEN};
pub use applog::{Applog, ENGINE_SOURCE, split_log_lines};
pub use env::{EnvMap, EnvVar, instance_env, merge_envs, remove_envs, render_apprc};
pub use hooks::{HookConfig, HookPhase, resolve_hook_command};
pub use ids::{ListenerId, MessageId};
pub use selection::{select_units_for_removal, validate_removal};
pub use team::{AppToken, Team, User, members};
pub use unit::{Unit, UnitStatus, unit_name};
