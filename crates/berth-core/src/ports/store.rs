//! Store ports - 永続化の抽象化
//!
//! ストアが source of truth（正本）です。エンジンはアプリをキャッシュせず、
//! 毎回読み直してから書き込みます（last-writer-wins）。

use async_trait::async_trait;

use super::PortError;
use crate::domain::{App, Applog};

#[async_trait]
pub trait AppStore: Send + Sync {
    /// Fails with `AlreadyExists` when the name is taken.
    async fn insert(&self, app: &App) -> Result<(), PortError>;

    async fn get(&self, name: &str) -> Result<App, PortError>;

    /// Replaces the whole record. Fails with `NotFound` for unknown apps.
    async fn update(&self, app: &App) -> Result<(), PortError>;

    async fn delete(&self, name: &str) -> Result<(), PortError>;

    async fn list(&self) -> Result<Vec<App>, PortError>;

    /// Apps owned by any of `teams`.
    async fn list_by_teams(&self, teams: &[String]) -> Result<Vec<App>, PortError>;
}

#[async_trait]
pub trait LogStore: Send + Sync {
    async fn append(&self, logs: &[Applog]) -> Result<(), PortError>;

    /// The newest `n` records of `app`, oldest first.
    async fn last(&self, app: &str, n: usize, source: Option<&str>)
    -> Result<Vec<Applog>, PortError>;

    async fn delete_app(&self, app: &str) -> Result<(), PortError>;
}
