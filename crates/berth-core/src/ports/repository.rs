//! RepositoryHost port - バージョン管理ホスティングの抽象化

use async_trait::async_trait;

use super::{OutputWriter, PortError};
use crate::domain::App;

#[async_trait]
pub trait RepositoryHost: Send + Sync {
    /// Creates the app's repository writable by `users`.
    async fn create_repository(&self, app: &str, users: &[String]) -> Result<(), PortError>;

    async fn remove_repository(&self, app: &str) -> Result<(), PortError>;

    fn repository_url(&self, app: &str) -> String;

    /// Brings the code on the app's units up to date.
    async fn clone_or_pull(&self, app: &App, out: OutputWriter<'_>) -> Result<(), PortError>;

    async fn grant_access(&self, apps: &[String], users: &[String]) -> Result<(), PortError>;

    async fn revoke_access(&self, apps: &[String], users: &[String]) -> Result<(), PortError>;
}
