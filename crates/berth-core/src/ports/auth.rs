//! Auth ports - チームとトークンの提供者

use async_trait::async_trait;

use super::PortError;
use crate::domain::{AppToken, Team, User};

#[async_trait]
pub trait TeamDirectory: Send + Sync {
    async fn get_team(&self, name: &str) -> Result<Team, PortError>;

    async fn teams_for_user(&self, user: &User) -> Result<Vec<Team>, PortError>;

    async fn is_admin(&self, user: &User) -> Result<bool, PortError>;
}

#[async_trait]
pub trait TokenIssuer: Send + Sync {
    async fn create_app_token(&self, app: &str) -> Result<AppToken, PortError>;

    /// Fails with `NotFound` for unknown tokens and `Failed` for expired ones.
    async fn get_token(&self, token: &str) -> Result<AppToken, PortError>;

    async fn delete_token(&self, token: &str) -> Result<(), PortError>;
}
