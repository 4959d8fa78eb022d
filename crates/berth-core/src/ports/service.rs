//! ServiceCatalog port - サービスインスタンス（DB など）との連携

use async_trait::async_trait;

use super::PortError;
use crate::domain::{App, EnvVar, Unit};

#[async_trait]
pub trait ServiceCatalog: Send + Sync {
    /// Instances the app is bound to.
    async fn instances_for_app(&self, app: &str) -> Result<Vec<String>, PortError>;

    /// Binds the app and returns the variables the instance exposes to it.
    async fn bind_app(&self, instance: &str, app: &App) -> Result<Vec<EnvVar>, PortError>;

    async fn unbind_app(&self, instance: &str, app: &App) -> Result<(), PortError>;

    /// Tells the instance a unit of a bound app came up.
    async fn bind_unit(&self, instance: &str, app: &App, unit: &Unit) -> Result<(), PortError>;

    /// Tells the instance a unit went away. The unit is already gone from
    /// the app by then, so only its address is passed.
    async fn unbind_unit(&self, instance: &str, app: &str, unit_ip: &str) -> Result<(), PortError>;
}
