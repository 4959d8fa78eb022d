//! Provisioner port - ユニットを実際に動かすバックエンドの抽象化
//!
//! エンジンはこの trait 経由でのみバックエンドを呼び出します。
//! バックエンドの種類で分岐しないこと。
//!
//! # 設計原則
//! - 呼び出しは同期的にリトライしない（失敗はそのまま呼び出し元へ）
//! - コマンド出力は逐次 writer に書き出す（バッファしない）

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWrite;

use crate::domain::{App, Unit};

/// Output sink for remote command streams.
pub type OutputWriter<'a> = &'a mut (dyn AsyncWrite + Send + Unpin);

/// Opaque backend failure; the message is shown to the user verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct ProvisionError {
    message: String,
}

impl ProvisionError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

/// A unit observed by the backend, tagged with the app it belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UnitReport {
    pub app: String,
    pub unit: Unit,
}

#[async_trait]
pub trait Provisioner: Send + Sync {
    /// Creates the app's first unit(s) on the backend.
    async fn provision(&self, app: &App) -> Result<Vec<Unit>, ProvisionError>;

    async fn add_units(&self, app: &App, n: usize) -> Result<Vec<Unit>, ProvisionError>;

    async fn remove_unit(&self, app: &App, unit: &str) -> Result<(), ProvisionError>;

    /// Tears down every unit of the app.
    async fn destroy(&self, app: &App) -> Result<(), ProvisionError>;

    /// Runs `cmd` with `args` on the app's units, streaming output.
    async fn execute_command(
        &self,
        stdout: OutputWriter<'_>,
        stderr: OutputWriter<'_>,
        app: &App,
        cmd: &str,
        args: &[String],
    ) -> Result<(), ProvisionError>;

    async fn restart(&self, app: &App) -> Result<(), ProvisionError>;

    /// Every unit the backend knows about, across all apps.
    async fn collect_status(&self) -> Result<Vec<UnitReport>, ProvisionError>;
}
