//! Errors - エンジンのエラー型と分類
//!
//! `EngineError` はオーケストレータの唯一のエラー型です。
//! メッセージ文字列は利用者にそのまま見せるため、文言を変えないこと。

use thiserror::Error;

use crate::ports::{PortError, ProvisionError};
use crate::queue::{Action, QueueError};

/// ErrorKind はエラーの運用分類
///
/// 外側の HTTP 層はこれでステータスを決めます（文字列マッチ不要）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// 入力が不正（リトライ無意味）
    Validation,
    NoTeams,
    Conflict,
    NotFound,
    PreconditionFailed,
    Forbidden,
    /// プロビジョナや外部サービスの失敗（再配送で回復しうる）
    Provisioner,
    Internal,
}

impl ErrorKind {
    pub fn is_retryable(self) -> bool {
        matches!(self, ErrorKind::Provisioner | ErrorKind::Internal)
    }
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("{0}")]
    Validation(String),

    #[error("Cannot create app without teams.")]
    NoTeams,

    #[error("there is already an app with this name.")]
    AlreadyExists { app: String },

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    PreconditionFailed(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Berth failed to create the app {app:?}: {source}")]
    CreationFailed {
        app: String,
        #[source]
        source: Box<EngineError>,
    },

    #[error(transparent)]
    Provisioner(#[from] ProvisionError),

    #[error("{context}: {source}")]
    Collaborator {
        context: String,
        #[source]
        source: PortError,
    },

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error("handler not found for action={0}")]
    HandlerNotFound(Action),

    #[error("duplicate handler for action={0}")]
    DuplicateHandler(Action),

    #[error("failed to write command output: {0}")]
    Output(#[from] std::io::Error),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::Validation(_) => ErrorKind::Validation,
            EngineError::NoTeams => ErrorKind::NoTeams,
            EngineError::AlreadyExists { .. } | EngineError::Conflict(_) => ErrorKind::Conflict,
            EngineError::NotFound(_) => ErrorKind::NotFound,
            EngineError::PreconditionFailed(_) => ErrorKind::PreconditionFailed,
            EngineError::Forbidden(_) => ErrorKind::Forbidden,
            EngineError::CreationFailed { .. }
            | EngineError::Provisioner(_)
            | EngineError::Collaborator { .. } => ErrorKind::Provisioner,
            EngineError::Queue(_)
            | EngineError::HandlerNotFound(_)
            | EngineError::DuplicateHandler(_)
            | EngineError::Output(_) => ErrorKind::Internal,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }

    pub(crate) fn collaborator(context: impl Into<String>, source: PortError) -> Self {
        EngineError::Collaborator {
            context: context.into(),
            source,
        }
    }

    pub(crate) fn creation_failed(app: &str, source: EngineError) -> Self {
        EngineError::CreationFailed {
            app: app.to_string(),
            source: Box::new(source),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn creation_failure_quotes_the_app_name() {
        let err = EngineError::creation_failed(
            "theirapp",
            ProvisionError::new("exit status 1").into(),
        );

        assert_eq!(
            err.to_string(),
            r#"Berth failed to create the app "theirapp": exit status 1"#
        );
        assert_eq!(err.kind(), ErrorKind::Provisioner);
    }

    #[test]
    fn validation_errors_are_not_retryable() {
        let err = EngineError::Validation("Cannot add zero units.".into());

        assert!(!err.is_retryable());
        assert_eq!(err.to_string(), "Cannot add zero units.");
    }

    #[test]
    fn collaborator_errors_carry_context() {
        let err = EngineError::collaborator(
            "Failed to grant access in the git server",
            PortError::Failed("connection refused".into()),
        );

        assert_eq!(
            err.to_string(),
            "Failed to grant access in the git server: connection refused"
        );
        assert!(err.is_retryable());
    }
}
