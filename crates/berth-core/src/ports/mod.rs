//! Ports - 抽象化レイヤー
//!
//! このモジュールは Hexagonal Architecture の「ポート」を定義します。
//! 各 trait は外部システム（プロビジョナ、リポジトリホスト、ストレージ、
//! サービスカタログ、認証）へのインターフェースを提供し、実装の詳細を隠蔽します。
//!
//! # 設計原則
//! - ストアが source of truth（正本）
//! - キューは `crate::queue` に置く（エンジンの一部として扱う）
//! - 外部サービスのエラーは `PortError` に揃える

pub mod auth;
pub mod clock;
pub mod id_generator;
pub mod provisioner;
pub mod repository;
pub mod service;
pub mod storage;
pub mod store;

use thiserror::Error;

// 主要な trait を再エクスポート
pub use self::auth::{TeamDirectory, TokenIssuer};
pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::provisioner::{OutputWriter, ProvisionError, Provisioner, UnitReport};
pub use self::repository::RepositoryHost;
pub use self::service::ServiceCatalog;
pub use self::storage::{BucketCredentials, StorageIssuer};
pub use self::store::{AppStore, LogStore};

/// Failure reported by a collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PortError {
    #[error("{0} not found")]
    NotFound(String),

    #[error("{0} already exists")]
    AlreadyExists(String),

    #[error("{0}")]
    Failed(String),
}

impl PortError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, PortError::NotFound(_))
    }
}
