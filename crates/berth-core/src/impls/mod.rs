//! Impls - 実装（開発用・テスト用）
//!
//! このモジュールには ports の実装を含めます。
//!
//! # 含まれる実装
//! - **InMemoryAppStore / InMemoryLogStore**: 開発用の正本
//! - **FakeProvisioner**: ユニットをメモリ上だけで扱うプロビジョナ
//! - **InMemoryRepositoryHost / InMemoryStorageIssuer / InMemoryServiceCatalog**
//! - **InMemoryTeamDirectory / KeyedTokenIssuer**
//! - **InMemoryStack**: 上記をまとめて組み立てる
//!
//! # 本番用実装
//! 本番用の実装は別クレートに配置します（git サーバ、S3、コンテナ基盤など）。

pub mod auth;
pub mod fake_provisioner;
pub mod memory_store;
pub mod repository;
pub mod service;
pub mod stack;
pub mod storage;

// 主要な型を再エクスポート
pub use self::auth::{InMemoryTeamDirectory, KeyedTokenIssuer};
pub use self::fake_provisioner::{FakeProvisioner, OutputChunk, RecordedCommand};
pub use self::memory_store::{InMemoryAppStore, InMemoryLogStore};
pub use self::repository::InMemoryRepositoryHost;
pub use self::service::InMemoryServiceCatalog;
pub use self::stack::InMemoryStack;
pub use self::storage::InMemoryStorageIssuer;
