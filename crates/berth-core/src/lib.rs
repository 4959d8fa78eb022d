//! berth-core
//!
//! Core building blocks for the Berth application engine.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（App, Unit, EnvVar, Applog, hooks, ids）
//! - **ports**: 抽象化レイヤー（Provisioner, AppStore, RepositoryHost, など）
//! - **engine**: Orchestrator（アプリのライフサイクル）と action handlers
//! - **queue**: action メッセージの Queue trait + in-memory 実装
//! - **runtime / worker / builder**: handler registry、ワーカー、起動時検証
//! - **logs**: ライブログの配信
//! - **impls**: 実装（インメモリの開発用・テスト用）
//! - **config / error / observability**

pub mod builder;
pub mod config;
pub mod domain;
pub mod engine;
pub mod error;
pub mod impls;
pub mod logs;
pub mod observability;
pub mod ports;
pub mod queue;
pub mod runtime;
pub mod worker;

pub use self::builder::{BuildError, Engine, EngineBuilder};
pub use self::config::{Config, ConfigError};
pub use self::engine::{AppInfo, Collaborators, Orchestrator};
pub use self::error::{EngineError, ErrorKind};
pub use self::observability::EngineStatus;
