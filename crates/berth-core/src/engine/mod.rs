//! Engine - アプリのライフサイクル
//!
//! # 主要コンポーネント
//! - **Orchestrator**: 同期 API（作成・スケール・環境変数・コマンド・ログ）
//! - **handlers**: キューに積まれた action の非同期処理

mod access;
mod command;
mod create;
mod env;
pub mod handlers;
mod logs;
mod orchestrator;
mod scale;

pub use self::handlers::default_handlers;
pub use self::orchestrator::{AppInfo, Collaborators, Orchestrator};
