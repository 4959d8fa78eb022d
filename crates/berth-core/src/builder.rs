//! EngineBuilder - エンジンの構築とワイヤリング
//!
//! # 方針
//! - 起動時検証（Fail-fast 設計）
//! - ハンドラ不足は実行時ではなく build() で分かるようにする

use std::sync::Arc;
use std::time::Duration;

use crate::engine::{Orchestrator, default_handlers};
use crate::error::EngineError;
use crate::queue::Action;
use crate::runtime::{ActionHandler, HandlerRegistry, Runtime};
use crate::worker::WorkerGroup;

/// EngineBuilder はエンジンを構築
///
/// # 使用例
/// ```ignore
/// let engine = EngineBuilder::new(orchestrator)
///     .with_default_handlers()?
///     .expect_actions(&Action::ALL)
///     .build()?;
/// let workers = engine.spawn_workers();
/// ```
///
/// # Fail-fast 設計
/// - expect_actions() で期待される action を登録
/// - build() 時に「期待集合 ⊆ 登録済み集合」をチェック
/// - 不足があれば BuildError を返す
pub struct EngineBuilder {
    orchestrator: Arc<Orchestrator>,
    registry: HandlerRegistry,
    expected_actions: Option<Vec<Action>>,
}

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing actions: {0:?}. These actions were expected but have no handler.")]
    MissingActions(Vec<Action>),
}

impl EngineBuilder {
    pub fn new(orchestrator: Arc<Orchestrator>) -> Self {
        Self {
            orchestrator,
            registry: HandlerRegistry::new(),
            expected_actions: None,
        }
    }

    /// Handler を登録
    pub fn register(
        mut self,
        action: Action,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<Self, EngineError> {
        self.registry.register(action, handler)?;
        Ok(self)
    }

    /// 全 action の標準ハンドラを登録
    pub fn with_default_handlers(mut self) -> Result<Self, EngineError> {
        for (action, handler) in default_handlers(&self.orchestrator) {
            self.registry.register(action, handler)?;
        }
        Ok(self)
    }

    pub fn expect_actions(mut self, actions: &[Action]) -> Self {
        self.expected_actions = Some(actions.to_vec());
        self
    }

    /// # 検証
    /// - expect_actions() で設定された action が全て登録されているかチェック
    /// - 不足があれば BuildError::MissingActions を返す
    pub fn build(self) -> Result<Engine, BuildError> {
        if let Some(expected) = &self.expected_actions {
            let missing: Vec<Action> = expected
                .iter()
                .copied()
                .filter(|action| !self.registry.contains(*action))
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingActions(missing));
            }
        }
        Ok(Engine {
            orchestrator: self.orchestrator,
            runtime: Arc::new(Runtime::new(Arc::new(self.registry))),
        })
    }
}

/// 構築済みのエンジン: 同期 API（Orchestrator）と非同期 API（Runtime）
pub struct Engine {
    pub orchestrator: Arc<Orchestrator>,
    pub runtime: Arc<Runtime>,
}

impl Engine {
    /// `queue` 設定に従ってワーカーを起動
    pub fn spawn_workers(&self) -> WorkerGroup {
        let queue = &self.orchestrator.config().queue;
        WorkerGroup::spawn(
            queue.workers,
            Arc::clone(self.orchestrator.queue()),
            Arc::clone(&self.runtime),
            Duration::from_millis(queue.poll_timeout_ms),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::handlers::RegenerateApprc;
    use crate::impls::InMemoryStack;

    #[test]
    fn build_with_default_handlers_covers_every_action() {
        let stack = InMemoryStack::demo().unwrap();

        let engine = EngineBuilder::new(stack.orchestrator())
            .with_default_handlers()
            .unwrap()
            .expect_actions(&Action::ALL)
            .build();

        assert_eq!(engine.unwrap().runtime.registry().len(), Action::ALL.len());
    }

    #[test]
    fn build_reports_missing_actions() {
        let stack = InMemoryStack::demo().unwrap();
        let orchestrator = stack.orchestrator();

        let engine = EngineBuilder::new(Arc::clone(&orchestrator))
            .register(Action::RegenerateApprc, Arc::new(RegenerateApprc(orchestrator)))
            .unwrap()
            .expect_actions(&[Action::RegenerateApprc, Action::DestroyApp])
            .build();

        assert!(matches!(
            engine,
            Err(BuildError::MissingActions(missing)) if missing == vec![Action::DestroyApp]
        ));
    }

    #[test]
    fn build_without_expectations_accepts_anything() {
        let stack = InMemoryStack::demo().unwrap();

        let engine = EngineBuilder::new(stack.orchestrator()).build();

        assert!(engine.unwrap().runtime.registry().is_empty());
    }

    #[test]
    fn default_handlers_twice_is_a_duplicate() {
        let stack = InMemoryStack::demo().unwrap();

        let result = EngineBuilder::new(stack.orchestrator())
            .with_default_handlers()
            .unwrap()
            .with_default_handlers();

        assert!(matches!(result, Err(EngineError::DuplicateHandler(_))));
    }
}
