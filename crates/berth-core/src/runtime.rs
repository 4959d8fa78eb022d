use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EngineError;
use crate::queue::{Action, Message};

/// Handles one queued action.
///
/// Delivery is at-least-once, so a handler re-reads whatever state it
/// needs by the names in the message and must tolerate running twice.
#[async_trait]
pub trait ActionHandler: Send + Sync {
    async fn handle(&self, message: &Message) -> Result<(), EngineError>;
}

/// Registry of handlers (action -> handler).
///
/// Built during initialization, read-only while workers run.
#[derive(Default)]
pub struct HandlerRegistry {
    handlers: HashMap<Action, Arc<dyn ActionHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        action: Action,
        handler: Arc<dyn ActionHandler>,
    ) -> Result<(), EngineError> {
        if self.handlers.contains_key(&action) {
            return Err(EngineError::DuplicateHandler(action));
        }
        self.handlers.insert(action, handler);
        Ok(())
    }

    pub fn get(&self, action: Action) -> Option<&Arc<dyn ActionHandler>> {
        self.handlers.get(&action)
    }

    pub fn contains(&self, action: Action) -> bool {
        self.handlers.contains_key(&action)
    }

    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}

/// Runtime executes a `Message` by dispatching to its action's handler.
pub struct Runtime {
    registry: Arc<HandlerRegistry>,
}

impl Runtime {
    pub fn new(registry: Arc<HandlerRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &HandlerRegistry {
        &self.registry
    }

    pub async fn execute(&self, message: &Message) -> Result<(), EngineError> {
        let action = message.action();
        let handler = self
            .registry
            .get(action)
            .ok_or(EngineError::HandlerNotFound(action))?;

        handler.handle(message).await
    }
}
