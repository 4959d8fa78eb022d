//! Handlers for queued actions.
//!
//! Each handler re-reads the app by name. An app that no longer exists
//! means there is nothing left to do, and the message is done.

use std::sync::Arc;

use async_trait::async_trait;

use super::Orchestrator;
use crate::domain::{App, Unit};
use crate::error::EngineError;
use crate::queue::{Action, Message};
use crate::runtime::ActionHandler;

/// The handler for every action, backed by one orchestrator.
pub fn default_handlers(orchestrator: &Arc<Orchestrator>) -> Vec<(Action, Arc<dyn ActionHandler>)> {
    let orchestrator = Arc::clone(orchestrator);
    let handlers: [(Action, Arc<dyn ActionHandler>); 5] = [
        (
            Action::RegenerateApprc,
            Arc::new(RegenerateApprc(Arc::clone(&orchestrator))),
        ),
        (
            Action::RegenerateApprcAndStart,
            Arc::new(RegenerateApprcAndStart(Arc::clone(&orchestrator))),
        ),
        (
            Action::BindService,
            Arc::new(BindService(Arc::clone(&orchestrator))),
        ),
        (
            Action::UnbindUnit,
            Arc::new(UnbindUnit(Arc::clone(&orchestrator))),
        ),
        (Action::DestroyApp, Arc::new(DestroyApp(orchestrator))),
    ];
    handlers.into()
}

fn arg<'a>(message: &'a Message, index: usize, what: &str) -> Result<&'a str, EngineError> {
    message.arg(index).ok_or_else(|| {
        EngineError::Validation(format!(
            "{} message is missing the {what}",
            message.action()
        ))
    })
}

/// `Ok(None)` when the app is gone.
async fn load_app(orchestrator: &Orchestrator, message: &Message) -> Result<Option<App>, EngineError> {
    let name = arg(message, 0, "app name")?;
    match orchestrator.get(name).await {
        Ok(app) => Ok(Some(app)),
        Err(EngineError::NotFound(_)) => {
            tracing::debug!(app = name, action = %message.action(), "app is gone, nothing to do");
            Ok(None)
        }
        Err(err) => Err(err),
    }
}

fn find_unit<'a>(app: &'a App, message: &Message) -> Result<Option<&'a Unit>, EngineError> {
    let name = arg(message, 1, "unit name")?;
    let unit = app.find_unit(name).map(|index| &app.units[index]);
    if unit.is_none() {
        tracing::debug!(app = %app.name, unit = name, action = %message.action(), "unit is gone, nothing to do");
    }
    Ok(unit)
}

pub struct RegenerateApprc(pub Arc<Orchestrator>);

#[async_trait]
impl ActionHandler for RegenerateApprc {
    async fn handle(&self, message: &Message) -> Result<(), EngineError> {
        let Some(app) = load_app(&self.0, message).await? else {
            return Ok(());
        };
        self.0.serialize_env_vars(&app).await
    }
}

/// Writes the apprc, then starts the app so the new unit picks it up.
pub struct RegenerateApprcAndStart(pub Arc<Orchestrator>);

#[async_trait]
impl ActionHandler for RegenerateApprcAndStart {
    async fn handle(&self, message: &Message) -> Result<(), EngineError> {
        let Some(app) = load_app(&self.0, message).await? else {
            return Ok(());
        };
        if find_unit(&app, message)?.is_none() {
            return Ok(());
        }
        self.0.serialize_env_vars(&app).await?;
        self.0.provisioner.restart(&app).await?;
        Ok(())
    }
}

/// Tells every service instance bound to the app about a new unit.
pub struct BindService(pub Arc<Orchestrator>);

#[async_trait]
impl ActionHandler for BindService {
    async fn handle(&self, message: &Message) -> Result<(), EngineError> {
        let Some(app) = load_app(&self.0, message).await? else {
            return Ok(());
        };
        let Some(unit) = find_unit(&app, message)? else {
            return Ok(());
        };
        let services = &self.0.services;
        let instances = services
            .instances_for_app(&app.name)
            .await
            .map_err(|err| EngineError::collaborator("Failed to list service instances", err))?;
        for instance in &instances {
            services
                .bind_unit(instance, &app, unit)
                .await
                .map_err(|err| EngineError::collaborator("Failed to bind the unit", err))?;
        }
        Ok(())
    }
}

/// Tells every service instance bound to the app that a unit went away.
/// Args: app, unit, unit ip.
pub struct UnbindUnit(pub Arc<Orchestrator>);

#[async_trait]
impl ActionHandler for UnbindUnit {
    async fn handle(&self, message: &Message) -> Result<(), EngineError> {
        let app = arg(message, 0, "app name")?;
        let ip = arg(message, 2, "unit ip")?;
        let services = &self.0.services;
        let instances = services
            .instances_for_app(app)
            .await
            .map_err(|err| EngineError::collaborator("Failed to list service instances", err))?;
        for instance in &instances {
            match services.unbind_unit(instance, app, ip).await {
                Ok(()) => {}
                Err(err) if err.is_not_found() => {}
                Err(err) => {
                    return Err(EngineError::collaborator("Failed to unbind the unit", err));
                }
            }
        }
        Ok(())
    }
}

/// Removes the bucket and credentials of an app that no longer exists.
/// A live app with the same name owns the bucket, so the message is stale.
pub struct DestroyApp(pub Arc<Orchestrator>);

#[async_trait]
impl ActionHandler for DestroyApp {
    async fn handle(&self, message: &Message) -> Result<(), EngineError> {
        let app = arg(message, 0, "app name")?;
        if !self.0.config.bucket_support {
            return Ok(());
        }
        match self.0.get(app).await {
            Ok(_) => {
                tracing::debug!(app, action = %message.action(), "app exists, keeping its bucket");
                return Ok(());
            }
            Err(EngineError::NotFound(_)) => {}
            Err(err) => return Err(err),
        }
        match self.0.storage.destroy_bucket(app).await {
            Ok(()) => {
                tracing::info!(app, "bucket destroyed");
                Ok(())
            }
            Err(err) if err.is_not_found() => Ok(()),
            Err(err) => Err(EngineError::collaborator("Failed to destroy the bucket", err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::EnvVar;
    use crate::impls::InMemoryStack;
    use crate::ports::{IdGenerator, ProvisionError};
    use crate::runtime::{HandlerRegistry, Runtime};

    fn runtime(stack: &InMemoryStack) -> (Arc<Orchestrator>, Runtime) {
        let orchestrator = stack.orchestrator();
        let mut registry = HandlerRegistry::new();
        for (action, handler) in default_handlers(&orchestrator) {
            registry.register(action, handler).unwrap();
        }
        (orchestrator, Runtime::new(Arc::new(registry)))
    }

    async fn run_all(stack: &InMemoryStack, runtime: &Runtime) {
        for message in stack.drain_queue().await {
            runtime.execute(&message).await.unwrap();
        }
    }

    #[tokio::test]
    async fn every_action_has_a_handler() {
        let stack = InMemoryStack::demo().unwrap();
        let handlers = default_handlers(&stack.orchestrator());

        let actions: Vec<Action> = handlers.iter().map(|(action, _)| *action).collect();

        assert_eq!(actions, Action::ALL);
    }

    #[tokio::test]
    async fn created_app_gets_apprc_restart_and_bindings() {
        let stack = InMemoryStack::demo().unwrap();
        stack.services.add_instance("mysql", vec![]);
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("myapp", "python", 2, &[stack.team()])
            .await
            .unwrap();
        orchestrator.bind_service("mysql", "myapp").await.unwrap();

        run_all(&stack, &runtime).await;

        // apprc from create, one per unit before each restart, one from the bind
        let apprc_writes = stack
            .provisioner
            .commands("myapp")
            .iter()
            .filter(|c| c.cmd.starts_with("cat > /home/application/apprc"))
            .count();
        assert_eq!(apprc_writes, 4);
        assert_eq!(stack.provisioner.restarts("myapp"), 2);
        assert_eq!(
            stack.services.bound_units("mysql"),
            ["10.10.10.1", "10.10.10.2"]
        );
    }

    #[tokio::test]
    async fn removed_units_are_unbound_by_ip() {
        let stack = InMemoryStack::demo().unwrap();
        stack.services.add_instance("mysql", vec![EnvVar::private("DB", "x")]);
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("myapp", "python", 3, &[stack.team()])
            .await
            .unwrap();
        orchestrator.bind_service("mysql", "myapp").await.unwrap();
        run_all(&stack, &runtime).await;

        orchestrator.remove_units("myapp", 2).await.unwrap();
        run_all(&stack, &runtime).await;

        assert_eq!(stack.services.bound_units("mysql"), ["10.10.10.3"]);
        assert_eq!(stack.services.unit_calls("mysql"), (3, 2));
    }

    #[tokio::test]
    async fn handlers_for_a_vanished_app_succeed() {
        let stack = InMemoryStack::demo().unwrap();
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("myapp", "python", 1, &[stack.team()])
            .await
            .unwrap();
        let pending = stack.drain_queue().await;
        orchestrator.force_destroy("myapp").await.unwrap();

        for message in &pending {
            runtime.execute(message).await.unwrap();
        }
        run_all(&stack, &runtime).await;

        assert!(stack.provisioner.commands("myapp").is_empty());
    }

    #[tokio::test]
    async fn destroy_app_removes_the_bucket() {
        let mut config = InMemoryStack::demo_config();
        config.bucket_support = true;
        let stack = InMemoryStack::new(config).unwrap();
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("myapp", "python", 1, &[stack.team()])
            .await
            .unwrap();
        stack.drain_queue().await;
        assert!(stack.storage.bucket("myapp").is_some());

        orchestrator.force_destroy("myapp").await.unwrap();
        run_all(&stack, &runtime).await;

        assert!(stack.storage.bucket("myapp").is_none());
        // a second delivery finds nothing to remove
        let message = Message::new(
            stack.ids.generate_message_id(),
            Action::DestroyApp,
            vec!["myapp".into()],
        );
        runtime.execute(&message).await.unwrap();
    }

    #[tokio::test]
    async fn stale_destroy_app_keeps_the_bucket_of_a_recreated_app() {
        let stack = InMemoryStack::demo().unwrap();
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("ritual", "python", 1, &[stack.team()])
            .await
            .unwrap();
        stack.drain_queue().await;
        orchestrator.force_destroy("ritual").await.unwrap();
        let destroy = stack.drain_queue().await;
        assert_eq!(destroy.len(), 1);
        runtime.execute(&destroy[0]).await.unwrap();

        orchestrator
            .create_app("ritual", "python", 1, &[stack.team()])
            .await
            .unwrap();
        let bucket = stack.storage.bucket("ritual").unwrap();
        // the same message delivered again
        runtime.execute(&destroy[0]).await.unwrap();

        assert_eq!(stack.storage.bucket("ritual"), Some(bucket));
    }

    #[tokio::test]
    async fn provisioner_failure_fails_the_message() {
        let stack = InMemoryStack::demo().unwrap();
        let (orchestrator, runtime) = runtime(&stack);
        orchestrator
            .create_app("myapp", "python", 1, &[stack.team()])
            .await
            .unwrap();
        stack
            .provisioner
            .prepare_failure("execute_command", ProvisionError::new("ssh: connection refused"));

        let messages = stack.drain_queue().await;
        let err = runtime.execute(&messages[0]).await.unwrap_err();

        assert!(err.is_retryable());
        assert!(err.to_string().starts_with("Failed to write env vars (ssh: connection refused)"));
    }
}
