//! Commands on units: run, restart with hooks, deploy.

use std::io;
use std::pin::Pin;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};

use tokio::io::{AsyncWrite, AsyncWriteExt};

use super::Orchestrator;
use crate::domain::{App, HookConfig, HookPhase, resolve_hook_command};
use crate::error::EngineError;
use crate::ports::OutputWriter;

impl Orchestrator {
    /// Runs `cmd` on the app's units with the apprc sourced and the
    /// working directory set to the app's code.
    pub async fn run(&self, name: &str, cmd: &str, out: OutputWriter<'_>) -> Result<(), EngineError> {
        let app = self.get(name).await?;
        self.run_on(&app, cmd, out).await
    }

    pub(crate) async fn run_on(
        &self,
        app: &App,
        cmd: &str,
        out: OutputWriter<'_>,
    ) -> Result<(), EngineError> {
        if !app.available() {
            return Err(EngineError::PreconditionFailed(
                "App must be available to run commands.".into(),
            ));
        }
        let unit = &self.config.unit;
        let cmd = format!(
            "[ -f {rc} ] && source {rc}; [ -d {dir} ] && cd {dir}; {cmd}",
            rc = unit.apprc,
            dir = unit.app_dir,
        );
        let shared = SharedOutput::new(out);
        self.provisioner
            .execute_command(&mut shared.handle(), &mut shared.handle(), app, &cmd, &[])
            .await?;
        Ok(())
    }

    /// Forwards `cmd` to the provisioner untouched.
    pub async fn command(
        &self,
        name: &str,
        stdout: OutputWriter<'_>,
        stderr: OutputWriter<'_>,
        cmd: &str,
        args: &[String],
    ) -> Result<(), EngineError> {
        let app = self.get(name).await?;
        self.provisioner
            .execute_command(stdout, stderr, &app, cmd, args)
            .await?;
        Ok(())
    }

    /// Runs the configured dependencies hook.
    pub async fn install_deps(&self, name: &str, out: OutputWriter<'_>) -> Result<(), EngineError> {
        let app = self.get(name).await?;
        self.run_on(&app, &self.config.unit.deps_hook, out).await
    }

    /// Restarts the app between its pre-restart and post-restart hooks.
    pub async fn restart(&self, name: &str, out: OutputWriter<'_>) -> Result<(), EngineError> {
        let mut app = self.get(name).await?;
        self.load_hooks(&mut app).await;

        self.run_hooks(&app, HookPhase::PreRestart, &mut *out).await?;
        out.write_all(b" ---> Restarting your app\n").await?;
        self.provisioner.restart(&app).await?;
        self.run_hooks(&app, HookPhase::PostRestart, &mut *out).await?;

        tracing::info!(app = name, "app restarted");
        Ok(())
    }

    /// Pulls the latest code, installs dependencies and restarts.
    pub async fn deploy(&self, name: &str, out: OutputWriter<'_>) -> Result<(), EngineError> {
        let app = self.get(name).await?;
        if !app.available() {
            return Err(EngineError::PreconditionFailed(
                "App must be available to receive pushs.".into(),
            ));
        }
        self.repository
            .clone_or_pull(&app, &mut *out)
            .await
            .map_err(|err| EngineError::collaborator("Failed to update the code", err))?;
        self.run_on(&app, &self.config.unit.deps_hook, &mut *out)
            .await?;
        self.restart(name, out).await?;
        tracing::info!(app = name, "app deployed");
        Ok(())
    }

    /// Reads the hook descriptor from the units. An unreadable or invalid
    /// descriptor leaves the app without hooks.
    async fn load_hooks(&self, app: &mut App) {
        if app.hooks.is_some() {
            return;
        }
        if !app.available() {
            app.hooks = Some(HookConfig::default());
            return;
        }
        let descriptor = self.config.unit.app_descriptor();
        let mut stdout = Vec::new();
        let mut stderr = Vec::new();
        let loaded = match self
            .provisioner
            .execute_command(&mut stdout, &mut stderr, app, "cat", &[descriptor.clone()])
            .await
        {
            Ok(()) => HookConfig::parse(&String::from_utf8_lossy(&stdout)).map_err(|err| err.to_string()),
            Err(err) => Err(err.to_string()),
        };
        app.hooks = Some(loaded.unwrap_or_else(|err| {
            tracing::info!(app = %app.name, %descriptor, error = %err, "no hooks loaded");
            HookConfig::default()
        }));
    }

    async fn run_hooks(
        &self,
        app: &App,
        phase: HookPhase,
        out: OutputWriter<'_>,
    ) -> Result<(), EngineError> {
        let commands = app
            .hooks
            .as_ref()
            .map(|hooks| hooks.commands(phase))
            .unwrap_or_default();
        if commands.is_empty() {
            tracing::info!(app = %app.name, "Skipping {phase} hooks...");
            return Ok(());
        }
        out.write_all(format!(" ---> Running {phase}\n").as_bytes())
            .await?;
        for cmd in commands {
            let cmd = resolve_hook_command(&self.config.unit.unit_repo, cmd);
            self.run_on(app, &cmd, &mut *out).await?;
        }
        Ok(())
    }
}

/// One writer fed by both streams of a command, in arrival order.
struct SharedOutput<'a>(Mutex<OutputWriter<'a>>);

impl<'a> SharedOutput<'a> {
    fn new(out: OutputWriter<'a>) -> Self {
        Self(Mutex::new(out))
    }

    fn handle(&self) -> SharedHandle<'_, 'a> {
        SharedHandle(self)
    }

    fn lock(&self) -> MutexGuard<'_, OutputWriter<'a>> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

struct SharedHandle<'s, 'a>(&'s SharedOutput<'a>);

impl AsyncWrite for SharedHandle<'_, '_> {
    fn poll_write(
        self: Pin<&mut Self>,
        cx: &mut Context<'_>,
        buf: &[u8],
    ) -> Poll<io::Result<usize>> {
        let mut out = self.0.lock();
        Pin::new(&mut **out).poll_write(cx, buf)
    }

    fn poll_flush(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut out = self.0.lock();
        Pin::new(&mut **out).poll_flush(cx)
    }

    fn poll_shutdown(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<io::Result<()>> {
        let mut out = self.0.lock();
        Pin::new(&mut **out).poll_shutdown(cx)
    }
}
