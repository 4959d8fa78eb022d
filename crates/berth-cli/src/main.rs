use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use tokio::io::AsyncWriteExt;
use tokio::time::{Duration, Instant, sleep};
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use berth_core::domain::{EnvVar, Team};
use berth_core::impls::InMemoryStack;
use berth_core::queue::{Action, Queue};
use berth_core::{Config, EngineBuilder, Orchestrator};

#[derive(Parser)]
#[command(name = "berth", about = "Application lifecycle engine on in-memory collaborators")]
struct Cli {
    /// YAML configuration file (defaults apply when omitted).
    #[arg(short, long, env = "BERTH_CONFIG")]
    config: Option<PathBuf>,

    /// Key used to sign app tokens; overrides `auth.token_key`.
    #[arg(long, env = "BERTH_TOKEN_KEY", hide_env_values = true)]
    token_key: Option<String>,

    /// Number of queue workers; overrides `queue.workers`.
    #[arg(long)]
    workers: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Create an app, scale it, bind a service, restart and destroy it.
    Demo {
        /// Name of the demo app.
        #[arg(default_value = "chemistry")]
        app: String,

        /// Units created with the app.
        #[arg(long, default_value_t = 2)]
        units: usize,
    },

    /// Print the effective configuration as JSON.
    Config,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = load_config(&cli)?;
    match cli.command {
        Command::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
            Ok(())
        }
        Command::Demo { app, units } => demo(config, &app, units).await,
    }
}

fn load_config(cli: &Cli) -> Result<Config> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => Config::default(),
    };
    if let Some(key) = &cli.token_key {
        config.auth.token_key = Some(key.clone());
    }
    if let Some(workers) = cli.workers {
        config.queue.workers = workers;
    }
    config.validate()?;
    Ok(config)
}

async fn demo(config: Config, app: &str, units: usize) -> Result<()> {
    let stack = InMemoryStack::new(config).context("building the in-memory stack")?;
    let team = Team::new("cobrateam", ["cobra@example.com"]);
    stack.teams.add_team(team.clone());
    stack.services.add_instance(
        "mysql",
        vec![
            EnvVar::private("DATABASE_HOST", "10.0.0.5"),
            EnvVar::public("DATABASE_NAME", app),
        ],
    );

    let engine = EngineBuilder::new(stack.orchestrator())
        .with_default_handlers()?
        .expect_actions(&Action::ALL)
        .build()?;
    let orchestrator = Arc::clone(&engine.orchestrator);
    let mut listener = orchestrator.new_log_listener(app);
    let mut stdout = tokio::io::stdout();

    orchestrator.create_app(app, "python", units, &[team]).await?;
    orchestrator.bind_service("mysql", app).await?;
    let workers = engine.spawn_workers();
    orchestrator
        .set_envs(app, vec![EnvVar::public("DEBUG", "1")], false)
        .await?;
    settle(&orchestrator).await?;

    orchestrator.add_units(app, 2).await?;
    settle(&orchestrator).await?;
    stack
        .provisioner
        .prepare_output("pre-restart:\n  - migrate.sh\npost-restart:\n  - echo restarted\n");
    orchestrator.restart(app, &mut stdout).await?;
    stdout.flush().await?;
    orchestrator
        .log(app, "restart finished\nall units up", "berth")
        .await?;
    settle(&orchestrator).await?;

    orchestrator.remove_units(app, 2).await?;
    settle(&orchestrator).await?;

    let info_view = orchestrator.info(app).await?;
    println!("{}", serde_json::to_string_pretty(&info_view)?);
    for (name, shown) in orchestrator.get_env(app, &[]).await? {
        info!(app, var = %name, "{shown}");
    }
    while let Some(log) = listener.try_recv() {
        info!(app, source = %log.source, "log: {}", log.message);
    }
    listener.close();

    orchestrator.force_destroy(app).await?;
    settle(&orchestrator).await?;
    println!("{}", serde_json::to_string_pretty(&orchestrator.status().await?)?);

    workers.shutdown_and_join().await;
    Ok(())
}

/// Waits until the workers have nothing left to deliver.
async fn settle(orchestrator: &Orchestrator) -> Result<()> {
    let deadline = Instant::now() + Duration::from_secs(30);
    loop {
        let counts = orchestrator.queue().counts_by_state().await?;
        if counts.pending() == 0 {
            if counts.dead > 0 {
                bail!("{} queued actions failed for good", counts.dead);
            }
            return Ok(());
        }
        if Instant::now() >= deadline {
            bail!("queue did not settle: {counts:?}");
        }
        sleep(Duration::from_millis(20)).await;
    }
}
