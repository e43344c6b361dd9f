use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use drover_config::{ConfigLoad, ConfigLoader};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt,
};

mod runtime;

use runtime::FleetRuntime;

#[derive(Parser, Debug)]
#[command(name = "droverd")]
#[command(
    about = "Keeps per-account polling workers in step with the configured accounts"
)]
struct Cli {
    /// Path to drover.toml
    #[arg(short, long, env = "DROVER_CONFIG")]
    config: Option<PathBuf>,

    /// Accounts file; overrides `[accounts].path`
    #[arg(long, env = "DROVER_ACCOUNTS_PATH")]
    accounts: Option<PathBuf>,

    /// Apply the accounts once, print the resulting fleet as JSON and exit
    #[arg(long, default_value_t = false)]
    once: bool,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut loader = ConfigLoader::new();
    if let Some(path) = &cli.config {
        loader = loader.with_config_path(path);
    }
    let ConfigLoad {
        mut config,
        path,
        env_file_loaded,
        warnings,
    } = loader.load().context("failed to load configuration")?;
    if let Some(accounts) = cli.accounts {
        config.accounts.path = Some(accounts);
    }

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.logging.filter.clone().into()),
        )
        .with(fmt::layer())
        .init();

    match &path {
        Some(path) => info!(
            config = %path.display(),
            env_file_loaded,
            "configuration loaded"
        ),
        None => {
            info!(env_file_loaded, "no config file found; using defaults")
        }
    }
    for warning in &warnings {
        warn!(message = %warning, "configuration warning");
    }

    let shutdown = CancellationToken::new();
    let runtime =
        Arc::new(FleetRuntime::start(&config.fleet, shutdown.clone())?);

    let initial = runtime
        .reload(&config.accounts)
        .await
        .context("failed to load accounts")?;
    info!(accounts = initial.added.len(), "initial accounts submitted");

    if cli.once {
        runtime.drain().await;
        runtime.poll_once().await;
        let summary = runtime.summary().await;
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    let mut tasks = vec![runtime.spawn_poller(), runtime.spawn_sweeper()];
    if let Some(period) = config.reload_interval() {
        tasks.push(runtime.spawn_reloader(config.accounts.clone(), period));
    }

    tokio::signal::ctrl_c()
        .await
        .context("failed to listen for shutdown signal")?;
    info!("shutdown signal received");
    shutdown.cancel();

    runtime.drain().await;
    for task in tasks {
        if let Err(err) = task.await {
            warn!("background task ended abnormally: {err}");
        }
    }
    info!("droverd stopped");
    Ok(())
}
