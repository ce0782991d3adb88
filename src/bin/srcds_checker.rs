use anyhow::Context;
use clap::Parser;
use srcds_controller::checker::Checker;
use srcds_controller::config::{Config, validate_config};
use std::path::PathBuf;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "srcds_checker", version, about = "Health checks and remediation for game servers")]
struct Args {
    /// Path to the checker config YAML
    #[arg(short = 'c', long = "config", env = "SRCDS_CHECKER_CONFIG", default_value = "checker.yaml")]
    config: PathBuf,

    /// Log filter, overrides RUST_LOG
    #[arg(long = "log-level")]
    log_level: Option<String>,

    /// Only log what actions would do
    #[arg(long = "dry-run")]
    dry_run: Option<bool>,

    /// React to container lifecycle events
    #[arg(long = "docker-events")]
    docker_events: Option<bool>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    fmt().with_env_filter(filter).with_target(true).init();

    let mut config = Config::from_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    if let Some(dry_run) = args.dry_run {
        config.checker.dry_run = dry_run;
    }
    if let Some(docker_events) = args.docker_events {
        config.checker.docker_events = docker_events;
    }
    validate_config(&config)?;

    let checker = Checker::with_defaults(config)?;
    let cancel = CancellationToken::new();

    let mut sigterm = signal(SignalKind::terminate())?;
    let stopper = cancel.clone();
    tokio::spawn(async move {
        tokio::select! {
            _ = sigterm.recv() => tracing::info!("SIGTERM received"),
            _ = tokio::signal::ctrl_c() => tracing::info!("SIGINT received"),
            _ = stopper.cancelled() => return,
        }
        stopper.cancel();
    });

    checker.run(cancel).await?;
    Ok(())
}
