use anyhow::Context;
use clap::Parser;
use srcds_controller::runner::Runner;
use std::path::PathBuf;
use tracing_subscriber::{EnvFilter, fmt};

#[derive(Debug, Parser)]
#[command(name = "srcds_runner", version, about = "Supervise one game server process")]
struct Args {
    /// Path to the runner config YAML
    #[arg(short = 'c', long = "config", env = "SRCDS_RUNNER_CONFIG", default_value = "runner.yaml")]
    config: PathBuf,

    /// Log filter, overrides RUST_LOG
    #[arg(long = "log-level")]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let filter = match &args.log_level {
        Some(level) => EnvFilter::new(level),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };
    // Server output owns stdout.
    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    let runner = Runner::from_config_file(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    let exit = runner.run().await?;

    std::process::exit(exit.code());
}
