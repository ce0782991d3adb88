//! Process supervisor for one game server.
//!
//! A [`Runner`] starts the server on a pseudo-terminal, forwards its output,
//! serves the command channel and reconciles configuration changes. It
//! shuts down when it receives SIGINT/SIGTERM or when the server exits on
//! its own:
//!
//! 1. write `onExitCommand` to the console and wait up to `onExitGrace`
//! 2. wait `termGrace`, then send SIGTERM if the server is still alive
//! 3. close the console and stop the channel and the reconciler
//! 4. let pending output drain briefly, then close the terminal and join
//!    the output copier
//!
//! # Example
//!
//! ```no_run
//! use srcds_controller::runner::Runner;
//!
//! # async fn demo() -> srcds_controller::Result<()> {
//! let runner = Runner::from_config_file("/srv/alpha/runner.yaml")?;
//! let exit = runner.run().await?;
//! println!("server exited: {:?}", exit.status);
//! # Ok(())
//! # }
//! ```

mod active;
mod console;
pub mod output;
mod process;
mod pty;
pub mod reconciler;
mod shutdown;

pub use active::ActiveConfig;
pub use console::Console;
pub use output::{Route, copy_output};
pub use process::{ProcessSignal, SupervisedProcess};
pub use pty::PtyMaster;
pub use reconciler::{ReconcileOutcome, Reconciler};
pub use shutdown::ShutdownSignal;

use crate::channel::{AclPolicy, ChannelState, CommandChannel};
use crate::config::RunnerConfig;
use crate::config::validator::validate_server_spec;
use crate::error::{Error, Result};
use async_process::ExitStatus;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::signal::unix::{SignalKind, signal};
use tokio_util::sync::CancellationToken;

/// Wait after SIGTERM before resorting to SIGKILL.
const KILL_TIMEOUT: Duration = Duration::from_secs(10);

/// Wait for the output copier to reach EOF before closing the terminal.
const OUTPUT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// How a runner ended.
#[derive(Debug)]
pub struct RunnerExit {
    /// Exit status of the server, if it could be collected.
    pub status: Option<ExitStatus>,
}

impl RunnerExit {
    /// Exit code to hand on to the host.
    pub fn code(&self) -> i32 {
        self.status.and_then(|s| s.code()).unwrap_or(1)
    }
}

pub struct Runner {
    config_path: PathBuf,
    active: ActiveConfig,
    shutdown: ShutdownSignal,
}

impl Runner {
    pub fn new(config_path: impl Into<PathBuf>, config: RunnerConfig) -> Self {
        Self {
            config_path: config_path.into(),
            active: ActiveConfig::new(config),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Loads and validates a runner configuration file.
    pub fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        let config = RunnerConfig::from_file(&path)?;
        validate_server_spec(&config.server)?;
        Ok(Self::new(path.as_ref(), config))
    }

    pub fn active_config(&self) -> &ActiveConfig {
        &self.active
    }

    /// Handle to start the shutdown sequence from elsewhere.
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Runs the server until it exits or shutdown is requested.
    #[tracing::instrument(skip(self), fields(server = %self.active.current().server.name))]
    pub async fn run(self) -> Result<RunnerExit> {
        let config = self.active.current();

        let mut process = SupervisedProcess::spawn(&config.server)?;
        let process_signal = process.signal();
        let terminal = process
            .take_terminal()
            .ok_or_else(|| Error::Process("terminal already taken".to_string()))?;
        let console = Arc::new(Console::new(terminal.clone()));

        let terminal_closed = CancellationToken::new();
        let mut copier = {
            let active = self.active.clone();
            let closed = terminal_closed.clone();
            tokio::spawn(async move {
                let reader = tokio::io::BufReader::new(terminal);
                copy_output(reader, &active, tokio::io::stdout(), tokio::io::stderr(), &closed)
                    .await
            })
        };

        let channel = CommandChannel::start(
            &config.socket_path(),
            ChannelState::new(self.active.clone(), console.clone()),
            Arc::new(AclPolicy::system(self.active.clone())),
        )?;

        let duties = CancellationToken::new();
        let reconciler = tokio::spawn(
            Reconciler::new(&self.config_path, self.active.clone(), console.clone())
                .run(duties.clone()),
        );

        let exit_waiter = {
            let shutdown = self.shutdown.clone();
            tokio::spawn(async move {
                let status = process.wait().await;
                shutdown.trigger("server process exited");
                status
            })
        };

        let signal_listener = {
            let shutdown = self.shutdown.clone();
            let mut sigterm = signal(SignalKind::terminate())?;
            let mut sigint = signal(SignalKind::interrupt())?;
            tokio::spawn(async move {
                tokio::select! {
                    _ = sigterm.recv() => { shutdown.trigger("SIGTERM"); }
                    _ = sigint.recv() => { shutdown.trigger("SIGINT"); }
                    _ = shutdown.triggered() => {}
                }
            })
        };

        self.shutdown.triggered().await;
        let current = self.active.current();
        let settings = &current.runner;
        self.stop_process(&console, &process_signal, settings.on_exit_grace, settings.term_grace)
            .await;

        console.close().await;
        duties.cancel();
        channel.shutdown().await;

        if let Err(e) = reconciler.await {
            tracing::error!(error = %e, "Reconciler task failed");
        }
        signal_listener.abort();

        let status = match exit_waiter.await {
            Ok(Ok(status)) => Some(status),
            Ok(Err(e)) => {
                tracing::error!(error = %e, "Cannot collect server exit status");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Exit waiter failed");
                None
            }
        };

        // Grandchildren may still hold the terminal open; closing our side
        // ends the copy either way.
        let copied = match tokio::time::timeout(OUTPUT_DRAIN_TIMEOUT, &mut copier).await {
            Ok(joined) => joined,
            Err(_) => {
                tracing::debug!("Output still open, closing terminal");
                terminal_closed.cancel();
                copier.await
            }
        };
        match copied {
            Ok(Ok(dropped)) => tracing::debug!(dropped, "Output copier finished"),
            Ok(Err(e)) => tracing::warn!(error = %e, "Output copier failed"),
            Err(e) => tracing::error!(error = %e, "Output copier task failed"),
        }

        tracing::info!(?status, "Runner stopped");
        Ok(RunnerExit { status })
    }

    async fn stop_process(
        &self,
        console: &Console,
        process: &ProcessSignal,
        on_exit_grace: Duration,
        term_grace: Duration,
    ) {
        let on_exit = self.active.current().server.on_exit_command.clone();
        if let Some(command) = on_exit.filter(|_| !process.has_exited()) {
            tracing::info!(%command, ?on_exit_grace, "Sending on-exit command");
            match console.write_line(&command).await {
                Ok(()) => {
                    tokio::select! {
                        _ = process.exited() => {}
                        _ = tokio::time::sleep(on_exit_grace) => {}
                    }
                }
                Err(e) => tracing::warn!(error = %e, "On-exit command not delivered"),
            }
        }

        tokio::time::sleep(term_grace).await;
        if process.has_exited() {
            return;
        }

        tracing::info!("Terminating server process");
        if let Err(e) = process.terminate() {
            tracing::error!(error = %e, "SIGTERM failed");
        }
        if tokio::time::timeout(KILL_TIMEOUT, process.exited()).await.is_err() {
            tracing::warn!(timeout = ?KILL_TIMEOUT, "Server ignored SIGTERM, killing it");
            if let Err(e) = process.kill() {
                tracing::error!(error = %e, "SIGKILL failed");
            }
        }
    }
}
