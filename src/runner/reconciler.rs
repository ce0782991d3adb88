//! Applies configuration file changes to the running server.

use crate::config::RunnerConfig;
use crate::config::validator::validate_server_spec;
use crate::error::Result;
use crate::runner::{ActiveConfig, Console};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Result of one reconciliation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// The file matches what was last applied.
    Unchanged,
    /// A new configuration became active.
    Applied { password_rotated: bool },
    /// The file could not be used this time; the active configuration stays.
    Skipped(String),
}

/// Polls the runner's configuration file and applies changes.
///
/// Only changes of the file itself count: the live password may have been
/// rotated through the command channel in between, and an unchanged file
/// must not undo that.
pub struct Reconciler {
    path: PathBuf,
    active: ActiveConfig,
    console: Arc<Console>,
    last_seen: RunnerConfig,
}

impl Reconciler {
    pub fn new(path: impl Into<PathBuf>, active: ActiveConfig, console: Arc<Console>) -> Self {
        let last_seen = (*active.current()).clone();
        Self {
            path: path.into(),
            active,
            console,
            last_seen,
        }
    }

    async fn load(&self) -> Result<RunnerConfig> {
        let content = tokio::fs::read_to_string(&self.path).await?;
        let config = RunnerConfig::parse_from_str(&content)?;
        validate_server_spec(&config.server)?;
        Ok(config)
    }

    /// Re-reads the file once and applies it if it changed.
    pub async fn reconcile_once(&mut self) -> ReconcileOutcome {
        let next = match self.load().await {
            Ok(config) => config,
            Err(e) => {
                // Half-written files land here too; the next pass retries.
                tracing::warn!(path = %self.path.display(), error = %e, "Ignoring unusable configuration");
                return ReconcileOutcome::Skipped(e.to_string());
            }
        };
        if next == self.last_seen {
            return ReconcileOutcome::Unchanged;
        }

        let password = &next.server.rcon.password;
        let password_rotated = *password != self.active.password();
        if password_rotated {
            let command = next.runner.password_command_for(password);
            if let Err(e) = self.console.write_line(&command).await {
                tracing::warn!(error = %e, "Cannot rotate RCON password, retrying next pass");
                return ReconcileOutcome::Skipped(e.to_string());
            }
            tracing::info!("RCON password rotated from configuration");
        }

        self.active.update(|cfg| *cfg = next.clone());
        self.last_seen = next;
        tracing::info!(path = %self.path.display(), "Configuration reloaded");
        ReconcileOutcome::Applied { password_rotated }
    }

    /// Reconciles every `runner.reloadInterval` until `cancel` fires.
    #[tracing::instrument(skip_all, fields(path = %self.path.display()))]
    pub async fn run(mut self, cancel: CancellationToken) {
        loop {
            let interval = self.active.current().runner.reload_interval;
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(interval) => {}
            }
            self.reconcile_once().await;
        }
        tracing::debug!("Reconciler stopped");
    }
}
