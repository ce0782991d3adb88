//! Failure window evaluation and remediation dispatch.

use crate::checker::actions::{ActionContext, ActionRegistry};
use crate::checker::failure::{FailureRegistry, ProbeResult, Verdict};
use crate::config::{CheckSpec, ServerSpec};
use crate::error::{Error, Result};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// Consumes probe results, owns the failure counters, fires actions.
#[derive(Debug)]
pub struct Evaluator {
    failures: FailureRegistry,
    actions: ActionRegistry,
    dry_run: bool,
}

impl Evaluator {
    pub fn new(actions: ActionRegistry, dry_run: bool) -> Self {
        Self {
            failures: FailureRegistry::new(),
            actions,
            dry_run,
        }
    }

    pub fn failures(&self) -> &FailureRegistry {
        &self.failures
    }

    pub fn observe(&self, result: &ProbeResult) -> Verdict {
        self.observe_at(result, Instant::now())
    }

    /// Accounts `result` as seen at `now` and logs the decision.
    pub fn observe_at(&self, result: &ProbeResult, now: Instant) -> Verdict {
        let verdict = self.failures.record_at(result, now);
        let server = &result.server.name;
        let check = &result.check.name;
        match verdict {
            Verdict::Passed { had_failures: true } => {
                tracing::info!(%server, %check, "Check recovered");
            }
            Verdict::Passed { .. } => {
                tracing::trace!(%server, %check, "Check passed");
            }
            Verdict::Counting { count, window } => {
                tracing::debug!(%server, %check, count, ?window, "Check failed");
            }
            Verdict::Triggered { count, window } => {
                tracing::warn!(%server, %check, count, ?window, "Check limit crossed");
            }
        }
        verdict
    }

    /// Observes `result` and, if the limit was crossed, runs its actions.
    pub async fn handle(&self, result: &ProbeResult) -> Verdict {
        let verdict = self.observe(result);
        if let Verdict::Triggered { .. } = verdict {
            self.remediate(result.server.clone(), result.check.clone())
                .await;
        }
        verdict
    }

    /// Runs every action of the check's limit concurrently.
    ///
    /// Failures are logged per action and never affect sibling actions.
    pub async fn remediate(
        &self,
        server: Arc<ServerSpec>,
        check: Arc<CheckSpec>,
    ) -> Vec<(String, Result<()>)> {
        let ctx = ActionContext {
            server,
            check,
            dry_run: self.dry_run,
            incident: Uuid::new_v4(),
        };

        let runs = ctx.check.limit.actions.iter().map(|name| {
            let ctx = &ctx;
            async move {
                let outcome = match self.actions.get(name) {
                    Some(action) => action.execute(ctx).await,
                    None => Err(Error::ConfigInvalid(format!("unknown action '{}'", name))),
                };
                if let Err(e) = &outcome {
                    tracing::error!(
                        server = %ctx.server.name,
                        check = %ctx.check.name,
                        action = %name,
                        incident = %ctx.incident,
                        error = %e,
                        "Action failed"
                    );
                }
                (name.clone(), outcome)
            }
        });
        join_all(runs).await
    }

    /// Consumes results until the queue closes or `cancel` fires.
    ///
    /// Remediation runs in background tasks, so a slow restart never delays
    /// accounting for other servers. Pending remediations are awaited
    /// before returning.
    #[tracing::instrument(skip_all)]
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<ProbeResult>, cancel: CancellationToken) {
        let mut remediations = JoinSet::new();
        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                received = rx.recv() => {
                    let Some(result) = received else { break };
                    if let Verdict::Triggered { .. } = self.observe(&result) {
                        let this = self.clone();
                        remediations.spawn(async move {
                            this.remediate(result.server, result.check).await;
                        });
                    }
                }
                Some(_) = remediations.join_next(), if !remediations.is_empty() => {}
            }
        }

        while remediations.join_next().await.is_some() {}
        tracing::debug!("Evaluator stopped");
    }
}
