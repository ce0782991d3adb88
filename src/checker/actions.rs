//! Remediation actions run when a check crosses its limit.

use crate::channel::CommandSender;
use crate::config::{CheckSpec, ServerSpec};
use crate::error::{Error, Result};
use crate::notify::{IncidentKind, IncidentNotifier};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

/// Everything an action needs to know about the trigger.
#[derive(Debug, Clone)]
pub struct ActionContext {
    pub server: Arc<ServerSpec>,
    pub check: Arc<CheckSpec>,
    /// Log the intended effect instead of performing it.
    pub dry_run: bool,
    /// Correlates the log lines of all actions of one trigger.
    pub incident: Uuid,
}

#[async_trait]
pub trait Action: Send + Sync {
    async fn execute(&self, ctx: &ActionContext) -> Result<()>;
}

/// Audit marker. Runs the same in dry-run mode.
#[derive(Debug, Default)]
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<()> {
        tracing::info!(
            server = %ctx.server.name,
            check = %ctx.check.name,
            incident = %ctx.incident,
            "Check limit reached"
        );
        Ok(())
    }
}

/// Warns players over the console, then restarts the container.
pub struct RestartAction {
    runtime: Arc<dyn ContainerRuntime>,
    commander: Arc<dyn CommandSender>,
    message: String,
}

impl RestartAction {
    pub fn new(
        runtime: Arc<dyn ContainerRuntime>,
        commander: Arc<dyn CommandSender>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            runtime,
            commander,
            message: message.into(),
        }
    }
}

#[async_trait]
impl Action for RestartAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<()> {
        let server = &ctx.server;
        if ctx.dry_run {
            tracing::info!(server = %server.name, incident = %ctx.incident, "dry-run: would restart server");
            return Ok(());
        }

        // A dead console is the usual reason we are here.
        if let Err(e) = self.commander.send_command(server, &self.message).await {
            tracing::warn!(server = %server.name, error = %e, "Restart broadcast not delivered");
        }

        tracing::info!(server = %server.name, incident = %ctx.incident, "Restarting server");
        self.runtime.restart(server).await
    }
}

/// Creates a "restarted" incident on the status page.
pub struct NotifyAction {
    notifier: Option<Arc<dyn IncidentNotifier>>,
}

impl NotifyAction {
    pub fn new(notifier: Option<Arc<dyn IncidentNotifier>>) -> Self {
        Self { notifier }
    }
}

#[async_trait]
impl Action for NotifyAction {
    async fn execute(&self, ctx: &ActionContext) -> Result<()> {
        if ctx.dry_run {
            tracing::info!(server = %ctx.server.name, incident = %ctx.incident, "dry-run: would create incident");
            return Ok(());
        }
        let notifier = self
            .notifier
            .as_ref()
            .ok_or_else(|| Error::Notify("no incident service configured".to_string()))?;
        let outcome = notifier.notify(&ctx.server, IncidentKind::Restarted).await?;
        tracing::debug!(server = %ctx.server.name, ?outcome, "notify action done");
        Ok(())
    }
}

/// Name-keyed table of actions.
#[derive(Clone, Default)]
pub struct ActionRegistry {
    actions: HashMap<String, Arc<dyn Action>>,
}

impl ActionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with `log`, `restart` and `notify` (alias `cachet`).
    pub fn with_defaults(
        runtime: Arc<dyn ContainerRuntime>,
        commander: Arc<dyn CommandSender>,
        notifier: Option<Arc<dyn IncidentNotifier>>,
        restart_message: &str,
    ) -> Self {
        let mut registry = Self::new();
        registry.register("log", Arc::new(LogAction));
        registry.register(
            "restart",
            Arc::new(RestartAction::new(runtime, commander, restart_message)),
        );
        let notify: Arc<dyn Action> = Arc::new(NotifyAction::new(notifier));
        registry.register("notify", notify.clone());
        registry.register("cachet", notify);
        registry
    }

    pub fn register(&mut self, name: impl Into<String>, action: Arc<dyn Action>) {
        self.actions.insert(name.into(), action);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Action>> {
        self.actions.get(name).cloned()
    }
}

impl std::fmt::Debug for ActionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.actions.keys().collect();
        names.sort_unstable();
        f.debug_struct("ActionRegistry").field("actions", &names).finish()
    }
}
