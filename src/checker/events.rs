//! Reacts to container lifecycle events.

use crate::config::{Config, ServerSpec};
use crate::error::{Error, Result};
use crate::notify::{IncidentKind, IncidentNotifier, NotifyOutcome};
use crate::runtime::{ContainerEvent, ContainerRuntime};
use futures::StreamExt;
use std::sync::Arc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

/// What the reactor did with one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventOutcome {
    /// Not an action we handle.
    Ignored,
    /// The container name matches no configured server.
    UnknownServer(String),
    /// The server is configured but disabled.
    Disabled,
    /// Dry-run: the effect was only logged.
    DryRun,
    Restarted,
    /// Recovery processed; `None` if no incident service is configured.
    Recovered(Option<NotifyOutcome>),
    /// Shutdown began during the restart delay.
    Cancelled,
}

pub struct EventReactor {
    config: Arc<Config>,
    runtime: Arc<dyn ContainerRuntime>,
    notifier: Option<Arc<dyn IncidentNotifier>>,
}

impl EventReactor {
    pub fn new(
        config: Arc<Config>,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Option<Arc<dyn IncidentNotifier>>,
    ) -> Self {
        Self {
            config,
            runtime,
            notifier,
        }
    }

    /// Maps a container name to its server, stripping the runtime prefix.
    pub fn resolve(&self, container: &str) -> Option<&ServerSpec> {
        let name = container.trim_start_matches('/');
        let name = name
            .strip_prefix(self.config.docker.name_prefix.as_str())
            .unwrap_or(name);
        self.config.server(name)
    }

    pub async fn handle_event(
        &self,
        event: &ContainerEvent,
        cancel: &CancellationToken,
    ) -> Result<EventOutcome> {
        if event.action != "die" && event.action != "start" {
            tracing::trace!(action = %event.action, "Ignoring container event");
            return Ok(EventOutcome::Ignored);
        }

        let container = event.container_name().unwrap_or_default();
        let Some(server) = self.resolve(container) else {
            tracing::warn!(%container, "Event for unknown server");
            return Ok(EventOutcome::UnknownServer(container.to_string()));
        };
        if !server.enabled {
            tracing::debug!(server = %server.name, "Event for disabled server");
            return Ok(EventOutcome::Disabled);
        }

        let dry_run = self.config.checker.dry_run;
        match event.action.as_str() {
            "die" => {
                if dry_run {
                    tracing::info!(server = %server.name, "dry-run: would restart died server");
                    return Ok(EventOutcome::DryRun);
                }
                let delay = self.config.checker.restart_delay;
                tracing::info!(server = %server.name, ?delay, "Server died, restarting");
                tokio::select! {
                    _ = cancel.cancelled() => return Ok(EventOutcome::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                self.runtime.restart(server).await?;
                Ok(EventOutcome::Restarted)
            }
            _ => {
                let Some(notifier) = &self.notifier else {
                    return Ok(EventOutcome::Recovered(None));
                };
                if dry_run {
                    tracing::info!(server = %server.name, "dry-run: would create recovery incident");
                    return Ok(EventOutcome::DryRun);
                }
                let outcome = notifier.notify(server, IncidentKind::Recovered).await?;
                Ok(EventOutcome::Recovered(Some(outcome)))
            }
        }
    }

    /// Processes events until the subscription breaks or `cancel` fires.
    ///
    /// A broken subscription is returned as an error; resubscribing is up
    /// to the caller.
    #[tracing::instrument(skip_all)]
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> Result<()> {
        let mut events = self.runtime.events().await?;
        let mut handlers = JoinSet::new();
        tracing::info!("Subscribed to container events");

        let outcome = loop {
            tokio::select! {
                _ = cancel.cancelled() => break Ok(()),
                next = events.next() => match next {
                    Some(Ok(event)) => {
                        let this = self.clone();
                        let cancel = cancel.clone();
                        handlers.spawn(async move {
                            if let Err(e) = this.handle_event(&event, &cancel).await {
                                tracing::error!(action = %event.action, error = %e, "Handling container event failed");
                            }
                        });
                    }
                    Some(Err(e)) => break Err(e),
                    None => break Err(Error::Runtime("event stream ended".to_string())),
                },
                Some(_) = handlers.join_next(), if !handlers.is_empty() => {}
            }
        };

        while handlers.join_next().await.is_some() {}
        outcome
    }
}
