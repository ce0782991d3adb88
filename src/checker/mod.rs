//! Health checker: scheduler, failure evaluator and event reactor.
//!
//! [`Checker::run`] starts one [`CheckWorker`] per enabled (server, check)
//! pair. Workers push [`ProbeResult`]s into a queue consumed by a single
//! [`Evaluator`], which owns every failure counter and dispatches actions
//! when a limit is crossed. With `checker.dockerEvents` enabled an
//! [`EventReactor`] restarts containers that die.
//!
//! All tasks share one [`CancellationToken`]; cancelling it stops every
//! worker and `run` returns once all of them have finished.
//!
//! # Example
//!
//! ```no_run
//! use srcds_controller::checker::Checker;
//! use srcds_controller::config::Config;
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn demo() -> srcds_controller::Result<()> {
//! let config = Config::from_file("checker.yaml")?;
//! let checker = Checker::with_defaults(config)?;
//! let cancel = CancellationToken::new();
//! checker.run(cancel).await?;
//! # Ok(())
//! # }
//! ```

pub mod actions;
pub mod evaluator;
pub mod events;
pub mod failure;
pub mod scheduler;

pub use actions::{Action, ActionContext, ActionRegistry};
pub use evaluator::Evaluator;
pub use events::{EventOutcome, EventReactor};
pub use failure::{FailureCounter, FailureRegistry, ProbeResult, Verdict};
pub use scheduler::{CheckWorker, Timing, splay_duration};

use crate::channel::{CommandSender, UnixCommandClient};
use crate::checks::ProbeRegistry;
use crate::config::{CheckSpec, Config};
use crate::error::Result;
use crate::notify::{CachetNotifier, IncidentNotifier};
use crate::runtime::{ContainerRuntime, DockerCli};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

const RESULT_QUEUE: usize = 1024;

pub struct Checker {
    config: Arc<Config>,
    probes: ProbeRegistry,
    evaluator: Arc<Evaluator>,
    reactor: Option<Arc<EventReactor>>,
}

impl Checker {
    pub fn new(
        config: Config,
        probes: ProbeRegistry,
        actions: ActionRegistry,
        runtime: Arc<dyn ContainerRuntime>,
        notifier: Option<Arc<dyn IncidentNotifier>>,
    ) -> Self {
        let config = Arc::new(config);
        let evaluator = Arc::new(Evaluator::new(actions, config.checker.dry_run));
        let reactor = config
            .checker
            .docker_events
            .then(|| Arc::new(EventReactor::new(config.clone(), runtime, notifier)));
        Self {
            config,
            probes,
            evaluator,
            reactor,
        }
    }

    /// Checker wired to the Docker CLI, the runner sockets and, if
    /// configured, Cachet.
    pub fn with_defaults(config: Config) -> Result<Self> {
        let runtime: Arc<dyn ContainerRuntime> = Arc::new(DockerCli::new(config.docker.clone()));
        let commander: Arc<dyn CommandSender> = Arc::new(UnixCommandClient::new());
        let notifier = match &config.cachet {
            Some(settings) => {
                Some(Arc::new(CachetNotifier::new(settings)?) as Arc<dyn IncidentNotifier>)
            }
            None => None,
        };

        let probes = ProbeRegistry::with_defaults(runtime.clone(), commander.clone());
        let actions = ActionRegistry::with_defaults(
            runtime.clone(),
            commander,
            notifier.clone(),
            &config.checker.restart_message,
        );
        Ok(Self::new(config, probes, actions, runtime, notifier))
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn evaluator(&self) -> &Arc<Evaluator> {
        &self.evaluator
    }

    /// Builds the workers for every enabled server and known probe.
    pub fn workers(&self) -> Vec<CheckWorker> {
        let timing = Timing {
            interval: self.config.checker.interval,
            splay: self.config.checker.splay,
            probe_timeout: self.config.checker.probe_timeout,
        };

        let mut workers = Vec::new();
        for server in self.config.servers.iter().filter(|s| s.enabled) {
            let server = Arc::new(server.clone());
            for check in &server.checks {
                let Some(probe) = self.probes.get(&check.name) else {
                    tracing::warn!(server = %server.name, check = %check.name, "Unknown check, skipping");
                    continue;
                };
                let check = CheckSpec {
                    opts: check.merged_opts(&self.config.checks),
                    ..check.clone()
                };
                workers.push(CheckWorker {
                    probe,
                    server: server.clone(),
                    check: Arc::new(check),
                    timing,
                });
            }
        }
        workers
    }

    /// Runs until `cancel` fires or the event reactor fails.
    ///
    /// A failing reactor cancels everything else and its error is returned.
    #[tracing::instrument(skip_all)]
    pub async fn run(&self, cancel: CancellationToken) -> Result<()> {
        let (tx, rx) = mpsc::channel(RESULT_QUEUE);
        let workers = self.workers();
        tracing::info!(
            workers = workers.len(),
            dry_run = self.config.checker.dry_run,
            "Starting checker"
        );

        let mut tasks = JoinSet::new();
        for worker in workers {
            tasks.spawn(worker.run(tx.clone(), cancel.clone()));
        }
        drop(tx);

        let evaluator = tokio::spawn(self.evaluator.clone().run(rx, cancel.clone()));

        let mut outcome = Ok(());
        if let Some(reactor) = &self.reactor {
            let result = reactor.clone().run(cancel.clone()).await;
            if let Err(e) = &result {
                tracing::error!(error = %e, "Container event reactor stopped");
                cancel.cancel();
            }
            outcome = result;
        } else {
            cancel.cancelled().await;
        }

        while tasks.join_next().await.is_some() {}
        if let Err(e) = evaluator.await {
            tracing::error!(error = %e, "Evaluator task failed");
        }
        tracing::info!("Checker stopped");
        outcome
    }
}
