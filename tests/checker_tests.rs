mod common;

use async_trait::async_trait;
use common::{check, server};
use mockall::mock;
use srcds_controller::channel::CommandSender;
use srcds_controller::checker::{
    Action, ActionContext, ActionRegistry, CheckWorker, Checker, Evaluator, FailureRegistry,
    ProbeResult, Timing, Verdict,
};
use srcds_controller::checks::{Probe, ProbeRegistry};
use srcds_controller::config::{CheckSpec, Config, ServerSpec, Splay};
use srcds_controller::error::{Error, Result};
use srcds_controller::notify::{IncidentKind, IncidentNotifier, NotifyOutcome};
use srcds_controller::runtime::{ContainerRuntime, EventStream, LogStream};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;

mock! {
    pub Runtime {}

    #[async_trait]
    impl ContainerRuntime for Runtime {
        async fn restart(&self, server: &ServerSpec) -> Result<()>;
        async fn events(&self) -> Result<EventStream>;
        async fn follow_logs(&self, server: &ServerSpec) -> Result<LogStream>;
    }
}

mock! {
    pub Commander {}

    #[async_trait]
    impl CommandSender for Commander {
        async fn send_command(&self, server: &ServerSpec, command: &str) -> Result<()>;
    }
}

mock! {
    pub Notifier {}

    #[async_trait]
    impl IncidentNotifier for Notifier {
        async fn notify(&self, server: &ServerSpec, kind: IncidentKind) -> Result<NotifyOutcome>;
    }
}

const RESTART_MESSAGE: &str = "say SRCDS CHECKER RESTART MARKER";

fn alpha() -> Arc<ServerSpec> {
    server("name: alpha")
}

fn failing(server: &Arc<ServerSpec>, check: &Arc<CheckSpec>) -> ProbeResult {
    ProbeResult::new(server.clone(), check.clone(), false)
}

fn passing(server: &Arc<ServerSpec>, check: &Arc<CheckSpec>) -> ProbeResult {
    ProbeResult::new(server.clone(), check.clone(), true)
}

fn registry(runtime: MockRuntime, commander: MockCommander, notifier: Option<MockNotifier>) -> ActionRegistry {
    ActionRegistry::with_defaults(
        Arc::new(runtime),
        Arc::new(commander),
        notifier.map(|n| Arc::new(n) as Arc<dyn IncidentNotifier>),
        RESTART_MESSAGE,
    )
}

/// Action that only counts its invocations.
struct CountingAction(Arc<AtomicUsize>);

#[async_trait]
impl Action for CountingAction {
    async fn execute(&self, _: &ActionContext) -> Result<()> {
        self.0.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

#[tokio::test]
async fn test_restart_fires_once_on_third_failure() {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_restart()
        .withf(|s| s.name == "alpha")
        .times(1)
        .returning(|_| Ok(()));
    let mut commander = MockCommander::new();
    commander
        .expect_send_command()
        .withf(|_, cmd| cmd == RESTART_MESSAGE)
        .times(1)
        .returning(|_, _| Ok(()));

    let evaluator = Evaluator::new(registry(runtime, commander, None), false);
    let server = alpha();
    let rcon = check("{ name: rcon, limit: { count: 3, actions: [restart] } }");

    assert!(matches!(evaluator.handle(&failing(&server, &rcon)).await, Verdict::Counting { count: 1, .. }));
    assert!(matches!(evaluator.handle(&failing(&server, &rcon)).await, Verdict::Counting { count: 2, .. }));
    assert!(matches!(evaluator.handle(&failing(&server, &rcon)).await, Verdict::Triggered { count: 3, .. }));
    assert_eq!(evaluator.failures().get("alpha", "rcon").unwrap().count, 0);

    // Immediately after the reset a new window starts.
    assert!(matches!(evaluator.handle(&failing(&server, &rcon)).await, Verdict::Counting { count: 1, .. }));
}

#[tokio::test]
async fn test_time_window_fires_before_count() {
    let evaluator = Evaluator::new(ActionRegistry::new(), true);
    let server = alpha();
    let rcon = check("{ name: rcon, limit: { count: 10, after: 60s, actions: [log] } }");
    let t0 = Instant::now();

    assert!(matches!(evaluator.observe_at(&failing(&server, &rcon), t0), Verdict::Counting { .. }));
    assert!(matches!(
        evaluator.observe_at(&failing(&server, &rcon), t0 + Duration::from_secs(30)),
        Verdict::Counting { count: 2, .. }
    ));
    match evaluator.observe_at(&failing(&server, &rcon), t0 + Duration::from_secs(61)) {
        Verdict::Triggered { count, window } => {
            assert_eq!(count, 3);
            assert_eq!(window, Duration::from_secs(61));
        }
        other => panic!("expected trigger, got {:?}", other),
    }
}

#[tokio::test]
async fn test_pass_resets_window() {
    let evaluator = Evaluator::new(ActionRegistry::new(), true);
    let server = alpha();
    let rcon = check("{ name: rcon, limit: { count: 3, after: 60s } }");
    let t0 = Instant::now();

    evaluator.observe_at(&failing(&server, &rcon), t0);
    evaluator.observe_at(&failing(&server, &rcon), t0 + Duration::from_secs(10));
    assert_eq!(
        evaluator.observe_at(&passing(&server, &rcon), t0 + Duration::from_secs(20)),
        Verdict::Passed { had_failures: true }
    );
    assert!(evaluator.failures().get("alpha", "rcon").is_none());

    // The old first-failure time is gone: 50s later is a fresh window.
    match evaluator.observe_at(&failing(&server, &rcon), t0 + Duration::from_secs(70)) {
        Verdict::Counting { count, window } => {
            assert_eq!(count, 1);
            assert_eq!(window, Duration::ZERO);
        }
        other => panic!("expected counting, got {:?}", other),
    }
}

#[tokio::test]
async fn test_dry_run_skips_side_effects_but_logs() {
    let mut runtime = MockRuntime::new();
    runtime.expect_restart().times(0);
    let mut commander = MockCommander::new();
    commander.expect_send_command().times(0);
    let mut notifier = MockNotifier::new();
    notifier.expect_notify().times(0);

    let evaluator = Evaluator::new(registry(runtime, commander, Some(notifier)), true);
    let results = evaluator
        .remediate(alpha(), check("{ name: rcon, limit: { count: 1, actions: [log, restart, notify] } }"))
        .await;

    assert_eq!(results.len(), 3);
    assert!(results.iter().all(|(_, r)| r.is_ok()));
}

#[tokio::test]
async fn test_failing_action_does_not_block_siblings() {
    let mut runtime = MockRuntime::new();
    runtime
        .expect_restart()
        .times(1)
        .returning(|_| Err(Error::Runtime("no such container".to_string())));
    let mut commander = MockCommander::new();
    commander
        .expect_send_command()
        .times(1)
        .returning(|_, _| Err(Error::Console("closed".to_string())));
    let mut notifier = MockNotifier::new();
    notifier
        .expect_notify()
        .withf(|_, kind| *kind == IncidentKind::Restarted)
        .times(1)
        .returning(|_, _| Ok(NotifyOutcome::Created));

    let evaluator = Evaluator::new(registry(runtime, commander, Some(notifier)), false);
    let results = evaluator
        .remediate(
            alpha(),
            check("{ name: rcon, limit: { count: 1, actions: [restart, cachet, log, bogus] } }"),
        )
        .await;

    let outcome = |name: &str| results.iter().find(|(n, _)| n == name).unwrap().1.is_ok();
    assert!(!outcome("restart"));
    assert!(outcome("cachet"));
    assert!(outcome("log"));
    assert!(!outcome("bogus"));
}

#[tokio::test]
async fn test_notify_without_service_fails() {
    let evaluator = Evaluator::new(registry(MockRuntime::new(), MockCommander::new(), None), false);
    let results = evaluator
        .remediate(alpha(), check("{ name: rcon, limit: { count: 1, actions: [notify] } }"))
        .await;
    assert!(matches!(results[0].1, Err(Error::Notify(_))));
}

#[tokio::test]
async fn test_concurrent_failures_are_counted_exactly() {
    let registry = Arc::new(FailureRegistry::new());
    let server = alpha();
    let unlimited = check("{ name: rcon }");

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let registry = registry.clone();
            let result = failing(&server, &unlimited);
            tokio::spawn(async move { registry.record(&result) })
        })
        .collect();

    let mut seen = Vec::new();
    for task in tasks {
        match task.await.unwrap() {
            Verdict::Counting { count, .. } => seen.push(count),
            other => panic!("unexpected {:?}", other),
        }
    }
    seen.sort_unstable();
    assert_eq!(seen, (1..=50).collect::<Vec<u64>>());
    assert_eq!(registry.get("alpha", "rcon").unwrap().count, 50);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_failures_trigger_once() {
    let registry = Arc::new(FailureRegistry::new());
    let server = alpha();
    let limited = check("{ name: rcon, limit: { count: 50, actions: [log] } }");

    let tasks: Vec<_> = (0..50)
        .map(|_| {
            let registry = registry.clone();
            let result = failing(&server, &limited);
            tokio::spawn(async move { registry.record(&result) })
        })
        .collect();

    let mut triggers = 0;
    for task in tasks {
        if let Verdict::Triggered { count, .. } = task.await.unwrap() {
            assert_eq!(count, 50);
            triggers += 1;
        }
    }
    assert_eq!(triggers, 1);
    assert_eq!(registry.get("alpha", "rcon").unwrap().count, 0);
}

struct SlowProbe;

#[async_trait]
impl Probe for SlowProbe {
    async fn probe(&self, _: &ServerSpec, _: &CheckSpec) -> bool {
        tokio::time::sleep(Duration::from_secs(30)).await;
        true
    }
}

#[tokio::test]
async fn test_hung_probe_counts_as_failure() {
    let worker = CheckWorker {
        probe: Arc::new(SlowProbe),
        server: alpha(),
        check: check("{ name: slow, opts: { timeout: 50ms } }"),
        timing: Timing {
            interval: Duration::from_secs(60),
            splay: Splay::default(),
            probe_timeout: Duration::from_secs(10),
        },
    };

    let started = Instant::now();
    assert!(!worker.probe_once().await);
    assert!(started.elapsed() < Duration::from_secs(5));
}

fn checker_config() -> Config {
    Config::parse_from_str(
        r#"
checker:
  interval: 10ms
  dryRun: false
servers:
  - name: alpha
    checks:
      - name: dummy
        limit: { count: 3, actions: [restart] }
      - name: unknown-probe
  - name: beta
    enabled: false
    checks:
      - name: dummy
"#,
    )
    .unwrap()
}

#[tokio::test]
async fn test_workers_cover_enabled_known_checks() {
    let mut probes = ProbeRegistry::new();
    probes.register("dummy", Arc::new(srcds_controller::checks::DummyProbe));
    let checker = Checker::new(
        checker_config(),
        probes,
        ActionRegistry::new(),
        Arc::new(MockRuntime::new()),
        None,
    );

    let workers = checker.workers();
    assert_eq!(workers.len(), 1);
    assert_eq!(workers[0].server.name, "alpha");
    assert_eq!(workers[0].check.name, "dummy");
}

#[tokio::test]
async fn test_checker_remediates_and_stops_on_cancel() {
    let restarts = Arc::new(AtomicUsize::new(0));
    let mut actions = ActionRegistry::new();
    actions.register("restart", Arc::new(CountingAction(restarts.clone())));
    let mut probes = ProbeRegistry::new();
    probes.register("dummy", Arc::new(srcds_controller::checks::DummyProbe));

    let checker = Arc::new(Checker::new(
        checker_config(),
        probes,
        actions,
        Arc::new(MockRuntime::new()),
        None,
    ));
    let cancel = CancellationToken::new();
    let run = {
        let checker = checker.clone();
        let cancel = cancel.clone();
        tokio::spawn(async move { checker.run(cancel).await })
    };

    tokio::time::timeout(Duration::from_secs(5), async {
        while restarts.load(Ordering::SeqCst) == 0 {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("restart action never ran");

    cancel.cancel();
    let result = tokio::time::timeout(Duration::from_secs(5), run)
        .await
        .expect("checker did not stop")
        .unwrap();
    assert!(result.is_ok());
}
