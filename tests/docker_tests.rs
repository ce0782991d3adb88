use futures::StreamExt;
use srcds_controller::checker::EventReactor;
use srcds_controller::config::Config;
use srcds_controller::error::Error;
use srcds_controller::runtime::{ContainerRuntime, DockerCli};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// Writes a stand-in `docker` client that logs its arguments to `calls`
/// and answers `events` with a noise line followed by one real event.
fn fake_docker(dir: &Path) -> (PathBuf, PathBuf) {
    let calls = dir.join("calls");
    let script = dir.join("docker");
    std::fs::write(
        &script,
        format!(
            r#"#!/bin/sh
echo "$@" >> "{calls}"
case "$1" in
  events)
    echo 'WARNING: something odd'
    echo '{{"Action":"die","Actor":{{"Attributes":{{"name":"game-alpha"}}}}}}'
    ;;
esac
"#,
            calls = calls.display()
        ),
    )
    .unwrap();
    std::fs::set_permissions(&script, std::fs::Permissions::from_mode(0o755)).unwrap();
    (script, calls)
}

fn config() -> Arc<Config> {
    Arc::new(
        Config::parse_from_str(
            r#"
checker:
  restartDelay: 0s
docker:
  namePrefix: "game-"
servers:
  - name: alpha
"#,
        )
        .unwrap(),
    )
}

#[tokio::test]
async fn test_unreadable_event_line_is_skipped() {
    let dir = tempfile::tempdir().unwrap();
    let (script, _) = fake_docker(dir.path());
    let docker = DockerCli::new(config().docker.clone()).with_binary(script.display().to_string());

    let items: Vec<_> = docker.events().await.unwrap().collect().await;

    assert_eq!(items.len(), 2);
    let event = items[0].as_ref().unwrap();
    assert_eq!(event.action, "die");
    assert_eq!(event.container_name(), Some("game-alpha"));
    assert!(matches!(items[1], Err(Error::Runtime(_))));
}

#[tokio::test]
async fn test_reactor_survives_noise_and_restarts() {
    let dir = tempfile::tempdir().unwrap();
    let (script, calls) = fake_docker(dir.path());
    let config = config();
    let docker = DockerCli::new(config.docker.clone()).with_binary(script.display().to_string());
    let reactor = Arc::new(EventReactor::new(config, Arc::new(docker), None));

    let result = tokio::time::timeout(
        Duration::from_secs(10),
        reactor.run(CancellationToken::new()),
    )
    .await
    .expect("reactor did not finish");

    // Only the closed subscription ends the reactor.
    assert!(matches!(result, Err(Error::Runtime(msg)) if msg.contains("closed")));
    let calls = std::fs::read_to_string(calls).unwrap();
    assert!(calls.lines().any(|l| l.starts_with("restart") && l.ends_with("game-alpha")));
}
