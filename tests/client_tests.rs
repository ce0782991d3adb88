mod common;

use common::{Recorder, server};
use nix::unistd::getuid;
use srcds_controller::channel::{
    AclPolicy, ChannelState, CommandChannel, CommandSender, UnixCommandClient,
};
use srcds_controller::config::RunnerConfig;
use srcds_controller::error::Error;
use srcds_controller::runner::{ActiveConfig, Console};
use std::os::unix::fs::{FileTypeExt, PermissionsExt};
use std::sync::Arc;

fn runner_config(users: &str) -> RunnerConfig {
    RunnerConfig::parse_from_str(&format!(
        "server: {{ name: alpha, rcon: {{ password: old }}, acl: {{ users: [{}] }} }}",
        users
    ))
    .unwrap()
}

#[actix_web::test]
async fn test_command_roundtrip_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("alpha.sock");
    // A leftover file from a crashed runner must not prevent binding.
    std::fs::write(&socket, b"stale").unwrap();

    let active = ActiveConfig::new(runner_config(&getuid().as_raw().to_string()));
    let recorder = Recorder::new();
    let channel = CommandChannel::start(
        &socket,
        ChannelState::new(active.clone(), Arc::new(Console::new(recorder.clone()))),
        Arc::new(AclPolicy::system(active.clone())),
    )
    .unwrap();

    let meta = std::fs::metadata(&socket).unwrap();
    assert!(meta.file_type().is_socket());
    assert_eq!(meta.permissions().mode() & 0o777, 0o660);

    let client = UnixCommandClient::new().with_socket(&socket);
    let spec = server("name: alpha");
    client.send_command(&spec, "say hello & goodbye").await.unwrap();
    client.update_password(&spec, "n3w").await.unwrap();

    assert_eq!(recorder.lines(), vec!["say hello & goodbye", "rcon_password n3w"]);
    assert_eq!(active.password(), "n3w");

    channel.shutdown().await;
    assert!(!socket.exists());
}

#[actix_web::test]
async fn test_unlisted_caller_is_rejected_over_unix_socket() {
    let dir = tempfile::tempdir().unwrap();
    let socket = dir.path().join("alpha.sock");

    let other_uid = getuid().as_raw().wrapping_add(1);
    let active = ActiveConfig::new(runner_config(&other_uid.to_string()));
    let recorder = Recorder::new();
    let channel = CommandChannel::start(
        &socket,
        ChannelState::new(active.clone(), Arc::new(Console::new(recorder.clone()))),
        Arc::new(AclPolicy::system(active)),
    )
    .unwrap();

    let client = UnixCommandClient::new().with_socket(&socket);
    let result = client.send_command(&server("name: alpha"), "status").await;
    assert!(matches!(result, Err(Error::Unauthorized(_))));
    assert_eq!(recorder.text(), "");

    channel.shutdown().await;
}

#[tokio::test]
async fn test_missing_socket_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let spec = server(&format!("{{ name: alpha, path: {} }}", dir.path().display()));
    let result = UnixCommandClient::new().send_command(&spec, "status").await;
    assert!(matches!(result, Err(Error::Io(_))));
}
