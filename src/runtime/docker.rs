use crate::config::{DockerSettings, ServerSpec};
use crate::error::{Error, Result};
use crate::runtime::{ContainerEvent, ContainerRuntime, EventStream, LogStream, MANAGED_LABELS};
use async_process::{Command, Stdio};
use async_trait::async_trait;
use futures::StreamExt;
use futures_lite::io::{AsyncBufReadExt, BufReader};
use serde::Deserialize;
use std::collections::HashMap;

/// Shape of `docker events --format '{{json .}}'` lines we care about.
#[derive(Debug, Deserialize)]
struct DockerEventMessage {
    #[serde(rename = "Action", default)]
    action: String,
    #[serde(rename = "Actor", default)]
    actor: DockerActor,
}

#[derive(Debug, Default, Deserialize)]
struct DockerActor {
    #[serde(rename = "Attributes", default)]
    attributes: HashMap<String, String>,
}

/// Parses one line of `docker events` JSON output.
pub(crate) fn parse_event_line(line: &str) -> Result<ContainerEvent> {
    let msg: DockerEventMessage = serde_json::from_str(line)
        .map_err(|e| Error::Runtime(format!("Malformed docker event: {}", e)))?;
    Ok(ContainerEvent {
        action: msg.action,
        attributes: msg.actor.attributes,
    })
}

/// [`ContainerRuntime`] backed by the `docker` command line client.
#[derive(Debug, Clone)]
pub struct DockerCli {
    binary: String,
    settings: DockerSettings,
}

impl DockerCli {
    pub fn new(settings: DockerSettings) -> Self {
        Self {
            binary: "docker".to_string(),
            settings,
        }
    }

    /// Uses a different client binary, e.g. `podman`.
    pub fn with_binary(mut self, binary: impl Into<String>) -> Self {
        self.binary = binary.into();
        self
    }

    pub fn container_name(&self, server: &ServerSpec) -> String {
        format!("{}{}", self.settings.name_prefix, server.name)
    }
}

#[async_trait]
impl ContainerRuntime for DockerCli {
    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn restart(&self, server: &ServerSpec) -> Result<()> {
        let name = self.container_name(server);
        let timeout = self.settings.stop_timeout.as_secs().to_string();
        tracing::info!(container = %name, "Restarting container");

        let output = Command::new(&self.binary)
            .args(["restart", "-t", &timeout, &name])
            .stdin(Stdio::null())
            .output()
            .await
            .map_err(|e| Error::Runtime(format!("Failed to run {}: {}", self.binary, e)))?;

        if !output.status.success() {
            return Err(Error::Runtime(format!(
                "restart of {} failed: {}",
                name,
                String::from_utf8_lossy(&output.stderr).trim()
            )));
        }
        Ok(())
    }

    async fn events(&self) -> Result<EventStream> {
        let mut args = vec!["events".to_string()];
        for (key, value) in MANAGED_LABELS {
            args.push("--filter".to_string());
            args.push(format!("label={}={}", key, value));
        }
        args.push("--format".to_string());
        args.push("{{json .}}".to_string());

        let mut child = Command::new(&self.binary)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Runtime(format!("Failed to subscribe to events: {}", e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Runtime("events process has no stdout".to_string()))?;

        let stream = async_stream::stream! {
            // The child is killed when the stream is dropped.
            let _child = child;
            let mut lines = BufReader::new(stdout).lines();
            while let Some(line) = lines.next().await {
                match line {
                    Ok(line) if line.trim().is_empty() => continue,
                    Ok(line) => match parse_event_line(&line) {
                        Ok(event) => yield Ok(event),
                        // Stray client output is not a broken subscription.
                        Err(e) => tracing::warn!(%line, error = %e, "Skipping unreadable docker event"),
                    },
                    Err(e) => {
                        yield Err(Error::Runtime(format!("event stream read failed: {}", e)));
                        return;
                    }
                }
            }
            yield Err(Error::Runtime("event stream closed".to_string()));
        };
        Ok(stream.boxed())
    }

    async fn follow_logs(&self, server: &ServerSpec) -> Result<LogStream> {
        let name = self.container_name(server);
        let mut child = Command::new(&self.binary)
            .args(["logs", "--follow", "--tail", "5", &name])
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Runtime(format!("Failed to follow logs of {}: {}", name, e)))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| Error::Runtime("logs process has no stdout".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| Error::Runtime("logs process has no stderr".to_string()))?;

        let merged = futures::stream::select(
            BufReader::new(stdout).lines(),
            BufReader::new(stderr).lines(),
        );
        let stream = async_stream::stream! {
            let _child = child;
            futures::pin_mut!(merged);
            while let Some(line) = merged.next().await {
                yield line.map_err(Error::from);
            }
        };
        Ok(stream.boxed())
    }
}
