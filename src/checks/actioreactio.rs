use crate::channel::CommandSender;
use crate::checks::Probe;
use crate::config::{CheckSpec, ServerSpec};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::Arc;
use std::time::Duration;

/// Console command the server does not know and answers with an error line.
pub const CHECK_COMMAND: &str = "srcds_controller_check";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Action/reaction probe.
///
/// Follows the server log, sends [`CHECK_COMMAND`] through the runner's
/// command channel and passes once the console echoes
/// `Unknown command "srcds_controller_check"`. This proves the console loop
/// of the game server is alive, not only its network port.
pub struct ConsoleEchoProbe {
    runtime: Arc<dyn ContainerRuntime>,
    commander: Arc<dyn CommandSender>,
}

impl ConsoleEchoProbe {
    pub fn new(runtime: Arc<dyn ContainerRuntime>, commander: Arc<dyn CommandSender>) -> Self {
        Self { runtime, commander }
    }

    fn expected_line() -> String {
        format!("Unknown command \"{}\"", CHECK_COMMAND)
    }
}

#[async_trait]
impl Probe for ConsoleEchoProbe {
    async fn probe(&self, server: &ServerSpec, check: &CheckSpec) -> bool {
        let timeout = check.timeout(DEFAULT_TIMEOUT);
        let expected = Self::expected_line();

        let exchange = async {
            // Subscribe first so the echo cannot slip past us.
            let mut logs = match self.runtime.follow_logs(server).await {
                Ok(logs) => logs,
                Err(e) => {
                    tracing::debug!(server = %server.name, error = %e, "cannot follow server log");
                    return false;
                }
            };
            if let Err(e) = self.commander.send_command(server, CHECK_COMMAND).await {
                tracing::debug!(server = %server.name, error = %e, "check command not delivered");
                return false;
            }
            while let Some(line) = logs.next().await {
                match line {
                    Ok(line) if line.contains(&expected) => return true,
                    Ok(_) => continue,
                    Err(e) => {
                        tracing::debug!(server = %server.name, error = %e, "server log broke");
                        return false;
                    }
                }
            }
            false
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(passed) => passed,
            Err(_) => {
                tracing::debug!(server = %server.name, ?timeout, "no console echo in time");
                false
            }
        }
    }
}
