use crate::checks::Probe;
use crate::config::{CheckSpec, ServerSpec};
use crate::rcon::RconClient;
use async_trait::async_trait;

/// RCON round trip: authenticate, run a harmless command, expect an answer.
///
/// Options: `password` (defaults to the server's RCON password) and
/// `command` (defaults to `hostname`).
#[derive(Debug, Clone, Default)]
pub struct RconProbe;

#[async_trait]
impl Probe for RconProbe {
    async fn probe(&self, server: &ServerSpec, check: &CheckSpec) -> bool {
        let password = check
            .opts
            .get("password")
            .map(String::as_str)
            .unwrap_or(&server.rcon.password);
        let command = check
            .opts
            .get("command")
            .map(String::as_str)
            .unwrap_or("hostname");
        let addr = (server.address.as_str(), server.port);

        let result = async {
            let mut client = RconClient::connect(addr, password).await?;
            client.exec(command).await
        }
        .await;

        match result {
            Ok(output) => {
                tracing::trace!(server = %server.name, output = %output.trim(), "rcon probe answered");
                true
            }
            Err(e) => {
                tracing::debug!(server = %server.name, error = %e, "rcon probe failed");
                false
            }
        }
    }
}
