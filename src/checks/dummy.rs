use crate::checks::Probe;
use crate::config::{CheckSpec, ServerSpec};
use async_trait::async_trait;

/// Probe that always fails. Handy for exercising limits and actions.
#[derive(Debug, Clone, Copy, Default)]
pub struct DummyProbe;

#[async_trait]
impl Probe for DummyProbe {
    async fn probe(&self, server: &ServerSpec, _check: &CheckSpec) -> bool {
        tracing::debug!(server = %server.name, "dummy probe reports failure");
        false
    }
}
