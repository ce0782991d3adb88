//! Liveness probes and the registry that maps check names to them.
//!
//! A check's `name` in the configuration selects a [`Probe`] registered in
//! a [`ProbeRegistry`]. New probes are added by registering them at startup;
//! the scheduler never matches on names itself.

mod actioreactio;
mod dummy;
mod rcon;

pub use actioreactio::{CHECK_COMMAND, ConsoleEchoProbe};
pub use dummy::DummyProbe;
pub use rcon::RconProbe;

use crate::channel::CommandSender;
use crate::config::{CheckSpec, ServerSpec};
use crate::runtime::ContainerRuntime;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

/// One liveness check against a server.
///
/// Probes report failure as `false`; they never error. The caller bounds the
/// call with the check's timeout and treats an elapsed timeout as a failure.
#[async_trait]
pub trait Probe: Send + Sync {
    async fn probe(&self, server: &ServerSpec, check: &CheckSpec) -> bool;
}

/// Name-keyed table of probe implementations.
#[derive(Clone, Default)]
pub struct ProbeRegistry {
    probes: HashMap<String, Arc<dyn Probe>>,
}

impl ProbeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in `rcon`, `actioreactio` and `dummy` probes.
    pub fn with_defaults(
        runtime: Arc<dyn ContainerRuntime>,
        commander: Arc<dyn CommandSender>,
    ) -> Self {
        let mut registry = Self::new();
        registry.register("rcon", Arc::new(RconProbe::default()));
        registry.register(
            "actioreactio",
            Arc::new(ConsoleEchoProbe::new(runtime, commander)),
        );
        registry.register("dummy", Arc::new(DummyProbe));
        registry
    }

    /// Registers `probe` under `name`, replacing any previous entry.
    pub fn register(&mut self, name: impl Into<String>, probe: Arc<dyn Probe>) {
        self.probes.insert(name.into(), probe);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Probe>> {
        self.probes.get(name).cloned()
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.probes.keys().map(String::as_str)
    }
}

impl std::fmt::Debug for ProbeRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut names: Vec<_> = self.names().collect();
        names.sort_unstable();
        f.debug_struct("ProbeRegistry").field("probes", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Always(bool);

    #[async_trait]
    impl Probe for Always {
        async fn probe(&self, _: &ServerSpec, _: &CheckSpec) -> bool {
            self.0
        }
    }

    #[tokio::test]
    async fn register_replaces_by_name() {
        let mut registry = ProbeRegistry::new();
        registry.register("x", Arc::new(Always(false)));
        registry.register("x", Arc::new(Always(true)));

        let server: ServerSpec = serde_yaml::from_str("name: alpha").unwrap();
        let check: CheckSpec = serde_yaml::from_str("name: x").unwrap();
        let probe = registry.get("x").unwrap();
        assert!(probe.probe(&server, &check).await);
        assert!(registry.get("missing").is_none());
    }
}
