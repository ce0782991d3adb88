use crate::config::RunnerConfig;
use std::sync::{Arc, RwLock};

/// Pointer to the configuration currently in effect.
///
/// Readers get an immutable snapshot; updates replace the whole
/// configuration, so nobody observes a half-applied change.
#[derive(Debug, Clone)]
pub struct ActiveConfig {
    inner: Arc<RwLock<Arc<RunnerConfig>>>,
}

impl ActiveConfig {
    pub fn new(config: RunnerConfig) -> Self {
        Self {
            inner: Arc::new(RwLock::new(Arc::new(config))),
        }
    }

    pub fn current(&self) -> Arc<RunnerConfig> {
        self.inner
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Replaces the active configuration and returns the previous one.
    pub fn swap(&self, config: RunnerConfig) -> Arc<RunnerConfig> {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, Arc::new(config))
    }

    /// Applies `change` to a copy of the active configuration and installs
    /// the result, all under the write lock.
    ///
    /// Concurrent updates see each other's changes; a field edit never
    /// reverts a reload that landed in between.
    pub fn update<F>(&self, change: F) -> Arc<RunnerConfig>
    where
        F: FnOnce(&mut RunnerConfig),
    {
        let mut guard = self
            .inner
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        let mut next = (**guard).clone();
        change(&mut next);
        let next = Arc::new(next);
        *guard = next.clone();
        next
    }

    /// Secret of the active configuration.
    pub fn password(&self) -> String {
        self.current().server.rcon.password.clone()
    }
}
