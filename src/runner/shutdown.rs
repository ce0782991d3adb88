use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio_util::sync::CancellationToken;

/// Fires the runner's shutdown sequence exactly once.
///
/// Both an OS signal and the process exiting on its own may trigger it,
/// possibly at the same time; only the first caller wins.
#[derive(Debug, Clone, Default)]
pub struct ShutdownSignal {
    fired: Arc<AtomicBool>,
    token: CancellationToken,
}

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    /// Triggers shutdown. Returns `false` if it was already triggered.
    pub fn trigger(&self, reason: &str) -> bool {
        if self
            .fired
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            tracing::debug!(%reason, "Shutdown already in progress");
            return false;
        }
        tracing::info!(%reason, "Shutting down");
        self.token.cancel();
        true
    }

    pub fn is_triggered(&self) -> bool {
        self.fired.load(Ordering::Acquire)
    }

    /// Completes once shutdown was triggered.
    pub async fn triggered(&self) {
        self.token.cancelled().await
    }
}
