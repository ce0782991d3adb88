//! Perpetual probe-then-wait workers, one per (server, check) pair.

use crate::checker::failure::ProbeResult;
use crate::checks::Probe;
use crate::config::{CheckSpec, ServerSpec, Splay};
use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Random jitter in `[start, end)` seconds; zero for an empty range.
pub fn splay_duration(splay: Splay) -> Duration {
    if splay.end <= splay.start {
        return Duration::from_secs(splay.start);
    }
    let low = splay.start.saturating_mul(1000);
    let high = splay.end.saturating_mul(1000);
    if high <= low {
        return Duration::from_millis(low);
    }
    Duration::from_millis(rand::thread_rng().gen_range(low..high))
}

/// Timing parameters shared by all workers.
#[derive(Debug, Clone, Copy)]
pub struct Timing {
    pub interval: Duration,
    pub splay: Splay,
    /// Probe timeout when the check sets none.
    pub probe_timeout: Duration,
}

/// One check of one server, probed until cancelled.
pub struct CheckWorker {
    pub probe: Arc<dyn Probe>,
    pub server: Arc<ServerSpec>,
    pub check: Arc<CheckSpec>,
    pub timing: Timing,
}

impl CheckWorker {
    /// Runs one bounded probe. An elapsed timeout counts as a failure.
    pub async fn probe_once(&self) -> bool {
        let timeout = self.check.timeout(self.timing.probe_timeout);
        match tokio::time::timeout(timeout, self.probe.probe(&self.server, &self.check)).await {
            Ok(passed) => passed,
            Err(_) => {
                tracing::debug!(
                    server = %self.server.name,
                    check = %self.check.name,
                    ?timeout,
                    "Probe timed out"
                );
                false
            }
        }
    }

    #[tracing::instrument(skip_all, fields(server = %self.server.name, check = %self.check.name))]
    pub async fn run(self, results: mpsc::Sender<ProbeResult>, cancel: CancellationToken) {
        loop {
            let passed = tokio::select! {
                _ = cancel.cancelled() => break,
                passed = self.probe_once() => passed,
            };

            let result = ProbeResult::new(self.server.clone(), self.check.clone(), passed);
            if results.send(result).await.is_err() {
                tracing::debug!("Result queue closed");
                break;
            }

            let wait = self.timing.interval.saturating_add(splay_duration(self.timing.splay));
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = tokio::time::sleep(wait) => {}
            }
        }
        tracing::debug!("Check worker stopped");
    }
}
