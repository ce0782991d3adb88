//! Per (server, check) failure accounting.

use crate::config::{CheckSpec, Limit, ServerSpec};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};

/// Outcome of one probe run.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub server: Arc<ServerSpec>,
    pub check: Arc<CheckSpec>,
    pub passed: bool,
}

impl ProbeResult {
    pub fn new(server: Arc<ServerSpec>, check: Arc<CheckSpec>, passed: bool) -> Self {
        Self {
            server,
            check,
            passed,
        }
    }

    fn key(&self) -> FailureKey {
        (self.server.name.clone(), self.check.name.clone())
    }
}

/// Running failure state of one (server, check) pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FailureCounter {
    pub count: u64,
    pub first_failure: Instant,
    pub last_failure: Instant,
}

impl FailureCounter {
    fn fresh(now: Instant) -> Self {
        Self {
            count: 0,
            first_failure: now,
            last_failure: now,
        }
    }

    /// Time between the first and the latest failure of the window.
    pub fn window(&self) -> Duration {
        self.last_failure.saturating_duration_since(self.first_failure)
    }

    fn crosses(&self, limit: &Limit) -> bool {
        (limit.count > 0 && self.count >= limit.count)
            || (!limit.after.is_zero() && self.window() >= limit.after)
    }
}

/// What the registry decided for one probe result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    /// The probe passed; any failure window was discarded.
    Passed { had_failures: bool },
    /// Failure recorded, limit not crossed yet.
    Counting { count: u64, window: Duration },
    /// Limit crossed; the counter was reset and actions are due.
    Triggered { count: u64, window: Duration },
}

type FailureKey = (String, String);

/// Lock-guarded map of failure counters.
///
/// Every update of a key happens under one lock acquisition, so
/// increments, resets and threshold checks never interleave.
#[derive(Debug, Default)]
pub struct FailureRegistry {
    counters: Mutex<HashMap<FailureKey, FailureCounter>>,
}

impl FailureRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<FailureKey, FailureCounter>> {
        self.counters.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    pub fn record(&self, result: &ProbeResult) -> Verdict {
        self.record_at(result, Instant::now())
    }

    /// Records `result` as observed at `now`.
    pub fn record_at(&self, result: &ProbeResult, now: Instant) -> Verdict {
        let key = result.key();
        let mut counters = self.lock();

        if result.passed {
            let had_failures = counters.remove(&key).is_some_and(|c| c.count > 0);
            return Verdict::Passed { had_failures };
        }

        let counter = counters
            .entry(key)
            .or_insert_with(|| FailureCounter::fresh(now));
        if counter.count == 0 {
            counter.first_failure = now;
        }
        counter.count += 1;
        counter.last_failure = now;

        let count = counter.count;
        let window = counter.window();
        if counter.crosses(&result.check.limit) {
            *counter = FailureCounter::fresh(now);
            Verdict::Triggered { count, window }
        } else {
            Verdict::Counting { count, window }
        }
    }

    pub fn get(&self, server: &str, check: &str) -> Option<FailureCounter> {
        self.lock()
            .get(&(server.to_string(), check.to_string()))
            .copied()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn result(limit: Limit, passed: bool) -> ProbeResult {
        let server: ServerSpec = serde_yaml::from_str("name: alpha").unwrap();
        let check = CheckSpec {
            name: "rcon".to_string(),
            opts: Default::default(),
            limit,
        };
        ProbeResult::new(Arc::new(server), Arc::new(check), passed)
    }

    #[test]
    fn zero_limits_never_fire() {
        let registry = FailureRegistry::new();
        let failing = result(Limit::default(), false);
        for _ in 0..100 {
            assert!(matches!(registry.record(&failing), Verdict::Counting { .. }));
        }
        assert_eq!(registry.get("alpha", "rcon").unwrap().count, 100);
    }

    #[test]
    fn reset_after_trigger_keeps_entry_at_zero() {
        let registry = FailureRegistry::new();
        let failing = result(
            Limit {
                count: 1,
                ..Default::default()
            },
            false,
        );
        assert!(matches!(registry.record(&failing), Verdict::Triggered { count: 1, .. }));
        assert_eq!(registry.get("alpha", "rcon").unwrap().count, 0);
    }

    #[test]
    fn pass_removes_counter() {
        let registry = FailureRegistry::new();
        let limit = Limit {
            count: 5,
            ..Default::default()
        };
        registry.record(&result(limit.clone(), false));
        assert_eq!(
            registry.record(&result(limit, true)),
            Verdict::Passed { had_failures: true }
        );
        assert!(registry.is_empty());
    }
}
