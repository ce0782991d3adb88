//! Incident notifications for restarts and recoveries.
//!
//! [`IncidentNotifier`] is the seam the checker uses; [`CachetNotifier`]
//! posts incidents to a Cachet status page. Both the restart and the
//! recovery notification are deduplicated: if an incident with the same
//! title was updated within the cool-down window, no new one is created.

mod cachet;

pub use cachet::CachetNotifier;

use crate::config::ServerSpec;
use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, Local};
use std::time::Duration;

/// Action option holding the status page component of a server.
pub const COMPONENT_ID_OPT: &str = "cachetComponentID";

/// What happened to the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IncidentKind {
    /// The checker restarted the server.
    Restarted,
    /// The server came back up.
    Recovered,
}

impl IncidentKind {
    /// Incident title for a component.
    pub fn title(&self, component: &str) -> String {
        match self {
            IncidentKind::Restarted => format!("{} was restarted!", component),
            IncidentKind::Recovered => format!("{} should be available again", component),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotifyOutcome {
    Created,
    /// A matching incident was updated within the cool-down window.
    Suppressed,
}

#[async_trait]
pub trait IncidentNotifier: Send + Sync {
    async fn notify(&self, server: &ServerSpec, kind: IncidentKind) -> Result<NotifyOutcome>;
}

/// An existing incident as far as deduplication cares.
#[derive(Debug, Clone)]
pub struct IncidentSummary {
    pub name: String,
    pub updated_at: DateTime<Local>,
}

/// True if an incident titled `title` was updated less than `cooldown` ago.
pub fn recently_updated(
    incidents: &[IncidentSummary],
    title: &str,
    now: DateTime<Local>,
    cooldown: Duration,
) -> bool {
    incidents
        .iter()
        .filter(|i| i.name.starts_with(title))
        .any(|i| match (now - i.updated_at).to_std() {
            Ok(age) => age < cooldown,
            // Updated "in the future": clock skew, treat as fresh.
            Err(_) => true,
        })
}

/// Status page component of a server, taken from its checks' action options.
pub fn component_id(server: &ServerSpec) -> Result<u64> {
    let raw = server.action_opt(COMPONENT_ID_OPT).ok_or_else(|| {
        Error::ConfigInvalid(format!("server '{}' has no {}", server.name, COMPONENT_ID_OPT))
    })?;
    match raw.trim().parse::<u64>() {
        Ok(id) if id > 0 => Ok(id),
        _ => Err(Error::ConfigInvalid(format!(
            "server '{}' has an invalid {}: {:?}",
            server.name, COMPONENT_ID_OPT, raw
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeDelta;

    fn incident(name: &str, age_minutes: i64, now: DateTime<Local>) -> IncidentSummary {
        IncidentSummary {
            name: name.to_string(),
            updated_at: now - TimeDelta::minutes(age_minutes),
        }
    }

    #[test]
    fn suppresses_within_cooldown() {
        let now = Local::now();
        let title = IncidentKind::Restarted.title("Alpha");
        let cooldown = Duration::from_secs(60 * 60);

        let fresh = vec![incident("Alpha was restarted!", 10, now)];
        assert!(recently_updated(&fresh, &title, now, cooldown));

        let stale = vec![incident("Alpha was restarted!", 61, now)];
        assert!(!recently_updated(&stale, &title, now, cooldown));

        let other = vec![incident("Alpha should be available again", 1, now)];
        assert!(!recently_updated(&other, &title, now, cooldown));
    }

    #[test]
    fn component_id_must_be_positive() {
        let server: ServerSpec = serde_yaml::from_str(
            r#"
name: alpha
checks:
  - name: rcon
    limit: { count: 1, actions: [notify], actionOpts: { cachetComponentID: "0" } }
"#,
        )
        .unwrap();
        assert!(component_id(&server).is_err());

        let server: ServerSpec = serde_yaml::from_str(
            r#"
name: alpha
checks:
  - name: rcon
    limit: { count: 1, actions: [notify], actionOpts: { cachetComponentID: "7" } }
"#,
        )
        .unwrap();
        assert_eq!(component_id(&server).unwrap(), 7);
    }
}
