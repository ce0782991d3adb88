use crate::config::{CachetSettings, ServerSpec};
use crate::error::{Error, Result};
use crate::notify::{
    IncidentKind, IncidentNotifier, IncidentSummary, NotifyOutcome, component_id,
    recently_updated,
};
use async_trait::async_trait;
use chrono::{Local, NaiveDateTime, TimeZone};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Cachet incident and component status codes.
const INCIDENT_INVESTIGATING: u8 = 1;
const INCIDENT_FIXED: u8 = 4;
const COMPONENT_OPERATIONAL: u8 = 1;
const COMPONENT_MAJOR_OUTAGE: u8 = 4;

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct Component {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Incident {
    name: String,
    #[serde(default)]
    updated_at: Option<String>,
}

#[derive(Debug, Serialize)]
struct NewIncident<'a> {
    name: &'a str,
    message: &'a str,
    status: u8,
    visible: u8,
    component_id: u64,
    component_status: u8,
    notify: bool,
}

/// [`IncidentNotifier`] for the Cachet status page API (v1).
#[derive(Debug, Clone)]
pub struct CachetNotifier {
    http: reqwest::Client,
    base: String,
    token: String,
    cooldown: Duration,
}

impl CachetNotifier {
    pub fn new(settings: &CachetSettings) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .build()
            .map_err(|e| Error::Notify(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base: settings.url.trim_end_matches('/').to_string(),
            token: settings.token.clone(),
            cooldown: settings.cooldown,
        })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/v1/{}", self.base, path)
    }

    async fn get<T: for<'de> Deserialize<'de>>(&self, path: &str) -> Result<T> {
        let resp = self
            .http
            .get(self.endpoint(path))
            .header("X-Cachet-Token", &self.token)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("GET {} failed: {}", path, e)))?;
        if !resp.status().is_success() {
            return Err(Error::Notify(format!("GET {} answered {}", path, resp.status())));
        }
        let envelope: Envelope<T> = resp
            .json()
            .await
            .map_err(|e| Error::Notify(format!("GET {} returned bad JSON: {}", path, e)))?;
        Ok(envelope.data)
    }

    async fn incidents(&self, component: u64) -> Result<Vec<IncidentSummary>> {
        let raw: Vec<Incident> = self
            .get(&format!(
                "incidents?component_id={}&sort=id&order=desc",
                component
            ))
            .await?;
        Ok(raw
            .into_iter()
            .filter_map(|i| {
                let updated = i.updated_at.as_deref().and_then(parse_timestamp)?;
                Some(IncidentSummary {
                    name: i.name,
                    updated_at: updated,
                })
            })
            .collect())
    }
}

fn parse_timestamp(raw: &str) -> Option<chrono::DateTime<Local>> {
    let naive = NaiveDateTime::parse_from_str(raw, TIMESTAMP_FORMAT).ok()?;
    Local.from_local_datetime(&naive).earliest()
}

#[async_trait]
impl IncidentNotifier for CachetNotifier {
    #[tracing::instrument(skip(self, server), fields(server = %server.name))]
    async fn notify(&self, server: &ServerSpec, kind: IncidentKind) -> Result<NotifyOutcome> {
        let component_id = component_id(server)?;
        let component: Component = self.get(&format!("components/{}", component_id)).await?;
        let title = kind.title(&component.name);

        let incidents = self.incidents(component_id).await?;
        if recently_updated(&incidents, &title, Local::now(), self.cooldown) {
            tracing::info!(incident = %title, "Matching incident is recent, not creating another");
            return Ok(NotifyOutcome::Suppressed);
        }

        let (status, component_status) = match kind {
            IncidentKind::Restarted => (INCIDENT_INVESTIGATING, COMPONENT_MAJOR_OUTAGE),
            IncidentKind::Recovered => (INCIDENT_FIXED, COMPONENT_OPERATIONAL),
        };
        let message = format!("{}.", title);
        let body = NewIncident {
            name: &title,
            message: &message,
            status,
            visible: 1,
            component_id,
            component_status,
            notify: false,
        };

        let resp = self
            .http
            .post(self.endpoint("incidents"))
            .header("X-Cachet-Token", &self.token)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Notify(format!("creating incident failed: {}", e)))?;
        if !resp.status().is_success() {
            return Err(Error::Notify(format!(
                "creating incident answered {}",
                resp.status()
            )));
        }

        tracing::info!(incident = %title, "Created incident");
        Ok(NotifyOutcome::Created)
    }
}
