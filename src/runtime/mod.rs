//! Container runtime abstraction.
//!
//! The checker never talks to the container engine directly; it goes
//! through [`ContainerRuntime`], which restarts servers, streams lifecycle
//! events, and follows server logs. [`DockerCli`] is the production adapter.

mod docker;

pub use docker::DockerCli;

use crate::config::ServerSpec;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Labels every managed game-server container carries.
pub const MANAGED_LABELS: [(&str, &str); 2] =
    [("app", "gameserver"), ("managed-by", "srcds_controller")];

/// A container lifecycle event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerEvent {
    /// Runtime action, e.g. `die` or `start`.
    pub action: String,
    /// Actor attributes; `name` holds the container name.
    #[serde(default)]
    pub attributes: HashMap<String, String>,
}

impl ContainerEvent {
    pub fn new(action: impl Into<String>, name: impl Into<String>) -> Self {
        let mut attributes = HashMap::new();
        attributes.insert("name".to_string(), name.into());
        Self {
            action: action.into(),
            attributes,
        }
    }

    pub fn container_name(&self) -> Option<&str> {
        self.attributes.get("name").map(String::as_str)
    }
}

pub type EventStream = BoxStream<'static, Result<ContainerEvent>>;
pub type LogStream = BoxStream<'static, Result<String>>;

/// Lifecycle controller and event source for managed servers.
#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    /// Restarts the server's container.
    async fn restart(&self, server: &ServerSpec) -> Result<()>;

    /// Subscribes to lifecycle events of managed containers.
    ///
    /// Lines that cannot be decoded are skipped. The stream yields an error
    /// and ends only when the subscription itself breaks.
    async fn events(&self) -> Result<EventStream>;

    /// Follows the server's output, starting with the last few lines.
    async fn follow_logs(&self, server: &ServerSpec) -> Result<LogStream>;
}
