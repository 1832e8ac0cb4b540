//! Internal notifications published by the plugin lifecycle manager and
//! scheduler, for components (the admin surface, `flushQueuedWrites`) that
//! want to react without being wired directly into those components.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventType(String);

impl EventType {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for EventType {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl std::fmt::Display for EventType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A notification flowing through the internal bus. `event_type` follows a
/// `component.fact` naming convention, e.g. `plugin.runtime_error`,
/// `scheduler.lock_acquired`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DomainEvent {
    pub id: Uuid,
    pub event_type: String,
    pub team_id: Option<i64>,
    pub plugin_config_id: Option<i64>,
    pub payload: serde_json::Value,
    pub occurred_at: DateTime<Utc>,
}

impl DomainEvent {
    pub fn new(event_type: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::now_v7(),
            event_type: event_type.into(),
            team_id: None,
            plugin_config_id: None,
            payload,
            occurred_at: Utc::now(),
        }
    }

    pub fn for_team(mut self, team_id: i64) -> Self {
        self.team_id = Some(team_id);
        self
    }

    pub fn for_plugin_config(mut self, plugin_config_id: i64) -> Self {
        self.plugin_config_id = Some(plugin_config_id);
        self
    }
}
