//! Row types for the relational store, modeled after the teacher's
//! `FromRow` conventions (plain structs, explicit `COLUMNS` const where a
//! query needs to cast or exclude a column).

use chrono::{DateTime, Utc};
use serde_json::Value;
use uuid::Uuid;

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct TeamRow {
    pub id: i64,
    pub name: String,
    pub ingested_event_names: Vec<String>,
    pub event_properties: Vec<String>,
    pub event_properties_numerical: Vec<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersonRow {
    pub id: i64,
    pub team_id: i64,
    pub uuid: Uuid,
    pub properties: Value,
    pub is_identified: bool,
    pub created_at: DateTime<Utc>,
}

impl PersonRow {
    pub const COLUMNS: &'static str =
        "id, team_id, uuid, properties, is_identified, created_at";
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PersonDistinctIdRow {
    pub id: i64,
    pub team_id: i64,
    pub distinct_id: String,
    pub person_id: i64,
}

/// A person's membership in a cohort. Repointed (never duplicated) when
/// its person is merged away during an alias.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CohortPeopleRow {
    pub cohort_id: i64,
    pub team_id: i64,
    pub person_id: i64,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PluginRow {
    pub id: i64,
    pub name: String,
    pub url: Option<String>,
    pub source_bundle_hash: String,
    pub is_global: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Declarative summary of the compiled VM's exports — `{ methods,
    /// tasks, jobs }` — persisted so a fresh process doesn't need to
    /// recompile a plugin just to know its capabilities.
    pub capabilities: Value,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PluginConfigRow {
    pub id: i64,
    pub team_id: i64,
    pub plugin_id: i64,
    pub enabled: bool,
    pub order: i32,
    pub config: Value,
    pub attachments: Value,
    pub error: Option<Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PluginConfigRow {
    pub const COLUMNS: &'static str =
        "id, team_id, plugin_id, enabled, \"order\", config, attachments, error, created_at, updated_at";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, sqlx::Type)]
#[sqlx(type_name = "text", rename_all = "UPPERCASE")]
pub enum PluginLogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PluginLogEntryRow {
    pub id: Uuid,
    pub team_id: i64,
    pub plugin_config_id: i64,
    pub instance_id: Uuid,
    pub timestamp: DateTime<Utc>,
    pub level: PluginLogLevel,
    pub message: String,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionRow {
    pub id: i64,
    pub team_id: i64,
    pub name: String,
    pub deleted: bool,
    pub post_to_slack: bool,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ActionStepRow {
    pub id: i64,
    pub action_id: i64,
    pub event: Option<String>,
    pub url: Option<String>,
    pub url_matching: Option<String>,
    pub selector: Option<String>,
    pub properties: Option<Value>,
}

#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ElementGroupRow {
    pub id: i64,
    pub team_id: i64,
    pub hash: String,
}
