//! Wire formats for the topics this system reads from and writes to.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// The ingestion-handoff envelope read from the ingress topic. Matches the
/// shape the capture tier hands off: a raw, not-yet-processed event plus
/// enough context (team, distinct id, arrival time) for the event
/// processor to resolve identity and timestamps.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionEnvelope {
    pub uuid: Uuid,
    pub team_id: i64,
    pub distinct_id: String,
    pub event: String,
    pub properties: Value,
    /// Verbatim client-supplied timestamp, if any (see timestamp precedence rules).
    pub timestamp: Option<String>,
    /// Client-reported send time, used for clock-skew correction.
    pub sent_at: Option<DateTime<Utc>>,
    /// Client-reported offset in milliseconds before `received_at`, used
    /// when no absolute timestamp is available.
    pub offset_ms: Option<i64>,
    /// Broker-assigned arrival time ("now" in the timestamp precedence rules).
    pub received_at: DateTime<Utc>,
}

/// The length-prefixed binary record written to `clickhouse_events_json`.
/// JSON despite the topic name historically; this system writes the typed,
/// length-prefixed form and leaves JSON framing to the session-recording
/// path only, per the wire-format split.
#[derive(Clone, PartialEq, prost::Message)]
pub struct ClickhouseEvent {
    #[prost(string, tag = "1")]
    pub uuid: String,
    #[prost(int64, tag = "2")]
    pub team_id: i64,
    #[prost(string, tag = "3")]
    pub event: String,
    #[prost(string, tag = "4")]
    pub distinct_id: String,
    #[prost(string, tag = "5")]
    pub properties_json: String,
    #[prost(int64, tag = "6")]
    pub person_id: i64,
    #[prost(string, tag = "7")]
    pub timestamp: String,
}

/// Session-recording events stay JSON end to end; no binary framing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecordingEvent {
    pub uuid: Uuid,
    pub team_id: i64,
    pub session_id: String,
    pub distinct_id: String,
    pub snapshot_data: Value,
    pub timestamp: DateTime<Utc>,
}
