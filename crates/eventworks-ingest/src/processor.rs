//! Event Processor: timestamp resolution, identity dispatch, team-cache
//! side effects, the plugin pipeline, and the final publish to the
//! clickhouse/session-recording topics.

use crate::identify;
use crate::timestamp::resolve_timestamp;
use dashmap::DashMap;
use eventworks_broker::envelope::{ClickhouseEvent, IngestionEnvelope, SessionRecordingEvent};
use eventworks_broker::producer::KafkaProducer;
use eventworks_core::error::{Error, Result};
use eventworks_core::ids::TeamId;
use eventworks_core::team::Team;
use eventworks_database::persons::PersonRepository;
use eventworks_database::teams::TeamRepository;
use eventworks_plugins::manager::{PipelineOutcome, PluginLifecycleManager};
use serde_json::Value;
use std::sync::Arc;
use tokio::sync::Mutex;

const EVENT_SNAPSHOT: &str = "$snapshot";

pub struct EventProcessor {
    persons: Arc<PersonRepository>,
    teams: Arc<TeamRepository>,
    plugins: Arc<PluginLifecycleManager>,
    producer: Arc<KafkaProducer>,
    team_cache: DashMap<i64, Arc<Mutex<Team>>>,
}

impl EventProcessor {
    pub fn new(
        persons: Arc<PersonRepository>,
        teams: Arc<TeamRepository>,
        plugins: Arc<PluginLifecycleManager>,
        producer: Arc<KafkaProducer>,
    ) -> Self {
        Self {
            persons,
            teams,
            plugins,
            producer,
            team_cache: DashMap::new(),
        }
    }

    /// Processes one ingested event end to end. Returns once the event has
    /// either been published downstream or intentionally dropped.
    pub async fn process(&self, envelope: IngestionEnvelope) -> Result<()> {
        let resolved_at = self.prepare(&envelope).await?;

        if envelope.event == EVENT_SNAPSHOT {
            return self.publish_snapshot(&envelope, resolved_at).await;
        }

        let outcome = self
            .plugins
            .run_process_event(TeamId(envelope.team_id), envelope.properties.clone())
            .await?;

        let final_properties = match outcome {
            PipelineOutcome::Dropped => return Ok(()),
            PipelineOutcome::Passed(properties) => properties,
        };

        self.publish_event(&envelope, final_properties, resolved_at).await
    }

    /// Resolves the timestamp, ensures a person exists for the envelope's
    /// distinct id, and applies identity and team-cache side effects —
    /// everything that happens before an event enters the plugin pipeline,
    /// shared by [`process`] and [`process_batch`].
    async fn prepare(&self, envelope: &IngestionEnvelope) -> Result<chrono::DateTime<chrono::Utc>> {
        if envelope.event.is_empty() {
            return Err(Error::InvalidEvent {
                reason: "event name is empty".to_string(),
            });
        }

        let resolved_at = resolve_timestamp(
            envelope.received_at,
            envelope.timestamp.as_deref(),
            envelope.sent_at,
            envelope.offset_ms,
        );

        self.persons
            .ensure_person(envelope.team_id, &envelope.distinct_id)
            .await?;

        identify::handle(
            &self.persons,
            envelope.team_id,
            &envelope.event,
            &envelope.distinct_id,
            &envelope.properties,
        )
        .await?;

        self.observe_team_cache(TeamId(envelope.team_id), &envelope.event, &envelope.properties)
            .await?;

        Ok(resolved_at)
    }

    /// Processes a batch of envelopes end to end. Identity, timestamp, and
    /// team-cache side effects run per envelope exactly as in [`process`];
    /// the plugin pipeline runs once per team, so a plugin exposing
    /// `process_event_batch` sees the whole team's active batch in one call.
    pub async fn process_batch(&self, envelopes: Vec<IngestionEnvelope>) -> Result<u64> {
        let mut prepared = Vec::with_capacity(envelopes.len());
        let mut published: u64 = 0;

        for envelope in envelopes {
            let resolved_at = self.prepare(&envelope).await?;

            if envelope.event == EVENT_SNAPSHOT {
                self.publish_snapshot(&envelope, resolved_at).await?;
                published += 1;
                continue;
            }

            prepared.push((envelope, resolved_at));
        }

        let mut by_team: std::collections::HashMap<i64, Vec<usize>> = std::collections::HashMap::new();
        for (index, (envelope, _)) in prepared.iter().enumerate() {
            by_team.entry(envelope.team_id).or_default().push(index);
        }

        let mut survivors: Vec<Option<Value>> = (0..prepared.len()).map(|_| None).collect();
        for (team_id, indices) in by_team {
            let batch: Vec<Value> = indices.iter().map(|&i| prepared[i].0.properties.clone()).collect();
            let outcomes = self
                .plugins
                .run_process_event_batch(TeamId(team_id), batch)
                .await?;
            for (index, outcome) in indices.into_iter().zip(outcomes) {
                if let PipelineOutcome::Passed(properties) = outcome {
                    survivors[index] = Some(properties);
                }
            }
        }

        for (index, properties) in survivors.into_iter().enumerate() {
            let Some(properties) = properties else { continue };
            let (envelope, resolved_at) = &prepared[index];
            self.publish_event(envelope, properties, *resolved_at).await?;
            published += 1;
        }

        Ok(published)
    }

    async fn observe_team_cache(&self, team_id: TeamId, event: &str, properties: &Value) -> Result<()> {
        let team = self.team_for(team_id).await?;
        let (property_names, numerical_names) = partition_properties(properties);

        let changed = {
            let mut team = team.lock().await;
            team.observe(event, property_names, numerical_names)
        };

        if changed {
            let snapshot = team.lock().await.clone();
            self.teams.save_caches(&snapshot).await?;
        }
        Ok(())
    }

    async fn team_for(&self, team_id: TeamId) -> Result<Arc<Mutex<Team>>> {
        if let Some(existing) = self.team_cache.get(&team_id.0) {
            return Ok(existing.clone());
        }

        let team = self
            .teams
            .find(team_id)
            .await?
            .ok_or_else(|| Error::not_found("team", team_id.0.to_string()))?;

        let cached = Arc::new(Mutex::new(team));
        self.team_cache.insert(team_id.0, cached.clone());
        Ok(cached)
    }

    async fn publish_snapshot(
        &self,
        envelope: &IngestionEnvelope,
        resolved_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let session_id = envelope
            .properties
            .get("$session_id")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        let event = SessionRecordingEvent {
            uuid: envelope.uuid,
            team_id: envelope.team_id,
            session_id,
            distinct_id: envelope.distinct_id.clone(),
            snapshot_data: envelope.properties.clone(),
            timestamp: resolved_at,
        };

        self.producer
            .publish_session_recording(&envelope.uuid.to_string(), &event)
            .await
    }

    async fn publish_event(
        &self,
        envelope: &IngestionEnvelope,
        properties: Value,
        resolved_at: chrono::DateTime<chrono::Utc>,
    ) -> Result<()> {
        let person_id = self
            .persons
            .find_by_distinct_id(envelope.team_id, &envelope.distinct_id)
            .await?
            .ok_or_else(|| Error::not_found("person", envelope.distinct_id.clone()))?
            .id;

        let properties_json = serde_json::to_string(&properties).map_err(|e| Error::Serialization {
            message: format!("failed to encode event properties: {e}"),
        })?;

        let event = ClickhouseEvent {
            uuid: envelope.uuid.to_string(),
            team_id: envelope.team_id,
            event: envelope.event.clone(),
            distinct_id: envelope.distinct_id.clone(),
            properties_json,
            person_id,
            timestamp: resolved_at.to_rfc3339(),
        };

        self.producer.publish_event(&envelope.uuid.to_string(), &event).await
    }
}

/// Splits an event's top-level properties into plain names and those whose
/// value is a JSON number, for the additive team caches.
fn partition_properties(properties: &Value) -> (Vec<String>, Vec<String>) {
    let Value::Object(map) = properties else {
        return (Vec::new(), Vec::new());
    };

    let mut names = Vec::with_capacity(map.len());
    let mut numerical = Vec::new();
    for (key, value) in map {
        names.push(key.clone());
        if value.is_number() {
            numerical.push(key.clone());
        }
    }
    (names, numerical)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn partition_separates_numerical_properties() {
        let properties = json!({ "url": "https://example.com", "duration_ms": 120, "referrer": "google" });
        let (names, numerical) = partition_properties(&properties);
        assert_eq!(names.len(), 3);
        assert_eq!(numerical, vec!["duration_ms".to_string()]);
    }

    #[test]
    fn partition_of_non_object_properties_is_empty() {
        let (names, numerical) = partition_properties(&json!(null));
        assert!(names.is_empty());
        assert!(numerical.is_empty());
    }
}
