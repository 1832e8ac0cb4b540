//! Kafka producer publishing finished events to the downstream topics:
//! length-prefixed binary frames for `clickhouse_events_json`, plain JSON
//! for `clickhouse_session_recording_events`.

use crate::envelope::{ClickhouseEvent, SessionRecordingEvent};
use bytes::BufMut;
use eventworks_core::config::{ClickhouseConfig, KafkaConfig};
use eventworks_core::error::{Error, Result};
use eventworks_core::health::{ComponentHealth, HealthCheck};
use prost::Message;
use rdkafka::config::ClientConfig;
use rdkafka::producer::{FutureProducer, FutureRecord, Producer};
use std::time::Duration;

pub struct KafkaProducer {
    inner: FutureProducer,
    events_topic: String,
    session_recording_topic: String,
}

impl KafkaProducer {
    pub fn new(kafka: &KafkaConfig, clickhouse: &ClickhouseConfig) -> Result<Self> {
        let inner: FutureProducer = ClientConfig::new()
            .set("bootstrap.servers", kafka.hosts.join(","))
            .set("message.timeout.ms", "30000")
            .create()
            .map_err(|e| Error::broker_with_source("failed to create kafka producer", e))?;

        Ok(Self {
            inner,
            events_topic: clickhouse.events_topic.clone(),
            session_recording_topic: clickhouse.session_recording_topic.clone(),
        })
    }

    /// Publishes a finished event as a length-prefixed Protobuf frame.
    pub async fn publish_event(&self, key: &str, event: &ClickhouseEvent) -> Result<()> {
        let mut buf = Vec::with_capacity(event.encoded_len() + 4);
        buf.put_u32(event.encoded_len() as u32);
        event
            .encode(&mut buf)
            .map_err(|e| Error::Serialization {
                message: format!("failed to encode clickhouse event: {e}"),
            })?;

        let record = FutureRecord::to(&self.events_topic).key(key).payload(&buf);
        self.inner
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| Error::broker_with_source("failed to publish clickhouse event", e))?;
        Ok(())
    }

    /// Publishes a `$snapshot` session-recording event as JSON.
    pub async fn publish_session_recording(
        &self,
        key: &str,
        event: &SessionRecordingEvent,
    ) -> Result<()> {
        let payload = serde_json::to_vec(event).map_err(|e| Error::Serialization {
            message: format!("failed to encode session recording event: {e}"),
        })?;

        let record = FutureRecord::to(&self.session_recording_topic)
            .key(key)
            .payload(&payload);
        self.inner
            .send(record, Duration::from_secs(10))
            .await
            .map_err(|(e, _)| {
                Error::broker_with_source("failed to publish session recording event", e)
            })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl HealthCheck for KafkaProducer {
    fn name(&self) -> &str {
        "kafka"
    }

    async fn check(&self) -> ComponentHealth {
        let client = self.inner.client().clone();
        let events_topic = self.events_topic.clone();
        let result = tokio::task::spawn_blocking(move || {
            client.fetch_metadata(Some(&events_topic), Duration::from_secs(5))
        })
        .await;

        match result {
            Ok(Ok(_)) => ComponentHealth::healthy(0),
            Ok(Err(e)) => ComponentHealth::unhealthy(format!("metadata fetch failed: {e}")),
            Err(e) => ComponentHealth::unhealthy(format!("health check task panicked: {e}")),
        }
    }
}
