//! Kafka consumer wrapping the ingress topic, exposing just what the queue
//! consumer component needs: pull one record, pause/resume the assignment,
//! and commit an offset once a batch has been handed to the worker pool.

use crate::envelope::IngestionEnvelope;
use chrono::Utc;
use eventworks_core::config::KafkaConfig;
use eventworks_core::error::{Error, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{Message, TopicPartitionList};

pub struct KafkaConsumer {
    inner: StreamConsumer,
}

impl KafkaConsumer {
    pub fn new(config: &KafkaConfig) -> Result<Self> {
        let mut client_config = ClientConfig::new();
        client_config
            .set("bootstrap.servers", config.hosts.join(","))
            .set("group.id", &config.consumer_group)
            .set("enable.auto.commit", "false")
            .set("enable.partition.eof", "false");

        if let (Some(cert), Some(key), Some(ca)) =
            (&config.tls_cert_b64, &config.tls_key_b64, &config.tls_ca_b64)
        {
            client_config
                .set("security.protocol", "ssl")
                .set("ssl.certificate.pem", cert)
                .set("ssl.key.pem", key)
                .set("ssl.ca.pem", ca);
        }

        let consumer: StreamConsumer = client_config
            .create()
            .map_err(|e| Error::broker_with_source("failed to create kafka consumer", e))?;

        consumer
            .subscribe(&[&config.ingestion_topic])
            .map_err(|e| Error::broker_with_source("failed to subscribe to ingestion topic", e))?;

        Ok(Self { inner: consumer })
    }

    /// Pulls and deserializes the next record. Returns the record along
    /// with its topic/partition/offset so the caller can commit later.
    pub async fn recv(&self) -> Result<(IngestionEnvelope, RecordPosition)> {
        let message = self
            .inner
            .recv()
            .await
            .map_err(|e| Error::broker_with_source("kafka recv failed", e))?;

        let payload = message
            .payload()
            .ok_or_else(|| Error::InvalidEvent {
                reason: "kafka record had no payload".to_string(),
            })?;

        let mut envelope: IngestionEnvelope = serde_json::from_slice(payload)
            .map_err(|e| Error::Serialization {
                message: format!("failed to decode ingestion envelope: {e}"),
            })?;
        envelope.received_at = Utc::now();

        let position = RecordPosition {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
        };

        Ok((envelope, position))
    }

    /// Commits `position`'s offset + 1, the point the consumer should
    /// resume from on restart.
    pub fn commit(&self, position: &RecordPosition) -> Result<()> {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset(
            &position.topic,
            position.partition,
            rdkafka::Offset::Offset(position.offset + 1),
        )
        .map_err(|e| Error::broker_with_source("failed to build commit offset list", e))?;

        self.inner
            .commit(&tpl, rdkafka::consumer::CommitMode::Async)
            .map_err(|e| Error::broker_with_source("failed to commit offset", e))
    }

    /// Pauses every partition currently assigned to this consumer, entered
    /// when in-flight work reaches `pauseAt`.
    pub fn pause(&self) -> Result<()> {
        let assignment = self
            .inner
            .assignment()
            .map_err(|e| Error::broker_with_source("failed to read assignment", e))?;
        self.inner
            .pause(&assignment)
            .map_err(|e| Error::broker_with_source("failed to pause partitions", e))
    }

    /// Resumes every assigned partition, entered when in-flight work drops
    /// to `resumeAt`.
    pub fn resume(&self) -> Result<()> {
        let assignment = self
            .inner
            .assignment()
            .map_err(|e| Error::broker_with_source("failed to read assignment", e))?;
        self.inner
            .resume(&assignment)
            .map_err(|e| Error::broker_with_source("failed to resume partitions", e))
    }
}

#[derive(Debug, Clone)]
pub struct RecordPosition {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
}
