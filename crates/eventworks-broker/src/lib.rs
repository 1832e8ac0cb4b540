//! Kafka consumer/producer and wire formats for the ingestion pipeline.

pub mod consumer;
pub mod envelope;
pub mod producer;

pub use consumer::{KafkaConsumer, RecordPosition};
pub use envelope::{ClickhouseEvent, IngestionEnvelope, SessionRecordingEvent};
pub use producer::KafkaProducer;

#[cfg(test)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn clickhouse_event_respects_prost_field_tags() {
        let event = ClickhouseEvent {
            uuid: "11111111-1111-7111-8111-111111111111".to_string(),
            team_id: 7,
            event: "pageview".to_string(),
            distinct_id: "abc".to_string(),
            properties_json: "{}".to_string(),
            person_id: 42,
            timestamp: "2026-07-27T00:00:00Z".to_string(),
        };
        let encoded = event.encode_to_vec();
        let decoded = ClickhouseEvent::decode(encoded.as_slice()).unwrap();
        assert_eq!(decoded.team_id, 7);
        assert_eq!(decoded.event, "pageview");
    }
}
