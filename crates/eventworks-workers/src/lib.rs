//! In-process worker pool that runs plugin and scheduler tasks with a
//! bounded concurrency and per-task timeout, and the glue that lets the
//! queue consumer hand off received envelopes to it.

pub mod pool;
pub mod task;

pub use pool::{TaskRunner, WorkerPool, WorkerPoolStats};
pub use task::{TaskKind, TaskOutput};

use async_trait::async_trait;
use eventworks_broker::envelope::IngestionEnvelope;
use eventworks_core::error::Result;
use eventworks_core::ids::TeamId;
use eventworks_queue::Dispatch;
use std::sync::Arc;

/// Adapts a [`WorkerPool`] to the queue consumer's [`Dispatch`] trait:
/// every received envelope becomes an `IngestEvent` task, submitted and
/// awaited so the consumer only commits the offset once the pool has
/// actually run it.
pub struct PoolDispatch {
    pool: Arc<WorkerPool>,
}

impl PoolDispatch {
    pub fn new(pool: Arc<WorkerPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl Dispatch for PoolDispatch {
    async fn dispatch(&self, envelope: IngestionEnvelope) -> Result<()> {
        let team_id = TeamId(envelope.team_id);
        self.pool
            .run(TaskKind::IngestEvent { team_id, envelope })
            .await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use eventworks_core::config::WorkerConfig;

    struct NoopRunner;

    #[async_trait]
    impl TaskRunner for NoopRunner {
        async fn run(&self, _task: TaskKind) -> Result<TaskOutput> {
            Ok(TaskOutput::default())
        }
    }

    #[tokio::test]
    async fn dispatch_submits_envelope_as_ingest_event() {
        let pool = Arc::new(WorkerPool::new(&WorkerConfig::default(), Arc::new(NoopRunner)));
        let dispatch = PoolDispatch::new(pool.clone());

        let envelope = IngestionEnvelope {
            uuid: uuid::Uuid::now_v7(),
            team_id: 42,
            distinct_id: "user-1".to_string(),
            event: "pageview".to_string(),
            properties: serde_json::json!({}),
            timestamp: None,
            sent_at: None,
            offset_ms: None,
            received_at: chrono::Utc::now(),
        };

        dispatch.dispatch(envelope).await.expect("dispatch should succeed");
        assert_eq!(pool.stats().completed, 1);
    }
}
