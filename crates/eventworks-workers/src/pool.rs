//! Bounded worker pool: `concurrency` workers, each allowed
//! `tasks_per_worker` concurrent tasks, every task run under
//! `TASK_TIMEOUT`. Total capacity `C = concurrency * tasks_per_worker` is
//! what the queue consumer's backpressure thresholds are sized against.

use crate::task::{TaskKind, TaskOutput};
use async_trait::async_trait;
use eventworks_core::config::WorkerConfig;
use eventworks_core::error::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Semaphore;

/// Implemented by the plugin lifecycle manager / event processor / the
/// scheduler's task bodies; the pool is agnostic to what a task actually
/// does.
#[async_trait]
pub trait TaskRunner: Send + Sync {
    async fn run(&self, task: TaskKind) -> Result<TaskOutput>;
}

#[derive(Debug, Clone, Default)]
pub struct WorkerPoolStats {
    pub queue_size: usize,
    pub completed: u64,
    pub timed_out: u64,
    pub failed: u64,
    pub last_duration_ms: u64,
}

pub struct WorkerPool {
    runner: Arc<dyn TaskRunner>,
    semaphore: Arc<Semaphore>,
    capacity: usize,
    task_timeout: Duration,
    completed: Arc<AtomicU64>,
    timed_out: Arc<AtomicU64>,
    failed: Arc<AtomicU64>,
    last_duration_ms: Arc<AtomicU64>,
}

impl WorkerPool {
    pub fn new(config: &WorkerConfig, runner: Arc<dyn TaskRunner>) -> Self {
        Self {
            runner,
            semaphore: Arc::new(Semaphore::new(config.capacity())),
            capacity: config.capacity(),
            task_timeout: config.task_timeout(),
            completed: Arc::new(AtomicU64::new(0)),
            timed_out: Arc::new(AtomicU64::new(0)),
            failed: Arc::new(AtomicU64::new(0)),
            last_duration_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Total in-flight capacity, `C` in the backpressure design.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn in_flight(&self) -> usize {
        self.capacity.saturating_sub(self.semaphore.available_permits())
    }

    /// Runs a task once a permit is available, enforcing `TASK_TIMEOUT`.
    /// Returns `Error::PoolSaturated` immediately if the pool is shedding
    /// load rather than queuing indefinitely — callers that want to queue
    /// should await `run` directly, which blocks for a permit.
    pub async fn run(&self, task: TaskKind) -> Result<TaskOutput> {
        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| Error::internal("worker pool semaphore closed"))?;

        let label = task.label();
        let started = Instant::now();

        let result = tokio::time::timeout(self.task_timeout, self.runner.run(task)).await;

        drop(permit);
        let elapsed = started.elapsed();
        self.last_duration_ms
            .store(elapsed.as_millis() as u64, Ordering::SeqCst);

        match result {
            Ok(Ok(output)) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(output)
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(task = label, error = %e, "task failed");
                Err(e)
            }
            Err(_) => {
                self.timed_out.fetch_add(1, Ordering::SeqCst);
                tracing::warn!(task = label, elapsed_secs = elapsed.as_secs(), "task timed out");
                Err(Error::TaskTimeout {
                    elapsed_secs: elapsed.as_secs(),
                })
            }
        }
    }

    /// Attempts to run `task` without blocking for a permit; returns
    /// `Error::PoolSaturated` if the pool is already at capacity.
    pub async fn try_run(&self, task: TaskKind) -> Result<TaskOutput> {
        let permit = self
            .semaphore
            .clone()
            .try_acquire_owned()
            .map_err(|_| Error::PoolSaturated)?;

        let label = task.label();
        let started = Instant::now();
        let result = tokio::time::timeout(self.task_timeout, self.runner.run(task)).await;
        drop(permit);
        let elapsed = started.elapsed();
        self.last_duration_ms
            .store(elapsed.as_millis() as u64, Ordering::SeqCst);

        match result {
            Ok(Ok(output)) => {
                self.completed.fetch_add(1, Ordering::SeqCst);
                Ok(output)
            }
            Ok(Err(e)) => {
                self.failed.fetch_add(1, Ordering::SeqCst);
                Err(e)
            }
            Err(_) => {
                self.timed_out.fetch_add(1, Ordering::SeqCst);
                Err(Error::TaskTimeout {
                    elapsed_secs: elapsed.as_secs(),
                })
            }
        }
    }

    pub fn stats(&self) -> WorkerPoolStats {
        WorkerPoolStats {
            queue_size: 0,
            completed: self.completed.load(Ordering::SeqCst),
            timed_out: self.timed_out.load(Ordering::SeqCst),
            failed: self.failed.load(Ordering::SeqCst),
            last_duration_ms: self.last_duration_ms.load(Ordering::SeqCst),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::task::TaskKind;
    use eventworks_core::ids::TeamId;
    use std::sync::atomic::AtomicBool;

    struct EchoRunner {
        should_hang: AtomicBool,
    }

    #[async_trait]
    impl TaskRunner for EchoRunner {
        async fn run(&self, _task: TaskKind) -> Result<TaskOutput> {
            if self.should_hang.load(Ordering::SeqCst) {
                tokio::time::sleep(Duration::from_secs(60)).await;
            }
            Ok(TaskOutput { events_produced: 1 })
        }
    }

    fn test_config(concurrency: usize, task_timeout_secs: u64) -> WorkerConfig {
        WorkerConfig {
            concurrency,
            tasks_per_worker: 1,
            task_timeout_secs,
        }
    }

    #[tokio::test]
    async fn completes_and_records_stats() {
        let runner = Arc::new(EchoRunner {
            should_hang: AtomicBool::new(false),
        });
        let pool = WorkerPool::new(&test_config(2, 5), runner);

        let output = pool
            .run(TaskKind::ReloadSchedule)
            .await
            .expect("task should succeed");
        assert_eq!(output.events_produced, 1);
        assert_eq!(pool.stats().completed, 1);
    }

    #[tokio::test]
    async fn task_timeout_is_reported_as_timeout_error() {
        tokio::time::pause();
        let runner = Arc::new(EchoRunner {
            should_hang: AtomicBool::new(true),
        });
        let pool = WorkerPool::new(&test_config(1, 1), runner);

        let run = pool.run(TaskKind::ReloadSchedule);
        tokio::pin!(run);
        tokio::time::advance(Duration::from_secs(2)).await;
        let result = run.await;

        assert!(matches!(result, Err(Error::TaskTimeout { .. })));
        assert_eq!(pool.stats().timed_out, 1);
    }

    #[tokio::test]
    async fn try_run_reports_saturation_when_no_permits_free() {
        let runner = Arc::new(EchoRunner {
            should_hang: AtomicBool::new(true),
        });
        let pool = WorkerPool::new(&test_config(1, 30), runner);

        let this = Arc::new(pool);
        let background = {
            let this = this.clone();
            tokio::spawn(async move {
                let _ = this
                    .run(TaskKind::ProcessEvent {
                        team_id: TeamId(1),
                        envelope: test_envelope(),
                    })
                    .await;
            })
        };

        // Give the background task a chance to grab the only permit.
        tokio::task::yield_now().await;
        tokio::task::yield_now().await;

        let result = this.try_run(TaskKind::ReloadSchedule).await;
        assert!(matches!(result, Err(Error::PoolSaturated)));

        background.abort();
    }

    fn test_envelope() -> eventworks_broker::envelope::IngestionEnvelope {
        eventworks_broker::envelope::IngestionEnvelope {
            uuid: uuid::Uuid::now_v7(),
            team_id: 1,
            distinct_id: "abc".to_string(),
            event: "pageview".to_string(),
            properties: serde_json::json!({}),
            timestamp: None,
            sent_at: None,
            offset_ms: None,
            received_at: chrono::Utc::now(),
        }
    }
}
