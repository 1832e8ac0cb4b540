//! Queue consumer: owns the Kafka client, tracks in-flight work, and
//! applies the pause/resume backpressure thresholds.
//!
//! `C = worker_threads * tasks_per_worker` is the pool's total capacity;
//! the consumer pauses its partitions once in-flight work reaches `C`
//! (`pauseAt`) and only resumes once it drops back to `C / 2`
//! (`resumeAt`), so a brief dip below capacity doesn't thrash pause/resume.

use async_trait::async_trait;
use eventworks_broker::KafkaConsumer;
use eventworks_broker::envelope::IngestionEnvelope;
use eventworks_core::error::Result;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

/// How long `stop()` waits between checks of `in_flight()` while draining.
const DRAIN_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// Hands a received envelope off to the worker pool. Implemented by
/// `eventworks-workers`; kept as a trait here so this crate doesn't depend
/// on the worker pool's task-dispatch machinery.
#[async_trait]
pub trait Dispatch: Send + Sync {
    async fn dispatch(&self, envelope: IngestionEnvelope) -> Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Running,
    Paused,
    Stopped,
}

pub struct QueueConsumer {
    kafka: Arc<KafkaConsumer>,
    dispatch: Arc<dyn Dispatch>,
    capacity: usize,
    pause_at: usize,
    resume_at: usize,
    in_flight: AtomicUsize,
    is_backpressure_paused: std::sync::atomic::AtomicBool,
    state: RwLock<RunState>,
    dispatched_total: AtomicU64,
}

impl QueueConsumer {
    /// `capacity` is `C`; `pauseAt = C`, `resumeAt = C / 2`.
    pub fn new(kafka: Arc<KafkaConsumer>, dispatch: Arc<dyn Dispatch>, capacity: usize) -> Self {
        let (pause_at, resume_at) = backpressure_thresholds(capacity);
        Self {
            kafka,
            dispatch,
            capacity,
            pause_at,
            resume_at,
            in_flight: AtomicUsize::new(0),
            is_backpressure_paused: std::sync::atomic::AtomicBool::new(false),
            state: RwLock::new(RunState::Stopped),
            dispatched_total: AtomicU64::new(0),
        }
    }

    pub async fn state(&self) -> RunState {
        *self.state.read().await
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.load(Ordering::SeqCst)
    }

    pub fn dispatched_total(&self) -> u64 {
        self.dispatched_total.load(Ordering::SeqCst)
    }

    /// Runs the pull loop until `stop()` is called. Each record is handed
    /// to the dispatcher concurrently; the offset is committed only after
    /// dispatch succeeds.
    pub async fn start(self: &Arc<Self>) -> Result<()> {
        {
            let mut state = self.state.write().await;
            if *state == RunState::Running {
                return Ok(());
            }
            *state = RunState::Running;
        }

        tracing::info!(capacity = self.capacity, "queue consumer starting");

        loop {
            if *self.state.read().await == RunState::Stopped {
                break;
            }

            let (envelope, position) = match self.kafka.recv().await {
                Ok(pair) => pair,
                Err(e) => {
                    tracing::error!(error = %e, "failed to receive from kafka");
                    continue;
                }
            };

            self.in_flight.fetch_add(1, Ordering::SeqCst);
            self.enforce_backpressure();

            let this = Arc::clone(self);
            tokio::spawn(async move {
                match this.dispatch.dispatch(envelope).await {
                    Ok(()) => {
                        this.dispatched_total.fetch_add(1, Ordering::SeqCst);
                        if let Err(e) = this.kafka.commit(&position) {
                            tracing::error!(error = %e, "failed to commit offset");
                        }
                    }
                    Err(e) => {
                        tracing::error!(error = %e, "dispatch failed, offset not committed");
                    }
                }
                this.in_flight.fetch_sub(1, Ordering::SeqCst);
                this.enforce_backpressure();
            });
        }

        Ok(())
    }

    fn enforce_backpressure(&self) {
        let in_flight = self.in_flight.load(Ordering::SeqCst);
        let was_paused = self.is_backpressure_paused.load(Ordering::SeqCst);

        if !was_paused && in_flight >= self.pause_at {
            if self.kafka.pause().is_ok() {
                self.is_backpressure_paused.store(true, Ordering::SeqCst);
                tracing::warn!(in_flight, pause_at = self.pause_at, "pausing ingestion: at capacity");
            }
        } else if was_paused && in_flight <= self.resume_at {
            if self.kafka.resume().is_ok() {
                self.is_backpressure_paused.store(false, Ordering::SeqCst);
                tracing::info!(in_flight, resume_at = self.resume_at, "resuming ingestion");
            }
        }
    }

    /// Operator-initiated pause, independent of backpressure.
    pub async fn pause(&self) -> Result<()> {
        self.kafka.pause()?;
        *self.state.write().await = RunState::Paused;
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        self.kafka.resume()?;
        *self.state.write().await = RunState::Running;
        Ok(())
    }

    /// Stops the pull loop and waits for every dispatched task to finish
    /// before returning. The kafka client itself has no explicit
    /// disconnect call; it disconnects when the last `Arc<KafkaConsumer>`
    /// referencing it (held by this consumer and its in-flight dispatch
    /// tasks) is dropped, which a caller achieves by dropping its
    /// `Arc<QueueConsumer>` once this returns.
    pub async fn stop(&self) {
        *self.state.write().await = RunState::Stopped;
        while self.in_flight() > 0 {
            tokio::time::sleep(DRAIN_POLL_INTERVAL).await;
        }
    }
}

/// `pauseAt = C`, `resumeAt = C / 2`.
fn backpressure_thresholds(capacity: usize) -> (usize, usize) {
    (capacity, capacity / 2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn thresholds_follow_worker_pool_capacity() {
        assert_eq!(backpressure_thresholds(80), (80, 40));
        assert_eq!(backpressure_thresholds(1), (1, 0));
    }
}
