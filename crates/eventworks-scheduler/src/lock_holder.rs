//! Lock-holder state machine: `Follower -> Acquiring -> Leader`, modeled on
//! the teacher's `CircuitState` (`Closed`/`Open`/`HalfOpen`) transition-log
//! style. Never does scheduled work as `Follower`; demotes immediately on
//! any extension failure.

use eventworks_cache::lock::DistributedLock;
use eventworks_core::config::SchedulerConfig;
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HolderState {
    Follower,
    Acquiring,
    Leader,
}

pub struct LockHolder {
    pool: Arc<deadpool_redis::Pool>,
    config: SchedulerConfig,
    state: HolderState,
    lock: Option<DistributedLock>,
    last_extend_at: Option<Instant>,
}

impl LockHolder {
    pub fn new(pool: Arc<deadpool_redis::Pool>, config: SchedulerConfig) -> Self {
        Self {
            pool,
            config,
            state: HolderState::Follower,
            lock: None,
            last_extend_at: None,
        }
    }

    pub fn state(&self) -> HolderState {
        self.state
    }

    pub fn is_leader(&self) -> bool {
        self.state == HolderState::Leader
    }

    /// One step of the election loop. Callers drive this on a timer; the
    /// return value says whether the caller should sleep the full tick
    /// interval or the shorter acquire-retry delay.
    pub async fn tick(&mut self) {
        match self.state {
            HolderState::Follower => self.try_acquire().await,
            HolderState::Acquiring => self.try_acquire().await,
            HolderState::Leader => self.maybe_extend().await,
        }
    }

    async fn try_acquire(&mut self) {
        self.state = HolderState::Acquiring;
        let acquired = DistributedLock::acquire(
            self.pool.clone(),
            &self.config.lock_resource,
            self.config.lock_ttl(),
        )
        .await;

        match acquired {
            Ok(Some(lock)) => {
                tracing::info!(resource = %self.config.lock_resource, "acquired scheduler lock, becoming leader");
                self.lock = Some(lock);
                self.last_extend_at = Some(Instant::now());
                self.state = HolderState::Leader;
            }
            Ok(None) => {
                self.state = HolderState::Follower;
            }
            Err(e) => {
                tracing::warn!(error = %e, "scheduler lock acquisition failed");
                self.state = HolderState::Follower;
            }
        }
    }

    async fn maybe_extend(&mut self) {
        let due = self
            .last_extend_at
            .map(|t| t.elapsed() >= self.config.extend_at())
            .unwrap_or(true);
        if !due {
            return;
        }

        let Some(lock) = &self.lock else {
            self.demote();
            return;
        };

        match lock.extend(self.config.lock_ttl()).await {
            Ok(true) => {
                self.last_extend_at = Some(Instant::now());
            }
            Ok(false) => {
                tracing::warn!("lost scheduler lock on extend, demoting");
                self.demote();
            }
            Err(e) => {
                tracing::warn!(error = %e, "scheduler lock extend errored, demoting");
                self.demote();
            }
        }
    }

    fn demote(&mut self) {
        self.lock = None;
        self.last_extend_at = None;
        self.state = HolderState::Follower;
    }

    /// Delay the caller should sleep before the next `tick()`.
    pub fn next_delay(&self) -> std::time::Duration {
        match self.state {
            HolderState::Leader => self.config.extend_at(),
            _ => self.config.acquire_retry_delay(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_as_follower() {
        let config = SchedulerConfig::default();
        assert_eq!(config.lock_ttl_secs, 60);
        assert_eq!(config.extend_at(), std::time::Duration::from_secs(30));
        assert_eq!(config.acquire_retry_delay(), std::time::Duration::from_secs(6));
    }
}
