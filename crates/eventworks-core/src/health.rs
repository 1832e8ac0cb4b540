//! Lightweight health-check aggregation, exposed by the server's `/healthz` endpoint.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

/// Implemented by each subsystem (database pool, cache, broker) that wants to
/// participate in the aggregate health report.
#[async_trait]
pub trait HealthCheck: Send + Sync {
    fn name(&self) -> &str;
    async fn check(&self) -> ComponentHealth;
    fn is_critical(&self) -> bool {
        true
    }
}

/// Lets a check that's shared via `Arc` (because the same connection is also
/// used elsewhere) be registered without giving up that sharing.
#[async_trait]
impl<T: HealthCheck + ?Sized> HealthCheck for Arc<T> {
    fn name(&self) -> &str {
        (**self).name()
    }

    async fn check(&self) -> ComponentHealth {
        (**self).check().await
    }

    fn is_critical(&self) -> bool {
        (**self).is_critical()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Healthy,
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: Status,
    pub message: Option<String>,
    pub latency_ms: u64,
}

impl ComponentHealth {
    pub fn healthy(latency_ms: u64) -> Self {
        Self {
            status: Status::Healthy,
            message: None,
            latency_ms,
        }
    }

    pub fn unhealthy(message: impl Into<String>) -> Self {
        Self {
            status: Status::Unhealthy,
            message: Some(message.into()),
            latency_ms: 0,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: Status,
    pub components: Vec<(String, ComponentHealth)>,
    pub checked_at: DateTime<Utc>,
}

/// Runs every registered check concurrently and rolls the results up into a
/// single status: unhealthy if any critical check failed, degraded if any
/// non-critical check failed, healthy otherwise.
pub struct HealthRegistry {
    checks: Vec<Box<dyn HealthCheck>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self { checks: Vec::new() }
    }

    pub fn register(&mut self, check: Box<dyn HealthCheck>) -> &mut Self {
        self.checks.push(check);
        self
    }

    pub async fn check_all(&self) -> HealthReport {
        let mut components = Vec::with_capacity(self.checks.len());
        let mut overall = Status::Healthy;

        for check in &self.checks {
            let start = Instant::now();
            let mut result = check.check().await;
            result.latency_ms = start.elapsed().as_millis() as u64;

            if result.status != Status::Healthy {
                overall = if check.is_critical() {
                    Status::Unhealthy
                } else if overall == Status::Healthy {
                    Status::Degraded
                } else {
                    overall
                };
            }

            components.push((check.name().to_string(), result));
        }

        HealthReport {
            status: overall,
            components,
            checked_at: Utc::now(),
        }
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AlwaysHealthy;
    #[async_trait]
    impl HealthCheck for AlwaysHealthy {
        fn name(&self) -> &str {
            "ok"
        }
        async fn check(&self) -> ComponentHealth {
            ComponentHealth::healthy(1)
        }
    }

    struct AlwaysFailing {
        critical: bool,
    }
    #[async_trait]
    impl HealthCheck for AlwaysFailing {
        fn name(&self) -> &str {
            "broken"
        }
        async fn check(&self) -> ComponentHealth {
            ComponentHealth::unhealthy("nope")
        }
        fn is_critical(&self) -> bool {
            self.critical
        }
    }

    #[tokio::test]
    async fn non_critical_failure_degrades_not_fails() {
        let mut registry = HealthRegistry::new();
        registry.register(Box::new(AlwaysHealthy));
        registry.register(Box::new(AlwaysFailing { critical: false }));
        let report = registry.check_all().await;
        assert_eq!(report.status, Status::Degraded);
    }

    #[tokio::test]
    async fn critical_failure_fails_overall() {
        let mut registry = HealthRegistry::new();
        registry.register(Box::new(AlwaysFailing { critical: true }));
        let report = registry.check_all().await;
        assert_eq!(report.status, Status::Unhealthy);
    }
}
