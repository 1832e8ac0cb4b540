//! Configuration surface for the ingestion core, merged from built-in defaults,
//! an optional TOML file, and environment variables at startup. Once loaded the
//! configuration is treated as immutable for the lifetime of the process.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub worker: WorkerConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub kafka: KafkaConfig,
    pub clickhouse: ClickhouseConfig,
    pub jobs: JobQueueConfig,
    pub logging: LoggingConfig,
    pub plugins: PluginsConfig,
    pub scheduler: SchedulerConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            worker: WorkerConfig::default(),
            database: DatabaseConfig::default(),
            redis: RedisConfig::default(),
            kafka: KafkaConfig::default(),
            clickhouse: ClickhouseConfig::default(),
            jobs: JobQueueConfig::default(),
            logging: LoggingConfig::default(),
            plugins: PluginsConfig::default(),
            scheduler: SchedulerConfig::default(),
        }
    }
}

impl AppConfig {
    /// Load configuration by layering built-in defaults under an optional TOML
    /// file and environment variables (prefixed `EVENTWORKS_`, `__` as the
    /// nesting separator, e.g. `EVENTWORKS_WORKER__CONCURRENCY=8`).
    pub fn load(file_path: Option<&str>) -> Result<Self, config::ConfigError> {
        let defaults = config::Config::try_from(&AppConfig::default())?;
        let mut builder = config::Config::builder().add_source(defaults);

        if let Some(path) = file_path {
            builder = builder.add_source(config::File::with_name(path).required(false));
        }

        builder = builder.add_source(
            config::Environment::with_prefix("EVENTWORKS")
                .separator("__")
                .try_parsing(true),
        );

        builder.build()?.try_deserialize()
    }
}

/// `WORKER_CONCURRENCY`, `TASKS_PER_WORKER`, `TASK_TIMEOUT`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub tasks_per_worker: usize,
    pub task_timeout_secs: u64,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            concurrency: num_cpus(),
            tasks_per_worker: 10,
            task_timeout_secs: 30,
        }
    }
}

impl WorkerConfig {
    /// `C` in the backpressure design: total in-flight capacity of the pool.
    pub fn capacity(&self) -> usize {
        self.concurrency * self.tasks_per_worker
    }

    pub fn task_timeout(&self) -> Duration {
        Duration::from_secs(self.task_timeout_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub pool_min: u32,
    pub pool_max: u32,
    pub connect_timeout_secs: u64,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: "postgres://localhost/eventworks".to_string(),
            pool_min: 2,
            pool_max: 10,
            connect_timeout_secs: 10,
        }
    }
}

impl DatabaseConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// `REDIS_POOL_MIN_SIZE`, `REDIS_POOL_MAX_SIZE`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RedisConfig {
    pub url: String,
    pub pool_min_size: u32,
    pub pool_max_size: u32,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            pool_min_size: 1,
            pool_max_size: 10,
        }
    }
}

/// `KAFKA_ENABLED`, `KAFKA_HOSTS`, and base64-encoded TLS material.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KafkaConfig {
    pub enabled: bool,
    pub hosts: Vec<String>,
    pub consumer_group: String,
    pub ingestion_topic: String,
    pub tls_cert_b64: Option<String>,
    pub tls_key_b64: Option<String>,
    pub tls_ca_b64: Option<String>,
}

impl Default for KafkaConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            hosts: vec!["localhost:9092".to_string()],
            consumer_group: "plugin-server".to_string(),
            ingestion_topic: "events_ingestion_handoff".to_string(),
            tls_cert_b64: None,
            tls_key_b64: None,
            tls_ca_b64: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClickhouseConfig {
    pub events_topic: String,
    pub session_recording_topic: String,
}

impl Default for ClickhouseConfig {
    fn default() -> Self {
        Self {
            events_topic: "clickhouse_events_json".to_string(),
            session_recording_topic: "clickhouse_session_recording_events".to_string(),
        }
    }
}

/// `PLUGINS_CELERY_QUEUE`, `CELERY_DEFAULT_QUEUE`, `JOB_QUEUE_GRAPHILE_SCHEMA`/`_URL`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobQueueConfig {
    pub plugins_celery_queue: String,
    pub celery_default_queue: String,
    pub graphile_schema: String,
    pub graphile_url: Option<String>,
}

impl Default for JobQueueConfig {
    fn default() -> Self {
        Self {
            plugins_celery_queue: "plugins".to_string(),
            celery_default_queue: "celery".to_string(),
            graphile_schema: "graphile_worker".to_string(),
            graphile_url: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    pub level: String,
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// `DISABLE_MMDB`, `PLUGIN_SERVER_INGESTION`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PluginsConfig {
    pub disable_mmdb: bool,
    pub ingestion_enabled: bool,
    pub retry_base_secs: u64,
    pub retry_multiplier: u32,
    pub retry_max_attempts: u32,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            disable_mmdb: false,
            ingestion_enabled: true,
            retry_base_secs: 3,
            retry_multiplier: 2,
            retry_max_attempts: 10,
        }
    }
}

/// Lock-based singleton election for the scheduler's `runEveryMinute/Hour/Day`
/// dispatch: TTL `L`, re-extended at `L / 2`, retry delay `L / 10` on a
/// failed acquisition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SchedulerConfig {
    pub lock_resource: String,
    pub lock_ttl_secs: u64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            lock_resource: "plugin-scheduler".to_string(),
            lock_ttl_secs: 60,
        }
    }
}

impl SchedulerConfig {
    pub fn lock_ttl(&self) -> Duration {
        Duration::from_secs(self.lock_ttl_secs)
    }

    pub fn extend_at(&self) -> Duration {
        self.lock_ttl() / 2
    }

    pub fn acquire_retry_delay(&self) -> Duration {
        self.lock_ttl() / 10
    }
}

fn num_cpus() -> usize {
    std::thread::available_parallelism()
        .map(|p| p.get())
        .unwrap_or(4)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_sane_worker_capacity() {
        let config = AppConfig::default();
        assert_eq!(
            config.worker.capacity(),
            config.worker.concurrency * config.worker.tasks_per_worker
        );
    }

    #[test]
    fn default_config_round_trips_through_json() {
        let config = AppConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let restored: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config.worker.concurrency, restored.worker.concurrency);
    }

    #[test]
    fn env_override_wins_over_defaults() {
        std::env::set_var("EVENTWORKS_WORKER__CONCURRENCY", "16");
        let config = AppConfig::load(None).unwrap();
        assert_eq!(config.worker.concurrency, 16);
        std::env::remove_var("EVENTWORKS_WORKER__CONCURRENCY");
    }
}
