//! Postgres connection pool, sized from `eventworks_core::config::DatabaseConfig`.

use eventworks_core::config::DatabaseConfig;
use eventworks_core::error::{Error, Result};
use eventworks_core::health::{ComponentHealth, HealthCheck};
use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

/// Thin wrapper so the rest of the crate depends on this type, not on sqlx
/// directly, matching the teacher's `DatabasePool` seam in `rustpress-database`.
#[derive(Clone)]
pub struct DatabasePool {
    pool: PgPool,
}

impl DatabasePool {
    pub async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(config.pool_min)
            .max_connections(config.pool_max)
            .acquire_timeout(config.connect_timeout())
            .connect(&config.url)
            .await
            .map_err(|e| Error::database_with_source("failed to connect to postgres", e))?;

        Ok(Self { pool })
    }

    pub fn raw(&self) -> &PgPool {
        &self.pool
    }

    /// Wraps an already-connected pool, for tests that stand up their own
    /// Postgres connection outside `DatabaseConfig`.
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl HealthCheck for DatabasePool {
    fn name(&self) -> &str {
        "database"
    }

    async fn check(&self) -> ComponentHealth {
        match sqlx::query("SELECT 1").execute(&self.pool).await {
            Ok(_) => ComponentHealth::healthy(0),
            Err(e) => ComponentHealth::unhealthy(e.to_string()),
        }
    }
}
