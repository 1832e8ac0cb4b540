//! Cache backend trait and Redis implementation, grounded in the teacher's
//! `CacheBackend`/`RedisBackend` pair. Only the Redis backend is kept: the
//! ingestion core always runs against a shared cache, so the teacher's
//! memory/null variants have no remaining caller here.

use crate::key::CacheKey;
use async_trait::async_trait;
use eventworks_core::error::{Error, Result};
use std::time::Duration;

#[async_trait]
pub trait CacheBackend: Send + Sync {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;
    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;
    async fn delete(&self, key: &CacheKey) -> Result<bool>;
    async fn exists(&self, key: &CacheKey) -> Result<bool>;
    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>>;
    async fn health_check(&self) -> Result<()>;
}

pub struct RedisBackend {
    pool: deadpool_redis::Pool,
}

impl RedisBackend {
    pub fn new(url: &str) -> Result<Self> {
        let cfg = deadpool_redis::Config::from_url(url);
        let pool = cfg
            .create_pool(Some(deadpool_redis::Runtime::Tokio1))
            .map_err(|e| Error::Cache {
                message: format!("failed to create redis pool: {e}"),
            })?;
        Ok(Self { pool })
    }

    pub(crate) async fn connection(&self) -> Result<deadpool_redis::Connection> {
        self.pool.get().await.map_err(|e| Error::Cache {
            message: format!("failed to get redis connection: {e}"),
        })
    }
}

#[async_trait]
impl CacheBackend for RedisBackend {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.get(key.as_str()).await.map_err(|e| Error::Cache {
            message: format!("redis GET failed: {e}"),
        })
    }

    async fn set(&self, key: &CacheKey, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        if let Some(ttl) = ttl {
            conn.set_ex::<_, _, ()>(key.as_str(), value, ttl.as_secs())
                .await
                .map_err(|e| Error::Cache {
                    message: format!("redis SETEX failed: {e}"),
                })?;
        } else {
            conn.set::<_, _, ()>(key.as_str(), value)
                .await
                .map_err(|e| Error::Cache {
                    message: format!("redis SET failed: {e}"),
                })?;
        }
        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let deleted: i64 = conn.del(key.as_str()).await.map_err(|e| Error::Cache {
            message: format!("redis DEL failed: {e}"),
        })?;
        Ok(deleted > 0)
    }

    async fn exists(&self, key: &CacheKey) -> Result<bool> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        conn.exists(key.as_str()).await.map_err(|e| Error::Cache {
            message: format!("redis EXISTS failed: {e}"),
        })
    }

    async fn ttl(&self, key: &CacheKey) -> Result<Option<Duration>> {
        use redis::AsyncCommands;
        let mut conn = self.connection().await?;
        let ttl: i64 = conn.ttl(key.as_str()).await.map_err(|e| Error::Cache {
            message: format!("redis TTL failed: {e}"),
        })?;
        Ok((ttl >= 0).then(|| Duration::from_secs(ttl as u64)))
    }

    async fn health_check(&self) -> Result<()> {
        let mut conn = self.connection().await?;
        let _: String = redis::cmd("PING")
            .query_async(&mut *conn)
            .await
            .map_err(|e| Error::Cache {
                message: format!("redis PING failed: {e}"),
            })?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl eventworks_core::health::HealthCheck for RedisBackend {
    fn name(&self) -> &str {
        "cache"
    }

    async fn check(&self) -> eventworks_core::health::ComponentHealth {
        match self.health_check().await {
            Ok(()) => eventworks_core::health::ComponentHealth::healthy(0),
            Err(e) => eventworks_core::health::ComponentHealth::unhealthy(e.to_string()),
        }
    }
}
