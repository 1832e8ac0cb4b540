//! Unified error type for the ingestion core, following the taxonomy in the design doc:
//! transient infrastructure errors, plugin init failures (transient/permanent), plugin
//! runtime errors, identity races, and input validation failures.

use thiserror::Error;

/// The unified error type for ingestion-core operations.
#[derive(Error, Debug)]
pub enum Error {
    #[error("database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("entity not found: {entity_type} with id {id}")]
    NotFound { entity_type: String, id: String },

    #[error("cache error: {message}")]
    Cache { message: String },

    #[error("broker error: {message}")]
    Broker {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    /// A plugin explicitly requested a retry during initialization.
    #[error("plugin init transient failure: {plugin_config_id} - {message}")]
    PluginInitTransient {
        plugin_config_id: i64,
        message: String,
    },

    /// A plugin's initialization failed in a way that cannot be retried.
    #[error("plugin init permanent failure: {plugin_config_id} - {message}")]
    PluginInitPermanent {
        plugin_config_id: i64,
        message: String,
    },

    /// A plugin threw while processing an event or running a task.
    #[error("plugin runtime error: {plugin_config_id} - {message}")]
    PluginRuntime {
        plugin_config_id: i64,
        message: String,
    },

    #[error("team not found: {team_id}")]
    TeamNotFound { team_id: i64 },

    #[error("invalid event: {reason}")]
    InvalidEvent { reason: String },

    #[error("lock error: {message}")]
    Lock { message: String },

    #[error("task timed out after {elapsed_secs}s")]
    TaskTimeout { elapsed_secs: u64 },

    #[error("worker pool is saturated")]
    PoolSaturated,

    #[error("configuration error: {message}")]
    Configuration { message: String },

    #[error("serialization error: {message}")]
    Serialization { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl Error {
    pub fn database(message: impl Into<String>) -> Self {
        Error::Database {
            message: message.into(),
            source: None,
        }
    }

    pub fn database_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Database {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn broker(message: impl Into<String>) -> Self {
        Error::Broker {
            message: message.into(),
            source: None,
        }
    }

    pub fn broker_with_source(
        message: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        Error::Broker {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn not_found(entity_type: impl Into<String>, id: impl Into<String>) -> Self {
        Error::NotFound {
            entity_type: entity_type.into(),
            id: id.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Error::Internal {
            message: message.into(),
        }
    }

    /// Infrastructure-level errors are safe to retry by the caller.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Error::Database { .. } | Error::Broker { .. } | Error::Cache { .. } | Error::Lock { .. }
        )
    }

    pub fn error_code(&self) -> &'static str {
        match self {
            Error::Database { .. } => "DATABASE_ERROR",
            Error::NotFound { .. } => "NOT_FOUND",
            Error::Cache { .. } => "CACHE_ERROR",
            Error::Broker { .. } => "BROKER_ERROR",
            Error::PluginInitTransient { .. } => "PLUGIN_INIT_TRANSIENT",
            Error::PluginInitPermanent { .. } => "PLUGIN_INIT_PERMANENT",
            Error::PluginRuntime { .. } => "PLUGIN_RUNTIME_ERROR",
            Error::TeamNotFound { .. } => "TEAM_NOT_FOUND",
            Error::InvalidEvent { .. } => "INVALID_EVENT",
            Error::Lock { .. } => "LOCK_ERROR",
            Error::TaskTimeout { .. } => "TASK_TIMEOUT",
            Error::PoolSaturated => "POOL_SATURATED",
            Error::Configuration { .. } => "CONFIG_ERROR",
            Error::Serialization { .. } => "SERIALIZATION_ERROR",
            Error::Internal { .. } => "INTERNAL_ERROR",
            Error::Other(_) => "UNKNOWN_ERROR",
        }
    }
}

/// Result type alias for ingestion-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(Error::database("connection reset").is_retryable());
        assert!(Error::broker("group join failed").is_retryable());
        assert!(!Error::InvalidEvent {
            reason: "missing uuid".into()
        }
        .is_retryable());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(
            Error::TeamNotFound { team_id: 7 }.error_code(),
            "TEAM_NOT_FOUND"
        );
        assert_eq!(Error::PoolSaturated.error_code(), "POOL_SATURATED");
    }
}
