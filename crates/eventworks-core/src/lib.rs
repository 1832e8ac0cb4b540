//! # EventWorks Core
//!
//! Shared types, error handling, configuration and identifiers used across the
//! ingestion pipeline, plugin lifecycle manager, worker pool, and scheduler.

pub mod config;
pub mod error;
pub mod health;
pub mod ids;
pub mod team;

pub use config::AppConfig;
pub use error::{Error, Result};
pub use ids::{EventIdGenerator, PersonId, PluginConfigId, TeamId};
pub use team::Team;

/// The current version of the ingestion core.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
