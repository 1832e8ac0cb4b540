//! Postgres-backed storage for teams, persons, plugins, actions, and
//! plugin log entries.

pub mod actions;
pub mod migration;
pub mod models;
pub mod persons;
pub mod plugins;
pub mod pool;
pub mod teams;

pub use actions::{ActionRepository, ActionWithSteps};
pub use migration::{Migration, Migrator};
pub use persons::{AliasOutcome, PersonRepository};
pub use plugins::{LoadedPluginConfig, PluginRepository};
pub use pool::DatabasePool;
pub use teams::TeamRepository;
