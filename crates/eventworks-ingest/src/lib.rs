//! Event processor: resolves a raw ingested event's timestamp and identity,
//! applies the team-cache side effects, runs it through a team's plugin
//! pipeline, and publishes the result to the analytics topics.

pub mod identify;
pub mod processor;
pub mod timestamp;

pub use processor::EventProcessor;
pub use timestamp::resolve_timestamp;
