//! Queue consumer: pulls ingress records from the broker, applies
//! backpressure against the worker pool's capacity, and commits offsets
//! once dispatch succeeds.

pub mod consumer;

pub use consumer::{Dispatch, QueueConsumer, RunState};
