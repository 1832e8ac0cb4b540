//! Scheduler & Lock Coordinator: elects a singleton holder among replicas
//! via a distributed lock and drives edge-triggered `runEveryMinute/Hour/Day`
//! dispatch for whichever replica holds it.

pub mod coordinator;
pub mod lock_holder;
pub mod tick;

pub use coordinator::SchedulerCoordinator;
pub use lock_holder::{HolderState, LockHolder};
pub use tick::{Periodicity, TickClock};
