//! Plugin Lifecycle Manager: lazily compiles per-team plugin VMs inside a
//! `wasmtime` sandbox, retries transient init failures with backoff, and
//! exposes the ordered per-team pipeline to the worker pool.

pub mod lazy_vm;
pub mod manager;
pub mod retry;
pub mod sandbox;

pub use lazy_vm::{LazyVm, VmState};
pub use manager::{ArchiveSource, PipelineOutcome, PluginLifecycleManager};
pub use sandbox::{Capabilities, PluginSandbox};
