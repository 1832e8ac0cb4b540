//! The `LazyVM` handle: resolves once to a compiled sandbox or to a null
//! result if the plugin permanently fails. All callers must tolerate a
//! null resolution by skipping the plugin for the current event or task.

use crate::sandbox::PluginSandbox;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Instant;

#[derive(Clone)]
pub enum VmState {
    Pending,
    Ready(Arc<PluginSandbox>),
    /// Awaiting a scheduled retry; `next_attempt_at` gates when the
    /// lifecycle manager should try compiling again.
    TransientFail {
        attempt: u32,
        next_attempt_at: Instant,
    },
    PermanentFail {
        reason: String,
    },
}

/// A handle to one plugin config's compiled VM. Readers call
/// [`LazyVm::resolved`]; writers (the lifecycle manager) drive
/// transitions via [`LazyVm::set`].
pub struct LazyVm {
    state: RwLock<VmState>,
}

impl LazyVm {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(VmState::Pending),
        }
    }

    pub fn state(&self) -> VmState {
        self.state.read().clone()
    }

    pub fn set(&self, state: VmState) {
        *self.state.write() = state;
    }

    /// Returns `Some(sandbox)` if ready, `None` otherwise — a null
    /// resolution means "skip this plugin for this event."
    pub fn resolved(&self) -> Option<Arc<PluginSandbox>> {
        match &*self.state.read() {
            VmState::Ready(sandbox) => Some(sandbox.clone()),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(&*self.state.read(), VmState::Pending)
    }

    pub fn due_for_retry(&self, now: Instant) -> bool {
        matches!(&*self.state.read(),
            VmState::TransientFail { next_attempt_at, .. } if *next_attempt_at <= now)
    }
}

impl Default for LazyVm {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fresh_handle_resolves_to_none() {
        let vm = LazyVm::new();
        assert!(vm.resolved().is_none());
        assert!(vm.is_pending());
    }

    #[test]
    fn transient_fail_is_not_due_until_its_deadline() {
        let vm = LazyVm::new();
        let next_attempt_at = Instant::now() + Duration::from_secs(30);
        vm.set(VmState::TransientFail {
            attempt: 1,
            next_attempt_at,
        });
        assert!(!vm.due_for_retry(Instant::now()));
        assert!(vm.due_for_retry(next_attempt_at + Duration::from_millis(1)));
    }
}
