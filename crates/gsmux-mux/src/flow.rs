//! Per-channel transmit gate driven by the peer's MSC flow-control bit.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// How often a blocked writer re-checks its cancel flag.
const CANCEL_POLL: Duration = Duration::from_millis(100);

/// Binary stop/go gate.
///
/// Waits are predicate-checked, so a `resume` that lands before the writer
/// starts waiting is never lost.
#[derive(Debug, Default)]
pub struct FlowControl {
    stopped: Mutex<bool>,
    resumed: Condvar,
}

impl FlowControl {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, bool> {
        self.stopped.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Peer signalled "no frames allowed".
    pub fn stop(&self) {
        *self.lock() = true;
    }

    /// Peer allows frames again. Wakes every blocked writer.
    pub fn resume(&self) {
        *self.lock() = false;
        self.resumed.notify_all();
    }

    pub fn is_stopped(&self) -> bool {
        *self.lock()
    }

    /// Back to the initial (open) state, as after a channel close.
    pub fn reset(&self) {
        self.resume();
    }

    /// Block while the gate is stopped.
    ///
    /// Returns `false` if `cancel` was raised before the gate opened.
    pub fn wait_if_stopped(&self, cancel: &AtomicBool) -> bool {
        let mut stopped = self.lock();
        while *stopped {
            if cancel.load(Ordering::Acquire) {
                return false;
            }
            let (guard, _) = self
                .resumed
                .wait_timeout_while(stopped, CANCEL_POLL, |s| *s)
                .unwrap_or_else(PoisonError::into_inner);
            stopped = guard;
        }
        true
    }

    /// Block up to `timeout` while stopped. Returns whether the gate is open.
    #[cfg(test)]
    pub(crate) fn wait_timeout(&self, timeout: Duration) -> bool {
        let stopped = self.lock();
        let (stopped, _) = self
            .resumed
            .wait_timeout_while(stopped, timeout, |s| *s)
            .unwrap_or_else(PoisonError::into_inner);
        !*stopped
    }
}
