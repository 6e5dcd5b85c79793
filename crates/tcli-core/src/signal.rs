//! Single-fire event with bounded waits.

use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

/// A flag that is set once and wakes every waiter.
#[derive(Debug, Default)]
pub struct Signal {
    fired: Mutex<bool>,
    cond: Condvar,
}

impl Signal {
    /// New, unset signal.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signal and wakes all waiters. Setting twice is harmless.
    pub fn set(&self) {
        let mut fired = self.fired.lock();
        *fired = true;
        self.cond.notify_all();
    }

    /// Clears the signal so it can guard another event.
    pub fn reset(&self) {
        *self.fired.lock() = false;
    }

    /// Whether the signal has fired.
    pub fn is_set(&self) -> bool {
        *self.fired.lock()
    }

    /// Blocks until set.
    pub fn wait(&self) {
        let mut fired = self.fired.lock();
        while !*fired {
            self.cond.wait(&mut fired);
        }
    }

    /// Blocks until set or `timeout` elapses. Returns whether it fired.
    ///
    /// A timeout past the representable clock range waits without bound.
    pub fn wait_timeout(&self, timeout: Duration) -> bool {
        let Some(deadline) = Instant::now().checked_add(timeout) else {
            self.wait();
            return true;
        };
        let mut fired = self.fired.lock();
        while !*fired {
            if self.cond.wait_until(&mut fired, deadline).timed_out() {
                return *fired;
            }
        }
        true
    }
}
