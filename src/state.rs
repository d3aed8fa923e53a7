//! # Shared Control State
//!
//! State read and written by both the input dispatch context and the capture
//! thread. Everything lives behind one mutex so the dispatch context can check
//! capture liveness atomically with respect to the capture thread's terminal
//! transition.

use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::capture::CaptureState;
use crate::flight::FlightState;

/// Snapshot of the controller's flight and capture state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlState {
    pub flight: FlightState,
    pub capture: CaptureState,
    /// Set when a capture thread is spawned, cleared by the thread as its last
    /// action once the encoder is closed.
    pub capture_running: bool,
    /// Cooperative stop signal observed by the capture loop.
    pub stop_requested: bool,
}

impl Default for ControlState {
    fn default() -> Self {
        Self {
            flight: FlightState::Grounded,
            capture: CaptureState::Idle,
            capture_running: false,
            stop_requested: false,
        }
    }
}

/// Mutex-guarded [`ControlState`] with change notification.
#[derive(Debug, Default)]
pub struct SharedState {
    state: Mutex<ControlState>,
    changed: Condvar,
}

impl SharedState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Lock the state.
    ///
    /// A panic on the other side never leaves the state unusable: poisoning is
    /// ignored and the last written value is used.
    pub fn lock(&self) -> MutexGuard<'_, ControlState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> ControlState {
        *self.lock()
    }

    /// Apply a change under the lock and wake all waiters.
    pub fn update<F>(&self, change: F)
    where
        F: FnOnce(&mut ControlState),
    {
        let mut guard = self.lock();
        change(&mut *guard);
        drop(guard);
        self.changed.notify_all();
    }

    /// Block while `condition` holds, for at most `timeout`.
    ///
    /// Returns the state at wake-up and whether the wait timed out.
    pub fn wait_while<F>(&self, timeout: Duration, mut condition: F) -> (ControlState, bool)
    where
        F: FnMut(&ControlState) -> bool,
    {
        let guard = self.lock();
        let (guard, result) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| condition(state))
            .unwrap_or_else(PoisonError::into_inner);
        (*guard, result.timed_out())
    }
}
