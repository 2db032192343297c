//! Run-state handshake between the control plane and the dispatch loop.
//!
//! The control plane writes a request state (Stopping, Pausing,
//! Continuing) and waits; the loop acknowledges at the top of each
//! iteration by moving to the settled state and notifying. A parked loop
//! sleeps on the condition variable until it is asked to run again.

use std::fmt;
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};

use log::debug;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RunState {
    Running,
    Stopping,
    Stopped,
    Pausing,
    Paused,
    Continuing,
}

impl RunState {
    /// True once the loop has parked.
    #[must_use]
    pub const fn is_parked(self) -> bool {
        matches!(self, RunState::Stopped | RunState::Paused)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RunState::Running => "running",
            RunState::Stopping => "stopping",
            RunState::Stopped => "stopped",
            RunState::Pausing => "pausing",
            RunState::Paused => "paused",
            RunState::Continuing => "continuing",
        })
    }
}

/// What the loop does after acknowledging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopAction {
    Run,
    Park,
    Exit,
}

struct Inner {
    state: RunState,
    shutdown: bool,
}

pub struct RunControl {
    inner: Mutex<Inner>,
    changed: Condvar,
}

impl RunControl {
    /// Starts stopped.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                state: RunState::Stopped,
                shutdown: false,
            }),
            changed: Condvar::new(),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.lock().state
    }

    /// Post a request for the loop to act on.
    pub fn request(&self, state: RunState) {
        let mut inner = self.lock();
        debug!("run state {} -> {state}", inner.state);
        inner.state = state;
        drop(inner);
        self.changed.notify_all();
    }

    /// Force a settled state from inside the loop (e.g. on a hotkey).
    pub fn set(&self, state: RunState) {
        self.request(state);
    }

    pub fn shutdown(&self) {
        self.lock().shutdown = true;
        self.changed.notify_all();
    }

    /// Loop side: settle any request and say what to do next.
    pub fn acknowledge(&self) -> LoopAction {
        let mut inner = self.lock();
        if inner.shutdown {
            return LoopAction::Exit;
        }
        let settled = match inner.state {
            RunState::Stopping => Some(RunState::Stopped),
            RunState::Pausing => Some(RunState::Paused),
            RunState::Continuing => Some(RunState::Running),
            _ => None,
        };
        if let Some(state) = settled {
            inner.state = state;
            drop(inner);
            self.changed.notify_all();
            inner = self.lock();
        }
        if inner.state.is_parked() {
            LoopAction::Park
        } else {
            LoopAction::Run
        }
    }

    /// Loop side: sleep until asked to run or shut down.
    pub fn park(&self) {
        let inner = self.lock();
        let _parked = self
            .changed
            .wait_while(inner, |i| i.state.is_parked() && !i.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Block until the loop has settled in a parked state.
    pub fn wait_parked(&self) {
        let inner = self.lock();
        let _parked = self
            .changed
            .wait_while(inner, |i| !i.state.is_parked() && !i.shutdown)
            .unwrap_or_else(PoisonError::into_inner);
    }

    /// Request a stop and wait for it. Returns the state before the stop.
    pub fn stop_and_wait(&self) -> RunState {
        let prior = self.state();
        if !prior.is_parked() {
            self.request(RunState::Stopping);
            self.wait_parked();
        }
        prior
    }

    /// Put the loop back the way [`stop_and_wait`](Self::stop_and_wait)
    /// found it.
    pub fn restore(&self, prior: RunState) {
        match prior {
            RunState::Running | RunState::Continuing => self.request(RunState::Continuing),
            RunState::Pausing | RunState::Paused => self.request(RunState::Paused),
            RunState::Stopping | RunState::Stopped => self.request(RunState::Stopped),
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requests_settle_on_acknowledge() {
        let control = RunControl::new();
        assert_eq!(control.acknowledge(), LoopAction::Park);
        control.request(RunState::Continuing);
        assert_eq!(control.acknowledge(), LoopAction::Run);
        assert_eq!(control.state(), RunState::Running);
        control.request(RunState::Pausing);
        assert_eq!(control.acknowledge(), LoopAction::Park);
        assert_eq!(control.state(), RunState::Paused);
    }

    #[test]
    fn shutdown_wins() {
        let control = RunControl::new();
        control.request(RunState::Continuing);
        control.shutdown();
        assert_eq!(control.acknowledge(), LoopAction::Exit);
        // A parked loop wakes for shutdown.
        control.park();
    }

    #[test]
    fn restore_returns_to_prior_state() {
        let control = RunControl::new();
        control.restore(RunState::Running);
        assert_eq!(control.state(), RunState::Continuing);
        control.restore(RunState::Paused);
        assert_eq!(control.state(), RunState::Paused);
    }
}
