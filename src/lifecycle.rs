//! Backend lifecycle state machine (spec §4.5).
//!
//! Grounded on `dapper/adapter/lifecycle.py::LifecycleManager` from the
//! original implementation: the same states, the same transition table,
//! the same auto-advance-then-busy `operation_context` shape, reworked as
//! a guard type instead of an async context manager.

use std::fmt;
use std::sync::Mutex;

use crate::error::LifecycleTransitionError;

/// Lifecycle states (spec §4.5). `Error` carries the message that caused
/// the transition so callers can inspect it via [`Lifecycle::error_info`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum State {
    Uninitialized,
    Initializing,
    Ready,
    Busy,
    Error(String),
    Terminating,
    Terminated,
}

impl fmt::Display for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            State::Uninitialized => write!(f, "uninitialized"),
            State::Initializing => write!(f, "initializing"),
            State::Ready => write!(f, "ready"),
            State::Busy => write!(f, "busy"),
            State::Error(msg) => write!(f, "error({msg})"),
            State::Terminating => write!(f, "terminating"),
            State::Terminated => write!(f, "terminated"),
        }
    }
}

impl State {
    fn discriminant_allows(&self, to: &State) -> bool {
        use State::*;
        matches!(
            (self, to),
            (Uninitialized, Initializing)
                | (Uninitialized, Terminated)
                | (Initializing, Ready)
                | (Initializing, Error(_))
                | (Initializing, Terminating)
                | (Ready, Busy)
                | (Ready, Error(_))
                | (Ready, Terminating)
                | (Busy, Ready)
                | (Busy, Error(_))
                | (Busy, Terminating)
                | (Error(_), Ready)
                | (Error(_), Terminating)
                | (Terminating, Terminated)
                | (Terminating, Error(_))
        )
    }
}

type CleanupCallback = Box<dyn FnOnce() + Send>;

/// Finite-state machine plus registered cleanup callbacks (spec §4.5).
///
/// A single coarse lock protects the state; cleanup callbacks run
/// outside that lock so a callback may itself observe the lifecycle.
pub struct Lifecycle {
    state: Mutex<State>,
    cleanup: Mutex<Vec<CleanupCallback>>,
    name: &'static str,
}

impl Lifecycle {
    pub fn new(name: &'static str) -> Self {
        Lifecycle {
            state: Mutex::new(State::Uninitialized),
            cleanup: Mutex::new(Vec::new()),
            name,
        }
    }

    pub fn state(&self) -> State {
        self.state.lock().unwrap().clone()
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.state(), State::Ready | State::Busy)
    }

    pub fn is_available(&self) -> bool {
        !matches!(
            self.state(),
            State::Terminated | State::Error(_) | State::Terminating
        )
    }

    /// Attempt a transition; fails if `to` is not reachable from the
    /// current state (spec §4.5's table).
    pub fn transition(&self, to: State) -> Result<(), LifecycleTransitionError> {
        let mut guard = self.state.lock().unwrap();
        if !guard.discriminant_allows(&to) {
            return Err(LifecycleTransitionError {
                from: guard.clone(),
                to,
            });
        }
        log::debug!("{}: {} -> {}", self.name, *guard, to);
        *guard = to;
        Ok(())
    }

    pub fn add_cleanup(&self, callback: impl FnOnce() + Send + 'static) {
        self.cleanup.lock().unwrap().push(Box::new(callback));
    }

    /// Run every registered cleanup callback, in registration order.
    /// A callback's panic/error is logged and does not stop the rest
    /// (spec §4.5, §5 "Cleanup callbacks run in registration order").
    pub fn run_cleanup(&self) {
        let callbacks: Vec<_> = std::mem::take(&mut *self.cleanup.lock().unwrap());
        log::debug!("{}: running {} cleanup callbacks", self.name, callbacks.len());
        for callback in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(callback));
            if result.is_err() {
                log::error!("{}: cleanup callback panicked", self.name);
            }
        }
    }

    /// Scoped guard for the duration of one operation (spec §4.5
    /// `operation_context`): auto-advances
    /// `Uninitialized -> Initializing -> Ready` if needed, then
    /// `Ready -> Busy`; normal `Drop` returns `Busy -> Ready`; an
    /// explicit [`OperationGuard::fail`] transitions to `Error` instead.
    pub fn operation<'a>(&'a self, name: &str) -> Result<OperationGuard<'a>, LifecycleTransitionError> {
        if matches!(self.state(), State::Uninitialized) {
            self.transition(State::Initializing)?;
            self.transition(State::Ready)?;
        }
        if matches!(self.state(), State::Terminated | State::Terminating) {
            return Err(LifecycleTransitionError {
                from: self.state(),
                to: State::Busy,
            });
        }
        self.transition(State::Busy)?;
        Ok(OperationGuard {
            lifecycle: self,
            name: name.to_string(),
            failed: false,
        })
    }
}

/// RAII guard returned by [`Lifecycle::operation`].
pub struct OperationGuard<'a> {
    lifecycle: &'a Lifecycle,
    name: String,
    failed: bool,
}

impl OperationGuard<'_> {
    /// Transition to `Error(message)` instead of back to `Ready` on drop.
    pub fn fail(&mut self, message: impl Into<String>) {
        self.failed = true;
        if let Err(err) = self.lifecycle.transition(State::Error(message.into())) {
            log::error!("{}: {err}", self.lifecycle.name);
        }
    }
}

impl Drop for OperationGuard<'_> {
    fn drop(&mut self) {
        if self.failed {
            return;
        }
        if matches!(self.lifecycle.state(), State::Busy) {
            if let Err(err) = self.lifecycle.transition(State::Ready) {
                log::error!("{}: operation '{}': {err}", self.lifecycle.name, self.name);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn auto_advances_from_uninitialized() {
        let lc = Lifecycle::new("test");
        assert_eq!(lc.state(), State::Uninitialized);
        {
            let _guard = lc.operation("op").unwrap();
            assert_eq!(lc.state(), State::Busy);
        }
        assert_eq!(lc.state(), State::Ready);
    }

    #[test]
    fn invalid_transition_rejected() {
        let lc = Lifecycle::new("test");
        let err = lc.transition(State::Busy).unwrap_err();
        assert_eq!(err.from, State::Uninitialized);
        assert_eq!(err.to, State::Busy);
    }

    #[test]
    fn error_recovers_to_ready() {
        let lc = Lifecycle::new("test");
        lc.transition(State::Initializing).unwrap();
        lc.transition(State::Ready).unwrap();
        lc.transition(State::Error("boom".into())).unwrap();
        lc.transition(State::Ready).unwrap();
        assert_eq!(lc.state(), State::Ready);
    }

    #[test]
    fn terminated_is_terminal() {
        let lc = Lifecycle::new("test");
        lc.transition(State::Terminated).unwrap();
        assert!(lc.transition(State::Initializing).is_err());
    }

    #[test]
    fn cleanup_runs_in_order_and_survives_panics() {
        let lc = Lifecycle::new("test");
        let log = std::sync::Arc::new(Mutex::new(Vec::new()));
        let log1 = log.clone();
        lc.add_cleanup(move || log1.lock().unwrap().push(1));
        lc.add_cleanup(|| panic!("cleanup blew up"));
        let log3 = log.clone();
        lc.add_cleanup(move || log3.lock().unwrap().push(3));
        lc.run_cleanup();
        assert_eq!(*log.lock().unwrap(), vec![1, 3]);
    }

    #[test]
    fn operation_guard_fail_transitions_to_error() {
        let lc = Lifecycle::new("test");
        {
            let mut guard = lc.operation("op").unwrap();
            guard.fail("kaboom");
        }
        assert_eq!(lc.state(), State::Error("kaboom".to_string()));
    }
}
