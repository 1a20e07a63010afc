//! In-process backend (spec §4.10): wraps an embedded [`Interpreter`]
//! directly, no IPC, no correlator.
//!
//! Grounded on `src/debugger/mod.rs`'s `Debugger` being driven by direct
//! method calls from its owning thread, with `EventHook` pushing
//! notifications the UI layer polls rather than blocks on; here that
//! becomes a plain `Mutex<VecDeque<InternalEvent>>` queue, since the
//! in-process case has no network round trip to hide latency behind.

use std::collections::{HashMap, VecDeque};
use std::sync::Mutex;

use crate::error::BackendError;
use crate::session::variables::{ScopeKind, Variable};

use super::{Backend, FrameInfo, InternalEvent, LaunchConfig, StepKind};

/// A language engine embeddable directly in this process (spec §4.10:
/// "InProcess ... calls debugger methods directly").
pub trait Interpreter: Send {
    fn launch(&mut self, config: &LaunchConfig) -> Result<Vec<InternalEvent>, BackendError>;
    fn resume(&mut self, thread_id: i64) -> Result<Vec<InternalEvent>, BackendError>;
    fn step(&mut self, thread_id: i64, kind: StepKind) -> Result<Vec<InternalEvent>, BackendError>;
    fn pause(&mut self, thread_id: i64) -> Result<Vec<InternalEvent>, BackendError>;
    fn threads(&self) -> Vec<crate::session::ThreadInfo>;
    fn set_breakpoints(&mut self, path: &str, lines: Vec<i64>);
    fn stack_trace(&self, thread_id: i64) -> Vec<FrameInfo>;
    fn variables(&self, frame_id: i64, scope: ScopeKind) -> Vec<Variable>;
    fn set_variable(
        &mut self,
        frame_id: i64,
        scope: ScopeKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, BackendError>;
    fn evaluate(&mut self, frame_id: Option<i64>, expression: &str) -> Result<Variable, BackendError>;
    fn data_snapshot(&self) -> HashMap<String, String>;
    fn terminate(&mut self) -> Vec<InternalEvent>;
}

pub struct InProcessBackend<I: Interpreter> {
    inner: Mutex<I>,
    events: Mutex<VecDeque<InternalEvent>>,
}

impl<I: Interpreter> InProcessBackend<I> {
    pub fn new(interpreter: I) -> Self {
        InProcessBackend {
            inner: Mutex::new(interpreter),
            events: Mutex::new(VecDeque::new()),
        }
    }

    fn push_all(&self, events: Vec<InternalEvent>) {
        let mut queue = self.events.lock().unwrap();
        queue.extend(events);
    }
}

impl<I: Interpreter> Backend for InProcessBackend<I> {
    fn launch(&self, config: LaunchConfig) -> Result<(), BackendError> {
        let events = self.inner.lock().unwrap().launch(&config)?;
        self.push_all(events);
        Ok(())
    }

    fn resume(&self, thread_id: i64) -> Result<(), BackendError> {
        let events = self.inner.lock().unwrap().resume(thread_id)?;
        self.push_all(events);
        Ok(())
    }

    fn step(&self, thread_id: i64, kind: StepKind) -> Result<(), BackendError> {
        let events = self.inner.lock().unwrap().step(thread_id, kind)?;
        self.push_all(events);
        Ok(())
    }

    fn pause(&self, thread_id: i64) -> Result<(), BackendError> {
        let events = self.inner.lock().unwrap().pause(thread_id)?;
        self.push_all(events);
        Ok(())
    }

    fn threads(&self) -> Result<Vec<crate::session::ThreadInfo>, BackendError> {
        Ok(self.inner.lock().unwrap().threads())
    }

    fn set_breakpoints(&self, path: &str, lines: Vec<i64>) -> Result<(), BackendError> {
        self.inner.lock().unwrap().set_breakpoints(path, lines);
        Ok(())
    }

    fn stack_trace(&self, thread_id: i64) -> Result<Vec<FrameInfo>, BackendError> {
        Ok(self.inner.lock().unwrap().stack_trace(thread_id))
    }

    fn variables(&self, frame_id: i64, scope: ScopeKind) -> Result<Vec<Variable>, BackendError> {
        Ok(self.inner.lock().unwrap().variables(frame_id, scope))
    }

    fn set_variable(
        &self,
        frame_id: i64,
        scope: ScopeKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, BackendError> {
        self.inner.lock().unwrap().set_variable(frame_id, scope, name, value)
    }

    fn evaluate(&self, frame_id: Option<i64>, expression: &str) -> Result<Variable, BackendError> {
        self.inner.lock().unwrap().evaluate(frame_id, expression)
    }

    fn data_snapshot(&self) -> Result<HashMap<String, String>, BackendError> {
        Ok(self.inner.lock().unwrap().data_snapshot())
    }

    fn terminate(&self) -> Result<(), BackendError> {
        let events = self.inner.lock().unwrap().terminate();
        self.push_all(events);
        Ok(())
    }

    fn poll_events(&self) -> Vec<InternalEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}
