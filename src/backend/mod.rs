//! Backend abstraction (spec §4.10): everything the dispatcher needs
//! from whatever is actually running the debuggee, decoupled from
//! whether that debuggee lives in this process or across an IPC pipe.
//!
//! Grounded on the split between `src/debugger/mod.rs` (the actual
//! ptrace-driving engine) and `src/ui/dap/mod.rs` (the thin session
//! that only ever calls through a trait-shaped surface) in the teacher:
//! the dispatcher here is written against [`Backend`] exactly the way
//! the teacher's DAP session is written against its `Debugger`, so
//! either an in-process interpreter or an external debuggee process can
//! sit behind it unmodified.

pub mod external;
pub mod inprocess;
pub mod toy;

use crate::error::BackendError;
use crate::session::variables::{ScopeKind, Variable};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepKind {
    Next,
    StepIn,
    StepOut,
}

#[derive(Debug, Clone)]
pub struct LaunchConfig {
    pub program: String,
    pub args: Vec<String>,
    pub stop_on_entry: bool,
}

#[derive(Debug, Clone)]
pub struct FrameInfo {
    pub name: String,
    pub path: String,
    pub line: i64,
    pub column: i64,
}

/// Events the backend originates on its own, without being asked
/// (spec §4.9's event router input). Translated into DAP client events
/// by [`crate::events::EventRouter`].
#[derive(Debug, Clone)]
pub enum InternalEvent {
    Stopped {
        thread_id: i64,
        reason: String,
        description: Option<String>,
    },
    ThreadStarted(i64),
    ThreadExited(i64),
    Continued {
        thread_id: i64,
        all_threads_continued: bool,
    },
    Output {
        category: String,
        text: String,
    },
    Exited {
        exit_code: i64,
    },
    Terminated,
    Exception {
        thread_id: i64,
        description: String,
        uncaught: bool,
    },
    DataSnapshot(std::collections::HashMap<String, String>),
}

/// The dispatcher's entire view of "the thing running the debuggee"
/// (spec §4.10). Implementors: [`inprocess::InProcessBackend`] for a
/// debuggee embedded in this process, [`external::ExternalBackend`]
/// for one reached over the binary-framed transport.
pub trait Backend: Send + Sync {
    fn launch(&self, config: LaunchConfig) -> Result<(), BackendError>;
    fn resume(&self, thread_id: i64) -> Result<(), BackendError>;
    fn step(&self, thread_id: i64, kind: StepKind) -> Result<(), BackendError>;
    fn pause(&self, thread_id: i64) -> Result<(), BackendError>;
    fn threads(&self) -> Result<Vec<crate::session::ThreadInfo>, BackendError>;
    /// Tells the backend which lines to stop before executing. The
    /// verified/line bookkeeping lives in [`crate::session::Session`];
    /// the backend only needs to know where to pause (spec §4.7).
    fn set_breakpoints(&self, path: &str, lines: Vec<i64>) -> Result<(), BackendError>;
    fn stack_trace(&self, thread_id: i64) -> Result<Vec<FrameInfo>, BackendError>;
    fn variables(&self, frame_id: i64, scope: ScopeKind) -> Result<Vec<Variable>, BackendError>;
    fn set_variable(
        &self,
        frame_id: i64,
        scope: ScopeKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, BackendError>;
    fn evaluate(&self, frame_id: Option<i64>, expression: &str) -> Result<Variable, BackendError>;
    fn data_snapshot(&self) -> Result<std::collections::HashMap<String, String>, BackendError>;
    fn terminate(&self) -> Result<(), BackendError>;

    /// Drains any events the backend has accumulated since the last
    /// call (spec §4.9). Never blocks.
    fn poll_events(&self) -> Vec<InternalEvent>;
}
