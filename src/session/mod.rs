//! Session store (spec §3): the single source of truth for everything
//! that the protocol engine and request dispatcher need to answer
//! questions about a running debuggee between `stopped` and `continued`.
//!
//! Grounded on `src/bin/bs_dap.rs`'s `Session` struct, which likewise
//! wraps one coarse lock around threads/frames/variables rather than a
//! lock per table — the same tables are almost always read together
//! (e.g. `stackTrace` needs both threads and frames), so a single lock
//! avoids lock-ordering bugs without adding real contention: requests
//! are already serialized per connection by the protocol engine.

pub mod breakpoints;
pub mod variables;
pub mod watches;

use std::collections::HashMap;
use std::sync::Mutex;

use serde::{Deserialize, Serialize};

use crate::correlator::Correlator;
use breakpoints::BreakpointRegistry;
use variables::VariableRefTable;
use watches::WatchRegistry;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ThreadInfo {
    pub id: i64,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StackFrame {
    pub id: i64,
    pub name: String,
    pub path: String,
    pub line: i64,
    pub column: i64,
}

/// Everything guarded by the single session lock.
#[derive(Default)]
struct SessionState {
    threads: HashMap<i64, ThreadInfo>,
    /// Stack frames are only meaningful while the owning thread is
    /// stopped; cleared for a thread on resume (spec §3 invariant).
    frames_by_thread: HashMap<i64, Vec<StackFrame>>,
    variable_refs: VariableRefTable,
    breakpoints: BreakpointRegistry,
    watches: WatchRegistry,
    next_frame_id: i64,
}

/// The session store. `pending_commands` lives in its own lock-free
/// [`Correlator`] rather than inside [`SessionState`] because its
/// callers block on `PendingCommand::wait` without holding any other
/// session data (spec §3 names it alongside the other tables, but
/// nothing else ever needs to observe it and the session lock at once).
pub struct Session {
    state: Mutex<SessionState>,
    pub pending_commands: Correlator,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Session {
            state: Mutex::new(SessionState {
                next_frame_id: 1,
                ..SessionState::default()
            }),
            pending_commands: Correlator::new(),
        }
    }

    pub fn set_threads(&self, threads: Vec<ThreadInfo>) {
        let mut state = self.state.lock().unwrap();
        state.threads = threads.into_iter().map(|t| (t.id, t)).collect();
    }

    pub fn threads(&self) -> Vec<ThreadInfo> {
        let state = self.state.lock().unwrap();
        let mut threads: Vec<_> = state.threads.values().cloned().collect();
        threads.sort_by_key(|t| t.id);
        threads
    }

    /// Replaces the stopped-frame snapshot for one thread, allocating
    /// fresh frame ids (spec §3: frame ids are also injective while
    /// the thread remains stopped).
    pub fn set_frames(&self, thread_id: i64, frames: Vec<(String, String, i64, i64)>) -> Vec<StackFrame> {
        let mut state = self.state.lock().unwrap();
        let mut stored = Vec::with_capacity(frames.len());
        for (name, path, line, column) in frames {
            let id = state.next_frame_id;
            state.next_frame_id += 1;
            stored.push(StackFrame {
                id,
                name,
                path,
                line,
                column,
            });
        }
        state.frames_by_thread.insert(thread_id, stored.clone());
        stored
    }

    pub fn frames(&self, thread_id: i64) -> Vec<StackFrame> {
        self.state
            .lock()
            .unwrap()
            .frames_by_thread
            .get(&thread_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn frame(&self, frame_id: i64) -> Option<StackFrame> {
        self.state
            .lock()
            .unwrap()
            .frames_by_thread
            .values()
            .flatten()
            .find(|f| f.id == frame_id)
            .cloned()
    }

    /// Resume-time cleanup: drops stale frames and every variable
    /// reference derived from them (spec §3 invariant, §8 testable
    /// property #6's "cleared wholesale on resume").
    pub fn clear_on_resume(&self, thread_id: i64) {
        let mut state = self.state.lock().unwrap();
        state.frames_by_thread.remove(&thread_id);
        state.variable_refs.clear();
    }

    /// Drops every thread's cached frames and all variable references,
    /// without touching breakpoints/watches or the correlator
    /// (spec §4.11: hot reload invalidates stale frame/variable state
    /// without tearing down the whole session). Returns how many
    /// frames were actually invalidated, for `hotReloadResult`'s
    /// `reboundFrames` counter.
    pub fn invalidate_all_frames(&self) -> usize {
        let mut state = self.state.lock().unwrap();
        let count = state.frames_by_thread.values().map(Vec::len).sum();
        state.frames_by_thread.clear();
        state.variable_refs.clear();
        count
    }

    pub fn alloc_variable_ref(&self, target: variables::RefTarget) -> i64 {
        self.state.lock().unwrap().variable_refs.alloc(target)
    }

    pub fn resolve_variable_ref(&self, handle: i64) -> Option<variables::RefTarget> {
        match self.state.lock().unwrap().variable_refs.get(handle) {
            Some(variables::RefTarget::Scope { frame_id, scope }) => Some(variables::RefTarget::Scope {
                frame_id: *frame_id,
                scope: *scope,
            }),
            Some(variables::RefTarget::Cached(vars)) => Some(variables::RefTarget::Cached(vars.clone())),
            None => None,
        }
    }

    pub fn with_breakpoints<R>(&self, f: impl FnOnce(&mut BreakpointRegistry) -> R) -> R {
        f(&mut self.state.lock().unwrap().breakpoints)
    }

    pub fn with_watches<R>(&self, f: impl FnOnce(&mut WatchRegistry) -> R) -> R {
        f(&mut self.state.lock().unwrap().watches)
    }

    /// Full teardown at disconnect/terminate (spec §4.9): clears every
    /// table and drains the correlator so no caller is left blocked.
    pub fn shutdown(&self) {
        let mut state = self.state.lock().unwrap();
        state.threads.clear();
        state.frames_by_thread.clear();
        state.variable_refs.clear();
        drop(state);
        self.pending_commands.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_ids_are_injective_across_threads() {
        let session = Session::new();
        let f1 = session.set_frames(1, vec![("main".into(), "/a.py".into(), 1, 0)]);
        let f2 = session.set_frames(2, vec![("other".into(), "/b.py".into(), 2, 0)]);
        assert_ne!(f1[0].id, f2[0].id);
    }

    #[test]
    fn resume_clears_frames_and_variable_refs() {
        let session = Session::new();
        session.set_frames(1, vec![("main".into(), "/a.py".into(), 1, 0)]);
        let handle = session.alloc_variable_ref(variables::RefTarget::Cached(vec![]));
        assert!(session.resolve_variable_ref(handle).is_some());

        session.clear_on_resume(1);
        assert!(session.frames(1).is_empty());
        assert!(session.resolve_variable_ref(handle).is_none());
    }

    #[test]
    fn shutdown_drains_pending_commands() {
        let session = Session::new();
        let pending = session.pending_commands.register();
        session.shutdown();
        assert!(pending.wait(&session.pending_commands, "evaluate", None).is_err());
    }

    #[test]
    fn threads_are_returned_sorted_by_id() {
        let session = Session::new();
        session.set_threads(vec![
            ThreadInfo { id: 2, name: "b".into() },
            ThreadInfo { id: 1, name: "a".into() },
        ]);
        let ids: Vec<_> = session.threads().into_iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![1, 2]);
    }
}
