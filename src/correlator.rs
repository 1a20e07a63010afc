//! Command correlator (spec §4.4): tags outbound adapter→debuggee
//! commands with a numeric id and resolves the matching pending future
//! when a response with that id arrives.
//!
//! Grounded on `src/ui/dap/mod.rs::Session::request`, which already
//! does exactly this with a single-shot `mpsc::sync_channel(0)` per
//! call; generalized here into a table keyed by id (the teacher only
//! ever had one command in flight at a time, driven by its single
//! debugger worker thread) so multiple commands can be outstanding
//! concurrently, as spec §4.4/§5 requires.

use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::time::Duration;

use serde_json::Value;

use crate::error::TimeoutError;

/// What a pending command resolves to.
enum Outcome {
    Response(Value),
    ShutdownCancelled,
}

/// A one-shot handle a calling coroutine awaits (spec §9: "The
/// correlator's future becomes a one-shot channel").
pub struct PendingCommand {
    id: i64,
    receiver: Receiver<Outcome>,
}

impl PendingCommand {
    pub fn id(&self) -> i64 {
        self.id
    }

    /// Blocks for the response, honoring an optional timeout (spec §4.4
    /// step 4, §6 `DAPPER_COMMAND_RESPONSE_TIMEOUT_SECONDS`). On timeout
    /// the entry is removed from `correlator`'s table (spec §4.4 step
    /// 6) so a response that arrives late finds nothing to resolve.
    pub fn wait(self, correlator: &Correlator, command: &str, timeout: Option<Duration>) -> Result<Value, CorrelatorError> {
        let outcome = match timeout {
            Some(d) => match self.receiver.recv_timeout(d) {
                Ok(outcome) => outcome,
                Err(_) => {
                    correlator.pending.lock().unwrap().remove(&self.id);
                    return Err(CorrelatorError::Timeout(TimeoutError {
                        command: command.to_string(),
                        seconds: d.as_secs_f64(),
                    }));
                }
            },
            None => self
                .receiver
                .recv()
                .map_err(|_| CorrelatorError::Shutdown)?,
        };
        match outcome {
            Outcome::Response(value) => Ok(value),
            Outcome::ShutdownCancelled => Err(CorrelatorError::Shutdown),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CorrelatorError {
    #[error(transparent)]
    Timeout(#[from] TimeoutError),
    #[error("adapter is shutting down")]
    Shutdown,
}

/// The correlator table (spec §3 `pending_commands`, §4.4).
pub struct Correlator {
    next_id: AtomicI64,
    pending: Mutex<HashMap<i64, Sender<Outcome>>>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Correlator {
            next_id: AtomicI64::new(1),
            pending: Mutex::new(HashMap::new()),
        }
    }

    /// Allocates the next command id and registers a pending entry.
    /// Callers for which no response is expected skip this and write
    /// their command frame directly (spec §4.4 "bypass steps 1 and 2").
    pub fn register(&self) -> PendingCommand {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let (tx, rx) = mpsc::channel();
        self.pending.lock().unwrap().insert(id, tx);
        PendingCommand { id, receiver: rx }
    }

    /// Resolves a pending command with the matching id. Returns
    /// `false` if no such entry exists (already timed out, cancelled,
    /// or an unknown id arrived) — crosstalk is thereby impossible
    /// (spec §8 testable property #4): the table is keyed by id, so a
    /// stray response can only ever resolve the one future filed under
    /// that exact id, never another.
    pub fn resolve(&self, id: i64, response: Value) -> bool {
        if let Some(tx) = self.pending.lock().unwrap().remove(&id) {
            let _ = tx.send(Outcome::Response(response));
            true
        } else {
            false
        }
    }

    /// Removes a pending entry without resolving it (spec §5:
    /// client-initiated `cancel`).
    pub fn cancel(&self, id: i64) -> bool {
        self.pending.lock().unwrap().remove(&id).is_some()
    }

    /// Drains the table, failing every remaining entry with a shutdown
    /// error (spec §3 invariant, §4.9, §8 testable property #7).
    pub fn shutdown(&self) {
        let pending = std::mem::take(&mut *self.pending.lock().unwrap());
        for (_, tx) in pending {
            let _ = tx.send(Outcome::ShutdownCancelled);
        }
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn resolve_delivers_matching_response_no_crosstalk() {
        let correlator = Correlator::new();
        let a = correlator.register();
        let b = correlator.register();
        assert_ne!(a.id(), b.id());

        assert!(correlator.resolve(b.id(), json!({"from": "b"})));
        assert!(correlator.resolve(a.id(), json!({"from": "a"})));

        assert_eq!(a.wait(&correlator, "cmd", None).unwrap(), json!({"from": "a"}));
        assert_eq!(b.wait(&correlator, "cmd", None).unwrap(), json!({"from": "b"}));
    }

    #[test]
    fn unknown_id_does_not_resolve_anything() {
        let correlator = Correlator::new();
        assert!(!correlator.resolve(999, json!(null)));
    }

    #[test]
    fn shutdown_fails_every_outstanding_entry() {
        let correlator = Correlator::new();
        let pending: Vec<_> = (0..5).map(|_| correlator.register()).collect();
        assert_eq!(correlator.pending_count(), 5);
        correlator.shutdown();
        assert_eq!(correlator.pending_count(), 0);
        for p in pending {
            assert!(matches!(p.wait(&correlator, "cmd", None), Err(CorrelatorError::Shutdown)));
        }
    }

    #[test]
    fn timeout_removes_entry_and_fails_caller() {
        let correlator = Correlator::new();
        let pending = correlator.register();
        let id = pending.id();
        assert_eq!(correlator.pending_count(), 1);
        let err = pending
            .wait(&correlator, "evaluate", Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, CorrelatorError::Timeout(_)));
        assert_eq!(correlator.pending_count(), 0);
        assert!(!correlator.resolve(id, json!(null)));
    }

    #[test]
    fn resolve_from_another_thread_is_observed() {
        let correlator = std::sync::Arc::new(Correlator::new());
        let pending = correlator.register();
        let id = pending.id();
        let c2 = correlator.clone();
        thread::spawn(move || {
            thread::sleep(Duration::from_millis(10));
            c2.resolve(id, json!({"ok": true}));
        });
        assert_eq!(pending.wait(&correlator, "cmd", Some(Duration::from_secs(2))).unwrap(), json!({"ok": true}));
    }

    #[test]
    fn cancel_removes_pending_without_resolving() {
        let correlator = Correlator::new();
        let pending = correlator.register();
        assert!(correlator.cancel(pending.id()));
        assert!(!correlator.resolve(pending.id(), json!(null)));
    }
}
