//! Translates backend-originated [`InternalEvent`]s into DAP client
//! events (spec §4.9).
//!
//! Grounded on `src/ui/dap/mod.rs::bs_dap.rs::drain_events`: that
//! function pre-scans a batch of debugger events and lets a
//! process-exit event dominate everything else queued alongside it,
//! rather than emitting a `stopped` the client will never get to act
//! on because the process is already gone. The same pre-scan is kept
//! here, generalized to the fuller event set spec §4.9 names.

use serde_json::json;

use crate::backend::InternalEvent;
use crate::message::Event;
use crate::session::Session;

pub struct EventRouter;

impl Default for EventRouter {
    fn default() -> Self {
        Self::new()
    }
}

impl EventRouter {
    pub fn new() -> Self {
        EventRouter
    }

    /// Converts one batch of backend events into the DAP events to
    /// send, in order. If the batch contains `Exited`/`Terminated`,
    /// every other event in the same batch is dropped (spec §4.9:
    /// "lifecycle events dominate").
    pub fn route(&self, events: Vec<InternalEvent>, session: &Session) -> Vec<Event> {
        let exit_code = events.iter().find_map(|e| match e {
            InternalEvent::Exited { exit_code } => Some(*exit_code),
            _ => None,
        });
        let terminated = events.iter().any(|e| matches!(e, InternalEvent::Terminated));

        if exit_code.is_some() || terminated {
            let mut out = Vec::new();
            if let Some(code) = exit_code {
                out.push(Event::new("exited", Some(json!({"exitCode": code}))));
            }
            if terminated {
                out.push(Event::new("terminated", None));
            }
            return out;
        }

        events
            .into_iter()
            .filter_map(|event| self.translate(event, session))
            .collect()
    }

    fn translate(&self, event: InternalEvent, session: &Session) -> Option<Event> {
        match event {
            InternalEvent::Stopped {
                thread_id,
                reason,
                description,
            } => Some(Event::new(
                "stopped",
                Some(json!({
                    "threadId": thread_id,
                    "reason": reason,
                    "description": description,
                    "allThreadsStopped": false,
                })),
            )),
            InternalEvent::ThreadStarted(id) => {
                Some(Event::new("thread", Some(json!({"reason": "started", "threadId": id}))))
            }
            InternalEvent::ThreadExited(id) => {
                Some(Event::new("thread", Some(json!({"reason": "exited", "threadId": id}))))
            }
            InternalEvent::Continued {
                thread_id,
                all_threads_continued,
            } => {
                // A resumed thread's cached frames and every variable
                // reference derived from them are now stale (spec §3
                // invariant, §8 testable property #6).
                session.clear_on_resume(thread_id);
                Some(Event::new(
                    "continued",
                    Some(json!({"threadId": thread_id, "allThreadsContinued": all_threads_continued})),
                ))
            }
            InternalEvent::Output { category, text } => {
                Some(Event::new("output", Some(json!({"category": category, "output": text}))))
            }
            InternalEvent::Exception {
                thread_id,
                description,
                uncaught,
            } => Some(Event::new(
                "stopped",
                Some(json!({
                    "threadId": thread_id,
                    "reason": "exception",
                    "description": description,
                    "text": if uncaught { "uncaught" } else { "raised" },
                })),
            )),
            InternalEvent::DataSnapshot(_) => None,
            InternalEvent::Exited { .. } | InternalEvent::Terminated => {
                unreachable!("handled by the lifecycle pre-scan in route()")
            }
        }
    }
}
