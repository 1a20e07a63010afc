//! External backend (spec §4.10): the debuggee runs in its own
//! process, reached over the binary-framed transport, with commands
//! correlated by id exactly like [`crate::correlator::Correlator`]
//! documents.
//!
//! Grounded on `src/ui/dap/mod.rs::Session::request`/`Session::notify`:
//! the teacher writes a tagged command and waits on a channel for the
//! matching reply; here that's generalized to run over a real
//! transport with a background reader thread pumping frames in (the
//! teacher's debuggee was ptrace-attached, not a separate network
//! peer, so it never needed one).

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde_json::{json, Value};

use crate::correlator::Correlator;
use crate::error::BackendError;
use crate::framing::{read_binary_frame, write_binary_frame, BinaryFrameKind};
use crate::session::variables::{ScopeKind, Variable};
use crate::session::ThreadInfo;
use crate::transport::DuplexStream;

use super::{Backend, FrameInfo, InternalEvent, LaunchConfig, StepKind};

pub struct ExternalBackend {
    writer: Mutex<crate::transport::WriteHalf>,
    correlator: Arc<Correlator>,
    events: Arc<Mutex<VecDeque<InternalEvent>>>,
    reader: Option<std::thread::JoinHandle<()>>,
    /// Per-command response timeout (spec §4.4 step 4, §6
    /// `DAPPER_COMMAND_RESPONSE_TIMEOUT_SECONDS`); `None` means wait
    /// forever, the spec's default.
    timeout: Option<Duration>,
}

impl ExternalBackend {
    /// `timeout` is the per-command response timeout threaded in from
    /// `Args::command_response_timeout_seconds` (spec §6); `None` means
    /// unlimited.
    pub fn new(stream: DuplexStream, timeout: Option<Duration>) -> Self {
        let (mut read_half, write_half) = stream.split();
        let correlator = Arc::new(Correlator::new());
        let events = Arc::new(Mutex::new(VecDeque::new()));

        let reader_correlator = correlator.clone();
        let reader_events = events.clone();
        let reader = std::thread::spawn(move || loop {
            match read_binary_frame(read_half.reader()) {
                Ok(Some((BinaryFrameKind::FromDebuggee, value))) => {
                    if let Some(id) = value.get("id").and_then(Value::as_i64) {
                        let resolved = if value.get("ok").and_then(Value::as_bool) == Some(false) {
                            json!({"error": value.get("error").cloned().unwrap_or(Value::Null)})
                        } else {
                            value.get("value").cloned().unwrap_or(Value::Null)
                        };
                        reader_correlator.resolve(id, resolved);
                    } else if let Some(event) = parse_event(&value) {
                        reader_events.lock().unwrap().push_back(event);
                    }
                }
                Ok(Some((BinaryFrameKind::ToDebuggee, _))) => {
                    log::warn!("external backend: received a ToDebuggee-tagged frame, ignoring");
                }
                Ok(None) => {
                    log::debug!("external backend: connection closed");
                    reader_correlator.shutdown();
                    return;
                }
                Err(err) => {
                    log::error!("external backend: framing error: {err}");
                    reader_correlator.shutdown();
                    return;
                }
            }
        });

        ExternalBackend {
            writer: Mutex::new(write_half),
            correlator,
            events,
            reader: Some(reader),
            timeout,
        }
    }

    fn call(&self, op: &str, args: Value) -> Result<Value, BackendError> {
        let pending = self.correlator.register();
        let frame = json!({"id": pending.id(), "op": op, "args": args});
        {
            let mut writer = self.writer.lock().unwrap();
            write_binary_frame(writer.writer(), BinaryFrameKind::ToDebuggee, &frame)
                .map_err(|e| BackendError::Reported(e.to_string()))?;
        }
        let response = pending
            .wait(&self.correlator, op, self.timeout)
            .map_err(|e| BackendError::Reported(e.to_string()))?;
        if let Some(error) = response.get("error").filter(|v| !v.is_null()) {
            return Err(BackendError::Reported(error.to_string()));
        }
        Ok(response)
    }
}

impl Drop for ExternalBackend {
    fn drop(&mut self) {
        self.correlator.shutdown();
        if let Some(handle) = self.reader.take() {
            let _ = handle.join();
        }
    }
}

impl Backend for ExternalBackend {
    fn launch(&self, config: LaunchConfig) -> Result<(), BackendError> {
        self.call(
            "launch",
            json!({"program": config.program, "args": config.args, "stopOnEntry": config.stop_on_entry}),
        )?;
        Ok(())
    }

    fn resume(&self, thread_id: i64) -> Result<(), BackendError> {
        self.call("resume", json!({"threadId": thread_id}))?;
        Ok(())
    }

    fn step(&self, thread_id: i64, kind: StepKind) -> Result<(), BackendError> {
        let op = match kind {
            StepKind::Next => "next",
            StepKind::StepIn => "stepIn",
            StepKind::StepOut => "stepOut",
        };
        self.call(op, json!({"threadId": thread_id}))?;
        Ok(())
    }

    fn pause(&self, thread_id: i64) -> Result<(), BackendError> {
        self.call("pause", json!({"threadId": thread_id}))?;
        Ok(())
    }

    fn threads(&self) -> Result<Vec<ThreadInfo>, BackendError> {
        let value = self.call("threads", json!({}))?;
        serde_json::from_value(value).map_err(|e| BackendError::Reported(e.to_string()))
    }

    fn set_breakpoints(&self, path: &str, lines: Vec<i64>) -> Result<(), BackendError> {
        self.call("setBreakpoints", json!({"path": path, "lines": lines}))?;
        Ok(())
    }

    fn stack_trace(&self, thread_id: i64) -> Result<Vec<FrameInfo>, BackendError> {
        let value = self.call("stackTrace", json!({"threadId": thread_id}))?;
        let raw: Vec<(String, String, i64, i64)> =
            serde_json::from_value(value).map_err(|e| BackendError::Reported(e.to_string()))?;
        Ok(raw
            .into_iter()
            .map(|(name, path, line, column)| FrameInfo { name, path, line, column })
            .collect())
    }

    fn variables(&self, frame_id: i64, scope: ScopeKind) -> Result<Vec<Variable>, BackendError> {
        let scope_name = match scope {
            ScopeKind::Locals => "locals",
            ScopeKind::Globals => "globals",
        };
        let value = self.call("variables", json!({"frameId": frame_id, "scope": scope_name}))?;
        serde_json::from_value(value).map_err(|e| BackendError::Reported(e.to_string()))
    }

    fn set_variable(
        &self,
        frame_id: i64,
        scope: ScopeKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, BackendError> {
        let scope_name = match scope {
            ScopeKind::Locals => "locals",
            ScopeKind::Globals => "globals",
        };
        let response = self.call(
            "setVariable",
            json!({"frameId": frame_id, "scope": scope_name, "name": name, "value": value}),
        )?;
        serde_json::from_value(response).map_err(|e| BackendError::Reported(e.to_string()))
    }

    fn evaluate(&self, frame_id: Option<i64>, expression: &str) -> Result<Variable, BackendError> {
        let response = self.call("evaluate", json!({"frameId": frame_id, "expression": expression}))?;
        serde_json::from_value(response).map_err(|e| BackendError::Reported(e.to_string()))
    }

    fn data_snapshot(&self) -> Result<HashMap<String, String>, BackendError> {
        let value = self.call("dataSnapshot", json!({}))?;
        serde_json::from_value(value).map_err(|e| BackendError::Reported(e.to_string()))
    }

    fn terminate(&self) -> Result<(), BackendError> {
        self.call("terminate", json!({}))?;
        Ok(())
    }

    fn poll_events(&self) -> Vec<InternalEvent> {
        self.events.lock().unwrap().drain(..).collect()
    }
}

fn parse_event(value: &Value) -> Option<InternalEvent> {
    let name = value.get("event")?.as_str()?;
    match name {
        "stopped" => Some(InternalEvent::Stopped {
            thread_id: value.get("threadId")?.as_i64()?,
            reason: value.get("reason")?.as_str()?.to_string(),
            description: value.get("description").and_then(Value::as_str).map(str::to_string),
        }),
        "threadStarted" => Some(InternalEvent::ThreadStarted(value.get("threadId")?.as_i64()?)),
        "threadExited" => Some(InternalEvent::ThreadExited(value.get("threadId")?.as_i64()?)),
        "continued" => Some(InternalEvent::Continued {
            thread_id: value.get("threadId")?.as_i64()?,
            all_threads_continued: value
                .get("allThreadsContinued")
                .and_then(Value::as_bool)
                .unwrap_or(false),
        }),
        "output" => Some(InternalEvent::Output {
            category: value.get("category").and_then(Value::as_str).unwrap_or("stdout").to_string(),
            text: value.get("text")?.as_str()?.to_string(),
        }),
        "exited" => Some(InternalEvent::Exited {
            exit_code: value.get("exitCode").and_then(Value::as_i64).unwrap_or(0),
        }),
        "terminated" => Some(InternalEvent::Terminated),
        "exception" => Some(InternalEvent::Exception {
            thread_id: value.get("threadId")?.as_i64()?,
            description: value.get("description")?.as_str()?.to_string(),
            uncaught: value.get("uncaught").and_then(Value::as_bool).unwrap_or(true),
        }),
        _ => {
            log::warn!("external backend: unknown event '{name}'");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::{connect, Listener, TransportKind};

    /// A debuggee stub: accepts one connection, answers exactly
    /// `requests` commands with `{"id", "ok": true, "value": echoed
    /// args}`, then closes the connection. Serving a bounded number of
    /// requests (rather than looping until the peer hangs up) matters
    /// here: [`ExternalBackend::drop`] joins its reader thread, which
    /// only returns once it observes EOF, so the stub must actually let
    /// the socket close once the test is done with it.
    fn spawn_stub_debuggee(requests: usize) -> (u16, std::thread::JoinHandle<()>) {
        let listener = Listener::bind_tcp("127.0.0.1", 0).unwrap();
        let port = listener.bound_port().unwrap();
        let handle = std::thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            listener.close();
            for _ in 0..requests {
                match read_binary_frame(conn.reader()) {
                    Ok(Some((BinaryFrameKind::ToDebuggee, value))) => {
                        let id = value.get("id").cloned().unwrap_or(Value::Null);
                        let response = json!({"id": id, "ok": true, "value": value.get("args").cloned().unwrap_or(Value::Null)});
                        write_binary_frame(conn.writer(), BinaryFrameKind::FromDebuggee, &response).unwrap();
                    }
                    _ => return,
                }
            }
        });
        (port, handle)
    }

    #[test]
    fn call_round_trips_through_a_real_socket() {
        let (port, debuggee) = spawn_stub_debuggee(1);
        let stream = connect(TransportKind::Tcp, &format!("127.0.0.1:{port}")).unwrap();
        let backend = ExternalBackend::new(stream, Some(Duration::from_secs(5)));

        backend
            .launch(LaunchConfig {
                program: "prog.toy".to_string(),
                args: vec![],
                stop_on_entry: false,
            })
            .unwrap();
        debuggee.join().unwrap();
    }

    #[test]
    fn default_timeout_is_unlimited() {
        let (port, debuggee) = spawn_stub_debuggee(0);
        let stream = connect(TransportKind::Tcp, &format!("127.0.0.1:{port}")).unwrap();
        let backend = ExternalBackend::new(stream, None);
        assert_eq!(backend.timeout, None);
        debuggee.join().unwrap();
    }

    #[test]
    fn call_reports_debuggee_error_response() {
        let listener = Listener::bind_tcp("127.0.0.1", 0).unwrap();
        let port = listener.bound_port().unwrap();
        let server = std::thread::spawn(move || {
            let mut conn = listener.accept().unwrap();
            listener.close();
            let (_, value) = read_binary_frame(conn.reader()).unwrap().unwrap();
            let id = value.get("id").cloned().unwrap_or(Value::Null);
            let response = json!({"id": id, "ok": false, "error": "boom"});
            write_binary_frame(conn.writer(), BinaryFrameKind::FromDebuggee, &response).unwrap();
        });
        let stream = connect(TransportKind::Tcp, &format!("127.0.0.1:{port}")).unwrap();
        let backend = ExternalBackend::new(stream, Some(Duration::from_secs(5)));

        let err = backend.pause(1).unwrap_err();
        assert!(matches!(err, BackendError::Reported(_)));
        server.join().unwrap();
    }

    #[test]
    fn call_times_out_when_debuggee_never_answers() {
        let listener = Listener::bind_tcp("127.0.0.1", 0).unwrap();
        let port = listener.bound_port().unwrap();
        let server = std::thread::spawn(move || {
            let conn = listener.accept().unwrap();
            listener.close();
            conn
        });
        let stream = connect(TransportKind::Tcp, &format!("127.0.0.1:{port}")).unwrap();
        let backend = ExternalBackend::new(stream, Some(Duration::from_millis(50)));

        let err = backend.pause(1).unwrap_err();
        assert!(matches!(err, BackendError::Reported(_)));
        drop(server.join().unwrap());
    }
}
