//! A tiny line-stepping toy language, used as the reference
//! [`Interpreter`] for the end-to-end test scenarios (spec §8 S1-S6).
//!
//! Real debuggee languages are out of scope for this crate; this toy
//! stands in for "the dynamic interpreted language" spec.md leaves
//! abstract, the same way `src/debugger/`'s test fixtures under
//! `examples/` give the teacher's own integration tests something real
//! to step through without needing a full external program.
//!
//! Grammar, one statement per line:
//!   NAME = INT                 assignment of an integer literal
//!   NAME = NAME + INT          addition of a literal to a variable
//!   print NAME                 emits an `output` event with its value
//!   raise MESSAGE              raises an uncaught exception
//!   # ...                      comment, no-op
//!   (blank line)                no-op

use std::collections::{HashMap, HashSet};

use crate::error::BackendError;
use crate::session::variables::{ScopeKind, Variable};
use crate::session::ThreadInfo;

use super::inprocess::Interpreter;
use super::{FrameInfo, InternalEvent, LaunchConfig, StepKind};

const THREAD_ID: i64 = 1;

#[derive(Default)]
pub struct ToyBackend {
    program_name: String,
    lines: Vec<String>,
    pc: usize,
    locals: HashMap<String, i64>,
    breakpoint_lines: HashSet<i64>,
    terminated: bool,
}

impl ToyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn current_line_no(&self) -> i64 {
        (self.pc + 1) as i64
    }

    /// Executes the statement at `pc`. Returns `Ok(Some(text))` for a
    /// `print`, `Ok(None)` otherwise, `Err(message)` for `raise`.
    fn execute_current(&mut self) -> Result<Option<String>, String> {
        let line = self.lines[self.pc].trim().to_string();
        if line.is_empty() || line.starts_with('#') {
            return Ok(None);
        }
        if let Some(rest) = line.strip_prefix("print ") {
            let name = rest.trim();
            let value = self.locals.get(name).copied().unwrap_or(0);
            return Ok(Some(format!("{value}")));
        }
        if let Some(rest) = line.strip_prefix("raise ") {
            return Err(rest.trim().to_string());
        }
        if let Some((lhs, rhs)) = line.split_once('=') {
            let name = lhs.trim().to_string();
            let rhs = rhs.trim();
            let value = if let Some((base, delta)) = rhs.split_once('+') {
                let base = base.trim();
                let delta: i64 = delta.trim().parse().unwrap_or(0);
                self.locals.get(base).copied().unwrap_or(0) + delta
            } else {
                rhs.parse().unwrap_or(0)
            };
            self.locals.insert(name, value);
            return Ok(None);
        }
        Err(format!("syntax error at line {}: {line}", self.current_line_no()))
    }
}

impl Interpreter for ToyBackend {
    fn launch(&mut self, config: &LaunchConfig) -> Result<Vec<InternalEvent>, BackendError> {
        self.program_name = config.program.clone();
        self.lines = config.args.clone();
        self.pc = 0;
        self.locals.clear();
        self.terminated = false;
        let mut events = vec![InternalEvent::ThreadStarted(THREAD_ID)];
        if config.stop_on_entry {
            events.push(InternalEvent::Stopped {
                thread_id: THREAD_ID,
                reason: "entry".to_string(),
                description: None,
            });
        } else {
            events.extend(self.resume(THREAD_ID)?);
        }
        Ok(events)
    }

    fn resume(&mut self, _thread_id: i64) -> Result<Vec<InternalEvent>, BackendError> {
        let mut events = Vec::new();
        loop {
            if self.terminated || self.pc >= self.lines.len() {
                events.push(InternalEvent::Exited { exit_code: 0 });
                events.push(InternalEvent::Terminated);
                self.terminated = true;
                return Ok(events);
            }
            match self.execute_current() {
                Ok(Some(text)) => events.push(InternalEvent::Output {
                    category: "stdout".to_string(),
                    text,
                }),
                Ok(None) => {}
                Err(message) => {
                    events.push(InternalEvent::Exception {
                        thread_id: THREAD_ID,
                        description: message,
                        uncaught: true,
                    });
                    events.push(InternalEvent::Stopped {
                        thread_id: THREAD_ID,
                        reason: "exception".to_string(),
                        description: None,
                    });
                    self.pc += 1;
                    return Ok(events);
                }
            }
            self.pc += 1;
            if self.pc < self.lines.len() && self.breakpoint_lines.contains(&self.current_line_no()) {
                events.push(InternalEvent::Stopped {
                    thread_id: THREAD_ID,
                    reason: "breakpoint".to_string(),
                    description: None,
                });
                return Ok(events);
            }
        }
    }

    fn step(&mut self, _thread_id: i64, _kind: StepKind) -> Result<Vec<InternalEvent>, BackendError> {
        if self.terminated || self.pc >= self.lines.len() {
            return Ok(vec![InternalEvent::Exited { exit_code: 0 }, InternalEvent::Terminated]);
        }
        let mut events = Vec::new();
        match self.execute_current() {
            Ok(Some(text)) => events.push(InternalEvent::Output {
                category: "stdout".to_string(),
                text,
            }),
            Ok(None) => {}
            Err(message) => {
                events.push(InternalEvent::Exception {
                    thread_id: THREAD_ID,
                    description: message,
                    uncaught: true,
                });
                events.push(InternalEvent::Stopped {
                    thread_id: THREAD_ID,
                    reason: "exception".to_string(),
                    description: None,
                });
                self.pc += 1;
                return Ok(events);
            }
        }
        self.pc += 1;
        if self.pc >= self.lines.len() {
            events.push(InternalEvent::Exited { exit_code: 0 });
            events.push(InternalEvent::Terminated);
            self.terminated = true;
        } else {
            events.push(InternalEvent::Stopped {
                thread_id: THREAD_ID,
                reason: "step".to_string(),
                description: None,
            });
        }
        Ok(events)
    }

    fn pause(&mut self, _thread_id: i64) -> Result<Vec<InternalEvent>, BackendError> {
        Ok(vec![InternalEvent::Stopped {
            thread_id: THREAD_ID,
            reason: "pause".to_string(),
            description: None,
        }])
    }

    fn threads(&self) -> Vec<ThreadInfo> {
        if self.terminated {
            return Vec::new();
        }
        vec![ThreadInfo {
            id: THREAD_ID,
            name: "main".to_string(),
        }]
    }

    fn set_breakpoints(&mut self, _path: &str, lines: Vec<i64>) {
        self.breakpoint_lines = lines.into_iter().collect();
    }

    fn stack_trace(&self, _thread_id: i64) -> Vec<FrameInfo> {
        if self.terminated {
            return Vec::new();
        }
        vec![FrameInfo {
            name: "<module>".to_string(),
            path: self.program_name.clone(),
            line: self.current_line_no(),
            column: 0,
        }]
    }

    fn variables(&self, _frame_id: i64, scope: ScopeKind) -> Vec<Variable> {
        if scope == ScopeKind::Globals {
            return Vec::new();
        }
        let mut names: Vec<_> = self.locals.keys().cloned().collect();
        names.sort();
        names
            .into_iter()
            .map(|name| {
                let value = self.locals[&name];
                Variable {
                    name,
                    value: value.to_string(),
                    ty: Some("int".to_string()),
                    variables_reference: 0,
                }
            })
            .collect()
    }

    fn set_variable(
        &mut self,
        _frame_id: i64,
        _scope: ScopeKind,
        name: &str,
        value: &str,
    ) -> Result<Variable, BackendError> {
        let parsed: i64 = value
            .trim()
            .parse()
            .map_err(|_| BackendError::Reported(format!("not an integer: {value}")))?;
        self.locals.insert(name.to_string(), parsed);
        Ok(Variable {
            name: name.to_string(),
            value: parsed.to_string(),
            ty: Some("int".to_string()),
            variables_reference: 0,
        })
    }

    fn evaluate(&mut self, _frame_id: Option<i64>, expression: &str) -> Result<Variable, BackendError> {
        let expression = expression.trim();
        if let Some(value) = self.locals.get(expression) {
            return Ok(Variable {
                name: expression.to_string(),
                value: value.to_string(),
                ty: Some("int".to_string()),
                variables_reference: 0,
            });
        }
        if let Ok(value) = expression.parse::<i64>() {
            return Ok(Variable {
                name: expression.to_string(),
                value: value.to_string(),
                ty: Some("int".to_string()),
                variables_reference: 0,
            });
        }
        Err(BackendError::Reported(format!("unknown expression: {expression}")))
    }

    fn data_snapshot(&self) -> HashMap<String, String> {
        self.locals.iter().map(|(k, v)| (k.clone(), v.to_string())).collect()
    }

    fn terminate(&mut self) -> Vec<InternalEvent> {
        self.terminated = true;
        vec![InternalEvent::Terminated]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn launch(lines: &[&str], stop_on_entry: bool) -> (ToyBackend, Vec<InternalEvent>) {
        let mut backend = ToyBackend::new();
        let events = backend
            .launch(&LaunchConfig {
                program: "toy.prog".to_string(),
                args: lines.iter().map(|s| s.to_string()).collect(),
                stop_on_entry,
            })
            .unwrap();
        (backend, events)
    }

    #[test]
    fn runs_to_completion_without_breakpoints() {
        let (_backend, events) = launch(&["x = 1", "print x"], false);
        assert!(matches!(events.last(), Some(InternalEvent::Terminated)));
        assert!(events.iter().any(|e| matches!(e, InternalEvent::Output { text, .. } if text == "1")));
    }

    #[test]
    fn stops_before_breakpointed_line() {
        let mut backend = ToyBackend::new();
        backend.set_breakpoints("toy.prog", vec![2]);
        let events = backend
            .launch(&LaunchConfig {
                program: "toy.prog".to_string(),
                args: vec!["x = 1".into(), "x = x + 1".into(), "print x".into()],
                stop_on_entry: false,
            })
            .unwrap();
        assert!(matches!(events.last(), Some(InternalEvent::Stopped { reason, .. }) if reason == "breakpoint"));
        assert_eq!(backend.variables(0, ScopeKind::Locals)[0].value, "1");
    }

    #[test]
    fn raise_emits_uncaught_exception_and_stops() {
        let (_backend, events) = launch(&["raise boom"], false);
        assert!(events
            .iter()
            .any(|e| matches!(e, InternalEvent::Exception { uncaught: true, .. })));
        assert!(matches!(events.last(), Some(InternalEvent::Stopped { reason, .. }) if reason == "exception"));
    }

    #[test]
    fn stepping_reports_line_progress() {
        let (mut backend, _events) = launch(&["x = 1", "x = x + 1"], true);
        let events = backend.step(THREAD_ID, StepKind::Next).unwrap();
        assert!(matches!(events.last(), Some(InternalEvent::Stopped { reason, .. }) if reason == "step"));
        assert_eq!(backend.stack_trace(THREAD_ID)[0].line, 2);
    }

    #[test]
    fn data_snapshot_tracks_locals() {
        let (backend, _events) = launch(&["x = 1", "x = x + 1"], false);
        assert_eq!(backend.data_snapshot().get("x"), Some(&"2".to_string()));
    }
}
