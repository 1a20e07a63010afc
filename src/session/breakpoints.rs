//! Line, function, and exception breakpoint bookkeeping (spec §4.7).
//!
//! Grounded on `src/bin/bs_dap.rs::{BreakpointRecord, HitCondition,
//! handle_set_breakpoints, handle_set_function_breakpoints,
//! handle_set_exception_breakpoints}`: the hit-condition parser below
//! keeps the teacher's `>`, `>=`, `==`, `%` grammar; the replace-not-
//! merge semantics of `setBreakpoints` and the per-entry verified/line
//! response shape come straight from the same handler.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A requested hit-condition expression (`setBreakpoints[].hitCondition`,
/// e.g. `"> 3"`, `"== 5"`, `"% 2"`), evaluated against the running hit
/// count (spec §4.7).
#[derive(Debug, Clone, PartialEq)]
pub enum HitCondition {
    GreaterThan(u64),
    GreaterOrEqual(u64),
    Equal(u64),
    Modulo(u64),
    /// Bare integer: exact match, DAP's common shorthand for `==`.
    Exactly(u64),
}

impl HitCondition {
    pub fn parse(input: &str) -> Option<HitCondition> {
        let input = input.trim();
        if let Some(rest) = input.strip_prefix(">=") {
            return rest.trim().parse().ok().map(HitCondition::GreaterOrEqual);
        }
        if let Some(rest) = input.strip_prefix('>') {
            return rest.trim().parse().ok().map(HitCondition::GreaterThan);
        }
        if let Some(rest) = input.strip_prefix("==") {
            return rest.trim().parse().ok().map(HitCondition::Equal);
        }
        if let Some(rest) = input.strip_prefix('%') {
            return rest.trim().parse().ok().map(HitCondition::Modulo);
        }
        input.parse().ok().map(HitCondition::Exactly)
    }

    pub fn matches(&self, hits: u64) -> bool {
        match self {
            HitCondition::GreaterThan(n) => hits > *n,
            HitCondition::GreaterOrEqual(n) => hits >= *n,
            HitCondition::Equal(n) | HitCondition::Exactly(n) => hits == *n,
            HitCondition::Modulo(n) if *n > 0 => hits.is_multiple_of(*n),
            HitCondition::Modulo(_) => false,
        }
    }
}

/// One line breakpoint as stored server-side (spec §3 `line_breakpoints`).
#[derive(Debug, Clone)]
pub struct LineBreakpoint {
    pub line: i64,
    pub verified: bool,
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub log_message: Option<String>,
    pub hits: u64,
}

impl LineBreakpoint {
    /// A logpoint resumes without stopping and instead emits `output`
    /// (spec §4.7).
    pub fn is_logpoint(&self) -> bool {
        self.log_message.is_some()
    }

    /// Whether this hit should cause a stop, given a truthy-condition
    /// result already evaluated by the caller (spec §4.7: invalid
    /// condition expressions must not stop execution silently — the
    /// caller reports those via `output(stderr)` and treats them as
    /// "do not stop").
    pub fn should_stop(&mut self, condition_truthy: Option<bool>) -> bool {
        self.hits += 1;
        if let Some(truthy) = condition_truthy {
            if !truthy {
                return false;
            }
        }
        match self.hit_condition.as_deref().and_then(HitCondition::parse) {
            Some(hc) => hc.matches(self.hits),
            None => true,
        }
    }
}

/// The response shape shared by every breakpoint-setting command
/// (spec §4.7: "one result per input entry, preserving order").
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreakpointResult {
    pub verified: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LineBreakpointSpec {
    pub line: i64,
    #[serde(default)]
    pub condition: Option<String>,
    #[serde(rename = "hitCondition", default)]
    pub hit_condition: Option<String>,
    #[serde(rename = "logMessage", default)]
    pub log_message: Option<String>,
}

#[derive(Debug, Clone)]
pub struct FunctionBreakpoint {
    pub condition: Option<String>,
    pub hit_condition: Option<String>,
    pub hits: u64,
}

/// Exception break filters: exactly `raised` and `uncaught`
/// (spec §4.7), each independently toggled with an optional condition.
#[derive(Debug, Clone, Default)]
pub struct ExceptionFilters {
    pub break_on_raised: bool,
    pub break_on_uncaught: bool,
    pub raised_condition: Option<String>,
    pub uncaught_condition: Option<String>,
}

/// All breakpoint tables in one place (spec §3).
#[derive(Default)]
pub struct BreakpointRegistry {
    /// Normalized file path -> ordered breakpoints, replaced wholesale
    /// on every `setBreakpoints` call for that path.
    pub lines: IndexMap<String, Vec<LineBreakpoint>>,
    pub functions: IndexMap<String, FunctionBreakpoint>,
    pub exception_filters: ExceptionFilters,
}

impl BreakpointRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `setBreakpoints(path, specs)`: replace, not merge (spec §3
    /// invariant, §8 testable properties #3 and #10).
    pub fn set_line_breakpoints(&mut self, path: &str, specs: Vec<LineBreakpointSpec>) -> Vec<BreakpointResult> {
        let results = specs
            .iter()
            .map(|spec| BreakpointResult {
                verified: true,
                line: Some(spec.line),
                message: None,
            })
            .collect();
        let breakpoints = specs
            .into_iter()
            .map(|spec| LineBreakpoint {
                line: spec.line,
                verified: true,
                condition: spec.condition,
                hit_condition: spec.hit_condition,
                log_message: spec.log_message,
                hits: 0,
            })
            .collect();
        self.lines.insert(path.to_string(), breakpoints);
        results
    }

    pub fn line_breakpoints(&self, path: &str) -> &[LineBreakpoint] {
        self.lines.get(path).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn line_breakpoints_mut(&mut self, path: &str) -> &mut [LineBreakpoint] {
        self.lines
            .get_mut(path)
            .map(Vec::as_mut_slice)
            .unwrap_or(&mut [])
    }

    /// `setFunctionBreakpoints(specs)`: replaces the complete set
    /// (spec §4.7/§4.8).
    pub fn set_function_breakpoints(
        &mut self,
        specs: Vec<(String, Option<String>, Option<String>)>,
    ) -> Vec<BreakpointResult> {
        self.functions.clear();
        let mut results = Vec::with_capacity(specs.len());
        for (name, condition, hit_condition) in specs {
            self.functions.insert(
                name,
                FunctionBreakpoint {
                    condition,
                    hit_condition,
                    hits: 0,
                },
            );
            results.push(BreakpointResult {
                verified: true,
                line: None,
                message: None,
            });
        }
        results
    }

    pub fn function_breakpoint_mut(&mut self, name: &str) -> Option<&mut FunctionBreakpoint> {
        self.functions.get_mut(name)
    }

    pub fn set_exception_filters(&mut self, filters: ExceptionFilters) {
        self.exception_filters = filters;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hit_condition_parses_operators() {
        assert_eq!(HitCondition::parse("> 3"), Some(HitCondition::GreaterThan(3)));
        assert_eq!(HitCondition::parse(">=3"), Some(HitCondition::GreaterOrEqual(3)));
        assert_eq!(HitCondition::parse("== 5"), Some(HitCondition::Equal(5)));
        assert_eq!(HitCondition::parse("%2"), Some(HitCondition::Modulo(2)));
        assert_eq!(HitCondition::parse("7"), Some(HitCondition::Exactly(7)));
        assert_eq!(HitCondition::parse("garbage"), None);
    }

    #[test]
    fn hit_condition_matches() {
        assert!(HitCondition::GreaterThan(2).matches(3));
        assert!(!HitCondition::GreaterThan(2).matches(2));
        assert!(HitCondition::Modulo(3).matches(6));
        assert!(!HitCondition::Modulo(3).matches(7));
    }

    #[test]
    fn set_breakpoints_replaces_not_merges() {
        let mut registry = BreakpointRegistry::new();
        registry.set_line_breakpoints(
            "/tmp/x.py",
            vec![LineBreakpointSpec {
                line: 3,
                condition: None,
                hit_condition: None,
                log_message: None,
            }],
        );
        assert_eq!(registry.line_breakpoints("/tmp/x.py").len(), 1);

        let results = registry.set_line_breakpoints(
            "/tmp/x.py",
            vec![
                LineBreakpointSpec {
                    line: 4,
                    condition: None,
                    hit_condition: None,
                    log_message: None,
                },
                LineBreakpointSpec {
                    line: 5,
                    condition: None,
                    hit_condition: None,
                    log_message: None,
                },
            ],
        );
        let stored = registry.line_breakpoints("/tmp/x.py");
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].line, 4);
        assert_eq!(stored[1].line, 5);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].line, Some(4));
    }

    #[test]
    fn clearing_with_empty_list_clears() {
        let mut registry = BreakpointRegistry::new();
        registry.set_line_breakpoints(
            "/tmp/x.py",
            vec![LineBreakpointSpec {
                line: 3,
                condition: None,
                hit_condition: None,
                log_message: None,
            }],
        );
        let results = registry.set_line_breakpoints("/tmp/x.py", vec![]);
        assert!(results.is_empty());
        assert!(registry.line_breakpoints("/tmp/x.py").is_empty());

        // Second identical call is idempotent (spec §8 property #10).
        let results2 = registry.set_line_breakpoints("/tmp/x.py", vec![]);
        assert_eq!(results, results2);
    }

    #[test]
    fn logpoint_detection() {
        let bp = LineBreakpoint {
            line: 1,
            verified: true,
            condition: None,
            hit_condition: None,
            log_message: Some("x is {x}".into()),
            hits: 0,
        };
        assert!(bp.is_logpoint());
    }
}
