//! Data watchpoints (spec §4.7, §8 testable property #5, scenario S6).
//!
//! There is no hardware watchpoint support in a dynamic interpreted
//! language without native memory addresses, so — same as the teacher's
//! `src/debugger/watchpoint.rs` polls software breakpoints instead of
//! relying on CPU debug registers for it — watches here are evaluated
//! by comparing a computed value snapshot on every stop-candidate step,
//! not by any hardware mechanism.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum AccessKind {
    Read,
    Write,
    ReadWrite,
}

/// An opaque id returned by `dataBreakpointInfo` and consumed by
/// `setDataBreakpoints` (spec §4.7).
pub type DataId = String;

#[derive(Debug, Clone)]
pub struct DataWatch {
    pub data_id: DataId,
    pub description: String,
    /// The access kind actually granted, which may be a degraded
    /// version of what the client asked for if the backend cannot
    /// honor e.g. `read` (spec §9 Open Question: effective access kind
    /// recorded here rather than silently accepted).
    pub access_kind: AccessKind,
    pub condition: Option<String>,
    last_value: Option<String>,
}

impl DataWatch {
    pub fn new(data_id: DataId, description: String, access_kind: AccessKind, condition: Option<String>) -> Self {
        DataWatch {
            data_id,
            description,
            access_kind,
            condition,
            last_value: None,
        }
    }

    /// Updates the tracked value, returning `true` if this is a change
    /// worth reporting (i.e. not the first observation).
    fn observe(&mut self, value: &str) -> bool {
        let changed = self
            .last_value
            .as_deref()
            .is_some_and(|previous| previous != value);
        self.last_value = Some(value.to_string());
        changed
    }
}

/// All registered data watches, keyed by the `dataId` the client
/// obtained from `dataBreakpointInfo` (spec §3 `data_watches`).
#[derive(Default)]
pub struct WatchRegistry {
    watches: HashMap<DataId, DataWatch>,
}

impl WatchRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `setDataBreakpoints`: replaces the full set (spec §4.7, mirrors
    /// line/function breakpoint replace semantics).
    pub fn set(&mut self, watches: Vec<DataWatch>) {
        self.watches = watches
            .into_iter()
            .map(|w| (w.data_id.clone(), w))
            .collect();
    }

    pub fn is_empty(&self) -> bool {
        self.watches.is_empty()
    }

    /// Given a snapshot of `data_id -> current stringified value`,
    /// returns the names of every watch whose value changed since the
    /// last snapshot. A single stopped-step can report more than one
    /// changed name in the same pass (scenario S6).
    pub fn detect_changes(&mut self, snapshot: &HashMap<DataId, String>) -> Vec<String> {
        let mut changed = Vec::new();
        for (data_id, watch) in self.watches.iter_mut() {
            if let Some(value) = snapshot.get(data_id) {
                if watch.observe(value) {
                    changed.push(watch.description.clone());
                }
            }
        }
        changed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn watch(id: &str, desc: &str) -> DataWatch {
        DataWatch::new(id.to_string(), desc.to_string(), AccessKind::Write, None)
    }

    #[test]
    fn first_observation_never_reports_change() {
        let mut registry = WatchRegistry::new();
        registry.set(vec![watch("x", "x")]);
        let mut snapshot = HashMap::new();
        snapshot.insert("x".to_string(), "1".to_string());
        assert!(registry.detect_changes(&snapshot).is_empty());
    }

    #[test]
    fn detects_multiple_simultaneous_changes() {
        let mut registry = WatchRegistry::new();
        registry.set(vec![watch("x", "x"), watch("y", "y")]);

        let mut first = HashMap::new();
        first.insert("x".to_string(), "1".to_string());
        first.insert("y".to_string(), "2".to_string());
        registry.detect_changes(&first);

        let mut second = HashMap::new();
        second.insert("x".to_string(), "10".to_string());
        second.insert("y".to_string(), "20".to_string());
        let mut changed = registry.detect_changes(&second);
        changed.sort();
        assert_eq!(changed, vec!["x".to_string(), "y".to_string()]);
    }

    #[test]
    fn unchanged_value_is_not_reported() {
        let mut registry = WatchRegistry::new();
        registry.set(vec![watch("x", "x")]);
        let mut snapshot = HashMap::new();
        snapshot.insert("x".to_string(), "1".to_string());
        registry.detect_changes(&snapshot);
        assert!(registry.detect_changes(&snapshot).is_empty());
    }

    #[test]
    fn set_replaces_entire_table() {
        let mut registry = WatchRegistry::new();
        registry.set(vec![watch("x", "x")]);
        registry.set(vec![watch("y", "y")]);
        let mut snapshot = HashMap::new();
        snapshot.insert("x".to_string(), "1".to_string());
        snapshot.insert("y".to_string(), "1".to_string());
        assert!(registry.detect_changes(&snapshot).is_empty());
        snapshot.insert("x".to_string(), "2".to_string());
        assert!(registry.detect_changes(&snapshot).is_empty());
    }
}
