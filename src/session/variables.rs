//! Variable-reference table (spec §3 `variable_refs`).
//!
//! Grounded on `src/bin/bs_dap.rs::VariablesStore` (alloc/get/get_mut/
//! remove over a monotonically growing key), generalized to the two
//! reference shapes spec §3 names: a live `(frame_id, scope)` pointer,
//! or a cached `Variable` list (for compound values drilled into via
//! `variables`).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A single variable as reported to the client (spec §9: "already-
/// stringified `Variable` records").
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Variable {
    pub name: String,
    pub value: String,
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<String>,
    #[serde(rename = "variablesReference")]
    pub variables_reference: i64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScopeKind {
    Locals,
    Globals,
}

/// What a `variablesReference` handle points to (spec §3).
#[derive(Debug, Clone)]
pub enum RefTarget {
    Scope { frame_id: i64, scope: ScopeKind },
    Cached(Vec<Variable>),
}

/// `variable_refs`: injective, monotonically growing, never reused
/// within a session (spec §3 invariant, §8 testable property #6).
#[derive(Default)]
pub struct VariableRefTable {
    next_handle: i64,
    table: HashMap<i64, RefTarget>,
}

impl VariableRefTable {
    pub fn new() -> Self {
        VariableRefTable {
            next_handle: 1,
            table: HashMap::new(),
        }
    }

    pub fn alloc(&mut self, target: RefTarget) -> i64 {
        let handle = self.next_handle;
        self.next_handle += 1;
        self.table.insert(handle, target);
        handle
    }

    pub fn get(&self, handle: i64) -> Option<&RefTarget> {
        self.table.get(&handle)
    }

    /// Drops every allocated reference (spec §3: "any resume of `t`
    /// invalidates" its cached frames, and references into them).
    pub fn clear(&mut self) {
        self.table.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_injective_and_never_reused() {
        let mut table = VariableRefTable::new();
        let a = table.alloc(RefTarget::Scope {
            frame_id: 1,
            scope: ScopeKind::Locals,
        });
        let b = table.alloc(RefTarget::Scope {
            frame_id: 1,
            scope: ScopeKind::Globals,
        });
        assert_ne!(a, b);
        table.clear();
        let c = table.alloc(RefTarget::Scope {
            frame_id: 2,
            scope: ScopeKind::Locals,
        });
        assert_ne!(c, a);
        assert_ne!(c, b);
    }

    #[test]
    fn clear_invalidates_lookups() {
        let mut table = VariableRefTable::new();
        let a = table.alloc(RefTarget::Cached(vec![]));
        assert!(table.get(a).is_some());
        table.clear();
        assert!(table.get(a).is_none());
    }
}
