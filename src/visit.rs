//! Identity-based visited set.
//!
//! Every traversal in this crate owns one [`IdentitySet`] for the duration
//! of a single top-level call. A container is marked *before* anything is
//! done with its children, so a node that transitively contains itself is
//! handled at most once.
//!
//! ## Identity
//!
//! Nodes are compared by the address of their shared allocation
//! ([`NodeId`]), never by content: two records with the same fields are two
//! different nodes.
//!
//! Lookups are O(1) through a hash set. The set also keeps a clone of every
//! marked handle alive until it is dropped; without that, a node released
//! mid-traversal (for example by a callback overwriting its only parent
//! slot) could free its address for a new allocation that would then be
//! mistaken for an already visited node.

use std::collections::HashSet;

use crate::types::{NodeId, Value};

/// Set of container nodes seen during one traversal.
#[derive(Debug, Default)]
pub struct IdentitySet {
    seen: HashSet<NodeId>,
    pinned: Vec<Value>,
}

impl IdentitySet {
    /// Create an empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark a container as seen.
    ///
    /// Returns `true` the first time a given node is marked and `false`
    /// afterwards. Leaves are never tracked and always return `false`.
    pub fn mark(&mut self, node: &Value) -> bool {
        let Some(id) = node.node_id() else {
            return false;
        };
        if !self.seen.insert(id) {
            return false;
        }
        self.pinned.push(node.clone());
        true
    }

    /// Whether a container has been marked.
    pub fn contains(&self, node: &Value) -> bool {
        node.node_id().map_or(false, |id| self.seen.contains(&id))
    }

    /// Number of marked containers.
    pub fn len(&self) -> usize {
        self.seen.len()
    }

    /// Whether nothing has been marked yet.
    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mark_once() {
        let mut set = IdentitySet::new();
        let node = Value::record([("a", Value::Int(1))]);

        assert!(!set.contains(&node));
        assert!(set.mark(&node));
        assert!(set.contains(&node));
        assert!(!set.mark(&node.clone()));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn test_equal_content_is_distinct() {
        let mut set = IdentitySet::new();
        let a = Value::list(vec![Value::Int(1)]);
        let b = Value::list(vec![Value::Int(1)]);

        assert!(set.mark(&a));
        assert!(set.mark(&b));
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn test_leaves_are_not_tracked() {
        let mut set = IdentitySet::new();
        assert!(!set.mark(&Value::from("x")));
        assert!(!set.contains(&Value::Null));
        assert!(set.is_empty());
    }

    #[test]
    fn test_pins_released_node() {
        let mut set = IdentitySet::new();
        let parent = Value::record([("child", Value::record([("k", Value::Int(1))]))]);
        let child = parent.field("child").unwrap();
        assert!(set.mark(&child));

        parent.set_field("child", Value::Null);
        drop(child);

        let fresh = Value::record([("k", Value::Int(2))]);
        assert!(set.mark(&fresh));
    }
}
