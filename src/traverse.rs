//! Cycle-safe generic traversals over record graphs.
//!
//! ## Operations
//!
//! | Function | Visits | On a repeated node |
//! |----------|--------|--------------------|
//! | [`reduce_nested`] | root + every container, pre-order | skipped silently |
//! | [`for_each_nested`] | every leaf (opaque leaves included) | ignored |
//! | [`for_each_nested_with_cycles`] | every leaf | `on_cycle(node, key, parent)` |
//! | [`remove_circular_references`] | back-edges only | replaced by `id` or a placeholder |
//!
//! All walks run on an explicit stack, so depth is bounded by heap, not by
//! the call stack. Each call owns its own [`IdentitySet`]; nothing is shared
//! between calls.
//!
//! A node reached a second time through a different parent (a diamond, not
//! only a true cycle) counts as repeated: identity is all the walker knows.

use std::vec;

use crate::config::{NormalizerConfig, DEFAULT_ROOT_KEY, ID_FIELD};
use crate::types::{Key, Value};
use crate::visit::IdentitySet;

/// Fold `visit` over the root and every nested container, pre-order.
///
/// The root is reported under the `_root` key. See
/// [`reduce_nested_with_key`].
pub fn reduce_nested<A, F>(root: &Value, init: A, visit: F) -> A
where
    F: FnMut(A, &Value, &Key) -> A,
{
    reduce_nested_with_key(root, Key::from(DEFAULT_ROOT_KEY), init, visit)
}

/// Fold `visit` over the root and every nested container, pre-order.
///
/// `visit(acc, node, key)` runs on a node before any of its children.
/// Only containers are descended into and reported; scalars and opaque
/// leaves inside containers are skipped. A leaf root is reported once.
/// A `Null` root returns `init` untouched. A container already folded in
/// this call is skipped and the accumulator passes through unchanged.
pub fn reduce_nested_with_key<A, F>(root: &Value, root_key: Key, init: A, mut visit: F) -> A
where
    F: FnMut(A, &Value, &Key) -> A,
{
    if root.is_null() {
        return init;
    }

    let mut processed = IdentitySet::new();
    let mut stack: Vec<(Key, Value)> = vec![(root_key, root.clone())];
    let mut acc = init;

    while let Some((key, node)) = stack.pop() {
        if node.is_container() && !processed.mark(&node) {
            continue;
        }

        acc = visit(acc, &node, &key);

        // Reverse so the first child is folded first.
        let children: Vec<_> = node
            .children()
            .into_iter()
            .filter(|(_, child)| child.is_container())
            .collect();
        stack.extend(children.into_iter().rev());
    }

    tracing::trace!(nodes = processed.len(), "reduce_nested finished");
    acc
}

/// Call `on_leaf(value, key, parent)` for every leaf of the graph.
///
/// Repeated containers are ignored. See [`for_each_nested_with_cycles`].
pub fn for_each_nested<L>(root: &Value, on_leaf: L)
where
    L: FnMut(&Value, &Key, &Value),
{
    for_each_nested_with_cycles(root, on_leaf, |_, _, _| {});
}

struct Frame {
    parent: Value,
    entries: vec::IntoIter<(Key, Value)>,
}

/// Walk every leaf, reporting back-edges separately.
///
/// Leaves (opaque leaves included) go to `on_leaf(value, key, parent)`.
/// A container not seen yet is descended into; a container already seen
/// goes to `on_cycle(node, key, parent)` instead and is neither descended
/// into nor passed to `on_leaf`.
///
/// Lists enumerate by index, records by insertion order. Children are
/// snapshotted when a container is entered, so callbacks may rewrite the
/// parent slot they are handed.
pub fn for_each_nested_with_cycles<L, C>(root: &Value, mut on_leaf: L, mut on_cycle: C)
where
    L: FnMut(&Value, &Key, &Value),
    C: FnMut(&Value, &Key, &Value),
{
    if !root.is_container() {
        return;
    }

    let mut processed = IdentitySet::new();
    processed.mark(root);
    let mut stack = vec![Frame {
        parent: root.clone(),
        entries: root.children().into_iter(),
    }];

    while let Some(frame) = stack.last_mut() {
        let Some((key, value)) = frame.entries.next() else {
            stack.pop();
            continue;
        };

        if !value.is_container() {
            on_leaf(&value, &key, &frame.parent);
            continue;
        }

        if !processed.mark(&value) {
            tracing::trace!(key = %key, kind = value.type_name(), "repeated node");
            on_cycle(&value, &key, &frame.parent);
            continue;
        }

        let entries = value.children().into_iter();
        stack.push(Frame { parent: value, entries });
    }
}

/// Make the graph acyclic by collapsing back-edges with the default
/// placeholder. See [`remove_circular_references_with`].
pub fn remove_circular_references(root: &Value) {
    remove_circular_references_with(root, &NormalizerConfig::default());
}

/// Make the graph acyclic by collapsing back-edges.
///
/// Every repeated reference is replaced in its parent by the repeated
/// node's `id` field, or by `config.circular_placeholder` when the node has
/// no usable `id`. A usable `id` is a non-empty string, an integer or a
/// record id. The nested shape at those points is lost.
pub fn remove_circular_references_with(root: &Value, config: &NormalizerConfig) {
    let mut collapsed = 0usize;
    for_each_nested_with_cycles(
        root,
        |_, _, _| {},
        |node, key, parent| {
            let replacement = node
                .field(ID_FIELD)
                .filter(|id| id.as_identifier().is_some_and(|id| !id.is_empty()))
                .unwrap_or_else(|| Value::String(config.circular_placeholder.clone()));
            tracing::debug!(key = %key, replacement = ?replacement, "collapsing back-edge");
            parent.set(key, replacement);
            collapsed += 1;
        },
    );
    if collapsed > 0 {
        tracing::debug!(collapsed, "removed circular references");
    }
}
