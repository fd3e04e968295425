//! Identifier normalization for records fetched from the store.
//!
//! The driver hands records back with their identity in a driver-native
//! field (`@rid`, sometimes mirrored as `rid`) holding a [`RecordId`].
//! Normalization moves that identity into a plain string `id` field:
//!
//! ```text
//! { "@rid": #23:40, "name": "x" }   ->   { "name": "x", "id": "#23:40" }
//! { "@rid": #-5:12, "name": "x" }   ->   { "name": "x" }            (temporary)
//! ```
//!
//! Normalization is destructive and idempotent: the source field is
//! removed, so a second pass finds nothing to rewrite.
//!
//! ## Entry points
//!
//! - [`normalize_identifier`]: one field of one record, no recursion.
//! - [`rewrite_ids`]: one record or a list of records, plus shallow
//!   foreign-key flattening driven by the schema.
//! - [`rewrite_ids_recursive`]: the whole reachable graph, each record
//!   exactly once.
//! - [`clean_attributes`]: strip reserved driver attributes and undeclared
//!   edge fields from one record.
//!
//! The batch entry points never fail: a record that violates the
//! single-field contract is logged and left as it is.
//!
//! [`RecordId`]: crate::types::RecordId

use std::collections::HashSet;

use crate::config::{is_edge_field, is_reserved_attribute, AT_RID_FIELD, ID_FIELD, RID_FIELD};
use crate::types::{is_temporary_id, matches_record_id, Record, Schema, Value};
use crate::visit::IdentitySet;

/// Error type for single-field identifier normalization.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum NormalizeError {
    /// Target is not a record.
    #[error("expected a record, got {0}")]
    NotARecord(&'static str),
    /// Identifier field is absent.
    #[error("identifier field {0:?} is absent")]
    MissingField(String),
    /// Identifier field is present but null.
    #[error("identifier field {0:?} is null")]
    NullIdentifier(String),
    /// Identifier field holds something that has no identifier form.
    #[error("identifier field {field:?} holds a {kind}, expected a string or record id")]
    UnsupportedIdentifier {
        /// Field that was read.
        field: String,
        /// Type of the value found there.
        kind: &'static str,
    },
}

/// Result of normalizing one identifier field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdOutcome {
    /// The identifier was written to `id`.
    Promoted(String),
    /// The identifier was temporary; the source field was dropped and no
    /// `id` was written.
    Temporary(String),
}

impl IdOutcome {
    /// Canonical id written to the record, if any.
    pub fn promoted(&self) -> Option<&str> {
        match self {
            Self::Promoted(id) => Some(id),
            Self::Temporary(_) => None,
        }
    }
}

/// Move `record[field]` into the canonical `id` field.
///
/// The field must be present and hold a string or a record id. Its string
/// form becomes `id` unless it is a temporary identifier (`#-...`), in
/// which case no `id` is written. Either way `field` is deleted.
pub fn normalize_identifier(record: &Value, field: &str) -> Result<IdOutcome, NormalizeError> {
    let map = record
        .as_map()
        .ok_or_else(|| NormalizeError::NotARecord(record.type_name()))?;
    let mut fields = map.borrow_mut();
    promote_identifier(&mut fields, field)
}

fn promote_identifier(record: &mut Record, field: &str) -> Result<IdOutcome, NormalizeError> {
    let id = match record.get(field) {
        None => return Err(NormalizeError::MissingField(field.to_string())),
        Some(Value::Null) => return Err(NormalizeError::NullIdentifier(field.to_string())),
        Some(Value::String(s)) => s.clone(),
        Some(Value::RecordId(rid)) => rid.to_string(),
        Some(other) => {
            return Err(NormalizeError::UnsupportedIdentifier {
                field: field.to_string(),
                kind: other.type_name(),
            })
        }
    };

    record.remove(field);
    if is_temporary_id(&id) {
        tracing::debug!(field, rid = %id, "temporary record id stripped");
        return Ok(IdOutcome::Temporary(id));
    }

    record.insert(ID_FIELD, Value::String(id.clone()));
    Ok(IdOutcome::Promoted(id))
}

/// Rewrite driver identifiers of one record or of each record in a list.
///
/// A list input yields the same list (same length, same order), anything
/// else yields itself; records are rewritten in place. Non-record entries
/// pass through untouched.
///
/// Per record:
/// 1. if `rid` holds a record id, it is normalized and any `@rid` is
///    dropped; otherwise a present `@rid` is normalized;
/// 2. with a schema, every relation field (looked up under its column
///    name) holding a record id is replaced by its string form. This is
///    shallow: nested records are not touched.
pub fn rewrite_ids(models: &Value, schema: Option<&Schema>) -> Value {
    match models {
        Value::List(list) => {
            let items: Vec<Value> = list.borrow().clone();
            for item in &items {
                rewrite_one(item, schema);
            }
        }
        other => rewrite_one(other, schema),
    }
    models.clone()
}

fn rewrite_one(model: &Value, schema: Option<&Schema>) {
    if let Some(map) = model.as_map() {
        rewrite_record(&mut map.borrow_mut(), schema);
    }
}

fn rewrite_record(record: &mut Record, schema: Option<&Schema>) {
    let outcome = if record.get(RID_FIELD).map_or(false, matches_record_id) {
        let outcome = promote_identifier(record, RID_FIELD);
        record.remove(AT_RID_FIELD);
        Some(outcome)
    } else if record.contains_key(AT_RID_FIELD) {
        Some(promote_identifier(record, AT_RID_FIELD))
    } else {
        None
    };

    match outcome {
        Some(Ok(outcome)) => tracing::trace!(outcome = ?outcome, "record id normalized"),
        Some(Err(err)) => tracing::warn!(error = %err, "record id left as is"),
        None => {}
    }

    let Some(schema) = schema else {
        return;
    };
    for (_, column) in schema.relation_columns() {
        if let Some(slot) = record.get_mut(column) {
            if let Value::RecordId(rid) = *slot {
                *slot = Value::String(rid.to_string());
            }
        }
    }
}

/// Visited state of one [`rewrite_ids_recursive`] call.
///
/// Records are remembered by canonical id, so the same logical record is
/// skipped even when it shows up again as a different in-memory copy.
/// Containers are also remembered by identity, which is what stops records
/// without any id and lists that contain themselves.
#[derive(Debug, Default)]
pub struct RewriteVisited {
    ids: HashSet<String>,
    nodes: IdentitySet,
}

impl RewriteVisited {
    /// Create empty visited state.
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether a record with this canonical id has been rewritten.
    pub fn contains_id(&self, id: &str) -> bool {
        self.ids.contains(id)
    }

    /// Number of distinct canonical ids seen.
    pub fn id_count(&self) -> usize {
        self.ids.len()
    }

    /// Number of containers entered.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Rewrite identifiers across the whole reachable graph.
///
/// Uses fresh visited state. See [`rewrite_ids_recursive_with`].
pub fn rewrite_ids_recursive(models: &Value, schema: Option<&Schema>) -> Value {
    let mut visited = RewriteVisited::new();
    rewrite_ids_recursive_with(models, schema, &mut visited)
}

/// Rewrite identifiers across the whole reachable graph.
///
/// Each top-level record gets [`rewrite_ids`] with `schema`; every record
/// below it gets identifier rewriting only (no schema). After a record is
/// rewritten its direct fields are inspected: record ids are replaced by
/// their string form, timestamps are kept, containers are descended into.
/// Record ids sitting directly in a list are left as they are.
///
/// A record whose `id` is already in `visited` is returned untouched, as is
/// any container already entered. Leaves and opaque leaves at the top level
/// are returned unchanged. Records are processed in pre-order.
pub fn rewrite_ids_recursive_with(
    models: &Value,
    schema: Option<&Schema>,
    visited: &mut RewriteVisited,
) -> Value {
    let mut stack: Vec<(Value, Option<&Schema>)> = Vec::new();
    match models {
        Value::List(list) => {
            if visited.nodes.mark(models) {
                let items: Vec<Value> = list.borrow().clone();
                stack.extend(items.into_iter().rev().map(|item| (item, schema)));
            }
        }
        other => stack.push((other.clone(), schema)),
    }

    let mut rewritten = 0usize;
    while let Some((node, schema)) = stack.pop() {
        match &node {
            Value::List(list) => {
                if !visited.nodes.mark(&node) {
                    continue;
                }
                let items: Vec<Value> = list.borrow().clone();
                stack.extend(items.into_iter().rev().map(|item| (item, None)));
            }
            Value::Map(map) => {
                let known = canonical_id(&map.borrow());
                if let Some(id) = known {
                    if visited.ids.contains(&id) {
                        tracing::debug!(id = %id, "record already rewritten, skipping");
                        continue;
                    }
                }
                if !visited.nodes.mark(&node) {
                    continue;
                }

                let mut record = map.borrow_mut();
                rewrite_record(&mut record, schema);
                if let Some(id) = canonical_id(&record) {
                    visited.ids.insert(id);
                }

                let mut nested = Vec::new();
                for (_, value) in record.iter_mut() {
                    match *value {
                        Value::RecordId(rid) => *value = Value::String(rid.to_string()),
                        Value::List(_) | Value::Map(_) => nested.push(value.clone()),
                        _ => {}
                    }
                }
                drop(record);

                rewritten += 1;
                stack.extend(nested.into_iter().rev().map(|child| (child, None)));
            }
            _ => {}
        }
    }

    tracing::trace!(records = rewritten, ids = visited.id_count(), "recursive id rewrite finished");
    models.clone()
}

fn canonical_id(record: &Record) -> Option<String> {
    record.get(ID_FIELD)?.as_identifier()
}

/// Strip driver bookkeeping from a single record.
///
/// Removes, in place:
/// - fields whose name starts with `@`;
/// - `@`-prefixed fields of records nested one level down;
/// - `in_*` / `out_*` edge fields, unless `schema` declares a field of
///   exactly that name.
///
/// Anything that is not a record is left alone.
pub fn clean_attributes(model: &Value, schema: Option<&Schema>) {
    let Some(map) = model.as_map() else {
        return;
    };

    let mut record = map.borrow_mut();
    let before = record.len();
    record.retain(|name, value| {
        if is_reserved_attribute(name) {
            return false;
        }

        // A record nested in itself is the one being cleaned right now.
        if let Value::Map(nested) = value {
            if let Ok(mut nested) = nested.try_borrow_mut() {
                nested.retain(|k, _| !is_reserved_attribute(k));
            }
        }

        if is_edge_field(name) {
            return schema.map_or(false, |s| s.contains(name));
        }
        true
    });

    let removed = before - record.len();
    if removed > 0 {
        tracing::trace!(removed, "driver attributes removed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Attribute, Key, RecordId};
    use serde_json::json;

    fn rid(cluster: i64, position: u64) -> Value {
        Value::RecordId(RecordId::new(cluster, position))
    }

    #[test]
    fn test_normalize_permanent_id() {
        let record = Value::record([("@rid", rid(23, 40)), ("name", Value::from("x"))]);
        let outcome = normalize_identifier(&record, "@rid").unwrap();

        assert_eq!(outcome, IdOutcome::Promoted("#23:40".to_string()));
        assert_eq!(record.to_json().unwrap(), json!({"name": "x", "id": "#23:40"}));
    }

    #[test]
    fn test_normalize_temporary_id() {
        let record = Value::record([("@rid", Value::from("#-5:12")), ("name", Value::from("x"))]);
        let outcome = normalize_identifier(&record, "@rid").unwrap();

        assert_eq!(outcome.promoted(), None);
        assert!(!record.has_field("id"));
        assert!(!record.has_field("@rid"));
    }

    #[test]
    fn test_normalize_contract_violations() {
        let record = Value::record([("@rid", Value::Null), ("n", Value::Int(1))]);
        assert_eq!(
            normalize_identifier(&record, "@rid"),
            Err(NormalizeError::NullIdentifier("@rid".into()))
        );
        assert_eq!(
            normalize_identifier(&record, "rid"),
            Err(NormalizeError::MissingField("rid".into()))
        );
        assert!(matches!(
            normalize_identifier(&record, "n"),
            Err(NormalizeError::UnsupportedIdentifier { kind: "int", .. })
        ));
        assert_eq!(
            normalize_identifier(&Value::Int(3), "@rid"),
            Err(NormalizeError::NotARecord("int"))
        );
        // Nothing was consumed.
        assert!(record.has_field("@rid"));
    }

    #[test]
    fn test_rewrite_prefers_rid_and_drops_at_rid() {
        let record = Value::record([
            ("@rid", rid(1, 1)),
            ("rid", rid(9, 9)),
            ("name", Value::from("x")),
        ]);
        rewrite_ids(&record, None);
        assert_eq!(record.to_json().unwrap(), json!({"name": "x", "id": "#9:9"}));
    }

    #[test]
    fn test_rewrite_temporary_rid_drops_both() {
        let record = Value::record([("@rid", rid(-1, 0)), ("rid", Value::from("#-1:0"))]);
        rewrite_ids(&record, None);
        assert!(record.is_empty());
    }

    #[test]
    fn test_rewrite_ignores_non_id_rid() {
        let record = Value::record([("rid", Value::from("not-an-id")), ("@rid", rid(2, 3))]);
        rewrite_ids(&record, None);
        assert_eq!(record.to_json().unwrap(), json!({"rid": "not-an-id", "id": "#2:3"}));
    }

    #[test]
    fn test_rewrite_null_at_rid_is_left_alone() {
        let record = Value::record([("@rid", Value::Null)]);
        rewrite_ids(&record, None);
        assert!(record.has_field("@rid"));
        assert!(!record.has_field("id"));
    }

    #[test]
    fn test_rewrite_foreign_keys_shallow() {
        let schema = Schema::new()
            .with_attribute("owner", Attribute::relation("user").with_column_name("ownerId"))
            .with_attribute("parent", Attribute::foreign_key())
            .with_attribute("other", Attribute::typed("string"));
        let nested = Value::record([("ownerId", rid(4, 4))]);
        let record = Value::record([
            ("ownerId", rid(3, 1)),
            ("owner", rid(3, 2)),
            ("parent", Value::from("#3:3")),
            ("other", rid(3, 4)),
            ("child", nested.clone()),
        ]);

        rewrite_ids(&record, Some(&schema));

        assert_eq!(record.field("ownerId").unwrap().as_str(), Some("#3:1"));
        assert!(matches!(record.field("owner"), Some(Value::RecordId(_))));
        assert_eq!(record.field("parent").unwrap().as_str(), Some("#3:3"));
        assert!(matches!(record.field("other"), Some(Value::RecordId(_))));
        assert!(matches!(nested.field("ownerId"), Some(Value::RecordId(_))));
    }

    #[test]
    fn test_rewrite_list_shape() {
        let a = Value::record([("@rid", rid(1, 1))]);
        let b = Value::record([("@rid", rid(1, 2))]);
        let list = Value::list(vec![a, Value::Int(5), b]);

        let out = rewrite_ids(&list, None);

        assert!(out.same_node(&list));
        assert_eq!(out.to_json().unwrap(), json!([{"id": "#1:1"}, 5, {"id": "#1:2"}]));
    }

    #[test]
    fn test_rewrite_scalar_passthrough() {
        let out = rewrite_ids(&Value::from("plain"), None);
        assert_eq!(out.as_str(), Some("plain"));
    }

    #[test]
    fn test_recursive_nested_without_schema() {
        let schema = Schema::new().with_attribute("ownerId", Attribute::foreign_key());
        let child = Value::record([
            ("@rid", rid(2, 1)),
            ("@version", Value::Int(1)),
            ("ownerId", rid(7, 7)),
            ("tags", Value::list(vec![rid(8, 1)])),
        ]);
        let root = Value::record([("@rid", rid(1, 1)), ("child", child.clone())]);

        rewrite_ids_recursive(&root, Some(&schema));

        assert_eq!(root.field("id").unwrap().as_str(), Some("#1:1"));
        assert_eq!(child.field("id").unwrap().as_str(), Some("#2:1"));
        // Flattened as a direct field of a record, not through the schema.
        assert_eq!(child.field("ownerId").unwrap().as_str(), Some("#7:7"));
        // Record ids inside lists stay as they are.
        let tags = child.field("tags").unwrap();
        assert!(matches!(tags.get(&Key::Index(0)), Some(Value::RecordId(_))));
    }

    #[test]
    fn test_recursive_keeps_timestamps() {
        let now = chrono::Utc::now();
        let root = Value::record([("@rid", rid(1, 1)), ("at", Value::Timestamp(now))]);
        rewrite_ids_recursive(&root, None);
        assert!(matches!(root.field("at"), Some(Value::Timestamp(ts)) if ts == now));
    }

    #[test]
    fn test_recursive_self_reference() {
        let a = Value::record([("@rid", rid(5, 5))]);
        a.set_field("me", a.clone());
        a.set_field("list", Value::list(vec![a.clone()]));

        let mut visited = RewriteVisited::new();
        let out = rewrite_ids_recursive_with(&a, None, &mut visited);

        assert!(out.same_node(&a));
        assert_eq!(a.field("id").unwrap().as_str(), Some("#5:5"));
        assert!(visited.contains_id("#5:5"));
        assert_eq!(visited.id_count(), 1);
    }

    #[test]
    fn test_recursive_copy_with_same_id_is_skipped() {
        let copy = Value::record([("id", Value::from("#5:5")), ("@version", Value::Int(2)), ("x", rid(9, 9))]);
        let root = Value::record([("@rid", rid(5, 5)), ("copy", copy.clone())]);

        rewrite_ids_recursive(&root, None);

        // The copy carries an already-visited id so its fields were not touched.
        assert!(matches!(copy.field("x"), Some(Value::RecordId(_))));
    }

    #[test]
    fn test_recursive_terminates_without_ids() {
        let a = Value::record([("name", Value::from("a"))]);
        let list = Value::list(vec![a.clone()]);
        a.set_field("siblings", list.clone());
        list.as_list().unwrap().borrow_mut().push(list.clone());

        let mut visited = RewriteVisited::new();
        rewrite_ids_recursive_with(&list, None, &mut visited);

        assert_eq!(visited.id_count(), 0);
        assert_eq!(visited.node_count(), 2);
    }

    #[test]
    fn test_recursive_top_level_opaque_leaf() {
        let out = rewrite_ids_recursive(&rid(1, 2), None);
        assert!(matches!(out, Value::RecordId(r) if r == RecordId::new(1, 2)));
    }

    #[test]
    fn test_clean_attributes() {
        let record = Value::from_json(&json!({
            "@version": 3,
            "@class": "User",
            "in_friends": {"@rid": "#1:1"},
            "out_follows": ["#2:2"],
            "name": "x",
            "address": {"@type": "d", "city": "Paris"}
        }));

        clean_attributes(&record, None);

        assert_eq!(record.to_json().unwrap(), json!({"name": "x", "address": {"city": "Paris"}}));
    }

    #[test]
    fn test_clean_keeps_declared_edges() {
        let schema = Schema::new().with_attribute("out_follows", Attribute::relation("user"));
        let record = Value::from_json(&json!({"out_follows": [1], "in_friends": [2], "name": "x"}));

        clean_attributes(&record, Some(&schema));

        assert_eq!(record.to_json().unwrap(), json!({"out_follows": [1], "name": "x"}));
    }

    #[test]
    fn test_clean_self_nested_record() {
        let record = Value::record([("@version", Value::Int(1)), ("name", Value::from("x"))]);
        record.set_field("me", record.clone());

        clean_attributes(&record, None);

        let keys: Vec<String> = record.as_map().unwrap().borrow().keys().map(String::from).collect();
        assert_eq!(keys, vec!["name", "me"]);
    }
}
