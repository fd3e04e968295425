//! Value model for record graphs.
//!
//! ## Shape
//!
//! A [`Value`] is either a leaf or a container:
//!
//! | Variant | Kind |
//! |---------|------|
//! | `Null`, `Bool`, `Int`, `Float`, `String` | leaf |
//! | `Timestamp`, `RecordId` | opaque leaf (never descended into) |
//! | `List`, `Map` | container |
//!
//! Containers are shared handles (`Rc<RefCell<_>>`). Cloning a container
//! value clones the handle, not the contents, so the same node can hang
//! off several parents and a node can (transitively) contain itself.
//! Node identity is the address of the shared allocation, see [`NodeId`].
//!
//! `Debug` output is shallow for containers so that cyclic graphs can be
//! printed.

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use chrono::{DateTime, SecondsFormat, Utc};

use super::record_id::RecordId;

/// Shared handle to a list node.
pub type ListRef = Rc<RefCell<Vec<Value>>>;

/// Shared handle to a record node.
pub type MapRef = Rc<RefCell<Record>>;

/// Error type for the JSON bridge.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValueError {
    /// A container was reached again while it was still being serialised.
    #[error("circular structure at {path}")]
    CircularStructure {
        /// Dotted path of the back-edge.
        path: String,
    },
    /// JSON has no representation for NaN or infinities.
    #[error("non-finite float at {path}")]
    NonFiniteFloat {
        /// Dotted path of the offending value.
        path: String,
    },
}

/// Identity of a container node within one traversal.
///
/// Two distinct containers with equal content have different ids.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NodeId(usize);

impl NodeId {
    fn of_list(list: &ListRef) -> Self {
        Self(Rc::as_ptr(list) as *const () as usize)
    }

    fn of_map(map: &MapRef) -> Self {
        Self(Rc::as_ptr(map) as *const () as usize)
    }
}

/// Position of a value inside its parent container.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Key {
    /// Index into a list.
    Index(usize),
    /// Field name of a record.
    Field(String),
}

impl Key {
    /// Field name, if this key addresses a record field.
    pub fn as_field(&self) -> Option<&str> {
        match self {
            Self::Field(name) => Some(name),
            Self::Index(_) => None,
        }
    }

    /// List index, if this key addresses a list element.
    pub fn as_index(&self) -> Option<usize> {
        match self {
            Self::Index(i) => Some(*i),
            Self::Field(_) => None,
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Index(i) => write!(f, "{i}"),
            Self::Field(name) => f.write_str(name),
        }
    }
}

impl From<usize> for Key {
    fn from(i: usize) -> Self {
        Self::Index(i)
    }
}

impl From<&str> for Key {
    fn from(name: &str) -> Self {
        Self::Field(name.to_string())
    }
}

impl From<String> for Key {
    fn from(name: String) -> Self {
        Self::Field(name)
    }
}

impl PartialEq<&str> for Key {
    fn eq(&self, other: &&str) -> bool {
        self.as_field() == Some(*other)
    }
}

/// Insertion-ordered field list of a record.
///
/// Replacing a field keeps its position; removing a field keeps the
/// relative order of the others.
#[derive(Clone, Default)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Create an empty record.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the record has no fields.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Own-field check. A field holding `Null` still counts as present.
    pub fn contains_key(&self, name: &str) -> bool {
        self.position(name).is_some()
    }

    /// Borrow a field value.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.position(name).map(|i| &self.fields[i].1)
    }

    /// Mutably borrow a field value.
    pub fn get_mut(&mut self, name: &str) -> Option<&mut Value> {
        self.position(name).map(move |i| &mut self.fields[i].1)
    }

    /// Set a field, returning the previous value if there was one.
    pub fn insert(&mut self, name: impl Into<String>, value: Value) -> Option<Value> {
        let name = name.into();
        match self.position(&name) {
            Some(i) => Some(std::mem::replace(&mut self.fields[i].1, value)),
            None => {
                self.fields.push((name, value));
                None
            }
        }
    }

    /// Delete a field, returning its value.
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.position(name).map(|i| self.fields.remove(i).1)
    }

    /// Keep only the fields for which `keep` returns true.
    pub fn retain(&mut self, mut keep: impl FnMut(&str, &mut Value) -> bool) {
        self.fields.retain_mut(|(name, value)| keep(name, value));
    }

    /// Field names in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Fields in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }

    /// Mutable fields in insertion order.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (&str, &mut Value)> {
        self.fields.iter_mut().map(|(name, value)| (name.as_str(), value))
    }

    fn position(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }
}

impl<K: Into<String>> FromIterator<(K, Value)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Value)>>(iter: I) -> Self {
        let mut record = Record::new();
        for (name, value) in iter {
            record.insert(name, value);
        }
        record
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_map().entries(self.fields.iter().map(|(k, v)| (k, v))).finish()
    }
}

/// A node or leaf of a record graph.
#[derive(Clone)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point number.
    Float(f64),
    /// UTF-8 string.
    String(String),
    /// Point in time. Opaque leaf.
    Timestamp(DateTime<Utc>),
    /// Store-native record identifier. Opaque leaf.
    RecordId(RecordId),
    /// Ordered sequence container.
    List(ListRef),
    /// Keyed record container.
    Map(MapRef),
}

impl Value {
    /// Wrap elements in a new list node.
    pub fn list(items: Vec<Value>) -> Self {
        Self::List(Rc::new(RefCell::new(items)))
    }

    /// Wrap a record in a new map node.
    pub fn map(record: Record) -> Self {
        Self::Map(Rc::new(RefCell::new(record)))
    }

    /// Build a new map node from `(name, value)` pairs.
    pub fn record<K, I>(fields: I) -> Self
    where
        K: Into<String>,
        I: IntoIterator<Item = (K, Value)>,
    {
        Self::map(fields.into_iter().collect())
    }

    /// Name of the variant, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "null",
            Self::Bool(_) => "bool",
            Self::Int(_) => "int",
            Self::Float(_) => "float",
            Self::String(_) => "string",
            Self::Timestamp(_) => "timestamp",
            Self::RecordId(_) => "record_id",
            Self::List(_) => "list",
            Self::Map(_) => "map",
        }
    }

    /// Whether this is `Null`.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Whether this is a list or map node.
    pub fn is_container(&self) -> bool {
        matches!(self, Self::List(_) | Self::Map(_))
    }

    /// Whether this is a timestamp or record id.
    pub fn is_opaque_leaf(&self) -> bool {
        matches!(self, Self::Timestamp(_) | Self::RecordId(_))
    }

    /// String contents, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Integer contents, if this is an integer.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Record handle, if this is a map node.
    pub fn as_map(&self) -> Option<&MapRef> {
        match self {
            Self::Map(map) => Some(map),
            _ => None,
        }
    }

    /// List handle, if this is a list node.
    pub fn as_list(&self) -> Option<&ListRef> {
        match self {
            Self::List(list) => Some(list),
            _ => None,
        }
    }

    /// Identity of the node, `None` for leaves.
    pub fn node_id(&self) -> Option<NodeId> {
        match self {
            Self::List(list) => Some(NodeId::of_list(list)),
            Self::Map(map) => Some(NodeId::of_map(map)),
            _ => None,
        }
    }

    /// Whether both values are the same container node.
    pub fn same_node(&self, other: &Value) -> bool {
        match (self.node_id(), other.node_id()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    /// Number of elements or fields; zero for leaves.
    pub fn len(&self) -> usize {
        match self {
            Self::List(list) => list.borrow().len(),
            Self::Map(map) => map.borrow().len(),
            _ => 0,
        }
    }

    /// Whether [`len`](Self::len) is zero.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Child at `key`, cloning the handle.
    pub fn get(&self, key: &Key) -> Option<Value> {
        match (self, key) {
            (Self::List(list), Key::Index(i)) => list.borrow().get(*i).cloned(),
            (Self::Map(map), Key::Field(name)) => map.borrow().get(name).cloned(),
            _ => None,
        }
    }

    /// Replace the child at `key`. Returns false when `key` does not fit
    /// this container (wrong key kind, index out of bounds, or a leaf).
    pub fn set(&self, key: &Key, value: Value) -> bool {
        match (self, key) {
            (Self::List(list), Key::Index(i)) => match list.borrow_mut().get_mut(*i) {
                Some(slot) => {
                    *slot = value;
                    true
                }
                None => false,
            },
            (Self::Map(map), Key::Field(name)) => {
                map.borrow_mut().insert(name.clone(), value);
                true
            }
            _ => false,
        }
    }

    /// Field of a map node, cloning the handle.
    pub fn field(&self, name: &str) -> Option<Value> {
        self.as_map().and_then(|map| map.borrow().get(name).cloned())
    }

    /// Set a field on a map node. No-op on anything else.
    pub fn set_field(&self, name: &str, value: Value) {
        if let Some(map) = self.as_map() {
            map.borrow_mut().insert(name, value);
        }
    }

    /// Remove a field from a map node.
    pub fn remove_field(&self, name: &str) -> Option<Value> {
        self.as_map().and_then(|map| map.borrow_mut().remove(name))
    }

    /// Own-field check on a map node.
    pub fn has_field(&self, name: &str) -> bool {
        self.as_map().map_or(false, |map| map.borrow().contains_key(name))
    }

    /// Snapshot of the direct children in enumeration order.
    ///
    /// Lists enumerate by index, records by insertion order. The snapshot
    /// holds cloned handles so callers may mutate the node while walking it.
    pub fn children(&self) -> Vec<(Key, Value)> {
        match self {
            Self::List(list) => list
                .borrow()
                .iter()
                .enumerate()
                .map(|(i, v)| (Key::Index(i), v.clone()))
                .collect(),
            Self::Map(map) => map
                .borrow()
                .iter()
                .map(|(k, v)| (Key::Field(k.to_string()), v.clone()))
                .collect(),
            _ => Vec::new(),
        }
    }

    /// Canonical string form of a value usable as a record identifier.
    ///
    /// Strings, integers and record ids qualify; anything else is `None`.
    pub fn as_identifier(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Int(i) => Some(i.to_string()),
            Self::RecordId(rid) => Some(rid.to_string()),
            _ => None,
        }
    }

    /// Build a fresh, acyclic graph from JSON.
    ///
    /// Object fields keep their document order. Strings stay strings; no
    /// timestamp or record id detection is done. Integers that do not fit
    /// in an `i64` (above `i64::MAX`) become `Float` and may lose precision.
    pub fn from_json(json: &serde_json::Value) -> Self {
        let root = Self::shallow_from_json(json);
        let mut stack = vec![(json, root.clone())];

        while let Some((json, node)) = stack.pop() {
            match (json, &node) {
                (serde_json::Value::Array(items), Self::List(list)) => {
                    let mut list = list.borrow_mut();
                    for item in items {
                        let child = Self::shallow_from_json(item);
                        if child.is_container() {
                            stack.push((item, child.clone()));
                        }
                        list.push(child);
                    }
                }
                (serde_json::Value::Object(fields), Self::Map(map)) => {
                    let mut record = map.borrow_mut();
                    for (name, item) in fields {
                        let child = Self::shallow_from_json(item);
                        if child.is_container() {
                            stack.push((item, child.clone()));
                        }
                        record.insert(name.as_str(), child);
                    }
                }
                _ => {}
            }
        }
        root
    }

    /// Leaf conversion, or an empty container to be filled by the caller.
    fn shallow_from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(*b),
            serde_json::Value::Number(n) => match n.as_i64() {
                Some(i) => Self::Int(i),
                None => Self::Float(n.as_f64().unwrap_or(f64::NAN)),
            },
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::list(Vec::with_capacity(items.len())),
            serde_json::Value::Object(_) => Self::map(Record::new()),
        }
    }

    /// Serialise an acyclic graph to JSON.
    ///
    /// Shared (diamond) nodes are written once per reference. Timestamps are
    /// written as RFC 3339, record ids as `#cluster:position`. Record fields
    /// keep their insertion order.
    pub fn to_json(&self) -> Result<serde_json::Value, ValueError> {
        self.to_json_ordered(false)
    }

    /// Like [`to_json`](Self::to_json), with the fields of every record
    /// sorted by name.
    pub(crate) fn to_sorted_json(&self) -> Result<serde_json::Value, ValueError> {
        self.to_json_ordered(true)
    }

    fn to_json_ordered(&self, sorted: bool) -> Result<serde_json::Value, ValueError> {
        let Some(root_id) = self.node_id() else {
            return self.leaf_to_json(|| display_path(&[]));
        };

        let mut result = serde_json::Value::Null;
        let mut stack = vec![JsonFrame::open(self, root_id, None, sorted)];
        while let Some(frame) = stack.last_mut() {
            match frame.entries.next() {
                Some((key, child)) => match child.node_id() {
                    Some(id) => {
                        // Only nodes on the current path are cycles; a node
                        // reached again from a sibling branch is a diamond.
                        if stack.iter().any(|open| open.node == id) {
                            return Err(ValueError::CircularStructure {
                                path: frame_path(&stack, &key),
                            });
                        }
                        stack.push(JsonFrame::open(&child, id, Some(key), sorted));
                    }
                    None => {
                        let json = child.leaf_to_json(|| frame_path(&stack, &key))?;
                        if let Some(frame) = stack.last_mut() {
                            frame.out.push(key, json);
                        }
                    }
                },
                None => {
                    let Some(done) = stack.pop() else { break };
                    let json = done.out.finish();
                    match (stack.last_mut(), done.key) {
                        (Some(parent), Some(key)) => parent.out.push(key, json),
                        _ => result = json,
                    }
                }
            }
        }
        Ok(result)
    }

    /// Containers are never passed here; they map to `null`.
    fn leaf_to_json(&self, path: impl FnOnce() -> String) -> Result<serde_json::Value, ValueError> {
        let json = match self {
            Self::Null | Self::List(_) | Self::Map(_) => serde_json::Value::Null,
            Self::Bool(b) => serde_json::Value::Bool(*b),
            Self::Int(i) => serde_json::Value::from(*i),
            Self::Float(x) => serde_json::Number::from_f64(*x)
                .map(serde_json::Value::Number)
                .ok_or_else(|| ValueError::NonFiniteFloat { path: path() })?,
            Self::String(s) => serde_json::Value::String(s.clone()),
            Self::Timestamp(ts) => {
                serde_json::Value::String(ts.to_rfc3339_opts(SecondsFormat::AutoSi, true))
            }
            Self::RecordId(rid) => serde_json::Value::String(rid.to_string()),
        };
        Ok(json)
    }
}

/// A container being serialised: its remaining children and the output
/// built so far.
struct JsonFrame {
    node: NodeId,
    key: Option<Key>,
    entries: std::vec::IntoIter<(Key, Value)>,
    out: JsonOut,
}

impl JsonFrame {
    fn open(value: &Value, node: NodeId, key: Option<Key>, sorted: bool) -> Self {
        let mut children = value.children();
        if sorted {
            children.sort_by(|a, b| a.0.as_field().cmp(&b.0.as_field()));
        }
        let out = match value {
            Value::List(_) => JsonOut::Array(Vec::with_capacity(children.len())),
            _ => JsonOut::Object(serde_json::Map::new()),
        };
        Self { node, key, entries: children.into_iter(), out }
    }
}

enum JsonOut {
    Array(Vec<serde_json::Value>),
    Object(serde_json::Map<String, serde_json::Value>),
}

impl JsonOut {
    fn push(&mut self, key: Key, json: serde_json::Value) {
        match self {
            Self::Array(items) => items.push(json),
            Self::Object(fields) => {
                fields.insert(key.to_string(), json);
            }
        }
    }

    fn finish(self) -> serde_json::Value {
        match self {
            Self::Array(items) => serde_json::Value::Array(items),
            Self::Object(fields) => serde_json::Value::Object(fields),
        }
    }
}

/// Dotted path of `key` below the open frames; the root frame has no key.
fn frame_path(stack: &[JsonFrame], key: &Key) -> String {
    let mut segments: Vec<String> =
        stack.iter().filter_map(|frame| frame.key.as_ref().map(Key::to_string)).collect();
    segments.push(key.to_string());
    display_path(&segments)
}

fn display_path(path: &[String]) -> String {
    if path.is_empty() {
        "$".to_string()
    } else {
        format!("$.{}", path.join("."))
    }
}

impl Default for Value {
    fn default() -> Self {
        Self::Null
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("Null"),
            Self::Bool(b) => write!(f, "Bool({b})"),
            Self::Int(i) => write!(f, "Int({i})"),
            Self::Float(x) => write!(f, "Float({x})"),
            Self::String(s) => write!(f, "String({s:?})"),
            Self::Timestamp(ts) => write!(f, "Timestamp({ts})"),
            Self::RecordId(rid) => write!(f, "RecordId({rid})"),
            Self::List(list) => match list.try_borrow() {
                Ok(items) => write!(f, "List(len={})", items.len()),
                Err(_) => f.write_str("List(<borrowed>)"),
            },
            Self::Map(map) => match map.try_borrow() {
                Ok(record) => {
                    f.write_str("Map")?;
                    f.debug_list().entries(record.keys()).finish()
                }
                Err(_) => f.write_str("Map(<borrowed>)"),
            },
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Self::Int(i)
    }
}

impl From<f64> for Value {
    fn from(x: f64) -> Self {
        Self::Float(x)
    }
}

impl From<RecordId> for Value {
    fn from(rid: RecordId) -> Self {
        Self::RecordId(rid)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(ts: DateTime<Utc>) -> Self {
        Self::Timestamp(ts)
    }
}

impl From<Record> for Value {
    fn from(record: Record) -> Self {
        Self::map(record)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::list(items)
    }
}
