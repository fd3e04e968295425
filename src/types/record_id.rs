//! Store-native record identifiers.
//!
//! A record identifier is a positional pair `#<cluster>:<position>`.
//! Records that have not been persisted yet carry a negative cluster
//! component and are called *temporary*.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use super::value::Value;

/// Textual shape of a record identifier.
static RECORD_ID_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^#(-?\d+):(\d+)$").expect("record id pattern is valid")
});

/// Prefix carried by the string form of every temporary identifier.
const TEMPORARY_PREFIX: &str = "#-";

/// Error returned when a string is not a record identifier.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecordIdError {
    /// Input does not have the `#<cluster>:<position>` shape.
    #[error("not a record id: {0:?}")]
    Malformed(String),
    /// A component does not fit its integer type.
    #[error("record id component out of range: {0:?}")]
    OutOfRange(String),
}

/// Store-native identity of a persisted or pending record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RecordId {
    cluster: i64,
    position: u64,
}

impl RecordId {
    /// Create a record id from its cluster and position.
    pub fn new(cluster: i64, position: u64) -> Self {
        Self { cluster, position }
    }

    /// Cluster component. Negative for temporary records.
    pub fn cluster(&self) -> i64 {
        self.cluster
    }

    /// Position inside the cluster.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Whether this id belongs to a record that has no permanent identity yet.
    pub fn is_temporary(&self) -> bool {
        self.cluster < 0
    }
}

impl fmt::Display for RecordId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}:{}", self.cluster, self.position)
    }
}

impl FromStr for RecordId {
    type Err = RecordIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = RECORD_ID_PATTERN
            .captures(s)
            .ok_or_else(|| RecordIdError::Malformed(s.to_string()))?;
        let cluster = caps[1]
            .parse::<i64>()
            .map_err(|_| RecordIdError::OutOfRange(s.to_string()))?;
        let position = caps[2]
            .parse::<u64>()
            .map_err(|_| RecordIdError::OutOfRange(s.to_string()))?;
        Ok(Self { cluster, position })
    }
}

impl Serialize for RecordId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for RecordId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Whether `s` has the record identifier shape (`#-?\d+:\d+`).
pub fn is_record_id_str(s: &str) -> bool {
    RECORD_ID_PATTERN.is_match(s)
}

/// Whether an identifier's string form denotes a temporary record.
pub fn is_temporary_id(s: &str) -> bool {
    s.starts_with(TEMPORARY_PREFIX)
}

/// Check if a value resembles a record identifier.
///
/// True for a [`Value::RecordId`] or for a string in record id shape.
/// Null and every other value type are never record ids.
pub fn matches_record_id(value: &Value) -> bool {
    match value {
        Value::RecordId(_) => true,
        Value::String(s) => is_record_id_str(s),
        _ => false,
    }
}
