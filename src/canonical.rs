//! Canonical serialization for deterministic fingerprints.
//!
//! Produces a stable byte form of an acyclic record graph so two graphs can
//! be compared cheaply, for example to check that a second normalization
//! pass changed nothing.
//!
//! ## Determinism Guarantees
//!
//! - Object keys are written in sorted order, whatever the field order of
//!   the record
//! - Lists serialize in index order
//! - Timestamps and record ids use their canonical string forms

use xxhash_rust::xxh64::xxh64;

use crate::types::{Value, ValueError};

/// Serialize a graph to canonical JSON bytes.
///
/// Fails on cycles; run
/// [`remove_circular_references`](crate::traverse::remove_circular_references)
/// first if the graph may contain any.
///
/// The JSON tree is built on an explicit stack; writing it out goes through
/// `serde_json`'s serializer, which recurses once per nesting level.
pub fn to_canonical_bytes(value: &Value) -> Result<Vec<u8>, ValueError> {
    let json = value.to_sorted_json()?;
    // Serializing a `serde_json::Value` to a Vec cannot fail.
    Ok(serde_json::to_vec(&json).unwrap_or_default())
}

/// Compute canonical hash of a graph.
pub fn canonical_hash(value: &Value) -> Result<u64, ValueError> {
    let bytes = to_canonical_bytes(value)?;
    Ok(xxh64(&bytes, 0))
}

/// Compute canonical hash and return as hex string.
pub fn canonical_hash_hex(value: &Value) -> Result<String, ValueError> {
    Ok(format!("{:016x}", canonical_hash(value)?))
}
