//! # normalization-kernel
//!
//! Cycle-safe normalization of record graphs returned by a document/graph
//! store.
//!
//! Records come back from the driver as nested, possibly self-referential
//! structures: a user embeds their posts, each post embeds its author. The
//! kernel walks such graphs and rewrites each node exactly once, however
//! many links point to it.
//!
//! ## Core Contract
//!
//! 1. Driver identifiers (`@rid` / `rid`) become a canonical string `id`;
//!    temporary identifiers are dropped without an `id`
//! 2. Schema-declared foreign keys holding record ids become strings
//! 3. Generic walks ([`reduce_nested`], [`for_each_nested`]) visit every
//!    node at most once, detecting repeats by identity
//!
//! ## Architecture
//!
//! ```text
//! IdentitySet ──► reduce_nested
//!      │
//!      ├────────► for_each_nested ──► remove_circular_references
//!      │
//!      └────────► rewrite_ids_recursive ──► rewrite_ids ──► normalize_identifier
//! ```
//!
//! ## Guarantees
//!
//! - A node is processed at most once per top-level call
//! - Normalization is idempotent: a second pass finds no driver id to rewrite
//! - Traversal runs on an explicit stack; deep graphs do not exhaust the
//!   call stack
//!
//! All operations mutate their input in place and are single-threaded:
//! [`Value`] containers are `Rc`-shared and not `Send`.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod types;
pub mod config;
pub mod visit;
pub mod traverse;
pub mod normalize;
pub mod canonical;

// Re-exports
pub use types::{Value, Record, Key, NodeId, ValueError};
pub use types::{RecordId, RecordIdError, matches_record_id};
pub use types::{Schema, Attribute, CollectionDescriptor};
pub use config::NormalizerConfig;
pub use visit::IdentitySet;
pub use traverse::{
    reduce_nested, reduce_nested_with_key,
    for_each_nested, for_each_nested_with_cycles,
    remove_circular_references, remove_circular_references_with,
};
pub use normalize::{
    normalize_identifier, rewrite_ids, rewrite_ids_recursive, rewrite_ids_recursive_with,
    clean_attributes, IdOutcome, NormalizeError, RewriteVisited,
};
pub use canonical::{to_canonical_bytes, canonical_hash, canonical_hash_hex};
