//! Core types for the normalization kernel.

pub mod value;
pub mod record_id;
pub mod schema;

pub use value::{Value, Record, Key, NodeId, ListRef, MapRef, ValueError};
pub use record_id::{RecordId, RecordIdError, matches_record_id, is_record_id_str, is_temporary_id};
pub use schema::{Schema, Attribute, CollectionDescriptor};
