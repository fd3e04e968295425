//! Driver conventions and normalizer configuration.
//!
//! The driver conventions are fixed by the store's wire format and are not
//! configurable. [`NormalizerConfig`] only covers choices this crate makes
//! on its own.

use serde::{Deserialize, Serialize};

/// Canonical identifier field produced by normalization.
pub const ID_FIELD: &str = "id";

/// Driver-native identifier field, lowercase form.
pub const RID_FIELD: &str = "rid";

/// Driver-native identifier field, reserved-attribute form.
pub const AT_RID_FIELD: &str = "@rid";

/// Prefix of reserved driver attributes (`@rid`, `@version`, `@class`, ...).
pub const RESERVED_PREFIX: char = '@';

/// Prefix of inbound edge reference fields.
pub const IN_EDGE_PREFIX: &str = "in_";

/// Prefix of outbound edge reference fields.
pub const OUT_EDGE_PREFIX: &str = "out_";

/// Default marker written in place of a back-edge to a node without an `id`.
pub const DEFAULT_CIRCULAR_PLACEHOLDER: &str = "[Circular]";

/// Default key passed to the reducer callback for the root node.
pub const DEFAULT_ROOT_KEY: &str = "_root";

/// Whether `name` is a reserved driver attribute.
pub fn is_reserved_attribute(name: &str) -> bool {
    name.starts_with(RESERVED_PREFIX)
}

/// Whether `name` follows the edge reference naming convention.
pub fn is_edge_field(name: &str) -> bool {
    name.starts_with(IN_EDGE_PREFIX) || name.starts_with(OUT_EDGE_PREFIX)
}

/// Tunables of the traversal helpers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Marker that replaces a back-edge to a node without an `id`.
    pub circular_placeholder: String,
    /// Key reported for the root node by the reducer.
    pub root_key: String,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            circular_placeholder: DEFAULT_CIRCULAR_PLACEHOLDER.to_string(),
            root_key: DEFAULT_ROOT_KEY.to_string(),
        }
    }
}
