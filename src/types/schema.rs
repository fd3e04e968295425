//! Schema metadata consumed by the normalizer.
//!
//! A schema maps field names to attribute definitions. In JSON each entry
//! is either a bare type string (`"string"`) or an object:
//!
//! ```json
//! { "owner": { "model": "user", "columnName": "ownerId" },
//!   "name":  "string" }
//! ```
//!
//! The schema is read-only input; nothing in this crate mutates it.

use std::collections::BTreeMap;

use once_cell::sync::Lazy;
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize};

/// Generated junction table names look like `a_b__c_d`.
static JUNCTION_NAME_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\w+_\w+__\w+_\w+$").expect("junction name pattern is valid")
});

/// Metadata of a single schema field.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Attribute {
    /// Declared value type.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    /// Field holds a foreign key.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub foreign_key: bool,
    /// Related model name, if this field is a relation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    /// Output field name, if it differs from the schema key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub column_name: Option<String>,
    /// Junction collection used by a many-to-many relation.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub through: Option<String>,
}

impl Attribute {
    /// Attribute with only a type.
    pub fn typed(kind: impl Into<String>) -> Self {
        Self { kind: Some(kind.into()), ..Self::default() }
    }

    /// Foreign key attribute.
    pub fn foreign_key() -> Self {
        Self { foreign_key: true, ..Self::default() }
    }

    /// Relation to `model`.
    pub fn relation(model: impl Into<String>) -> Self {
        Self { model: Some(model.into()), ..Self::default() }
    }

    /// Set the column name alias.
    pub fn with_column_name(mut self, column_name: impl Into<String>) -> Self {
        self.column_name = Some(column_name.into());
        self
    }

    /// Whether the field denotes a relation to another record.
    pub fn is_relation(&self) -> bool {
        self.foreign_key || self.model.is_some()
    }

    /// Output field name, falling back to the schema key.
    pub fn column_name<'a>(&'a self, key: &'a str) -> &'a str {
        self.column_name.as_deref().unwrap_or(key)
    }
}

/// Schema entry as written: a bare type string or a full definition.
#[derive(Deserialize)]
#[serde(untagged)]
enum AttributeSpec {
    Type(String),
    Full(Attribute),
}

impl From<AttributeSpec> for Attribute {
    fn from(spec: AttributeSpec) -> Self {
        match spec {
            AttributeSpec::Type(kind) => Attribute::typed(kind),
            AttributeSpec::Full(attribute) => attribute,
        }
    }
}

/// Field name -> attribute metadata.
///
/// Iterates in key order for deterministic processing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Schema {
    attributes: BTreeMap<String, Attribute>,
}

impl<'de> Deserialize<'de> for Schema {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = BTreeMap::<String, AttributeSpec>::deserialize(deserializer)?;
        Ok(Self {
            attributes: raw.into_iter().map(|(k, v)| (k, v.into())).collect(),
        })
    }
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace an attribute.
    pub fn with_attribute(mut self, key: impl Into<String>, attribute: Attribute) -> Self {
        self.attributes.insert(key.into(), attribute);
        self
    }

    /// Whether a field of exactly this name is declared.
    pub fn contains(&self, key: &str) -> bool {
        self.attributes.contains_key(key)
    }

    /// Attribute declared under `key`.
    pub fn get(&self, key: &str) -> Option<&Attribute> {
        self.attributes.get(key)
    }

    /// Look up an attribute by schema key, then by column name alias.
    pub fn attribute(&self, column_name: &str) -> Option<&Attribute> {
        if column_name.is_empty() {
            return None;
        }
        self.attributes.get(column_name).or_else(|| {
            self.attributes
                .values()
                .find(|a| a.column_name.as_deref() == Some(column_name))
        })
    }

    /// All attributes in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Attribute)> {
        self.attributes.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// `(schema key, column name)` of every relation field.
    pub fn relation_columns(&self) -> impl Iterator<Item = (&str, &str)> {
        self.iter()
            .filter(|(_, a)| a.is_relation())
            .map(|(key, a)| (key, a.column_name(key)))
    }

    /// Number of attributes.
    pub fn len(&self) -> usize {
        self.attributes.len()
    }

    /// Whether no attributes are declared.
    pub fn is_empty(&self) -> bool {
        self.attributes.is_empty()
    }
}

/// Naming metadata of a collection, used to classify junction tables.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CollectionDescriptor {
    /// Logical identity of the collection.
    pub identity: Option<String>,
    /// Physical table name.
    pub table_name: Option<String>,
    /// Collection is a junction between two others.
    pub junction_table: bool,
    /// Tables joined by a generated junction.
    pub tables: Option<Vec<String>>,
}

impl CollectionDescriptor {
    /// Whether this is a user-declared "through" junction rather than a
    /// generated one.
    pub fn is_junction_table_through(&self) -> bool {
        if !self.junction_table || self.tables.is_some() {
            return false;
        }

        if let (Some(identity), Some(table_name)) = (&self.identity, &self.table_name) {
            if identity != table_name {
                return true;
            }
        }

        match self.identity.as_deref().or(self.table_name.as_deref()) {
            Some(name) => !JUNCTION_NAME_PATTERN.is_match(name),
            None => false,
        }
    }
}
