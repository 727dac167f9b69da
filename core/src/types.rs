//! Schema type definitions for table, index and migration modeling.
//!
//! This module defines the declarative data model consumed by the migration
//! engine of every backend. The types are designed for serialization with
//! [`serde`] and accept the JSON shape used by migration descriptor files
//! (`appliesTo`, `oneToMany`, `"type": "Counter"` and so on).

use std::cmp::Ordering;
use std::fmt;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::query::QueryError;

/// Name of the bookkeeping table that records applied migrations.
pub const MIGRATIONS_TABLE: &str = "migrations";

/// Version reported for tables that have never been migrated.
pub const DEFAULT_VERSION: &str = "0.0";

/// Abstract attribute type, independent of its physical storage.
///
/// Serialized with the names used in migration descriptors. `URL` and `Url`
/// are both accepted; any unknown name is kept verbatim in
/// [`SemanticType::Other`] so descriptors written for newer type sets still
/// load.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::SemanticType;
///
/// let ty: SemanticType = serde_json::from_str("\"Counter\"").unwrap();
/// assert_eq!(ty, SemanticType::Counter);
/// assert_eq!(SemanticType::from("URL"), SemanticType::Url);
/// assert_eq!(SemanticType::from("Json"), SemanticType::Other("Json".into()));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum SemanticType {
    Boolean,
    Byte,
    Number,
    Float,
    /// Auto-incrementing integer primary key.
    Counter,
    Currency,
    Decimal,
    Date,
    DateTime,
    Time,
    Long,
    Duration,
    Integer,
    Text,
    Note,
    Url,
    Binary,
    Image,
    Guid,
    Short,
    /// A type name this crate does not know about.
    Other(String),
}

impl SemanticType {
    /// Returns the descriptor name of this type.
    pub fn as_str(&self) -> &str {
        match self {
            SemanticType::Boolean => "Boolean",
            SemanticType::Byte => "Byte",
            SemanticType::Number => "Number",
            SemanticType::Float => "Float",
            SemanticType::Counter => "Counter",
            SemanticType::Currency => "Currency",
            SemanticType::Decimal => "Decimal",
            SemanticType::Date => "Date",
            SemanticType::DateTime => "DateTime",
            SemanticType::Time => "Time",
            SemanticType::Long => "Long",
            SemanticType::Duration => "Duration",
            SemanticType::Integer => "Integer",
            SemanticType::Text => "Text",
            SemanticType::Note => "Note",
            SemanticType::Url => "URL",
            SemanticType::Binary => "Binary",
            SemanticType::Image => "Image",
            SemanticType::Guid => "Guid",
            SemanticType::Short => "Short",
            SemanticType::Other(name) => name,
        }
    }
}

impl From<&str> for SemanticType {
    fn from(name: &str) -> Self {
        match name {
            "Boolean" => SemanticType::Boolean,
            "Byte" => SemanticType::Byte,
            "Number" => SemanticType::Number,
            "Float" => SemanticType::Float,
            "Counter" => SemanticType::Counter,
            "Currency" => SemanticType::Currency,
            "Decimal" => SemanticType::Decimal,
            "Date" => SemanticType::Date,
            "DateTime" => SemanticType::DateTime,
            "Time" => SemanticType::Time,
            "Long" => SemanticType::Long,
            "Duration" => SemanticType::Duration,
            "Integer" => SemanticType::Integer,
            "Text" => SemanticType::Text,
            "Note" => SemanticType::Note,
            "URL" | "Url" => SemanticType::Url,
            "Binary" => SemanticType::Binary,
            "Image" => SemanticType::Image,
            "Guid" => SemanticType::Guid,
            "Short" => SemanticType::Short,
            other => SemanticType::Other(other.to_string()),
        }
    }
}

impl From<String> for SemanticType {
    fn from(name: String) -> Self {
        SemanticType::from(name.as_str())
    }
}

impl From<SemanticType> for String {
    fn from(ty: SemanticType) -> Self {
        ty.as_str().to_string()
    }
}

impl fmt::Display for SemanticType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared shape of a single column.
///
/// `nullable` is tri-state: `None` renders as nullable, only an explicit
/// `Some(false)` produces `NOT NULL`. A [`SemanticType::Counter`] column is
/// always rendered as the auto-incrementing primary key, whatever `primary`
/// says.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::{ColumnDescriptor, SemanticType};
///
/// let id = ColumnDescriptor::counter("id");
/// assert!(id.is_primary_key());
///
/// let name = ColumnDescriptor::new("name", SemanticType::Text)
///     .with_size(255)
///     .not_null();
/// assert_eq!(name.nullable, Some(false));
/// assert_eq!(name.size, Some(255));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: String,
    #[serde(rename = "type")]
    pub semantic_type: SemanticType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ordinal: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nullable: Option<bool>,
    #[serde(default, skip_serializing_if = "is_false")]
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
    /// Relationship placeholder with no physical column.
    #[serde(default, skip_serializing_if = "is_false")]
    pub one_to_many: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl ColumnDescriptor {
    /// Creates a nullable, non-primary column of the given type.
    pub fn new(name: impl Into<String>, semantic_type: SemanticType) -> Self {
        Self {
            name: name.into(),
            semantic_type,
            ordinal: None,
            nullable: None,
            primary: false,
            size: None,
            scale: None,
            one_to_many: false,
        }
    }

    /// Creates an auto-incrementing primary key column.
    pub fn counter(name: impl Into<String>) -> Self {
        Self::new(name, SemanticType::Counter).as_primary()
    }

    /// Marks the column as the primary key.
    pub fn as_primary(mut self) -> Self {
        self.primary = true;
        self
    }

    /// Sets `nullable` to an explicit `false`.
    pub fn not_null(mut self) -> Self {
        self.nullable = Some(false);
        self
    }

    /// Sets `nullable` to an explicit `true`.
    pub fn nullable(mut self) -> Self {
        self.nullable = Some(true);
        self
    }

    pub fn with_size(mut self, size: u32) -> Self {
        self.size = Some(size);
        self
    }

    pub fn with_scale(mut self, scale: u32) -> Self {
        self.scale = Some(scale);
        self
    }

    /// Marks the column as a relationship placeholder.
    pub fn one_to_many(mut self) -> Self {
        self.one_to_many = true;
        self
    }

    /// Returns `true` if the column renders as a primary key.
    pub fn is_primary_key(&self) -> bool {
        self.primary || self.semantic_type == SemanticType::Counter
    }
}

/// Column shape read back from a live table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveColumn {
    pub name: String,
    pub ordinal: u32,
    /// Declared type text exactly as the engine reports it (e.g. `TEXT(255,0)`).
    #[serde(rename = "type")]
    pub declared_type: String,
    pub nullable: bool,
    pub primary: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

/// A named index over an ordered list of columns.
///
/// Column order is significant: two descriptors with the same name and the
/// same columns in a different order are not equal.
///
/// In descriptor files `columns` may be a single string or a sequence of
/// strings.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::IndexDescriptor;
///
/// let ix: IndexDescriptor =
///     serde_json::from_str(r#"{"name": "IX_NAME", "columns": "name"}"#).unwrap();
/// assert_eq!(ix, IndexDescriptor::new("IX_NAME", ["name"]));
///
/// let bad = serde_json::from_str::<IndexDescriptor>(r#"{"name": "IX", "columns": 3}"#);
/// assert!(bad.is_err());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexDescriptor {
    pub name: String,
    #[serde(deserialize_with = "deserialize_index_columns")]
    pub columns: Vec<String>,
}

impl IndexDescriptor {
    pub fn new<I, S>(name: impl Into<String>, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            columns: columns.into_iter().map(Into::into).collect(),
        }
    }
}

/// Reads an index column list from a JSON value.
///
/// # Errors
///
/// Returns [`QueryError::InvalidIndexSpec`] unless the value is a string or
/// an array made only of strings.
pub fn index_columns_from_value(value: &Value) -> Result<Vec<String>, QueryError> {
    match value {
        Value::String(column) => Ok(vec![column.clone()]),
        Value::Array(items) => items
            .iter()
            .map(|item| match item {
                Value::String(column) => Ok(column.clone()),
                _ => Err(QueryError::InvalidIndexSpec(
                    "columns must be a string or a sequence of strings".to_string(),
                )),
            })
            .collect(),
        _ => Err(QueryError::InvalidIndexSpec(
            "columns must be a string or a sequence of strings".to_string(),
        )),
    }
}

fn deserialize_index_columns<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    index_columns_from_value(&value).map_err(serde::de::Error::custom)
}

/// Reference to a column scheduled for removal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnName {
    pub name: String,
}

/// Declarative desired state of one table.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::*;
///
/// let descriptor: MigrationDescriptor = serde_json::from_str(r#"{
///     "appliesTo": "Table1",
///     "model": "Table1",
///     "version": "1.0",
///     "add": [
///         { "name": "id", "type": "Counter", "primary": true },
///         { "name": "name", "type": "Text", "nullable": false }
///     ]
/// }"#).unwrap();
/// assert_eq!(descriptor.applies_to, "Table1");
/// assert_eq!(descriptor.add.len(), 2);
/// assert!(descriptor.change.is_empty());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationDescriptor {
    pub applies_to: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub version: Version,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default)]
    pub add: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub change: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub remove: Vec<ColumnName>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub indexes: Vec<IndexDescriptor>,
}

impl MigrationDescriptor {
    /// Creates an empty descriptor for `applies_to` at `version`.
    pub fn new(applies_to: impl Into<String>, version: impl Into<Version>) -> Self {
        Self {
            applies_to: applies_to.into(),
            model: None,
            version: version.into(),
            description: None,
            add: Vec::new(),
            change: Vec::new(),
            remove: Vec::new(),
            indexes: Vec::new(),
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn add_column(mut self, column: ColumnDescriptor) -> Self {
        self.add.push(column);
        self
    }

    pub fn change_column(mut self, column: ColumnDescriptor) -> Self {
        self.change.push(column);
        self
    }

    pub fn remove_column(mut self, name: impl Into<String>) -> Self {
        self.remove.push(ColumnName { name: name.into() });
        self
    }

    pub fn with_index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }
}

/// One row of the migrations bookkeeping table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationRecord {
    pub applies_to: String,
    pub model: Option<String>,
    pub version: Version,
    pub description: Option<String>,
}

impl From<&MigrationDescriptor> for MigrationRecord {
    fn from(descriptor: &MigrationDescriptor) -> Self {
        Self {
            applies_to: descriptor.applies_to.clone(),
            model: descriptor.model.clone(),
            version: descriptor.version.clone(),
            description: descriptor.description.clone(),
        }
    }
}

/// Dotted version string with segment-wise ordering.
///
/// Segments that parse as integers compare numerically, all others compare
/// as text, and missing trailing segments count as `0`. Equality follows the
/// same ordering, so `"1"` equals `"1.0"`.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::Version;
///
/// assert!(Version::from("10.0") > Version::from("9.2"));
/// assert_eq!(Version::from("1"), Version::from("1.0"));
/// assert!(Version::default() < Version::from("0.1"));
/// ```
#[derive(Debug, Clone, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Version(String);

impl Version {
    pub fn new(version: impl Into<String>) -> Self {
        Self(version.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for Version {
    fn default() -> Self {
        Self(DEFAULT_VERSION.to_string())
    }
}

impl From<&str> for Version {
    fn from(version: &str) -> Self {
        Self(version.to_string())
    }
}

impl From<String> for Version {
    fn from(version: String) -> Self {
        Self(version)
    }
}

impl fmt::Display for Version {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl Ord for Version {
    fn cmp(&self, other: &Self) -> Ordering {
        let left: Vec<&str> = self.0.trim().split('.').collect();
        let right: Vec<&str> = other.0.trim().split('.').collect();
        for i in 0..left.len().max(right.len()) {
            let a = left.get(i).map(|s| s.trim()).unwrap_or("0");
            let b = right.get(i).map(|s| s.trim()).unwrap_or("0");
            let ordering = match (a.parse::<u64>(), b.parse::<u64>()) {
                (Ok(a), Ok(b)) => a.cmp(&b),
                _ => a.cmp(b),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

impl PartialOrd for Version {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Version {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}
