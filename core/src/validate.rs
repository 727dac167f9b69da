//! Migration descriptor validation.
//!
//! Validates structural invariants of migration descriptors, catching errors
//! such as duplicate columns, competing primary keys and empty indexes
//! before any DDL is issued. Index columns are resolved later, against the
//! live table, since a descriptor may index columns an earlier version
//! created.
//!
//! # Examples
//!
//! ```
//! use schema_adapter_core::*;
//!
//! let descriptor = MigrationDescriptor::new("Table1", "1.0")
//!     .add_column(ColumnDescriptor::counter("id"))
//!     .add_column(ColumnDescriptor::new("name", SemanticType::Text).not_null());
//! assert!(validate_descriptor(&descriptor).is_empty());
//!
//! // Invalid: two primary keys
//! let bad = MigrationDescriptor::new("Table1", "1.0")
//!     .add_column(ColumnDescriptor::counter("id"))
//!     .add_column(ColumnDescriptor::new("code", SemanticType::Text).as_primary());
//! assert!(!validate_descriptor(&bad).is_empty());
//! ```

use std::collections::HashSet;

use thiserror::Error;

use crate::{ColumnDescriptor, MigrationDescriptor};

/// Descriptor validation errors.
///
/// Each variant describes a specific structural problem found during
/// validation. The `Display` impl provides a human-readable message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// `appliesTo` is empty or whitespace-only.
    #[error("migration target table cannot be empty")]
    EmptyTableName,
    /// `version` is empty or whitespace-only.
    #[error("migration version cannot be empty")]
    EmptyVersion,
    /// A column has an empty name.
    #[error("column name cannot be empty")]
    EmptyColumnName,
    /// The same column appears twice in `add` or twice in `change`.
    #[error("duplicate column: {0}")]
    DuplicateColumn(String),
    /// More than one column renders as a primary key.
    #[error("multiple primary keys: {0}")]
    MultiplePrimaryKeys(String),
    /// An index has an empty name.
    #[error("index name cannot be empty")]
    EmptyIndexName,
    /// An index lists no columns.
    #[error("index {0} has no columns")]
    EmptyIndexColumns(String),
    /// An index references a column neither the descriptor nor the live
    /// table provides.
    #[error("index {index} references unknown column {column}")]
    UnknownIndexColumn { index: String, column: String },
}

/// Validates a migration descriptor.
///
/// Checks for empty names and versions, duplicate columns, more than one
/// primary key (a `Counter` column always counts as one), and indexes with
/// an empty name or no columns.
///
/// Index columns are not looked up here. [`ValidationError::UnknownIndexColumn`]
/// is reported by the migration engine once the live columns are known.
pub fn validate_descriptor(descriptor: &MigrationDescriptor) -> Vec<ValidationError> {
    let mut errors = Vec::new();

    if descriptor.applies_to.trim().is_empty() {
        errors.push(ValidationError::EmptyTableName);
    }
    if descriptor.version.as_str().trim().is_empty() {
        errors.push(ValidationError::EmptyVersion);
    }

    validate_columns(&descriptor.add, &mut errors);
    validate_columns(&descriptor.change, &mut errors);

    let primaries: Vec<&str> = descriptor
        .add
        .iter()
        .filter(|c| c.is_primary_key())
        .map(|c| c.name.as_str())
        .collect();
    if primaries.len() > 1 {
        errors.push(ValidationError::MultiplePrimaryKeys(primaries.join(", ")));
    }

    for index in &descriptor.indexes {
        if index.name.trim().is_empty() {
            errors.push(ValidationError::EmptyIndexName);
        } else if index.columns.is_empty() {
            errors.push(ValidationError::EmptyIndexColumns(index.name.clone()));
        }
    }

    errors
}

fn validate_columns(columns: &[ColumnDescriptor], errors: &mut Vec<ValidationError>) {
    let mut seen: HashSet<&str> = HashSet::new();
    for column in columns {
        if column.name.trim().is_empty() {
            errors.push(ValidationError::EmptyColumnName);
            continue;
        }
        if !seen.insert(column.name.as_str()) {
            errors.push(ValidationError::DuplicateColumn(column.name.clone()));
        }
    }
}
