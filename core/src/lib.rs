//! Core descriptor types and the structured query model.
//!
//! This crate defines the backend-independent vocabulary of the adapter:
//!
//! - [`ColumnDescriptor`] / [`SemanticType`]: declared column shapes.
//! - [`IndexDescriptor`]: named, ordered index column lists.
//! - [`MigrationDescriptor`]: version-tagged desired state of one table.
//! - [`Version`]: dotted version strings with segment-wise ordering.
//! - [`Query`]: select / insert / update / delete statements over an
//!   [`Expr`] tree, compiled by each backend.
//!
//! Validation ([`validate_descriptor`]) catches structural errors such as
//! duplicate columns and competing primary keys before any DDL runs.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::*;
//!
//! let descriptor = MigrationDescriptor::new("Table1", "1.0")
//!     .with_model("Table1")
//!     .add_column(ColumnDescriptor::counter("id"))
//!     .add_column(ColumnDescriptor::new("name", SemanticType::Text).not_null())
//!     .with_index(IndexDescriptor::new("IX_NAME", ["name"]));
//!
//! assert!(validate_descriptor(&descriptor).is_empty());
//! assert!(descriptor.version > Version::default());
//! ```

mod query;
mod types;
mod validate;

pub use query::*;
pub use types::*;
pub use validate::{ValidationError, validate_descriptor};
