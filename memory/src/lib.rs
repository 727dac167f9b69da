//! # schema-adapter-memory
//!
//! In-memory storage backend. Records live in named collections grouped into
//! containers; queries built with `schema-adapter-core` run directly against
//! them without a SQL engine.
//!
//! ## Architecture
//!
//! - [`ContainerRegistry`] / [`Container`]: explicitly owned stores of
//!   collections, created lazily on first access
//! - [`MemoryFormatter`]: compiles a query into a [`Statement`] closure
//! - [`MemoryAdapter`]: runs queries and hands out identities for one
//!   container
//!
//! Filters evaluate with SQLite semantics, so the same query answers the same
//! way in memory and through the SQL backend. `GROUP BY` is not supported
//! here; an aggregate-only projection folds every matching record into one
//! row.
//!
//! ## Quick Start
//!
//! ```
//! use schema_adapter_core::{Expr, SelectQuery, UpdateQuery};
//! use schema_adapter_memory::{ContainerRegistry, MemoryAdapter};
//! use serde_json::json;
//!
//! let mut registry = ContainerRegistry::new();
//! let mut adapter = MemoryAdapter::from_registry(&mut registry, "local-storage");
//! adapter
//!     .insert_value(&json!({"Customers": [
//!         {"CustomerID": 1, "CustomerName": "Alfreds", "Country": "Germany"},
//!         {"CustomerID": 2, "CustomerName": "Ana", "Country": "Mexico"}
//!     ]}))
//!     .unwrap();
//!
//! let change = json!({"CustomerID": 2, "City": "México D.F."});
//! let update = UpdateQuery::by_key("Customers", "CustomerID", change.as_object().unwrap()).unwrap();
//! adapter.execute(&update.into()).unwrap();
//!
//! let rows = adapter
//!     .execute(
//!         &SelectQuery::from("Customers")
//!             .select(["CustomerName", "City"])
//!             .filter(Expr::col("CustomerName").starts_with("An"))
//!             .into(),
//!     )
//!     .unwrap();
//! assert_eq!(rows[0]["City"], "México D.F.");
//! ```

mod adapter;
mod container;
mod error;
mod eval;
mod formatter;

pub use adapter::{IDENTITY_COLLECTION, MemoryAdapter};
pub use container::{Container, ContainerRegistry};
pub use error::{MemoryError, Result};
pub use formatter::{MemoryFormatter, Statement};
