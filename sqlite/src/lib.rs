//! SQLite storage backend.
//!
//! This crate runs the backend-independent descriptors and queries of
//! [`schema_adapter_core`] against an embedded SQLite database. It compiles
//! structured queries to SQL, reads the live schema back from the catalog,
//! converges tables towards version-tagged migration descriptors and
//! coordinates transactions over a single shared connection.
//!
//! # Architecture
//!
//! - **`adapter`**: [`SqliteAdapter`], the lazily opened, mutex-guarded
//!   connection
//! - **`session`**: [`Session`], statement execution and transaction scope
//! - **`compiler`**: [`Query`](schema_adapter_core::Query) to SQL text plus
//!   positional parameters
//! - **`introspect`**: live columns, indexes and recorded versions
//! - **`migration`**: the reconcile-and-apply engine
//! - **`handles`**: [`Table`], [`View`] and [`Indexes`]
//! - **`identity`**: application-level identity counters
//! - **`deferred`**: [`AsyncAdapter`] for tokio callers (feature `async`)
//!
//! # Quick start
//!
//! ```
//! use schema_adapter_core::{ColumnDescriptor, Expr, MigrationDescriptor, SelectQuery, SemanticType};
//! use schema_adapter_sqlite::SqliteAdapter;
//! use serde_json::json;
//!
//! let adapter = SqliteAdapter::in_memory();
//! adapter
//!     .migrate(
//!         &MigrationDescriptor::new("Customers", "1.0")
//!             .add_column(ColumnDescriptor::counter("CustomerID"))
//!             .add_column(ColumnDescriptor::new("CustomerName", SemanticType::Text).not_null())
//!             .add_column(ColumnDescriptor::new("City", SemanticType::Text)),
//!     )
//!     .unwrap();
//!
//! adapter
//!     .run_in_transaction(|s| {
//!         s.execute(
//!             r#"INSERT INTO "Customers" ("CustomerName", "City") VALUES (?, ?), (?, ?)"#,
//!             &[json!("Alfreds"), json!("Berlin"), json!("Ana"), json!("México D.F.")],
//!         )
//!     })
//!     .unwrap();
//!
//! let query = SelectQuery::from("Customers")
//!     .select(["CustomerName"])
//!     .filter(Expr::col("City").eq("Berlin"));
//! let rows = adapter.execute_query(&query.into()).unwrap();
//! assert_eq!(rows[0]["CustomerName"], "Alfreds");
//! ```
//!
//! # Features
//!
//! - `async` (default): enables [`AsyncAdapter`] on top of tokio's blocking
//!   pool.

mod adapter;
mod compiler;
mod convert;
#[cfg(feature = "async")]
mod deferred;
mod error;
mod handles;
mod identity;
mod introspect;
pub mod migration;
mod schema;
mod session;

pub use adapter::SqliteAdapter;
pub use compiler::{CompiledStatement, compile};
#[cfg(feature = "async")]
pub use deferred::AsyncAdapter;
pub use error::{Result, SqliteError};
pub use handles::{IndexChange, Indexes, Table, View};
pub use migration::{FULL_MIGRATION_UNSUPPORTED, MigrationOutcome, ReconcilePlan, plan_reconcile};
pub use schema::{escape_name, format_type};
pub use session::Session;
