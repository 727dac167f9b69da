//! Deferred calling convention for async callers.
//!
//! [`AsyncAdapter`] shares a [`SqliteAdapter`] and runs each operation on
//! tokio's blocking pool, so awaiting callers never block a runtime worker
//! on the connection lock or on the engine.
//!
//! # Example
//!
//! ```
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! use schema_adapter_sqlite::{AsyncAdapter, SqliteAdapter};
//!
//! let adapter = AsyncAdapter::new(SqliteAdapter::in_memory());
//! adapter
//!     .with_session(|s| s.run(r#"CREATE TABLE "T" ("v" INTEGER)"#))
//!     .await
//!     .unwrap();
//! assert!(adapter.table_exists("T").await.unwrap());
//! # }
//! ```

use std::sync::Arc;

use schema_adapter_core::{IndexDescriptor, LiveColumn, MigrationDescriptor, Query, Record, Version};
use serde_json::Value;

use crate::adapter::SqliteAdapter;
use crate::error::{Result, SqliteError};
use crate::handles::IndexChange;
use crate::migration::MigrationOutcome;
use crate::session::Session;

/// Cloneable async front of a [`SqliteAdapter`].
#[derive(Clone)]
pub struct AsyncAdapter {
    inner: Arc<SqliteAdapter>,
}

impl AsyncAdapter {
    pub fn new(adapter: SqliteAdapter) -> Self {
        Self {
            inner: Arc::new(adapter),
        }
    }

    pub fn from_shared(adapter: Arc<SqliteAdapter>) -> Self {
        Self { inner: adapter }
    }

    /// The shared synchronous adapter.
    pub fn blocking(&self) -> &Arc<SqliteAdapter> {
        &self.inner
    }

    async fn call<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&SqliteAdapter) -> Result<T> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || op(&inner))
            .await
            .map_err(|e| SqliteError::ConnectionError(format!("blocking task failed: {e}")))?
    }

    pub async fn with_session<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    {
        self.call(move |a| a.with_session(work)).await
    }

    pub async fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(&Session<'_>) -> Result<T> + Send + 'static,
    {
        self.call(move |a| a.run_in_transaction(work)).await
    }

    pub async fn migrate(&self, descriptor: MigrationDescriptor) -> Result<MigrationOutcome> {
        self.call(move |a| a.migrate(&descriptor)).await
    }

    pub async fn execute(&self, sql: impl Into<String>, params: Vec<Value>) -> Result<Vec<Record>> {
        let sql = sql.into();
        self.call(move |a| a.execute(&sql, &params)).await
    }

    pub async fn execute_query(&self, query: Query) -> Result<Vec<Record>> {
        self.call(move |a| a.execute_query(&query)).await
    }

    pub async fn select_identity(
        &self,
        entity: impl Into<String>,
        attribute: impl Into<String>,
    ) -> Result<i64> {
        let (entity, attribute) = (entity.into(), attribute.into());
        self.call(move |a| a.select_identity(&entity, &attribute)).await
    }

    pub async fn table_exists(&self, table: impl Into<String>) -> Result<bool> {
        let table = table.into();
        self.call(move |a| a.table_exists(&table)).await
    }

    pub async fn table_columns(&self, table: impl Into<String>) -> Result<Vec<LiveColumn>> {
        let table = table.into();
        self.call(move |a| a.table_columns(&table)).await
    }

    pub async fn table_version(&self, table: impl Into<String>) -> Result<Version> {
        let table = table.into();
        self.call(move |a| a.table_version(&table)).await
    }

    pub async fn index_list(&self, table: impl Into<String>) -> Result<Vec<IndexDescriptor>> {
        let table = table.into();
        self.call(move |a| a.index_list(&table)).await
    }

    pub async fn create_index(
        &self,
        table: impl Into<String>,
        name: impl Into<String>,
        columns: Vec<String>,
    ) -> Result<IndexChange> {
        let (table, name) = (table.into(), name.into());
        self.call(move |a| a.create_index(&table, &name, columns.as_slice())).await
    }

    pub async fn drop_index(&self, table: impl Into<String>, name: impl Into<String>) -> Result<bool> {
        let (table, name) = (table.into(), name.into());
        self.call(move |a| a.drop_index(&table, &name)).await
    }

    pub async fn view_exists(&self, view: impl Into<String>) -> Result<bool> {
        let view = view.into();
        self.call(move |a| a.view_exists(&view)).await
    }
}
