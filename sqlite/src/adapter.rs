//! The SQLite adapter: one lazily opened connection behind a mutex.
//!
//! Every operation locks the connection, opens it on first use and runs
//! through a [`Session`]. Callers on other threads wait for the lock, so
//! statements never interleave.

use std::path::Path;
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::Connection;
use schema_adapter_core::{
    IndexDescriptor, LiveColumn, MigrationDescriptor, Query, Record, SelectQuery, Version,
};
use schema_adapter_db::{AdapterConfig, AdapterKind, AdapterOptions, DescriptorSet};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::handles::IndexChange;
use crate::migration::MigrationOutcome;
use crate::session::Session;

/// Storage adapter over an embedded SQLite database.
///
/// # Examples
///
/// ```
/// use schema_adapter_core::{ColumnDescriptor, MigrationDescriptor, SemanticType};
/// use schema_adapter_sqlite::SqliteAdapter;
/// use serde_json::json;
///
/// let adapter = SqliteAdapter::in_memory();
/// adapter
///     .migrate(
///         &MigrationDescriptor::new("Users", "1.0")
///             .add_column(ColumnDescriptor::counter("id"))
///             .add_column(ColumnDescriptor::new("name", SemanticType::Text)),
///     )
///     .unwrap();
///
/// adapter
///     .execute(r#"INSERT INTO "Users" ("name") VALUES (?)"#, &[json!("alice")])
///     .unwrap();
/// let rows = adapter.execute(r#"SELECT "name" FROM "Users""#, &[]).unwrap();
/// assert_eq!(rows[0]["name"], "alice");
/// ```
pub struct SqliteAdapter {
    options: AdapterOptions,
    conn: Mutex<Option<Connection>>,
}

impl SqliteAdapter {
    /// Creates an adapter; the connection opens on first use.
    pub fn new(options: AdapterOptions) -> Self {
        Self {
            options,
            conn: Mutex::new(None),
        }
    }

    /// Adapter over a private in-memory database.
    pub fn in_memory() -> Self {
        Self::new(AdapterOptions::in_memory())
    }

    /// Adapter for the default entry of `config`.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::ConnectionError`] if the default entry is not a
    /// SQLite adapter.
    pub fn from_config(config: &AdapterConfig) -> Result<Self> {
        let entry = config
            .default_adapter()
            .ok_or_else(|| SqliteError::ConnectionError("no adapter configured".into()))?;
        if entry.invariant_name != AdapterKind::Sqlite {
            return Err(SqliteError::ConnectionError(format!(
                "adapter {} is not a sqlite adapter",
                entry.name
            )));
        }
        Ok(Self::new(entry.options.clone()))
    }

    pub fn options(&self) -> &AdapterOptions {
        &self.options
    }

    fn connect(&self) -> Result<Connection> {
        let database = &self.options.database;
        let conn = if self.options.is_in_memory() {
            Connection::open_in_memory()
        } else {
            Connection::open(database)
        }
        .map_err(|e| SqliteError::ConnectionError(format!("cannot open {database}: {e}")))?;

        if self.options.foreign_keys {
            conn.execute_batch("PRAGMA foreign_keys = ON")?;
        }
        if let Some(ms) = self.options.busy_timeout_ms {
            conn.busy_timeout(Duration::from_millis(ms))?;
        }
        info!(database = %database, "connection opened");
        Ok(conn)
    }

    /// Opens the connection now instead of on first use.
    pub fn open(&self) -> Result<()> {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        Ok(())
    }

    /// Closes the connection. The next operation reopens it; an in-memory
    /// database starts empty again.
    pub fn close(&self) -> Result<()> {
        let conn = self.conn.lock().take();
        if let Some(conn) = conn {
            conn.close().map_err(|(_, e)| SqliteError::from(e))?;
            debug!(database = %self.options.database, "connection closed");
        }
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.conn.lock().is_some()
    }

    /// Runs `work` with exclusive access to the connection.
    ///
    /// The adapter lock is held until `work` returns and is not reentrant:
    /// calling any method of this adapter from inside `work` deadlocks.
    /// Nested work goes through the [`Session`] argument instead.
    pub fn with_session<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        let mut guard = self.conn.lock();
        if guard.is_none() {
            *guard = Some(self.connect()?);
        }
        let conn = guard
            .as_ref()
            .ok_or_else(|| SqliteError::ConnectionError("connection unavailable".into()))?;
        work(&Session::new(conn))
    }

    /// Runs `work` as one transaction.
    ///
    /// Holds the adapter lock like [`with_session`](Self::with_session), so
    /// every statement of the unit of work must run on the [`Session`]
    /// passed to `work`. See [`Session::run_in_transaction`].
    pub fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Session<'_>) -> Result<T>,
    {
        self.with_session(|session| session.run_in_transaction(|s| work(s)))
    }

    pub fn migrate(&self, descriptor: &MigrationDescriptor) -> Result<MigrationOutcome> {
        self.with_session(|s| s.migrate(descriptor))
    }

    /// Applies descriptors in order, stopping at the first failure.
    pub fn migrate_all<'d, I>(&self, descriptors: I) -> Result<Vec<MigrationOutcome>>
    where
        I: IntoIterator<Item = &'d MigrationDescriptor>,
    {
        self.with_session(|s| descriptors.into_iter().map(|d| s.migrate(d)).collect())
    }

    /// Loads every descriptor file in `dir` and applies them in version order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::LoaderError`] with the loader's own error if the
    /// directory cannot be read or a file does not parse.
    pub fn migrate_dir(&self, dir: impl AsRef<Path>) -> Result<Vec<MigrationOutcome>> {
        let set = DescriptorSet::from_dir(dir)?;
        debug!(count = set.len(), "descriptors loaded");
        self.migrate_all(&set)
    }

    /// Loads descriptors from a directory or bundle file and applies them.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::LoaderError`] if nothing could be loaded from
    /// `path`, otherwise the first migration failure.
    pub fn migrate_path(&self, path: impl AsRef<Path>) -> Result<Vec<MigrationOutcome>> {
        let set = DescriptorSet::builder()
            .from_path(path.as_ref())
            .build()?;
        debug!(count = set.len(), source = ?set.source(), "descriptors loaded");
        self.migrate_all(&set)
    }

    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        self.with_session(|s| s.execute(sql, params))
    }

    pub fn execute_query(&self, query: &Query) -> Result<Vec<Record>> {
        self.with_session(|s| s.execute_query(query))
    }

    /// Produces the next identity value for `entity.attribute`.
    pub fn select_identity(&self, entity: &str, attribute: &str) -> Result<i64> {
        self.with_session(|s| s.select_identity(entity, attribute))
    }

    pub fn last_identity(&self) -> Result<Option<i64>> {
        self.with_session(|s| Ok(s.last_identity()))
    }

    pub fn table_exists(&self, table: &str) -> Result<bool> {
        self.with_session(|s| s.table(table).exists())
    }

    pub fn table_columns(&self, table: &str) -> Result<Vec<LiveColumn>> {
        self.with_session(|s| s.table(table).columns())
    }

    pub fn table_version(&self, table: &str) -> Result<Version> {
        self.with_session(|s| s.table(table).version())
    }

    pub fn index_list(&self, table: &str) -> Result<Vec<IndexDescriptor>> {
        self.with_session(|s| s.indexes(table).list())
    }

    pub fn create_index<S: AsRef<str>>(
        &self,
        table: &str,
        name: &str,
        columns: &[S],
    ) -> Result<IndexChange> {
        self.with_session(|s| s.indexes(table).create(name, columns))
    }

    pub fn drop_index(&self, table: &str, name: &str) -> Result<bool> {
        self.with_session(|s| s.indexes(table).drop(name))
    }

    pub fn view_exists(&self, view: &str) -> Result<bool> {
        self.with_session(|s| s.view(view).exists())
    }

    pub fn create_view(&self, view: &str, query: &SelectQuery) -> Result<()> {
        self.with_session(|s| s.view(view).create(query))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_adapter_core::{ColumnDescriptor, SemanticType};

    fn users() -> MigrationDescriptor {
        MigrationDescriptor::new("Users", "1.0")
            .add_column(ColumnDescriptor::counter("id"))
            .add_column(ColumnDescriptor::new("name", SemanticType::Text).not_null())
    }

    #[test]
    fn test_connection_opens_lazily() {
        let adapter = SqliteAdapter::in_memory();
        assert!(!adapter.is_open());
        assert!(!adapter.table_exists("Users").unwrap());
        assert!(adapter.is_open());
    }

    #[test]
    fn test_close_discards_in_memory_database() {
        let adapter = SqliteAdapter::in_memory();
        adapter.migrate(&users()).unwrap();
        assert!(adapter.table_exists("Users").unwrap());

        adapter.close().unwrap();
        assert!(!adapter.is_open());
        assert!(!adapter.table_exists("Users").unwrap());
    }

    #[test]
    fn test_open_is_idempotent() {
        let adapter = SqliteAdapter::in_memory();
        adapter.open().unwrap();
        adapter.migrate(&users()).unwrap();
        adapter.open().unwrap();
        assert!(adapter.table_exists("Users").unwrap());
    }

    #[test]
    fn test_from_config_requires_sqlite_default() {
        let mut config = AdapterConfig::in_memory();
        assert!(SqliteAdapter::from_config(&config).is_ok());

        config.adapters[0].invariant_name = AdapterKind::Memory;
        assert!(matches!(
            SqliteAdapter::from_config(&config),
            Err(SqliteError::ConnectionError(_))
        ));
    }

    #[test]
    fn test_unopenable_database_is_connection_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing").join("db.sqlite");
        let adapter = SqliteAdapter::new(AdapterOptions::file(&missing));
        assert!(matches!(adapter.open(), Err(SqliteError::ConnectionError(_))));
        assert!(!adapter.is_open());
    }

    #[test]
    fn test_foreign_keys_option() {
        let adapter = SqliteAdapter::new(AdapterOptions {
            foreign_keys: true,
            ..AdapterOptions::in_memory()
        });
        let rows = adapter.execute("PRAGMA foreign_keys", &[]).unwrap();
        assert_eq!(rows[0]["foreign_keys"], 1);
    }

    #[test]
    fn test_migrate_all_in_order() {
        let adapter = SqliteAdapter::in_memory();
        let v2 = MigrationDescriptor::new("Users", "1.1")
            .add_column(ColumnDescriptor::new("email", SemanticType::Text));
        let outcomes = adapter.migrate_all([&users(), &v2]).unwrap();
        assert_eq!(outcomes, vec![MigrationOutcome::Created, MigrationOutcome::Altered]);
        assert_eq!(adapter.table_version("Users").unwrap().as_str(), "1.1");
    }

    #[test]
    fn test_nested_work_goes_through_session() {
        let adapter = SqliteAdapter::in_memory();
        let id = adapter
            .run_in_transaction(|s| {
                s.migrate(&users())?;
                s.execute(r#"INSERT INTO "Users" ("name") VALUES (?)"#, &[Value::from("alice")])?;
                s.select_identity("Users", "id")
            })
            .unwrap();
        assert_eq!(id, 2);
        assert_eq!(adapter.execute(r#"SELECT "name" FROM "Users""#, &[]).unwrap().len(), 1);
    }
}
