//! Table, view and index handles.
//!
//! Handles are cheap, name-bound views over a [`Session`]. They are the
//! building blocks used by the migration engine and are exposed for callers
//! that manage schema objects directly.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::{ColumnDescriptor, SemanticType};
//! use schema_adapter_sqlite::{IndexChange, SqliteAdapter};
//!
//! let adapter = SqliteAdapter::in_memory();
//! adapter
//!     .with_session(|s| {
//!         let table = s.table("Table1");
//!         table.create(&[
//!             ColumnDescriptor::counter("id"),
//!             ColumnDescriptor::new("name", SemanticType::Text).not_null(),
//!         ])?;
//!         assert!(table.exists()?);
//!
//!         let indexes = s.indexes("Table1");
//!         assert_eq!(indexes.create("IX_NAME", &["name"])?, IndexChange::Created);
//!         assert_eq!(indexes.list()?.len(), 1);
//!         Ok(())
//!     })
//!     .unwrap();
//! ```

use std::cell::RefCell;

use schema_adapter_core::{
    ColumnDescriptor, IndexDescriptor, LiveColumn, SelectQuery, Version, index_columns_from_value,
};
use serde_json::Value;
use tracing::debug;

use crate::compiler::compile_inline;
use crate::error::{Result, SqliteError};
use crate::introspect;
use crate::schema::{
    create_index_sql, create_table_sql, drop_index_sql, drop_table_sql, drop_view_sql, escape_name,
};
use crate::session::Session;

/// Handle to one table.
pub struct Table<'a> {
    session: &'a Session<'a>,
    name: String,
}

impl<'a> Table<'a> {
    pub(crate) fn new(session: &'a Session<'a>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> Result<bool> {
        introspect::table_exists(self.session.connection(), &self.name)
    }

    /// Live columns in ordinal order.
    pub fn columns(&self) -> Result<Vec<LiveColumn>> {
        introspect::table_columns(self.session.connection(), &self.name)
    }

    /// Highest applied migration version, `0.0` when none is recorded.
    pub fn version(&self) -> Result<Version> {
        introspect::table_version(self.session.connection(), &self.name)
    }

    /// Returns `true` once an auto-increment key of this table has issued a
    /// value.
    pub fn has_sequence(&self) -> Result<bool> {
        introspect::has_sequence(self.session.connection(), &self.name)
    }

    /// Creates the table from column descriptors, without recording a
    /// migration.
    pub fn create(&self, columns: &[ColumnDescriptor]) -> Result<()> {
        self.session.run(&create_table_sql(&self.name, columns))
    }

    /// Drops the table if it exists.
    pub fn drop(&self) -> Result<()> {
        self.session.run(&drop_table_sql(&self.name))
    }
}

/// Handle to one view.
pub struct View<'a> {
    session: &'a Session<'a>,
    name: String,
}

impl<'a> View<'a> {
    pub(crate) fn new(session: &'a Session<'a>, name: String) -> Self {
        Self { session, name }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn exists(&self) -> Result<bool> {
        introspect::view_exists(self.session.connection(), &self.name)
    }

    /// Replaces the view with one defined by `query`.
    ///
    /// The previous definition is dropped and the new one created in a single
    /// transaction. Literals in the query are written into the definition.
    pub fn create(&self, query: &SelectQuery) -> Result<()> {
        let definition = compile_inline(query)?;
        self.session.run_in_transaction(|s| {
            s.run(&drop_view_sql(&self.name))?;
            s.run(&format!("CREATE VIEW {} AS {definition}", escape_name(&self.name)))
        })
    }

    /// Drops the view if it exists.
    pub fn drop(&self) -> Result<()> {
        self.session.run(&drop_view_sql(&self.name))
    }
}

/// Result of [`Indexes::create`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexChange {
    /// No index of that name existed.
    Created,
    /// An index of that name covered other columns and was replaced.
    Recreated,
    /// An identical index already existed.
    Unchanged,
}

/// Handle to the user-created indexes of one table.
///
/// The index list is read once and cached on the handle; [`create`] and
/// [`drop`] invalidate it, as does [`invalidate`] for DDL issued elsewhere.
///
/// [`create`]: Indexes::create
/// [`drop`]: Indexes::drop
/// [`invalidate`]: Indexes::invalidate
pub struct Indexes<'a> {
    session: &'a Session<'a>,
    table: String,
    cache: RefCell<Option<Vec<IndexDescriptor>>>,
}

impl<'a> Indexes<'a> {
    pub(crate) fn new(session: &'a Session<'a>, table: String) -> Self {
        Self {
            session,
            table,
            cache: RefCell::new(None),
        }
    }

    pub fn list(&self) -> Result<Vec<IndexDescriptor>> {
        if let Some(cached) = self.cache.borrow().as_ref() {
            return Ok(cached.clone());
        }
        let indexes = introspect::index_list(self.session.connection(), &self.table)?;
        *self.cache.borrow_mut() = Some(indexes.clone());
        Ok(indexes)
    }

    pub fn invalidate(&self) {
        self.cache.borrow_mut().take();
    }

    /// Ensures an index `name` over exactly `columns`, in order.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidIndexSpec`] when `columns` is empty.
    pub fn create<S: AsRef<str>>(&self, name: &str, columns: &[S]) -> Result<IndexChange> {
        if columns.is_empty() {
            return Err(SqliteError::InvalidIndexSpec(format!(
                "index {name} lists no columns"
            )));
        }

        let existing = self.list()?.into_iter().find(|index| index.name == name);
        let change = match existing {
            Some(index) if index.columns.iter().map(String::as_str).eq(columns.iter().map(AsRef::as_ref)) => {
                return Ok(IndexChange::Unchanged);
            }
            Some(_) => {
                self.session.run(&drop_index_sql(name))?;
                IndexChange::Recreated
            }
            None => IndexChange::Created,
        };

        self.invalidate();
        self.session.run(&create_index_sql(&self.table, name, columns))?;
        debug!(table = %self.table, index = name, ?change, "index applied");
        Ok(change)
    }

    /// Same as [`create`](Self::create) with columns given as JSON: a single
    /// column name or an array of names.
    pub fn create_from_value(&self, name: &str, columns: &Value) -> Result<IndexChange> {
        let columns = index_columns_from_value(columns)?;
        self.create(name, &columns)
    }

    /// Drops index `name`; returns `false` if the table had no such index.
    pub fn drop(&self, name: &str) -> Result<bool> {
        if !self.list()?.iter().any(|index| index.name == name) {
            return Ok(false);
        }
        self.invalidate();
        self.session.run(&drop_index_sql(name))?;
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use schema_adapter_core::{Expr, SemanticType};
    use serde_json::json;

    fn with_table<T>(f: impl FnOnce(&Session<'_>) -> T) -> T {
        let conn = Connection::open_in_memory().unwrap();
        let session = Session::new(&conn);
        session
            .table("Table1")
            .create(&[
                ColumnDescriptor::counter("id"),
                ColumnDescriptor::new("name", SemanticType::Text).not_null(),
                ColumnDescriptor::new("city", SemanticType::Text),
            ])
            .unwrap();
        f(&session)
    }

    #[test]
    fn test_table_lifecycle() {
        with_table(|s| {
            let table = s.table("Table1");
            assert!(table.exists().unwrap());
            assert_eq!(table.columns().unwrap().len(), 3);
            assert_eq!(table.version().unwrap(), Version::default());
            assert!(!table.has_sequence().unwrap());

            table.drop().unwrap();
            assert!(!table.exists().unwrap());
        });
    }

    #[test]
    fn test_index_create_list_drop() {
        with_table(|s| {
            let indexes = s.indexes("Table1");
            assert_eq!(indexes.create("IX_NAME", &["name"]).unwrap(), IndexChange::Created);
            assert_eq!(indexes.list().unwrap(), vec![IndexDescriptor::new("IX_NAME", ["name"])]);
            assert!(indexes.drop("IX_NAME").unwrap());
            assert!(indexes.list().unwrap().is_empty());
            assert!(!indexes.drop("IX_NAME").unwrap());
        });
    }

    #[test]
    fn test_index_recreated_when_columns_differ() {
        with_table(|s| {
            let indexes = s.indexes("Table1");
            indexes.create("IX_A", &["name", "city"]).unwrap();
            assert_eq!(indexes.create("IX_A", &["name", "city"]).unwrap(), IndexChange::Unchanged);
            assert_eq!(indexes.create("IX_A", &["city", "name"]).unwrap(), IndexChange::Recreated);
            assert_eq!(indexes.list().unwrap()[0].columns, vec!["city", "name"]);
        });
    }

    #[test]
    fn test_index_cache_until_invalidated() {
        with_table(|s| {
            let indexes = s.indexes("Table1");
            assert!(indexes.list().unwrap().is_empty());
            s.run(r#"CREATE INDEX "IX_OUTSIDE" ON "Table1" ("city")"#).unwrap();
            assert!(indexes.list().unwrap().is_empty());
            indexes.invalidate();
            assert_eq!(indexes.list().unwrap().len(), 1);
        });
    }

    #[test]
    fn test_index_spec_errors() {
        with_table(|s| {
            let indexes = s.indexes("Table1");
            assert!(matches!(
                indexes.create::<&str>("IX_EMPTY", &[]),
                Err(SqliteError::InvalidIndexSpec(_))
            ));
            assert!(matches!(
                indexes.create_from_value("IX_BAD", &json!(42)),
                Err(SqliteError::InvalidIndexSpec(_))
            ));
            assert_eq!(
                indexes.create_from_value("IX_CITY", &json!("city")).unwrap(),
                IndexChange::Created
            );
        });
    }

    #[test]
    fn test_view_lifecycle() {
        with_table(|s| {
            s.run(r#"INSERT INTO "Table1" ("name", "city") VALUES ('a', 'Athens'), ('b', 'Rome')"#)
                .unwrap();
            let view = s.view("AthensView");
            let query = SelectQuery::from("Table1")
                .select(["name"])
                .filter(Expr::col("city").eq("Athens"));
            view.create(&query).unwrap();
            assert!(view.exists().unwrap());
            view.create(&query).unwrap();

            let rows = s.execute(r#"SELECT * FROM "AthensView""#, &[]).unwrap();
            assert_eq!(rows.len(), 1);
            assert_eq!(rows[0]["name"], "a");

            view.drop().unwrap();
            assert!(!view.exists().unwrap());
        });
    }
}
