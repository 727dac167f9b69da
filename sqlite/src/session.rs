//! Exclusive access to the adapter's connection.
//!
//! A [`Session`] is handed out by
//! [`SqliteAdapter::with_session`](crate::SqliteAdapter::with_session) while
//! the adapter's lock is held, so everything issued through it runs without
//! interleaving with other callers. It owns the transaction boundary:
//! [`Session::run_in_transaction`] opens a transaction only when none is
//! active and otherwise joins the current one.

use rusqlite::Connection;
use schema_adapter_core::{MigrationDescriptor, Query, Record};
use serde_json::Value;
use tracing::{debug, warn};

use crate::compiler::compile;
use crate::convert::{query_records, to_sql_values};
use crate::error::{Result, SqliteError};
use crate::handles::{Indexes, Table, View};
use crate::migration::{self, MigrationOutcome};

/// Statement-level access to a locked connection.
pub struct Session<'c> {
    conn: &'c Connection,
}

/// Rolls back an open transaction unless disarmed, including on unwind.
struct RollbackGuard<'c> {
    conn: &'c Connection,
    armed: bool,
}

impl Drop for RollbackGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            rollback(self.conn);
        }
    }
}

fn rollback(conn: &Connection) {
    debug!("ROLLBACK");
    if let Err(err) = conn.execute_batch("ROLLBACK") {
        warn!(error = %err, "rollback failed");
    }
}

impl<'c> Session<'c> {
    pub(crate) fn new(conn: &'c Connection) -> Self {
        Self { conn }
    }

    /// The underlying connection.
    pub fn connection(&self) -> &'c Connection {
        self.conn
    }

    /// Returns `true` while a transaction is open on the connection.
    pub fn in_transaction(&self) -> bool {
        !self.conn.is_autocommit()
    }

    /// Runs `work` as one unit.
    ///
    /// Outside a transaction this issues `BEGIN TRANSACTION`, then `COMMIT`
    /// when `work` succeeds or `ROLLBACK` when it fails or panics. A failing
    /// rollback is logged and the original error is returned. Inside a
    /// transaction `work` runs inline and the outermost call decides the
    /// outcome.
    ///
    /// # Examples
    ///
    /// ```
    /// use schema_adapter_sqlite::{SqliteAdapter, SqliteError};
    ///
    /// let adapter = SqliteAdapter::in_memory();
    /// adapter.with_session(|s| s.run(r#"CREATE TABLE "T" ("v" INTEGER)"#)).unwrap();
    ///
    /// let result: Result<(), SqliteError> = adapter.run_in_transaction(|s| {
    ///     s.execute(r#"INSERT INTO "T" ("v") VALUES (1)"#, &[])?;
    ///     Err(SqliteError::InvalidStatement("abort".into()))
    /// });
    /// assert!(result.is_err());
    ///
    /// let rows = adapter.execute(r#"SELECT COUNT(*) AS n FROM "T""#, &[]).unwrap();
    /// assert_eq!(rows[0]["n"], 0);
    /// ```
    pub fn run_in_transaction<T, F>(&self, work: F) -> Result<T>
    where
        F: FnOnce(&Session<'c>) -> Result<T>,
    {
        if self.in_transaction() {
            return work(self);
        }

        debug!("BEGIN TRANSACTION");
        self.conn.execute_batch("BEGIN TRANSACTION")?;
        let mut guard = RollbackGuard {
            conn: self.conn,
            armed: true,
        };

        match work(self) {
            Ok(value) => {
                debug!("COMMIT");
                self.conn.execute_batch("COMMIT")?;
                guard.armed = false;
                Ok(value)
            }
            Err(err) => {
                guard.armed = false;
                rollback(self.conn);
                Err(err)
            }
        }
    }

    /// Runs one or more statements that return no rows.
    pub fn run(&self, sql: &str) -> Result<()> {
        if sql.trim().is_empty() {
            return Err(SqliteError::InvalidStatement("empty statement".into()));
        }
        debug!(sql, "run");
        self.conn.execute_batch(sql)?;
        Ok(())
    }

    /// Executes a single statement with positional parameters.
    ///
    /// Statements that produce columns (`SELECT`, `PRAGMA`, `WITH`, ...)
    /// return their rows; anything else returns an empty vector.
    ///
    /// # Errors
    ///
    /// Returns [`SqliteError::InvalidStatement`] for empty SQL and
    /// [`SqliteError::DatabaseError`] for anything the engine rejects.
    pub fn execute(&self, sql: &str, params: &[Value]) -> Result<Vec<Record>> {
        if sql.trim().is_empty() {
            return Err(SqliteError::InvalidStatement("empty statement".into()));
        }
        debug!(sql, ?params, "execute");
        let values = to_sql_values(params)?;
        let mut stmt = self.conn.prepare(sql)?;
        if stmt.column_count() > 0 {
            query_records(&mut stmt, &values)
        } else {
            stmt.execute(rusqlite::params_from_iter(values.iter()))?;
            Ok(Vec::new())
        }
    }

    /// Compiles `query` and executes it.
    pub fn execute_query(&self, query: &Query) -> Result<Vec<Record>> {
        let statement = compile(query)?;
        self.execute(&statement.sql, &statement.params)
    }

    /// Applies a migration descriptor.
    ///
    /// See the [`migration`](crate::migration) module for the steps.
    pub fn migrate(&self, descriptor: &MigrationDescriptor) -> Result<MigrationOutcome> {
        migration::apply(self, descriptor)
    }

    /// Produces the next identity value for `entity.attribute`.
    pub fn select_identity(&self, entity: &str, attribute: &str) -> Result<i64> {
        crate::identity::select_identity(self, entity, attribute)
    }

    /// Row id of the most recent successful insert, if any.
    pub fn last_identity(&self) -> Option<i64> {
        match self.conn.last_insert_rowid() {
            0 => None,
            id => Some(id),
        }
    }

    pub fn table(&self, name: impl Into<String>) -> Table<'_> {
        Table::new(self, name.into())
    }

    pub fn view(&self, name: impl Into<String>) -> View<'_> {
        View::new(self, name.into())
    }

    pub fn indexes(&self, table: impl Into<String>) -> Indexes<'_> {
        Indexes::new(self, table.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn session_test<T>(f: impl FnOnce(&Session<'_>) -> T) -> T {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(r#"CREATE TABLE "T" ("id" INTEGER PRIMARY KEY AUTOINCREMENT, "v" TEXT)"#)
            .unwrap();
        f(&Session::new(&conn))
    }

    fn count(session: &Session<'_>) -> i64 {
        session.execute(r#"SELECT COUNT(*) AS n FROM "T""#, &[]).unwrap()[0]["n"]
            .as_i64()
            .unwrap()
    }

    #[test]
    fn test_execute_returns_rows_only_for_queries() {
        session_test(|s| {
            let inserted = s
                .execute(r#"INSERT INTO "T" ("v") VALUES (?)"#, &[json!("a")])
                .unwrap();
            assert!(inserted.is_empty());
            assert_eq!(s.last_identity(), Some(1));

            let rows = s.execute(r#"SELECT "v" FROM "T" WHERE "id" = ?"#, &[json!(1)]).unwrap();
            assert_eq!(rows, vec![json!({"v": "a"}).as_object().cloned().unwrap()]);

            let pragma = s.execute("PRAGMA table_info(\"T\")", &[]).unwrap();
            assert_eq!(pragma.len(), 2);
        });
    }

    #[test]
    fn test_empty_statement_rejected() {
        session_test(|s| {
            assert!(matches!(s.execute("  ", &[]), Err(SqliteError::InvalidStatement(_))));
            assert!(matches!(s.run(""), Err(SqliteError::InvalidStatement(_))));
        });
    }

    #[test]
    fn test_commit_on_success() {
        session_test(|s| {
            s.run_in_transaction(|s| {
                assert!(s.in_transaction());
                s.execute(r#"INSERT INTO "T" ("v") VALUES ('x')"#, &[])
            })
            .unwrap();
            assert!(!s.in_transaction());
            assert_eq!(count(s), 1);
        });
    }

    #[test]
    fn test_rollback_on_error() {
        session_test(|s| {
            let result: Result<()> = s.run_in_transaction(|s| {
                s.execute(r#"INSERT INTO "T" ("v") VALUES ('x')"#, &[])?;
                s.execute("SELECT * FROM missing_table", &[])?;
                Ok(())
            });
            assert!(matches!(result, Err(SqliteError::DatabaseError(_))));
            assert!(!s.in_transaction());
            assert_eq!(count(s), 0);
        });
    }

    #[test]
    fn test_nested_call_joins_outer_transaction() {
        session_test(|s| {
            let result: Result<()> = s.run_in_transaction(|outer| {
                outer.run_in_transaction(|inner| {
                    inner.execute(r#"INSERT INTO "T" ("v") VALUES ('inner')"#, &[])
                })?;
                assert!(outer.in_transaction());
                Err(SqliteError::InvalidStatement("outer failure".into()))
            });
            assert!(result.is_err());
            assert_eq!(count(s), 0);
        });
    }

    #[test]
    fn test_panic_rolls_back() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(r#"CREATE TABLE "T" ("v" TEXT)"#).unwrap();
        let outcome = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let session = Session::new(&conn);
            let _: Result<()> = session.run_in_transaction(|s| {
                s.execute(r#"INSERT INTO "T" ("v") VALUES ('x')"#, &[])?;
                panic!("unit of work panicked");
            });
        }));
        assert!(outcome.is_err());
        assert!(conn.is_autocommit());
        let n: i64 = conn
            .query_row(r#"SELECT COUNT(*) FROM "T""#, [], |row| row.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }
}
