//! Application-level identity counters.
//!
//! Counters live in the `increment_id` table, one row per
//! `(entity, attribute)` pair. The first request for a pair seeds the counter
//! from the highest value already stored in the entity table.

use schema_adapter_core::{
    ColumnDescriptor, Expr, Field, MigrationDescriptor, Record, SelectQuery, SemanticType,
};
use serde_json::Value;
use tracing::debug;

use crate::error::{Result, SqliteError};
use crate::schema::escape_name;
use crate::session::Session;

pub(crate) const IDENTITY_TABLE: &str = "increment_id";

/// Descriptor of the counter table.
pub(crate) fn identity_descriptor() -> MigrationDescriptor {
    MigrationDescriptor::new(IDENTITY_TABLE, "1.0")
        .with_model("increments")
        .with_description("Increments migration (version 1.0)")
        .add_column(ColumnDescriptor::counter("id"))
        .add_column(ColumnDescriptor::new("entity", SemanticType::Text).with_size(120))
        .add_column(ColumnDescriptor::new("attribute", SemanticType::Text).with_size(120))
        .add_column(ColumnDescriptor::new("value", SemanticType::Integer))
}

fn as_integer(value: Option<&Value>) -> Option<i64> {
    match value? {
        Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn seed(session: &Session<'_>, entity: &str, attribute: &str) -> Result<i64> {
    let query = SelectQuery::from(entity).select([Field::aliased(Expr::col(attribute).max(), "value")]);
    let rows = session.execute_query(&query.into())?;
    match as_integer(rows.first().and_then(|row| row.get("value"))) {
        Some(max) => successor(max, entity, attribute),
        None => Ok(1),
    }
}

fn successor(value: i64, entity: &str, attribute: &str) -> Result<i64> {
    value.checked_add(1).ok_or_else(|| {
        SqliteError::ConversionError(format!("identity {entity}.{attribute} overflows i64"))
    })
}

pub(crate) fn select_identity(session: &Session<'_>, entity: &str, attribute: &str) -> Result<i64> {
    session.migrate(&identity_descriptor())?;

    session.run_in_transaction(|s| {
        let table = escape_name(IDENTITY_TABLE);
        let rows = s.execute(
            &format!(r#"SELECT "id", "value" FROM {table} WHERE "entity" = ? AND "attribute" = ?"#),
            &[Value::from(entity), Value::from(attribute)],
        )?;

        let next = match rows.first() {
            None => {
                let value = seed(s, entity, attribute)?;
                s.execute(
                    &format!(
                        r#"INSERT INTO {table} ("entity", "attribute", "value") VALUES (?, ?, ?)"#
                    ),
                    &[Value::from(entity), Value::from(attribute), Value::from(value)],
                )?;
                value
            }
            Some(row) => {
                let id = counter_field(row, "id")?;
                let value = successor(counter_field(row, "value")?, entity, attribute)?;
                s.execute(
                    &format!(r#"UPDATE {table} SET "value" = ? WHERE "id" = ?"#),
                    &[Value::from(value), Value::from(id)],
                )?;
                value
            }
        };

        debug!(entity, attribute, value = next, "identity issued");
        Ok(next)
    })
}

fn counter_field(row: &Record, name: &str) -> Result<i64> {
    as_integer(row.get(name)).ok_or_else(|| {
        SqliteError::ConversionError(format!("{IDENTITY_TABLE}.{name} is not an integer"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    #[test]
    fn test_identity_seeds_from_max_and_increments() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(
            r#"CREATE TABLE "Orders" ("OrderID" INTEGER);
               INSERT INTO "Orders" VALUES (10248), (10250), (10249);"#,
        )
        .unwrap();
        let session = Session::new(&conn);

        assert_eq!(select_identity(&session, "Orders", "OrderID").unwrap(), 10251);
        assert_eq!(select_identity(&session, "Orders", "OrderID").unwrap(), 10252);

        let counters = session.execute(r#"SELECT * FROM "increment_id""#, &[]).unwrap();
        assert_eq!(counters.len(), 1);
        assert_eq!(counters[0]["value"], 10252);
    }

    #[test]
    fn test_identity_starts_at_one_for_empty_table() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(r#"CREATE TABLE "Things" ("code" INTEGER)"#).unwrap();
        let session = Session::new(&conn);
        assert_eq!(select_identity(&session, "Things", "code").unwrap(), 1);
        assert_eq!(select_identity(&session, "Things", "code").unwrap(), 2);
    }

    #[test]
    fn test_identity_counter_table_recorded() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(r#"CREATE TABLE "Things" ("code" INTEGER)"#).unwrap();
        let session = Session::new(&conn);
        select_identity(&session, "Things", "code").unwrap();
        assert_eq!(session.table(IDENTITY_TABLE).version().unwrap().as_str(), "1.0");
    }

    #[test]
    fn test_identity_overflow_is_an_error() {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch(&format!(
            r#"CREATE TABLE "Things" ("code" INTEGER);
               INSERT INTO "Things" VALUES ({max});"#,
            max = i64::MAX
        ))
        .unwrap();
        let session = Session::new(&conn);
        assert!(matches!(
            select_identity(&session, "Things", "code"),
            Err(SqliteError::ConversionError(_))
        ));

        conn.execute_batch(&format!(
            r#"DELETE FROM "Things";
               INSERT INTO "increment_id" ("entity", "attribute", "value")
               VALUES ('Things', 'code', {max});"#,
            max = i64::MAX
        ))
        .unwrap();
        assert!(matches!(
            select_identity(&session, "Things", "code"),
            Err(SqliteError::ConversionError(_))
        ));
        let counters = session.execute(r#"SELECT "value" FROM "increment_id""#, &[]).unwrap();
        assert_eq!(counters[0]["value"], i64::MAX);
    }

    #[test]
    fn test_as_integer() {
        assert_eq!(as_integer(Some(&json!(5))), Some(5));
        assert_eq!(as_integer(Some(&json!("7"))), Some(7));
        assert_eq!(as_integer(Some(&json!(2.0))), Some(2));
        assert_eq!(as_integer(Some(&Value::Null)), None);
        assert_eq!(as_integer(None), None);
    }
}
