//! Conversion between JSON values and SQLite values.
//!
//! Parameters arrive as [`serde_json::Value`] and are bound as
//! [`rusqlite::types::Value`]; result rows come back as [`Record`] objects
//! keyed by the statement's column names.
//!
//! # Mapping
//!
//! | JSON | SQLite |
//! |---|---|
//! | `null` | `NULL` |
//! | `true` / `false` | `1` / `0` |
//! | integer | `INTEGER` |
//! | float | `REAL` |
//! | string | `TEXT` |
//! | array / object | `TEXT` holding the serialized JSON |
//!
//! `BLOB` results are read back as arrays of byte values.

use rusqlite::Statement;
use rusqlite::types::{Value as SqlValue, ValueRef};
use schema_adapter_core::Record;
use serde_json::{Number, Value};

use crate::error::{Result, SqliteError};

/// Converts a JSON value into a bindable SQLite value.
pub(crate) fn to_sql_value(value: &Value) -> Result<SqlValue> {
    Ok(match value {
        Value::Null => SqlValue::Null,
        Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                SqlValue::Integer(i)
            } else if let Some(f) = n.as_f64() {
                SqlValue::Real(f)
            } else {
                return Err(SqliteError::ConversionError(format!(
                    "number out of range: {n}"
                )));
            }
        }
        Value::String(s) => SqlValue::Text(s.clone()),
        Value::Array(_) | Value::Object(_) => SqlValue::Text(
            serde_json::to_string(value).map_err(|e| SqliteError::ConversionError(e.to_string()))?,
        ),
    })
}

/// Converts every parameter of a statement.
pub(crate) fn to_sql_values(values: &[Value]) -> Result<Vec<SqlValue>> {
    values.iter().map(to_sql_value).collect()
}

/// Converts one result cell into JSON.
pub(crate) fn from_value_ref(value: ValueRef<'_>) -> Result<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::from(i),
        ValueRef::Real(f) => Number::from_f64(f).map(Value::Number).unwrap_or(Value::Null),
        ValueRef::Text(bytes) => Value::String(
            std::str::from_utf8(bytes)
                .map_err(|e| SqliteError::ConversionError(format!("invalid UTF-8 text: {e}")))?
                .to_string(),
        ),
        ValueRef::Blob(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
    })
}

/// Runs a prepared row-returning statement and collects every row.
pub(crate) fn query_records(stmt: &mut Statement<'_>, params: &[SqlValue]) -> Result<Vec<Record>> {
    let names: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
    let mut rows = stmt.query(rusqlite::params_from_iter(params.iter()))?;
    let mut records = Vec::new();
    while let Some(row) = rows.next()? {
        let mut record = Record::new();
        for (i, name) in names.iter().enumerate() {
            record.insert(name.clone(), from_value_ref(row.get_ref(i)?)?);
        }
        records.push(record);
    }
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;
    use serde_json::json;

    #[test]
    fn test_to_sql_value() {
        assert_eq!(to_sql_value(&json!(null)).unwrap(), SqlValue::Null);
        assert_eq!(to_sql_value(&json!(true)).unwrap(), SqlValue::Integer(1));
        assert_eq!(to_sql_value(&json!(42)).unwrap(), SqlValue::Integer(42));
        assert_eq!(to_sql_value(&json!(1.5)).unwrap(), SqlValue::Real(1.5));
        assert_eq!(to_sql_value(&json!("x")).unwrap(), SqlValue::Text("x".into()));
        assert_eq!(
            to_sql_value(&json!({"a": 1})).unwrap(),
            SqlValue::Text(r#"{"a":1}"#.into())
        );
    }

    #[test]
    fn test_query_records_preserves_column_order() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn
            .prepare("SELECT 1 AS b, 'x' AS a, NULL AS n, 2.5 AS r, X'0102' AS bytes")
            .unwrap();
        let rows = query_records(&mut stmt, &[]).unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<&str> = rows[0].keys().map(String::as_str).collect();
        assert_eq!(keys, vec!["b", "a", "n", "r", "bytes"]);
        assert_eq!(rows[0]["r"], json!(2.5));
        assert_eq!(rows[0]["bytes"], json!([1, 2]));
    }

    #[test]
    fn test_query_records_binds_parameters() {
        let conn = Connection::open_in_memory().unwrap();
        let mut stmt = conn.prepare("SELECT ? + ? AS total").unwrap();
        let params = to_sql_values(&[json!(2), json!(3)]).unwrap();
        let rows = query_records(&mut stmt, &params).unwrap();
        assert_eq!(rows[0]["total"], json!(5));
    }
}
