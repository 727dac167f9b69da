//! Live schema introspection.
//!
//! Reads table, column, index and version metadata from the SQLite catalog.
//! Nothing here is cached: DDL can happen outside the adapter, so every call
//! goes back to the engine. (The index cache lives on
//! [`Indexes`](crate::Indexes) and is invalidated by its own mutations.)

use std::sync::LazyLock;

use regex::Regex;
use rusqlite::{Connection, OptionalExtension};
use schema_adapter_core::{IndexDescriptor, LiveColumn, MIGRATIONS_TABLE, Version};

use crate::error::Result;
use crate::schema::escape_name;

/// Matches `TYPE(size,scale)` or `TYPE(size)` in a declared column type.
static SIZED_TYPE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^\s*\w+\s*\(\s*(\d+)\s*(?:,\s*(\d+)\s*)?\)").expect("static regex must compile")
});

/// Extracts `(size, scale)` from a declared type; zeros count as unset.
pub(crate) fn parse_size_scale(declared: &str) -> (Option<u32>, Option<u32>) {
    let Some(caps) = SIZED_TYPE.captures(declared) else {
        return (None, None);
    };
    let number = |i: usize| {
        caps.get(i)
            .and_then(|m| m.as_str().parse::<u32>().ok())
            .filter(|n| *n > 0)
    };
    (number(1), number(2))
}

fn object_exists(conn: &Connection, kind: &str, name: &str) -> Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type = ?1 AND name = ?2",
        [kind, name],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> Result<bool> {
    object_exists(conn, "table", table)
}

pub(crate) fn view_exists(conn: &Connection, view: &str) -> Result<bool> {
    object_exists(conn, "view", view)
}

/// Columns of `table` in ordinal order; empty when the table is absent.
pub(crate) fn table_columns(conn: &Connection, table: &str) -> Result<Vec<LiveColumn>> {
    let mut stmt =
        conn.prepare("SELECT cid, name, type, \"notnull\", pk FROM pragma_table_info(?1) ORDER BY cid")?;
    let rows = stmt.query_map([table], |row| {
        let declared_type: String = row.get(2)?;
        let (size, scale) = parse_size_scale(&declared_type);
        Ok(LiveColumn {
            ordinal: row.get(0)?,
            name: row.get(1)?,
            declared_type,
            nullable: row.get::<_, i64>(3)? == 0,
            primary: row.get::<_, i64>(4)? > 0,
            size,
            scale,
        })
    })?;
    Ok(rows.collect::<rusqlite::Result<Vec<_>>>()?)
}

/// Highest version recorded for `table`, or `0.0` when none is.
pub(crate) fn table_version(conn: &Connection, table: &str) -> Result<Version> {
    if !table_exists(conn, MIGRATIONS_TABLE)? {
        return Ok(Version::default());
    }
    let mut stmt = conn.prepare(&format!(
        "SELECT \"version\" FROM {} WHERE \"appliesTo\" = ?1",
        escape_name(MIGRATIONS_TABLE)
    ))?;
    let versions = stmt.query_map([table], |row| row.get::<_, String>(0))?;
    let mut latest = Version::default();
    for version in versions {
        let version = Version::from(version?);
        if version > latest {
            latest = version;
        }
    }
    Ok(latest)
}

/// User-created indexes of `table` with their columns in key order.
pub(crate) fn index_list(conn: &Connection, table: &str) -> Result<Vec<IndexDescriptor>> {
    let names: Vec<String> = {
        let mut stmt =
            conn.prepare("SELECT name FROM pragma_index_list(?1) WHERE origin = 'c' ORDER BY name")?;
        let rows = stmt.query_map([table], |row| row.get(0))?;
        rows.collect::<rusqlite::Result<_>>()?
    };

    let mut stmt = conn.prepare("SELECT name FROM pragma_index_info(?1) ORDER BY seqno")?;
    let mut indexes = Vec::with_capacity(names.len());
    for name in names {
        let columns = stmt
            .query_map([&name], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        indexes.push(IndexDescriptor::new(name, columns));
    }
    Ok(indexes)
}

/// Returns `true` once `table` owns a row in `sqlite_sequence`.
pub(crate) fn has_sequence(conn: &Connection, table: &str) -> Result<bool> {
    if !table_exists(conn, "sqlite_sequence")? {
        return Ok(false);
    }
    let found = conn
        .query_row(
            "SELECT 1 FROM sqlite_sequence WHERE name = ?1",
            [table],
            |row| row.get::<_, i64>(0),
        )
        .optional()?;
    Ok(found.is_some())
}
