//! DDL generation and SQLite type mapping.
//!
//! Maps [`SemanticType`] column descriptors onto SQLite declared types and
//! renders the `CREATE`/`ALTER`/`DROP` statements issued by the migration
//! engine and the table, view and index handles.
//!
//! # Type mapping
//!
//! ```
//! use schema_adapter_core::{ColumnDescriptor, SemanticType};
//! use schema_adapter_sqlite::format_type;
//!
//! assert_eq!(
//!     format_type(&ColumnDescriptor::counter("id")),
//!     "INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL"
//! );
//! assert_eq!(
//!     format_type(&ColumnDescriptor::new("name", SemanticType::Text).with_size(120).not_null()),
//!     "TEXT(120,0) NOT NULL"
//! );
//! assert_eq!(format_type(&ColumnDescriptor::new("price", SemanticType::Currency)), "NUMERIC(19,4) NULL");
//! ```

use schema_adapter_core::{ColumnDescriptor, MIGRATIONS_TABLE, SemanticType};

/// Declared type for an auto-incrementing primary key; never suffixed.
const COUNTER_TYPE: &str = "INTEGER PRIMARY KEY AUTOINCREMENT NOT NULL";

/// Renders the declared SQLite type of a column, including its primary-key
/// or nullability suffix.
///
/// The result is deterministic for a given descriptor. `Counter` columns
/// render as a complete auto-increment primary key; other primary columns get
/// `PRIMARY KEY NOT NULL` regardless of `nullable`; everything else is
/// `NULL` unless `nullable` is explicitly `false`.
pub fn format_type(column: &ColumnDescriptor) -> String {
    let size = column.size.filter(|s| *s > 0);
    let base = match &column.semantic_type {
        SemanticType::Counter => return COUNTER_TYPE.to_string(),
        SemanticType::Boolean | SemanticType::Byte => "INTEGER(1,0)".to_string(),
        SemanticType::Number | SemanticType::Float => "REAL".to_string(),
        SemanticType::Currency => format!("NUMERIC({},4)", size.unwrap_or(19)),
        SemanticType::Decimal => match (size, column.scale.filter(|s| *s > 0)) {
            (Some(size), Some(scale)) => format!("NUMERIC({size},{scale})"),
            _ => "NUMERIC".to_string(),
        },
        SemanticType::Date | SemanticType::DateTime | SemanticType::Long => "NUMERIC".to_string(),
        SemanticType::Time | SemanticType::Text | SemanticType::Note | SemanticType::Url => {
            text_type(size, None)
        }
        SemanticType::Duration => text_type(size, Some(48)),
        SemanticType::Integer => match size {
            Some(size) => format!("INTEGER({size},0)"),
            None => "INTEGER".to_string(),
        },
        SemanticType::Binary | SemanticType::Image => "BLOB".to_string(),
        SemanticType::Guid => "TEXT(36,0)".to_string(),
        SemanticType::Short => "INTEGER(2,0)".to_string(),
        SemanticType::Other(_) => "INTEGER".to_string(),
    };

    if column.primary {
        format!("{base} PRIMARY KEY NOT NULL")
    } else if column.nullable == Some(false) {
        format!("{base} NOT NULL")
    } else {
        format!("{base} NULL")
    }
}

fn text_type(size: Option<u32>, fallback: Option<u32>) -> String {
    match size.or(fallback) {
        Some(size) => format!("TEXT({size},0)"),
        None => "TEXT".to_string(),
    }
}

/// Quotes an identifier, doubling embedded double quotes.
///
/// ```
/// use schema_adapter_sqlite::escape_name;
///
/// assert_eq!(escape_name("Orders"), r#""Orders""#);
/// assert_eq!(escape_name(r#"a"b"#), r#""a""b""#);
/// ```
pub fn escape_name(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Renders a string as a single-quoted SQL literal.
pub(crate) fn quote_text(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// `CREATE TABLE` over every physical column; relationship placeholders are
/// skipped.
pub(crate) fn create_table_sql(table: &str, columns: &[ColumnDescriptor]) -> String {
    let definitions = columns
        .iter()
        .filter(|c| !c.one_to_many)
        .map(|c| format!("{} {}", escape_name(&c.name), format_type(c)))
        .collect::<Vec<_>>()
        .join(", ");
    format!("CREATE TABLE {} ({definitions})", escape_name(table))
}

pub(crate) fn add_column_sql(table: &str, column: &ColumnDescriptor) -> String {
    format!(
        "ALTER TABLE {} ADD COLUMN {} {}",
        escape_name(table),
        escape_name(&column.name),
        format_type(column)
    )
}

pub(crate) fn drop_table_sql(table: &str) -> String {
    format!("DROP TABLE IF EXISTS {}", escape_name(table))
}

pub(crate) fn drop_view_sql(view: &str) -> String {
    format!("DROP VIEW IF EXISTS {}", escape_name(view))
}

pub(crate) fn create_index_sql<S: AsRef<str>>(table: &str, name: &str, columns: &[S]) -> String {
    let columns = columns
        .iter()
        .map(|c| escape_name(c.as_ref()))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE INDEX {} ON {} ({columns})",
        escape_name(name),
        escape_name(table)
    )
}

pub(crate) fn drop_index_sql(name: &str) -> String {
    format!("DROP INDEX IF EXISTS {}", escape_name(name))
}

/// DDL of the bookkeeping table; safe to run when it already exists.
pub(crate) fn migrations_table_sql() -> String {
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\"id\" INTEGER PRIMARY KEY AUTOINCREMENT, \
         \"appliesTo\" TEXT NOT NULL, \"model\" TEXT NULL, \"description\" TEXT, \
         \"version\" TEXT NOT NULL)",
        escape_name(MIGRATIONS_TABLE)
    )
}

pub(crate) fn insert_migration_sql() -> String {
    format!(
        "INSERT INTO {} (\"appliesTo\", \"model\", \"version\", \"description\") VALUES (?, ?, ?, ?)",
        escape_name(MIGRATIONS_TABLE)
    )
}
