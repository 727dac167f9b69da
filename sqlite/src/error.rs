//! Error types for SQLite adapter operations.
//!
//! Provides a unified error type covering connection, statement, migration,
//! query compilation and descriptor failures.

use schema_adapter_core::{QueryError, ValidationError};
use thiserror::Error;

/// Errors that can occur during SQLite adapter operations.
#[derive(Debug, Error)]
pub enum SqliteError {
    /// The connection could not be opened or configured.
    #[error("connection error: {0}")]
    ConnectionError(String),

    /// SQLite database operation failure.
    #[error("database error: {0}")]
    DatabaseError(#[from] rusqlite::Error),

    /// A raw statement was rejected before reaching the engine.
    #[error("invalid statement: {0}")]
    InvalidStatement(String),

    /// The requested schema change needs a path that is not available.
    #[error("{0}")]
    UnsupportedMigration(String),

    /// The query shape has no compiler rule.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// Index columns could not be interpreted.
    #[error("invalid index specification: {0}")]
    InvalidIndexSpec(String),

    /// A statement names no target collection, or an ambiguous one.
    #[error("invalid collection reference: {0}")]
    InvalidCollectionReference(String),

    /// A migration descriptor failed validation.
    #[error("invalid descriptor for {table}: {}", format_validation(.errors))]
    InvalidDescriptor {
        table: String,
        errors: Vec<ValidationError>,
    },

    /// A value could not be mapped between JSON and SQLite.
    #[error("conversion error: {0}")]
    ConversionError(String),

    /// Error loading migration descriptors.
    #[error("loader error: {0}")]
    LoaderError(#[from] schema_adapter_db::DatabaseError),
}

fn format_validation(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl From<QueryError> for SqliteError {
    fn from(err: QueryError) -> Self {
        match err {
            QueryError::UnsupportedExpression(msg) => SqliteError::UnsupportedExpression(msg),
            QueryError::InvalidCollectionReference(msg) => {
                SqliteError::InvalidCollectionReference(msg)
            }
            QueryError::InvalidIndexSpec(msg) => SqliteError::InvalidIndexSpec(msg),
            QueryError::MissingKey(key) => {
                SqliteError::InvalidCollectionReference(format!("missing key attribute {key}"))
            }
        }
    }
}

/// Convenience alias for results with [`SqliteError`].
pub type Result<T> = std::result::Result<T, SqliteError>;
