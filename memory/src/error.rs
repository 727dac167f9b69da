//! Error types for the in-memory backend.

use schema_adapter_core::QueryError;
use thiserror::Error;

/// Errors that can occur while formatting or executing a query in memory.
#[derive(Debug, Error)]
pub enum MemoryError {
    /// The query could not be built from its input.
    #[error(transparent)]
    QueryError(#[from] QueryError),

    /// The query shape has no in-memory rule.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// A statement names no target collection, or an unknown alias.
    #[error("invalid collection reference: {0}")]
    InvalidCollectionReference(String),

    /// A stored value could not be interpreted.
    #[error("evaluation error: {0}")]
    EvaluationError(String),
}

/// Convenience alias for results with [`MemoryError`].
pub type Result<T> = std::result::Result<T, MemoryError>;
