//! Error types for configuration and descriptor loading.
//!
//! Provides a unified error type covering all failure modes: I/O,
//! serialization, descriptor validation and configuration lookup.

use thiserror::Error;

/// Errors that can occur while loading configuration or descriptors.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// File I/O failure.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// JSON parsing or serialization failure.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// YAML parsing or serialization failure.
    #[error("YAML error: {0}")]
    YamlError(#[from] serde_yaml::Error),

    /// A migration descriptor failed structural validation.
    #[error("invalid descriptor {name}: {reason}")]
    InvalidDescriptor { name: String, reason: String },

    /// Configuration is well-formed but unusable (e.g. no adapters).
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// All configured descriptor sources failed.
    #[error("no descriptor sources available")]
    NoSourcesAvailable,
}

/// Convenience alias for results with [`DatabaseError`].
pub type Result<T> = std::result::Result<T, DatabaseError>;
