//! Adapter configuration.
//!
//! Defines the YAML-serializable configuration that names the available
//! storage adapters, picks the default one and carries connection options.
//!
//! # Example YAML
//!
//! ```yaml
//! version: "1.0"
//! log_level: info
//! adapters:
//!   - name: local
//!     invariant_name: sqlite
//!     default: true
//!     options:
//!       database: data/app.db
//!       foreign_keys: true
//!   - name: scratch
//!     invariant_name: memory
//! migrations:
//!   - config/migrations
//! ```

use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{DatabaseError, Result};

/// Database name that selects a private in-memory SQLite database.
pub const MEMORY_DATABASE: &str = ":memory:";

/// Which backend an adapter entry instantiates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AdapterKind {
    /// Embedded SQLite database (file or `:memory:`).
    Sqlite,
    /// Container/collection store with no SQL engine.
    Memory,
}

/// Connection options for one adapter.
///
/// # Examples
///
/// ```
/// use schema_adapter_db::AdapterOptions;
///
/// let options = AdapterOptions::default();
/// assert!(options.is_in_memory());
///
/// let options = AdapterOptions::file("app.db");
/// assert_eq!(options.database, "app.db");
/// assert!(!options.is_in_memory());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdapterOptions {
    /// Database file path, or `:memory:`.
    #[serde(default = "default_database")]
    pub database: String,
    /// Issue `PRAGMA foreign_keys = ON` after opening.
    #[serde(default)]
    pub foreign_keys: bool,
    /// Busy timeout applied to the connection, in milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub busy_timeout_ms: Option<u64>,
}

fn default_database() -> String {
    MEMORY_DATABASE.to_string()
}

impl Default for AdapterOptions {
    fn default() -> Self {
        Self {
            database: default_database(),
            foreign_keys: false,
            busy_timeout_ms: None,
        }
    }
}

impl AdapterOptions {
    /// Options for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Options for a database file at `path`.
    pub fn file(path: impl AsRef<Path>) -> Self {
        Self {
            database: path.as_ref().to_string_lossy().into_owned(),
            ..Self::default()
        }
    }

    /// Returns `true` if the options select an in-memory database.
    pub fn is_in_memory(&self) -> bool {
        self.database == MEMORY_DATABASE
    }
}

/// One named adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterEntry {
    pub name: String,
    pub invariant_name: AdapterKind,
    /// Marks the adapter returned by [`AdapterConfig::default_adapter`].
    #[serde(default)]
    pub default: bool,
    #[serde(default)]
    pub options: AdapterOptions,
}

/// Top-level adapter configuration.
///
/// Loaded from a YAML file (typically `schema-adapter.yml`) by the CLI and by
/// applications that want file-driven adapter selection.
///
/// # Examples
///
/// ```no_run
/// use schema_adapter_db::AdapterConfig;
///
/// let config = AdapterConfig::load("schema-adapter.yml").unwrap();
/// let adapter = config.default_adapter().unwrap();
/// println!("using {} ({})", adapter.name, adapter.options.database);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdapterConfig {
    /// Configuration format version (e.g., `"1.0"`).
    pub version: String,
    pub adapters: Vec<AdapterEntry>,
    /// Default `tracing` filter directive when `RUST_LOG` is unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_level: Option<String>,
    /// Directories or bundle files holding migration descriptors.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub migrations: Vec<PathBuf>,
}

impl AdapterConfig {
    /// Configuration with a single default in-memory SQLite adapter.
    pub fn in_memory() -> Self {
        Self {
            version: "1.0".to_string(),
            adapters: vec![AdapterEntry {
                name: "default".to_string(),
                invariant_name: AdapterKind::Sqlite,
                default: true,
                options: AdapterOptions::in_memory(),
            }],
            log_level: None,
            migrations: Vec::new(),
        }
    }

    /// Loads configuration from a YAML file.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be read, [`YamlError`](crate::DatabaseError::YamlError) if parsing
    /// fails, or [`InvalidConfig`](crate::DatabaseError::InvalidConfig) if no
    /// adapter is declared.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        let reader = BufReader::new(file);
        let config: Self = serde_yaml::from_reader(reader)?;
        if config.adapters.is_empty() {
            return Err(DatabaseError::InvalidConfig(
                "at least one adapter must be declared".to_string(),
            ));
        }
        Ok(config)
    }

    /// Saves the configuration as YAML.
    ///
    /// # Errors
    ///
    /// Returns [`IoError`](crate::DatabaseError::IoError) if the file cannot
    /// be written, or [`YamlError`](crate::DatabaseError::YamlError) if
    /// serialization fails.
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let file = std::fs::File::create(path)?;
        let writer = BufWriter::new(file);
        serde_yaml::to_writer(writer, self)?;
        Ok(())
    }

    /// Returns the adapter flagged `default`, falling back to the first one.
    pub fn default_adapter(&self) -> Option<&AdapterEntry> {
        self.adapters
            .iter()
            .find(|a| a.default)
            .or_else(|| self.adapters.first())
    }

    /// Looks up an adapter by name.
    pub fn adapter(&self, name: &str) -> Option<&AdapterEntry> {
        self.adapters.iter().find(|a| a.name == name)
    }
}
