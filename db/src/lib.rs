//! Adapter configuration and migration descriptor loading.
//!
//! This crate provides the file-facing side of the adapter: the YAML
//! configuration that selects a backend and its connection options, and the
//! loaders that read migration descriptors from disk in application order.
//!
//! # Quick start
//!
//! ```no_run
//! use schema_adapter_db::{AdapterConfig, DescriptorSet};
//!
//! let config = AdapterConfig::load("schema-adapter.yml").unwrap();
//! let adapter = config.default_adapter().unwrap();
//! println!("database: {}", adapter.options.database);
//!
//! // Descriptors from a directory, falling back to a bundle
//! let set = DescriptorSet::builder()
//!     .from_dir("config/migrations/")
//!     .from_bundle("migrations.json")
//!     .build()
//!     .unwrap();
//! for descriptor in &set {
//!     println!("{} {}", descriptor.applies_to, descriptor.version);
//! }
//! ```

mod config;
mod error;
mod loader;

pub use config::{AdapterConfig, AdapterEntry, AdapterKind, AdapterOptions, MEMORY_DATABASE};
pub use error::{DatabaseError, Result};
pub use loader::{DescriptorBuilder, DescriptorSet, DescriptorSource};
