//! Named containers of record collections.
//!
//! A [`ContainerRegistry`] owns every container by name, and a [`Container`]
//! owns its collections. Collections are created on first access and the same
//! backing vector is returned for the lifetime of the container. There is no
//! locking: exclusive access is expressed through `&mut` borrows.
//!
//! # Example
//!
//! ```
//! use schema_adapter_memory::ContainerRegistry;
//! use serde_json::json;
//!
//! let mut registry = ContainerRegistry::new();
//! let customers = registry.collection("local-storage", "Customers");
//! customers.push(json!({"CustomerName": "Alfreds"}).as_object().cloned().unwrap());
//!
//! assert_eq!(registry.collection("local-storage", "Customers").len(), 1);
//! assert!(registry.collection("other", "Customers").is_empty());
//! ```

use std::collections::BTreeMap;

use schema_adapter_core::Record;

/// Collections of records keyed by collection name.
#[derive(Debug, Clone, Default)]
pub struct Container {
    name: String,
    collections: BTreeMap<String, Vec<Record>>,
}

impl Container {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            collections: BTreeMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the collection `name`, creating it empty if needed.
    pub fn collection(&mut self, name: &str) -> &mut Vec<Record> {
        self.collections.entry(name.to_string()).or_default()
    }

    /// Read-only view of an existing collection.
    pub fn get(&self, name: &str) -> Option<&[Record]> {
        self.collections.get(name).map(Vec::as_slice)
    }

    pub fn has_collection(&self, name: &str) -> bool {
        self.collections.contains_key(name)
    }

    pub fn collection_names(&self) -> impl Iterator<Item = &str> {
        self.collections.keys().map(String::as_str)
    }

    /// Removes a collection and returns its records.
    pub fn remove_collection(&mut self, name: &str) -> Option<Vec<Record>> {
        self.collections.remove(name)
    }
}

/// Registry of containers keyed by name.
#[derive(Debug, Default)]
pub struct ContainerRegistry {
    containers: BTreeMap<String, Container>,
}

impl ContainerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the container `name`, creating it empty if needed.
    pub fn container(&mut self, name: &str) -> &mut Container {
        self.containers
            .entry(name.to_string())
            .or_insert_with(|| Container::new(name))
    }

    pub fn get(&self, name: &str) -> Option<&Container> {
        self.containers.get(name)
    }

    /// Shorthand for `registry.container(container).collection(collection)`.
    pub fn collection(&mut self, container: &str, collection: &str) -> &mut Vec<Record> {
        self.container(container).collection(collection)
    }

    pub fn remove(&mut self, name: &str) -> Option<Container> {
        self.containers.remove(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.containers.keys().map(String::as_str)
    }
}
