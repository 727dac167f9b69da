//! Query execution against one container.

use schema_adapter_core::{Expr, Field, InsertQuery, Query, Record, SelectQuery, UpdateQuery};
use serde_json::Value;
use tracing::debug;

use crate::container::{Container, ContainerRegistry};
use crate::error::{MemoryError, Result};
use crate::formatter::MemoryFormatter;

/// Collection holding one counter record per `(entity, attribute)` pair.
pub const IDENTITY_COLLECTION: &str = "increment_id";

/// Runs queries against a borrowed [`Container`].
///
/// # Example
///
/// ```
/// use schema_adapter_core::{Expr, SelectQuery};
/// use schema_adapter_memory::{Container, MemoryAdapter};
/// use serde_json::json;
///
/// let mut container = Container::new("local-storage");
/// let mut adapter = MemoryAdapter::new(&mut container);
/// adapter.insert_value(&json!({"Orders": {"OrderID": 10248}})).unwrap();
///
/// assert_eq!(adapter.select_identity("Orders", "OrderID").unwrap(), 10249);
/// let rows = adapter
///     .execute(&SelectQuery::from("Orders").filter(Expr::col("OrderID").ge(10248)).into())
///     .unwrap();
/// assert_eq!(rows.len(), 1);
/// ```
#[derive(Debug)]
pub struct MemoryAdapter<'c> {
    container: &'c mut Container,
    formatter: MemoryFormatter,
    last_identity: Option<i64>,
}

impl<'c> MemoryAdapter<'c> {
    pub fn new(container: &'c mut Container) -> Self {
        Self {
            container,
            formatter: MemoryFormatter::new(),
            last_identity: None,
        }
    }

    /// Adapter over the container `name`, created in `registry` if needed.
    pub fn from_registry(registry: &'c mut ContainerRegistry, name: &str) -> Self {
        Self::new(registry.container(name))
    }

    pub fn container(&self) -> &Container {
        self.container
    }

    /// Formats and runs `query`. Selects return their rows; every other
    /// statement returns an empty vector.
    ///
    /// # Errors
    ///
    /// Propagates formatting and evaluation errors. A statement that fails
    /// to format leaves the container untouched.
    pub fn execute(&mut self, query: &Query) -> Result<Vec<Record>> {
        let statement = self.formatter.format(query)?;
        statement(&mut *self.container)
    }

    /// Inserts the `{"Collection": object | [object, ...]}` shape.
    pub fn insert_value(&mut self, value: &Value) -> Result<()> {
        let query = InsertQuery::from_value(value)?;
        self.execute(&Query::Insert(query))?;
        Ok(())
    }

    /// Records of `name`, empty when the collection does not exist.
    pub fn collection(&self, name: &str) -> &[Record] {
        self.container.get(name).unwrap_or(&[])
    }

    pub fn collection_exists(&self, name: &str) -> bool {
        self.container.has_collection(name)
    }

    /// Next identity for `entity.attribute`.
    ///
    /// The first call seeds the counter from the largest numeric `attribute`
    /// already stored in `entity` plus one (or `1`); later calls increment
    /// the stored value.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::EvaluationError`] if the stored counter is not
    /// an integer.
    pub fn select_identity(&mut self, entity: &str, attribute: &str) -> Result<i64> {
        let key = Expr::col("entity")
            .eq(entity)
            .and(Expr::col("attribute").eq(attribute));
        let existing = self.execute(&Query::Select(
            SelectQuery::from(IDENTITY_COLLECTION)
                .select(["value"])
                .filter(key.clone()),
        ))?;

        let value = match existing.first() {
            Some(row) => {
                let current = row.get("value").and_then(Value::as_i64).ok_or_else(|| {
                    MemoryError::EvaluationError(format!(
                        "counter for {entity}.{attribute} is not an integer"
                    ))
                })?;
                let next = successor(current, entity, attribute)?;
                let mut values = Record::new();
                values.insert("value".into(), Value::from(next));
                self.execute(&Query::Update(
                    UpdateQuery::new(IDENTITY_COLLECTION, values).filter(key),
                ))?;
                next
            }
            None => {
                let next = self.seed(entity, attribute)?;
                let mut row = Record::new();
                row.insert("entity".into(), Value::from(entity));
                row.insert("attribute".into(), Value::from(attribute));
                row.insert("value".into(), Value::from(next));
                self.execute(&Query::Insert(InsertQuery::one(IDENTITY_COLLECTION, row)))?;
                next
            }
        };

        debug!(entity, attribute, value, "select_identity");
        self.last_identity = Some(value);
        Ok(value)
    }

    fn seed(&mut self, entity: &str, attribute: &str) -> Result<i64> {
        let rows = self.execute(&Query::Select(
            SelectQuery::from(entity).select([Field::aliased(Expr::col(attribute).max(), "value")]),
        ))?;
        let max = rows
            .first()
            .and_then(|row| row.get("value"))
            .and_then(|v| v.as_i64().or_else(|| v.as_f64().map(|f| f as i64)));
        match max {
            Some(max) => successor(max, entity, attribute),
            None => Ok(1),
        }
    }

    /// Value handed out by the last [`select_identity`](Self::select_identity).
    pub fn last_identity(&self) -> Option<i64> {
        self.last_identity
    }
}

fn successor(value: i64, entity: &str, attribute: &str) -> Result<i64> {
    value.checked_add(1).ok_or_else(|| {
        MemoryError::EvaluationError(format!("counter for {entity}.{attribute} overflows i64"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_identity_seeds_then_increments() {
        let mut container = Container::new("db");
        let mut adapter = MemoryAdapter::new(&mut container);
        adapter
            .insert_value(&json!({"Orders": [{"OrderID": 10248}, {"OrderID": 10250}]}))
            .unwrap();

        assert_eq!(adapter.select_identity("Orders", "OrderID").unwrap(), 10251);
        assert_eq!(adapter.select_identity("Orders", "OrderID").unwrap(), 10252);
        assert_eq!(adapter.last_identity(), Some(10252));
        assert_eq!(adapter.collection(IDENTITY_COLLECTION).len(), 1);
    }

    #[test]
    fn test_identity_starts_at_one() {
        let mut container = Container::new("db");
        let mut adapter = MemoryAdapter::new(&mut container);
        assert_eq!(adapter.last_identity(), None);
        assert_eq!(adapter.select_identity("Users", "id").unwrap(), 1);
        assert_eq!(adapter.select_identity("Groups", "id").unwrap(), 1);
        assert_eq!(adapter.select_identity("Users", "id").unwrap(), 2);
    }

    #[test]
    fn test_corrupt_counter() {
        let mut container = Container::new("db");
        container.collection(IDENTITY_COLLECTION).push(
            json!({"entity": "Users", "attribute": "id", "value": "x"})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let mut adapter = MemoryAdapter::new(&mut container);
        assert!(matches!(
            adapter.select_identity("Users", "id"),
            Err(MemoryError::EvaluationError(_))
        ));
    }

    #[test]
    fn test_counter_overflow_is_an_error() {
        let mut container = Container::new("db");
        container.collection("Users").push(
            json!({"id": i64::MAX}).as_object().cloned().unwrap(),
        );
        container.collection(IDENTITY_COLLECTION).push(
            json!({"entity": "Groups", "attribute": "id", "value": i64::MAX})
                .as_object()
                .cloned()
                .unwrap(),
        );
        let mut adapter = MemoryAdapter::new(&mut container);
        assert!(matches!(
            adapter.select_identity("Users", "id"),
            Err(MemoryError::EvaluationError(_))
        ));
        assert!(matches!(
            adapter.select_identity("Groups", "id"),
            Err(MemoryError::EvaluationError(_))
        ));
        assert_eq!(adapter.last_identity(), None);
        assert_eq!(adapter.collection(IDENTITY_COLLECTION)[0]["value"], i64::MAX);
    }

    #[test]
    fn test_from_registry() {
        let mut registry = ContainerRegistry::new();
        {
            let mut adapter = MemoryAdapter::from_registry(&mut registry, "local-storage");
            adapter.insert_value(&json!({"Users": {"name": "a"}})).unwrap();
            assert!(adapter.collection_exists("Users"));
            assert_eq!(adapter.container().name(), "local-storage");
        }
        assert_eq!(registry.collection("local-storage", "Users").len(), 1);
    }
}
