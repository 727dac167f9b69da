//! Schema migration engine.
//!
//! Reconciles a version-tagged [`MigrationDescriptor`] against the live
//! table and issues the DDL needed to converge them. One call runs these
//! steps in order:
//!
//! 1. create the `migrations` bookkeeping table if it is missing;
//! 2. stop with [`MigrationOutcome::AlreadyApplied`] when the recorded
//!    version of the table is at least the requested one;
//! 3. resolve index columns against the live and declared columns,
//!    failing with [`SqliteError::InvalidDescriptor`] before the table is touched;
//! 4. create the table, or reconcile its columns with [`plan_reconcile`]
//!    and add the missing ones with `ALTER TABLE ... ADD COLUMN`;
//! 5. create, recreate or keep each requested index;
//! 6. record the migration if any DDL ran.
//!
//! Removing or changing columns needs a full table rebuild, which is not
//! available; such descriptors fail with
//! [`SqliteError::UnsupportedMigration`]. DDL is not wrapped in a
//! transaction of its own, so statements applied before a failure stay
//! applied and a retry picks up from the live state.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::{ColumnDescriptor, MigrationDescriptor, SemanticType};
//! use schema_adapter_sqlite::{MigrationOutcome, SqliteAdapter};
//!
//! let adapter = SqliteAdapter::in_memory();
//! let v1 = MigrationDescriptor::new("Users", "1.0")
//!     .add_column(ColumnDescriptor::counter("id"))
//!     .add_column(ColumnDescriptor::new("name", SemanticType::Text).not_null());
//!
//! assert_eq!(adapter.migrate(&v1).unwrap(), MigrationOutcome::Created);
//! assert_eq!(adapter.migrate(&v1).unwrap(), MigrationOutcome::AlreadyApplied);
//!
//! let v2 = MigrationDescriptor::new("Users", "1.1")
//!     .add_column(ColumnDescriptor::new("email", SemanticType::Text).with_size(255));
//! assert_eq!(adapter.migrate(&v2).unwrap(), MigrationOutcome::Altered);
//! ```

use std::collections::HashSet;

use schema_adapter_core::{
    ColumnDescriptor, LiveColumn, MigrationDescriptor, MigrationRecord, ValidationError,
    validate_descriptor,
};
use serde_json::Value;
use tracing::{debug, info};

use crate::error::{Result, SqliteError};
use crate::handles::IndexChange;
use crate::introspect;
use crate::schema::{
    add_column_sql, create_table_sql, format_type, insert_migration_sql, migrations_table_sql,
};
use crate::session::Session;

/// Message of the error raised when a descriptor needs a table rebuild.
pub const FULL_MIGRATION_UNSUPPORTED: &str = "Full table migration is not yet implemented.";

/// How a migration call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MigrationOutcome {
    /// The recorded version already reached the requested one; nothing ran.
    AlreadyApplied,
    /// The table did not exist and was created.
    Created,
    /// Columns were added or indexes changed on an existing table.
    Altered,
    /// The live table already matched; no DDL ran and nothing was recorded.
    Unchanged,
}

impl MigrationOutcome {
    /// Returns `true` when the table was already up to date.
    pub fn updated(self) -> bool {
        matches!(self, MigrationOutcome::AlreadyApplied | MigrationOutcome::Unchanged)
    }
}

/// Column delta between a descriptor and a live table.
///
/// The three sets are disjoint. A non-empty `change` or `remove` set means
/// the table cannot be converged with `ADD COLUMN` alone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcilePlan {
    pub add: Vec<ColumnDescriptor>,
    pub change: Vec<ColumnDescriptor>,
    pub remove: Vec<String>,
}

impl ReconcilePlan {
    /// Returns `true` if applying the plan needs a full table rebuild.
    pub fn requires_rebuild(&self) -> bool {
        !self.change.is_empty() || !self.remove.is_empty()
    }

    pub fn is_empty(&self) -> bool {
        self.add.is_empty() && !self.requires_rebuild()
    }
}

/// Declared type plus nullability of a live column, in [`format_type`] form.
fn live_signature(column: &LiveColumn) -> String {
    let nullability = if column.nullable { "NULL" } else { "NOT NULL" };
    format!("{} {nullability}", column.declared_type.to_uppercase())
}

/// Computes the column delta between `descriptor` and `live`.
///
/// - removals keep only live, non-primary columns;
/// - changes keep live, non-primary columns whose type or nullability
///   differs; changes naming absent columns become additions;
/// - additions keep absent columns; an addition whose live column differs
///   becomes a change, an identical one is dropped.
///
/// Primary-key columns and relationship placeholders never appear in the
/// plan.
pub fn plan_reconcile(descriptor: &MigrationDescriptor, live: &[LiveColumn]) -> ReconcilePlan {
    let find = |name: &str| live.iter().find(|c| c.name == name);
    let mut plan = ReconcilePlan::default();

    for removal in &descriptor.remove {
        if find(&removal.name).is_some_and(|c| !c.primary) {
            plan.remove.push(removal.name.clone());
        }
    }

    let mut candidates: Vec<&ColumnDescriptor> = Vec::new();
    for column in descriptor.change.iter().filter(|c| !c.one_to_many) {
        match find(&column.name) {
            Some(existing) if existing.primary => {}
            Some(existing) => {
                if format_type(column) != live_signature(existing) {
                    plan.change.push(column.clone());
                }
            }
            None => candidates.push(column),
        }
    }

    for column in descriptor.add.iter().filter(|c| !c.one_to_many).chain(candidates) {
        match find(&column.name) {
            Some(existing) if existing.primary => {}
            Some(existing) => {
                if format_type(column) != live_signature(existing) {
                    plan.change.push(column.clone());
                }
            }
            None => {
                if !plan.add.iter().any(|c| c.name == column.name) {
                    plan.add.push(column.clone());
                }
            }
        }
    }

    plan
}

/// Index columns that neither the live table nor the descriptor provides.
///
/// Relationship placeholders are not physical columns and do not count.
fn unresolved_index_columns(
    descriptor: &MigrationDescriptor,
    live: &[LiveColumn],
) -> Vec<ValidationError> {
    let known: HashSet<&str> = live
        .iter()
        .map(|c| c.name.as_str())
        .chain(
            descriptor
                .add
                .iter()
                .chain(descriptor.change.iter())
                .filter(|c| !c.one_to_many)
                .map(|c| c.name.as_str()),
        )
        .collect();

    descriptor
        .indexes
        .iter()
        .flat_map(|index| {
            index
                .columns
                .iter()
                .filter(|column| !known.contains(column.as_str()))
                .map(|column| ValidationError::UnknownIndexColumn {
                    index: index.name.clone(),
                    column: column.clone(),
                })
        })
        .collect()
}

/// Runs one migration on `session`.
pub(crate) fn apply(session: &Session<'_>, descriptor: &MigrationDescriptor) -> Result<MigrationOutcome> {
    let errors = validate_descriptor(descriptor);
    if !errors.is_empty() {
        return Err(SqliteError::InvalidDescriptor {
            table: descriptor.applies_to.clone(),
            errors,
        });
    }

    let table = descriptor.applies_to.as_str();
    session.run(&migrations_table_sql())?;

    let live_version = introspect::table_version(session.connection(), table)?;
    if live_version >= descriptor.version {
        debug!(table, version = %live_version, requested = %descriptor.version, "migration already applied");
        return Ok(MigrationOutcome::AlreadyApplied);
    }

    let exists = introspect::table_exists(session.connection(), table)?;
    let live = if exists {
        introspect::table_columns(session.connection(), table)?
    } else {
        Vec::new()
    };
    let errors = unresolved_index_columns(descriptor, &live);
    if !errors.is_empty() {
        return Err(SqliteError::InvalidDescriptor {
            table: descriptor.applies_to.clone(),
            errors,
        });
    }

    let created = if !exists {
        if !descriptor.add.iter().any(|c| !c.one_to_many) {
            return Err(SqliteError::UnsupportedMigration(format!(
                "cannot create {table} without physical columns"
            )));
        }
        session.run(&create_table_sql(table, &descriptor.add))?;
        true
    } else {
        false
    };

    let mut ddl = created;
    if !created {
        let plan = plan_reconcile(descriptor, &live);
        if plan.requires_rebuild() {
            debug!(table, change = plan.change.len(), remove = plan.remove.len(), "rebuild required");
            return Err(SqliteError::UnsupportedMigration(FULL_MIGRATION_UNSUPPORTED.to_string()));
        }
        for column in &plan.add {
            session.run(&add_column_sql(table, column))?;
            ddl = true;
        }
    }

    if !descriptor.indexes.is_empty() {
        let indexes = session.indexes(table);
        for index in &descriptor.indexes {
            if indexes.create(&index.name, index.columns.as_slice())? != IndexChange::Unchanged {
                ddl = true;
            }
        }
    }

    if !ddl {
        debug!(table, version = %descriptor.version, "live table already matches");
        return Ok(MigrationOutcome::Unchanged);
    }

    let record = MigrationRecord::from(descriptor);
    session.execute(
        &insert_migration_sql(),
        &[
            Value::from(record.applies_to),
            record.model.map_or(Value::Null, Value::from),
            Value::from(record.version.to_string()),
            record.description.map_or(Value::Null, Value::from),
        ],
    )?;
    info!(table, version = %descriptor.version, created, "migration applied");

    Ok(if created {
        MigrationOutcome::Created
    } else {
        MigrationOutcome::Altered
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_adapter_core::SemanticType;

    fn live(name: &str, declared: &str, nullable: bool, primary: bool) -> LiveColumn {
        LiveColumn {
            name: name.into(),
            ordinal: 0,
            declared_type: declared.into(),
            nullable,
            primary,
            size: None,
            scale: None,
        }
    }

    fn live_users() -> Vec<LiveColumn> {
        vec![
            live("id", "INTEGER", false, true),
            live("name", "TEXT(120,0)", false, false),
            live("email", "text", true, false),
        ]
    }

    #[test]
    fn test_identical_add_is_dropped() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .add_column(ColumnDescriptor::new("name", SemanticType::Text).with_size(120).not_null())
            .add_column(ColumnDescriptor::new("email", SemanticType::Text));
        assert!(plan_reconcile(&descriptor, &live_users()).is_empty());
    }

    #[test]
    fn test_add_with_different_type_becomes_change() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .add_column(ColumnDescriptor::new("name", SemanticType::Note));
        let plan = plan_reconcile(&descriptor, &live_users());
        assert!(plan.add.is_empty());
        assert_eq!(plan.change.len(), 1);
        assert!(plan.requires_rebuild());
    }

    #[test]
    fn test_change_of_absent_column_is_promoted() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .change_column(ColumnDescriptor::new("phone", SemanticType::Text));
        let plan = plan_reconcile(&descriptor, &live_users());
        assert_eq!(plan.add.len(), 1);
        assert_eq!(plan.add[0].name, "phone");
        assert!(!plan.requires_rebuild());
    }

    #[test]
    fn test_primary_keys_are_never_touched() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .change_column(ColumnDescriptor::new("id", SemanticType::Guid))
            .remove_column("id")
            .add_column(ColumnDescriptor::counter("id"));
        assert!(plan_reconcile(&descriptor, &live_users()).is_empty());
    }

    #[test]
    fn test_removal_of_unknown_column_is_dropped() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .remove_column("missing")
            .remove_column("email");
        let plan = plan_reconcile(&descriptor, &live_users());
        assert_eq!(plan.remove, vec!["email".to_string()]);
    }

    #[test]
    fn test_relationship_placeholders_ignored() {
        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .add_column(ColumnDescriptor::new("orders", SemanticType::Integer).one_to_many());
        assert!(plan_reconcile(&descriptor, &live_users()).is_empty());
    }

    #[test]
    fn test_index_columns_resolve_against_live_table() {
        use schema_adapter_core::IndexDescriptor;

        let descriptor = MigrationDescriptor::new("Users", "1.1")
            .add_column(ColumnDescriptor::new("phone", SemanticType::Text))
            .add_column(ColumnDescriptor::new("orders", SemanticType::Integer).one_to_many())
            .with_index(IndexDescriptor::new("IX_NAME", ["name", "phone"]))
            .with_index(IndexDescriptor::new("IX_BAD", ["missing", "orders"]));
        assert_eq!(
            unresolved_index_columns(&descriptor, &live_users()),
            vec![
                ValidationError::UnknownIndexColumn {
                    index: "IX_BAD".into(),
                    column: "missing".into(),
                },
                ValidationError::UnknownIndexColumn {
                    index: "IX_BAD".into(),
                    column: "orders".into(),
                },
            ]
        );
    }

    #[test]
    fn test_live_signature_uppercases_type() {
        assert_eq!(live_signature(&live("email", "text", true, false)), "TEXT NULL");
        assert_eq!(live_signature(&live("name", "TEXT(120,0)", false, false)), "TEXT(120,0) NOT NULL");
    }

    #[test]
    fn test_outcome_updated() {
        assert!(MigrationOutcome::AlreadyApplied.updated());
        assert!(MigrationOutcome::Unchanged.updated());
        assert!(!MigrationOutcome::Created.updated());
        assert!(!MigrationOutcome::Altered.updated());
    }
}
