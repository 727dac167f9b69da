//! Query formatting for the in-memory backend.
//!
//! Where the SQL backend compiles a [`Query`] to text, [`MemoryFormatter`]
//! compiles it to a [`Statement`]: a closure that runs the query against a
//! [`Container`]. Shapes with no in-memory rule are rejected when the query is
//! formatted, before any record is touched.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::{Expr, InsertQuery, SelectQuery};
//! use schema_adapter_memory::{Container, MemoryFormatter};
//! use serde_json::json;
//!
//! let formatter = MemoryFormatter::new();
//! let mut container = Container::new("local-storage");
//!
//! let insert = InsertQuery::from_value(&json!({
//!     "Customers": [{"CustomerName": "Alfreds", "Country": "Germany"},
//!                   {"CustomerName": "Ana", "Country": "Mexico"}]
//! }))
//! .unwrap();
//! formatter.format(&insert.into()).unwrap()(&mut container).unwrap();
//!
//! let select = SelectQuery::from("Customers")
//!     .select(["CustomerName"])
//!     .filter(Expr::col("Country").eq("Mexico"));
//! let rows = formatter.format(&select.into()).unwrap()(&mut container).unwrap();
//! assert_eq!(rows, vec![json!({"CustomerName": "Ana"}).as_object().cloned().unwrap()]);
//! ```

use std::cmp::Ordering;

use schema_adapter_core::{
    DeleteQuery, Expr, Field, Function, InsertQuery, JoinKind, Query, Record, SelectQuery,
    UpdateQuery,
};
use serde_json::Value;
use tracing::debug;

use crate::container::Container;
use crate::error::{MemoryError, Result};
use crate::eval::{Num, Scope, apply, arithmetic, compare_values, eval, matches, to_num};

/// A formatted query, ready to run against a container.
pub type Statement = Box<dyn FnOnce(&mut Container) -> Result<Vec<Record>> + Send>;

/// Compiles queries into [`Statement`] closures.
#[derive(Debug, Clone, Copy, Default)]
pub struct MemoryFormatter;

fn require_target(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(MemoryError::InvalidCollectionReference(
            "statement names no target collection".into(),
        ));
    }
    Ok(())
}

fn reject_aggregate(expr: Option<&Expr>, clause: &str) -> Result<()> {
    if expr.is_some_and(Expr::contains_aggregate) {
        return Err(MemoryError::UnsupportedExpression(format!(
            "aggregate functions are not allowed in {clause}"
        )));
    }
    Ok(())
}

impl MemoryFormatter {
    pub fn new() -> Self {
        Self
    }

    /// Formats `query` into a closure over a container.
    ///
    /// # Errors
    ///
    /// Returns [`MemoryError::InvalidCollectionReference`] when the statement
    /// names no target and [`MemoryError::UnsupportedExpression`] for shapes
    /// with no in-memory rule: `GROUP BY`, aggregates outside the projection,
    /// a projection mixing aggregates with plain fields, an update without
    /// values or an insert without records.
    pub fn format(&self, query: &Query) -> Result<Statement> {
        match query {
            Query::Select(q) => {
                validate_select(q)?;
                let q = q.clone();
                Ok(Box::new(move |container: &mut Container| select(&q, container)))
            }
            Query::Insert(q) => {
                require_target(&q.into)?;
                if q.rows.is_empty() {
                    return Err(MemoryError::UnsupportedExpression(format!(
                        "insert into {} carries no records",
                        q.into
                    )));
                }
                let InsertQuery { into, rows } = q.clone();
                Ok(Box::new(move |container: &mut Container| {
                    debug!(collection = %into, count = rows.len(), "insert");
                    container.collection(&into).extend(rows);
                    Ok(Vec::new())
                }))
            }
            Query::Update(q) => {
                require_target(&q.table)?;
                if q.values.is_empty() {
                    return Err(MemoryError::UnsupportedExpression(format!(
                        "update of {} changes no attributes",
                        q.table
                    )));
                }
                reject_aggregate(q.filter.as_ref(), "a filter")?;
                let q = q.clone();
                Ok(Box::new(move |container: &mut Container| update(q, container)))
            }
            Query::Delete(q) => {
                require_target(&q.table)?;
                reject_aggregate(q.filter.as_ref(), "a filter")?;
                let q = q.clone();
                Ok(Box::new(move |container: &mut Container| delete(q, container)))
            }
        }
    }

    /// Formats the `{"Collection": object | [object, ...]}` insert shape.
    pub fn format_insert_value(&self, value: &Value) -> Result<Statement> {
        let query = InsertQuery::from_value(value)?;
        self.format(&Query::Insert(query))
    }
}

fn validate_select(q: &SelectQuery) -> Result<()> {
    require_target(&q.from)?;
    for join in &q.joins {
        require_target(&join.collection)?;
        reject_aggregate(Some(&join.on), "a join condition")?;
    }
    if !q.group_by.is_empty() {
        return Err(MemoryError::UnsupportedExpression(
            "GROUP BY is not supported by the memory backend".into(),
        ));
    }
    reject_aggregate(q.filter.as_ref(), "a filter")?;
    for order in &q.order_by {
        reject_aggregate(Some(&order.expr), "ORDER BY")?;
    }

    let aggregated = q.fields.iter().filter(|f| f.expr.contains_aggregate()).count();
    if aggregated > 0 && aggregated < q.fields.len() {
        return Err(MemoryError::UnsupportedExpression(
            "aggregate and plain fields cannot be mixed without GROUP BY".into(),
        ));
    }
    Ok(())
}

fn output_name(field: &Field, index: usize) -> String {
    field
        .output_name()
        .map_or_else(|| format!("field{index}"), str::to_string)
}

fn select(q: &SelectQuery, container: &Container) -> Result<Vec<Record>> {
    let base = container.get(&q.from).unwrap_or(&[]);
    let mut scopes: Vec<Scope<'_>> = base.iter().map(|r| Scope::root(&q.from, r)).collect();

    for join in &q.joins {
        let related = container.get(&join.collection).unwrap_or(&[]);
        let mut joined = Vec::with_capacity(scopes.len());
        for scope in &scopes {
            let mut matched = false;
            for candidate in related {
                let extended = scope.with(&join.alias, Some(candidate));
                if matches(&join.on, &extended)? {
                    joined.push(extended);
                    matched = true;
                }
            }
            if !matched && join.kind == JoinKind::Left {
                joined.push(scope.with(&join.alias, None));
            }
        }
        scopes = joined;
    }

    if let Some(filter) = &q.filter {
        let mut kept = Vec::with_capacity(scopes.len());
        for scope in scopes {
            if matches(filter, &scope)? {
                kept.push(scope);
            }
        }
        scopes = kept;
    }

    if !q.order_by.is_empty() {
        let mut keyed = scopes
            .into_iter()
            .map(|scope| {
                let keys = q
                    .order_by
                    .iter()
                    .map(|o| eval(&o.expr, &scope))
                    .collect::<Result<Vec<_>>>()?;
                Ok::<_, MemoryError>((keys, scope))
            })
            .collect::<Result<Vec<_>>>()?;
        keyed.sort_by(|(a, _), (b, _)| {
            for (i, order) in q.order_by.iter().enumerate() {
                let ordering = compare_values(&a[i], &b[i]);
                let ordering = if order.descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });
        scopes = keyed.into_iter().map(|(_, scope)| scope).collect();
    }

    let aggregated = !q.fields.is_empty() && q.fields.iter().all(|f| f.expr.contains_aggregate());
    let mut rows = if aggregated {
        let mut row = Record::new();
        for (i, field) in q.fields.iter().enumerate() {
            row.insert(output_name(field, i), eval_grouped(&field.expr, &scopes)?);
        }
        vec![row]
    } else {
        scopes
            .iter()
            .map(|scope| project(&q.fields, scope))
            .collect::<Result<Vec<_>>>()?
    };

    if q.distinct {
        let mut unique: Vec<Record> = Vec::with_capacity(rows.len());
        for row in rows {
            if !unique.contains(&row) {
                unique.push(row);
            }
        }
        rows = unique;
    }

    let offset = q.offset.unwrap_or(0) as usize;
    let limit = q.limit.map_or(usize::MAX, |l| l as usize);
    let rows: Vec<Record> = rows.into_iter().skip(offset).take(limit).collect();
    debug!(collection = %q.from, rows = rows.len(), "select");
    Ok(rows)
}

fn project(fields: &[Field], scope: &Scope<'_>) -> Result<Record> {
    if fields.is_empty() {
        return Ok(scope.merged());
    }
    let mut row = Record::new();
    for (i, field) in fields.iter().enumerate() {
        row.insert(output_name(field, i), eval(&field.expr, scope)?);
    }
    Ok(row)
}

/// Evaluates a projection that folds every row into one value.
fn eval_grouped(expr: &Expr, scopes: &[Scope<'_>]) -> Result<Value> {
    match expr {
        Expr::Call { func, args } if func.is_aggregate() => aggregate(*func, args.first(), scopes),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::Arithmetic { op, left, right } => Ok(arithmetic(
            *op,
            &eval_grouped(left, scopes)?,
            &eval_grouped(right, scopes)?,
        )),
        Expr::Call { func, args } => {
            let args = args
                .iter()
                .map(|a| eval_grouped(a, scopes))
                .collect::<Result<Vec<_>>>()?;
            apply(*func, &args)
        }
        other => Err(MemoryError::UnsupportedExpression(format!(
            "{other:?} cannot be combined with aggregate functions"
        ))),
    }
}

fn aggregate(func: Function, arg: Option<&Expr>, scopes: &[Scope<'_>]) -> Result<Value> {
    let Some(arg) = arg else {
        return match func {
            Function::Count => Ok(Value::from(scopes.len())),
            _ => Err(MemoryError::UnsupportedExpression(format!(
                "{func:?} expects an argument"
            ))),
        };
    };

    let mut values = Vec::with_capacity(scopes.len());
    for scope in scopes {
        let value = eval(arg, scope)?;
        if !value.is_null() {
            values.push(value);
        }
    }

    let numbers = || values.iter().filter_map(to_num).collect::<Vec<_>>();
    Ok(match func {
        Function::Count => Value::from(values.len()),
        Function::Min => values
            .iter()
            .min_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Function::Max => values
            .iter()
            .max_by(|a, b| compare_values(a, b))
            .cloned()
            .unwrap_or(Value::Null),
        Function::Sum => {
            let numbers = numbers();
            if numbers.is_empty() {
                Value::Null
            } else {
                let integers: Option<i64> = numbers.iter().try_fold(0i64, |acc, n| match n {
                    Num::Int(i) => acc.checked_add(*i),
                    Num::Float(_) => None,
                });
                match integers {
                    Some(total) => Value::from(total),
                    None => Num::Float(numbers.iter().map(|n| n.as_f64()).sum()).into_value(),
                }
            }
        }
        Function::Avg => {
            let numbers = numbers();
            if numbers.is_empty() {
                Value::Null
            } else {
                let total: f64 = numbers.iter().map(|n| n.as_f64()).sum();
                Num::Float(total / numbers.len() as f64).into_value()
            }
        }
        other => {
            return Err(MemoryError::UnsupportedExpression(format!(
                "{other:?} is not an aggregate"
            )));
        }
    })
}

fn update(q: UpdateQuery, container: &mut Container) -> Result<Vec<Record>> {
    let UpdateQuery {
        table,
        values,
        filter,
    } = q;
    let collection = container.collection(&table);
    // Every row is matched before any is written.
    let hits = match &filter {
        Some(filter) => collection
            .iter()
            .map(|row| matches(filter, &Scope::root(&table, row)))
            .collect::<Result<Vec<bool>>>()?,
        None => vec![true; collection.len()],
    };
    let mut affected = 0usize;
    for (row, _) in collection.iter_mut().zip(hits).filter(|(_, hit)| *hit) {
        for (name, value) in &values {
            row.insert(name.clone(), value.clone());
        }
        affected += 1;
    }
    debug!(collection = %table, affected, "update");
    Ok(Vec::new())
}

fn delete(q: DeleteQuery, container: &mut Container) -> Result<Vec<Record>> {
    let DeleteQuery { table, filter } = q;
    let collection = container.collection(&table);
    let doomed = match &filter {
        Some(filter) => collection
            .iter()
            .map(|row| matches(filter, &Scope::root(&table, row)))
            .collect::<Result<Vec<bool>>>()?,
        None => vec![true; collection.len()],
    };
    let before = collection.len();
    let mut flags = doomed.into_iter();
    collection.retain(|_| !flags.next().unwrap_or(false));
    debug!(collection = %table, affected = before - collection.len(), "delete");
    Ok(Vec::new())
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_adapter_core::Join;
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn northwind() -> Container {
        let mut container = Container::new("local-storage");
        container.collection("Customers").extend([
            record(json!({"CustomerID": 1, "CustomerName": "Alfreds", "Country": "Germany"})),
            record(json!({"CustomerID": 2, "CustomerName": "Ana", "Country": "Mexico"})),
            record(json!({"CustomerID": 3, "CustomerName": "Antonio", "Country": "Mexico"})),
        ]);
        container.collection("Orders").extend([
            record(json!({"OrderID": 10248, "Customer": 1, "Freight": 32.38})),
            record(json!({"OrderID": 10249, "Customer": 1, "Freight": 11.61})),
            record(json!({"OrderID": 10250, "Customer": 3, "Freight": 65.83})),
        ]);
        container
    }

    fn run(container: &mut Container, query: impl Into<Query>) -> Result<Vec<Record>> {
        MemoryFormatter::new().format(&query.into())?(container)
    }

    #[test]
    fn test_select_filter_order_limit() {
        let mut container = northwind();
        let rows = run(
            &mut container,
            SelectQuery::from("Customers")
                .select(["CustomerName"])
                .filter(Expr::col("Country").eq("Mexico"))
                .order_by_desc(Expr::col("CustomerID"))
                .take(1),
        )
        .unwrap();
        assert_eq!(rows, vec![record(json!({"CustomerName": "Antonio"}))]);

        let rows = run(
            &mut container,
            SelectQuery::from("Customers").order_by(Expr::col("CustomerID")).skip(2),
        )
        .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["CustomerName"], "Antonio");
    }

    #[test]
    fn test_inner_and_left_join() {
        let mut container = northwind();
        let on = Expr::column("Customer", "CustomerID").eq(Expr::col("Customer"));

        let inner = SelectQuery::from("Orders")
            .select(["OrderID", "Customer/CustomerName as CustomerName"])
            .join(Join::inner("Customers", "Customer", on.clone()))
            .order_by(Expr::col("OrderID"));
        let rows = run(&mut container, inner).unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2], record(json!({"OrderID": 10250, "CustomerName": "Antonio"})));

        container
            .collection("Orders")
            .push(record(json!({"OrderID": 10251, "Customer": 99})));
        let left = SelectQuery::from("Orders")
            .select(["OrderID", "Customer/CustomerName as CustomerName"])
            .join(Join::left("Customers", "Customer", on))
            .filter(Expr::col("OrderID").eq(10251));
        let rows = run(&mut container, left).unwrap();
        assert_eq!(rows, vec![record(json!({"OrderID": 10251, "CustomerName": null}))]);
    }

    #[test]
    fn test_aggregates_fold_into_one_row() {
        let mut container = northwind();
        let rows = run(
            &mut container,
            SelectQuery::from("Orders").select([
                Field::aliased(Expr::count_all(), "total"),
                Field::aliased(Expr::col("OrderID").max(), "last"),
                Field::aliased(Expr::col("Customer").sum(), "customers"),
                Field::new(Expr::col("OrderID").max().plus(1)),
            ]),
        )
        .unwrap();
        assert_eq!(
            rows,
            vec![record(json!({"total": 3, "last": 10250, "customers": 5, "field3": 10251}))]
        );

        let rows = run(
            &mut container,
            SelectQuery::from("Missing").select([Field::aliased(Expr::col("x").max(), "value")]),
        )
        .unwrap();
        assert_eq!(rows, vec![record(json!({"value": null}))]);
    }

    #[test]
    fn test_average() {
        let mut container = northwind();
        let rows = run(
            &mut container,
            SelectQuery::from("Customers")
                .select([Field::aliased(Expr::col("CustomerID").avg(), "avg")]),
        )
        .unwrap();
        assert_eq!(rows[0]["avg"], json!(2.0));
    }

    #[test]
    fn test_unsupported_shapes() {
        let formatter = MemoryFormatter::new();
        let grouped = SelectQuery::from("Orders")
            .select([Field::new(Expr::col("Customer")), Field::new(Expr::count_all())])
            .group_by(Expr::col("Customer"));
        assert!(matches!(
            formatter.format(&grouped.into()),
            Err(MemoryError::UnsupportedExpression(_))
        ));

        let mixed = SelectQuery::from("Orders")
            .select([Field::new(Expr::col("Customer")), Field::new(Expr::count_all())]);
        assert!(matches!(
            formatter.format(&mixed.into()),
            Err(MemoryError::UnsupportedExpression(_))
        ));

        let filtered = SelectQuery::from("Orders").filter(Expr::col("Freight").max().gt(1));
        assert!(matches!(
            formatter.format(&filtered.into()),
            Err(MemoryError::UnsupportedExpression(_))
        ));

        assert!(matches!(
            formatter.format(&SelectQuery::from(" ").into()),
            Err(MemoryError::InvalidCollectionReference(_))
        ));
        assert!(matches!(
            formatter.format(&UpdateQuery::new("Orders", Record::new()).into()),
            Err(MemoryError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_distinct() {
        let mut container = northwind();
        let rows = run(
            &mut container,
            SelectQuery::from("Customers").select(["Country"]).distinct(),
        )
        .unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_insert_value_shape() {
        let formatter = MemoryFormatter::new();
        let mut container = Container::new("db");
        formatter
            .format_insert_value(&json!({"Users": [{"name": "a"}, {"name": "b"}]}))
            .unwrap()(&mut container)
        .unwrap();
        assert_eq!(container.get("Users").unwrap().len(), 2);

        assert!(matches!(
            formatter.format_insert_value(&json!({"A": {}, "B": {}})),
            Err(MemoryError::QueryError(_))
        ));
    }

    #[test]
    fn test_update_and_delete() {
        let mut container = northwind();
        let update = UpdateQuery::by_key(
            "Customers",
            "CustomerID",
            &record(json!({"CustomerID": 2, "Country": "México"})),
        )
        .unwrap();
        run(&mut container, update).unwrap();
        assert_eq!(container.get("Customers").unwrap()[1]["Country"], "México");
        assert_eq!(container.get("Customers").unwrap()[2]["Country"], "Mexico");

        run(
            &mut container,
            DeleteQuery::new("Orders").filter(Expr::col("Customer").eq(1)),
        )
        .unwrap();
        let orders = container.get("Orders").unwrap();
        assert_eq!(orders.len(), 1);
        assert_eq!(orders[0]["OrderID"], 10250);

        run(&mut container, DeleteQuery::new("Orders")).unwrap();
        assert!(container.get("Orders").unwrap().is_empty());
    }

    #[test]
    fn test_failing_update_filter_writes_nothing() {
        let mut container = Container::new("db");
        container.collection("Items").extend([
            record(json!({"a": 1, "b": "x"})),
            record(json!({"a": 2, "b": "y"})),
        ]);
        let before = container.get("Items").unwrap().to_vec();

        let filter = Expr::col("a").eq(1).or(Expr::Call {
            func: Function::Substring,
            args: vec![Expr::col("b")],
        });
        let update = UpdateQuery::new("Items", record(json!({"b": "CHANGED"}))).filter(filter);
        assert!(matches!(
            run(&mut container, update),
            Err(MemoryError::UnsupportedExpression(_))
        ));
        assert_eq!(container.get("Items").unwrap(), before.as_slice());
    }
}
