//! Query compiler: structured [`Query`] values to SQLite SQL.
//!
//! Identifiers are always double-quoted and values are always bound as `?`
//! positional parameters, in the order their placeholders appear in the SQL
//! text. View definitions cannot carry parameters, so
//! [`compile_inline`] renders literals directly into the text instead, with
//! strings single-quoted and escaped.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::{Expr, SelectQuery};
//! use schema_adapter_sqlite::compile;
//!
//! let query = SelectQuery::from("Products")
//!     .select(["ProductName", "Price"])
//!     .filter(Expr::col("Price").gt(20))
//!     .order_by_desc(Expr::col("Price"))
//!     .take(5);
//!
//! let statement = compile(&query.into()).unwrap();
//! assert_eq!(
//!     statement.sql,
//!     r#"SELECT "ProductName", "Price" FROM "Products" WHERE "Price" > ? ORDER BY "Price" DESC LIMIT 5"#
//! );
//! assert_eq!(statement.params, vec![serde_json::json!(20)]);
//! ```

use schema_adapter_core::{
    ArithmeticOp, ColumnRef, CompareOp, DeleteQuery, Expr, Function, InsertQuery, JoinKind, Query,
    SelectQuery, UpdateQuery,
};
use serde_json::Value;

use crate::error::{Result, SqliteError};
use crate::schema::{escape_name, quote_text};

/// SQL text plus the values bound to its `?` placeholders.
#[derive(Debug, Clone, PartialEq)]
pub struct CompiledStatement {
    pub sql: String,
    pub params: Vec<Value>,
}

/// Compiles a query into parameterized SQL.
///
/// # Errors
///
/// Returns [`SqliteError::InvalidCollectionReference`] when the statement
/// names no target, and [`SqliteError::UnsupportedExpression`] for shapes
/// with no SQL rule (an update without values, an aggregate inside a filter,
/// a function call missing its arguments).
pub fn compile(query: &Query) -> Result<CompiledStatement> {
    let mut compiler = Compiler::new(false);
    let sql = match query {
        Query::Select(q) => compiler.select(q)?,
        Query::Insert(q) => compiler.insert(q)?,
        Query::Update(q) => compiler.update(q)?,
        Query::Delete(q) => compiler.delete(q)?,
    };
    Ok(CompiledStatement {
        sql,
        params: compiler.params,
    })
}

/// Compiles a select with every literal rendered into the SQL text.
pub(crate) fn compile_inline(query: &SelectQuery) -> Result<String> {
    Compiler::new(true).select(query)
}

struct Compiler {
    params: Vec<Value>,
    inline: bool,
}

fn require_target(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(SqliteError::InvalidCollectionReference(
            "statement names no target collection".into(),
        ));
    }
    Ok(())
}

fn arg(args: &[Expr], index: usize, func: Function) -> Result<&Expr> {
    args.get(index).ok_or_else(|| {
        SqliteError::UnsupportedExpression(format!("{func:?} expects at least {} argument(s)", index + 1))
    })
}

impl Compiler {
    fn new(inline: bool) -> Self {
        Self {
            params: Vec::new(),
            inline,
        }
    }

    fn select(&mut self, q: &SelectQuery) -> Result<String> {
        require_target(&q.from)?;

        let mut sql = String::from("SELECT ");
        if q.distinct {
            sql.push_str("DISTINCT ");
        }
        if q.fields.is_empty() {
            sql.push('*');
        } else {
            let mut fields = Vec::with_capacity(q.fields.len());
            for field in &q.fields {
                let expr = self.expr(&field.expr)?;
                fields.push(match &field.alias {
                    Some(alias) => format!("{expr} AS {}", escape_name(alias)),
                    None => expr,
                });
            }
            sql.push_str(&fields.join(", "));
        }

        sql.push_str(" FROM ");
        sql.push_str(&escape_name(&q.from));

        for join in &q.joins {
            require_target(&join.collection)?;
            let keyword = match join.kind {
                JoinKind::Inner => "INNER JOIN",
                JoinKind::Left => "LEFT JOIN",
            };
            let on = self.expr(&join.on)?;
            sql.push_str(&format!(
                " {keyword} {} AS {} ON {on}",
                escape_name(&join.collection),
                escape_name(&join.alias)
            ));
        }

        if let Some(filter) = &q.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(filter)?);
        }

        if !q.group_by.is_empty() {
            let groups = q
                .group_by
                .iter()
                .map(|e| self.expr(e))
                .collect::<Result<Vec<_>>>()?;
            sql.push_str(" GROUP BY ");
            sql.push_str(&groups.join(", "));
        }

        if !q.order_by.is_empty() {
            let mut orders = Vec::with_capacity(q.order_by.len());
            for order in &q.order_by {
                let expr = self.expr(&order.expr)?;
                orders.push(if order.descending {
                    format!("{expr} DESC")
                } else {
                    format!("{expr} ASC")
                });
            }
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        match (q.limit, q.offset) {
            (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
            (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
            (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
            (None, None) => {}
        }

        Ok(sql)
    }

    fn insert(&mut self, q: &InsertQuery) -> Result<String> {
        require_target(&q.into)?;
        if q.rows.is_empty() {
            return Err(SqliteError::UnsupportedExpression(format!(
                "insert into {} carries no records",
                q.into
            )));
        }

        let mut columns: Vec<&str> = Vec::new();
        for row in &q.rows {
            for key in row.keys() {
                if !columns.contains(&key.as_str()) {
                    columns.push(key);
                }
            }
        }

        let table = escape_name(&q.into);
        if columns.is_empty() {
            if q.rows.len() > 1 {
                return Err(SqliteError::UnsupportedExpression(
                    "cannot insert several empty records in one statement".into(),
                ));
            }
            return Ok(format!("INSERT INTO {table} DEFAULT VALUES"));
        }

        let mut tuples = Vec::with_capacity(q.rows.len());
        for row in &q.rows {
            let mut values = Vec::with_capacity(columns.len());
            for column in &columns {
                values.push(self.literal(row.get(*column).unwrap_or(&Value::Null)));
            }
            tuples.push(format!("({})", values.join(", ")));
        }

        let column_list = columns
            .iter()
            .map(|c| escape_name(c))
            .collect::<Vec<_>>()
            .join(", ");
        Ok(format!(
            "INSERT INTO {table} ({column_list}) VALUES {}",
            tuples.join(", ")
        ))
    }

    fn update(&mut self, q: &UpdateQuery) -> Result<String> {
        require_target(&q.table)?;
        if q.values.is_empty() {
            return Err(SqliteError::UnsupportedExpression(format!(
                "update of {} changes no attributes",
                q.table
            )));
        }

        let assignments = q
            .values
            .iter()
            .map(|(name, value)| format!("{} = {}", escape_name(name), self.literal(value)))
            .collect::<Vec<_>>()
            .join(", ");
        let mut sql = format!("UPDATE {} SET {assignments}", escape_name(&q.table));
        if let Some(filter) = &q.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(filter)?);
        }
        Ok(sql)
    }

    fn delete(&mut self, q: &DeleteQuery) -> Result<String> {
        require_target(&q.table)?;
        let mut sql = format!("DELETE FROM {}", escape_name(&q.table));
        if let Some(filter) = &q.filter {
            sql.push_str(" WHERE ");
            sql.push_str(&self.predicate(filter)?);
        }
        Ok(sql)
    }

    fn predicate(&mut self, expr: &Expr) -> Result<String> {
        if expr.contains_aggregate() {
            return Err(SqliteError::UnsupportedExpression(
                "aggregate functions are not allowed in a filter".into(),
            ));
        }
        self.expr(expr)
    }

    fn literal(&mut self, value: &Value) -> String {
        if !self.inline {
            self.params.push(value.clone());
            return "?".to_string();
        }
        match value {
            Value::Null => "NULL".to_string(),
            Value::Bool(b) => (if *b { "1" } else { "0" }).to_string(),
            Value::Number(n) => n.to_string(),
            Value::String(s) => quote_text(s),
            other => quote_text(&other.to_string()),
        }
    }

    fn column(&self, column: &ColumnRef) -> String {
        match &column.table {
            Some(table) => format!("{}.{}", escape_name(table), escape_name(&column.name)),
            None => escape_name(&column.name),
        }
    }

    fn list(&mut self, exprs: &[Expr]) -> Result<Vec<String>> {
        exprs.iter().map(|e| self.expr(e)).collect()
    }

    fn expr(&mut self, expr: &Expr) -> Result<String> {
        Ok(match expr {
            Expr::Column(column) => self.column(column),
            Expr::Literal(value) => self.literal(value),
            Expr::Compare { op, left, right } => {
                let left = self.expr(left)?;
                if matches!(right.as_ref(), Expr::Literal(Value::Null)) {
                    match op {
                        CompareOp::Eq => return Ok(format!("{left} IS NULL")),
                        CompareOp::Ne => return Ok(format!("{left} IS NOT NULL")),
                        _ => {}
                    }
                }
                let right = self.expr(right)?;
                let op = match op {
                    CompareOp::Eq => "=",
                    CompareOp::Ne => "<>",
                    CompareOp::Gt => ">",
                    CompareOp::Ge => ">=",
                    CompareOp::Lt => "<",
                    CompareOp::Le => "<=",
                };
                format!("{left} {op} {right}")
            }
            Expr::And(operands) => match operands.len() {
                0 => "1".to_string(),
                _ => format!("({})", self.list(operands)?.join(" AND ")),
            },
            Expr::Or(operands) => match operands.len() {
                0 => "0".to_string(),
                _ => format!("({})", self.list(operands)?.join(" OR ")),
            },
            Expr::Not(inner) => format!("NOT ({})", self.expr(inner)?),
            Expr::Arithmetic { op, left, right } => {
                let left = self.expr(left)?;
                let right = self.expr(right)?;
                let op = match op {
                    ArithmeticOp::Add => "+",
                    ArithmeticOp::Subtract => "-",
                    ArithmeticOp::Multiply => "*",
                    ArithmeticOp::Divide => "/",
                    ArithmeticOp::Modulo => "%",
                };
                format!("({left} {op} {right})")
            }
            Expr::In {
                expr,
                list,
                negated,
            } => {
                if list.is_empty() {
                    return Ok(if *negated { "1" } else { "0" }.to_string());
                }
                let subject = self.expr(expr)?;
                let values = self.list(list)?.join(", ");
                let keyword = if *negated { "NOT IN" } else { "IN" };
                format!("{subject} {keyword} ({values})")
            }
            Expr::IsNull { expr, negated } => {
                let subject = self.expr(expr)?;
                if *negated {
                    format!("{subject} IS NOT NULL")
                } else {
                    format!("{subject} IS NULL")
                }
            }
            Expr::Between { expr, low, high } => {
                let subject = self.expr(expr)?;
                let low = self.expr(low)?;
                let high = self.expr(high)?;
                format!("({subject} BETWEEN {low} AND {high})")
            }
            Expr::Call { func, args } => self.call(*func, args)?,
        })
    }

    fn call(&mut self, func: Function, args: &[Expr]) -> Result<String> {
        let unary = |this: &mut Self, name: &str| -> Result<String> {
            Ok(format!("{name}({})", this.expr(arg(args, 0, func)?)?))
        };
        let date_part = |this: &mut Self, pattern: &str| -> Result<String> {
            Ok(format!(
                "CAST(STRFTIME('{pattern}', {}) AS INTEGER)",
                this.expr(arg(args, 0, func)?)?
            ))
        };

        Ok(match func {
            Function::StartsWith => {
                let subject = self.expr(arg(args, 0, func)?)?;
                let prefix = self.expr(arg(args, 1, func)?)?;
                format!("(INSTR({subject}, {prefix}) = 1)")
            }
            Function::EndsWith => {
                // Start is computed from both lengths so an empty suffix
                // lands one past the end and compares equal to ''.
                let subject = arg(args, 0, func)?;
                let suffix = arg(args, 1, func)?;
                let text = self.expr(subject)?;
                let text_length = self.expr(subject)?;
                let length = self.expr(suffix)?;
                let compared = self.expr(suffix)?;
                format!(
                    "(SUBSTR({text}, LENGTH({text_length}) - LENGTH({length}) + 1) = {compared})"
                )
            }
            Function::Contains | Function::NotContains => {
                let subject = self.expr(arg(args, 0, func)?)?;
                let needle = self.expr(arg(args, 1, func)?)?;
                let test = if func == Function::Contains { "> 0" } else { "= 0" };
                format!("(INSTR({subject}, {needle}) {test})")
            }
            Function::IndexOf => {
                let subject = self.expr(arg(args, 0, func)?)?;
                let needle = self.expr(arg(args, 1, func)?)?;
                format!("(INSTR({subject}, {needle}) - 1)")
            }
            Function::Substring => {
                let subject = self.expr(arg(args, 0, func)?)?;
                let start = self.expr(arg(args, 1, func)?)?;
                match args.get(2) {
                    Some(length) => {
                        let length = self.expr(length)?;
                        format!("SUBSTR({subject}, {start} + 1, {length})")
                    }
                    None => format!("SUBSTR({subject}, {start} + 1)"),
                }
            }
            Function::Concat => {
                arg(args, 0, func)?;
                format!("({})", self.list(args)?.join(" || "))
            }
            Function::Length => unary(self, "LENGTH")?,
            Function::ToLower => unary(self, "LOWER")?,
            Function::ToUpper => unary(self, "UPPER")?,
            Function::Trim => unary(self, "TRIM")?,
            Function::Year => date_part(self, "%Y")?,
            Function::Month => date_part(self, "%m")?,
            Function::Day => date_part(self, "%d")?,
            Function::Hour => date_part(self, "%H")?,
            Function::Minute => date_part(self, "%M")?,
            Function::Second => date_part(self, "%S")?,
            Function::Date => unary(self, "DATE")?,
            Function::Floor | Function::Ceil => {
                let value = arg(args, 0, func)?;
                let (test, step) = if func == Function::Floor {
                    ("<", "- 1")
                } else {
                    (">", "+ 1")
                };
                let tested = self.expr(value)?;
                let truncated = self.expr(value)?;
                let adjusted = self.expr(value)?;
                let plain = self.expr(value)?;
                format!(
                    "(CASE WHEN {tested} {test} CAST({truncated} AS INTEGER) \
                     THEN CAST({adjusted} AS INTEGER) {step} ELSE CAST({plain} AS INTEGER) END)"
                )
            }
            Function::Round => {
                let value = self.expr(arg(args, 0, func)?)?;
                match args.get(1) {
                    Some(digits) => format!("ROUND({value}, {})", self.expr(digits)?),
                    None => format!("ROUND({value})"),
                }
            }
            Function::Count if args.is_empty() => "COUNT(*)".to_string(),
            Function::Count => unary(self, "COUNT")?,
            Function::Min => unary(self, "MIN")?,
            Function::Max => unary(self, "MAX")?,
            Function::Sum => unary(self, "SUM")?,
            Function::Avg => unary(self, "AVG")?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use schema_adapter_core::{Field, Join, Record};
    use serde_json::json;

    fn record(value: Value) -> Record {
        value.as_object().cloned().unwrap()
    }

    fn sql(query: impl Into<Query>) -> CompiledStatement {
        compile(&query.into()).unwrap()
    }

    #[test]
    fn test_select_all() {
        let statement = sql(SelectQuery::from("Users"));
        assert_eq!(statement.sql, r#"SELECT * FROM "Users""#);
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_select_with_expansion_join() {
        let query = SelectQuery::from("Orders")
            .select(["OrderID", "Customer/CustomerName as CustomerName"])
            .join(Join::left(
                "Customers",
                "Customer",
                Expr::column("Customer", "CustomerID").eq(Expr::column("Orders", "Customer")),
            ))
            .filter(Expr::col("OrderDate").year().eq(1996));
        let statement = sql(query);
        assert_eq!(
            statement.sql,
            "SELECT \"OrderID\", \"Customer\".\"CustomerName\" AS \"CustomerName\" FROM \"Orders\" \
             LEFT JOIN \"Customers\" AS \"Customer\" ON \"Customer\".\"CustomerID\" = \"Orders\".\"Customer\" \
             WHERE CAST(STRFTIME('%Y', \"OrderDate\") AS INTEGER) = ?"
        );
        assert_eq!(statement.params, vec![json!(1996)]);
    }

    #[test]
    fn test_params_follow_placeholder_order() {
        let query = SelectQuery::from("Products")
            .filter(Expr::col("Price").between(10, 20))
            .filter(Expr::col("Category").in_list([1, 2]))
            .filter(Expr::col("Name").ends_with("x"));
        let statement = sql(query);
        assert_eq!(
            statement.sql,
            "SELECT * FROM \"Products\" WHERE ((\"Price\" BETWEEN ? AND ?) AND \"Category\" IN (?, ?) \
             AND (SUBSTR(\"Name\", LENGTH(\"Name\") - LENGTH(?) + 1) = ?))"
        );
        assert_eq!(
            statement.params,
            vec![json!(10), json!(20), json!(1), json!(2), json!("x"), json!("x")]
        );
    }

    #[test]
    fn test_null_comparison_becomes_is_null() {
        let statement = sql(SelectQuery::from("T").filter(Expr::col("a").eq(Value::Null)));
        assert_eq!(statement.sql, r#"SELECT * FROM "T" WHERE "a" IS NULL"#);
        assert!(statement.params.is_empty());
    }

    #[test]
    fn test_group_order_limit_offset() {
        let query = SelectQuery::from("Orders")
            .select([
                Field::new(Expr::col("Customer")),
                Field::aliased(Expr::count_all(), "total"),
            ])
            .group_by(Expr::col("Customer"))
            .order_by(Expr::col("Customer"))
            .skip(10);
        assert_eq!(
            sql(query).sql,
            "SELECT \"Customer\", COUNT(*) AS \"total\" FROM \"Orders\" GROUP BY \"Customer\" \
             ORDER BY \"Customer\" ASC LIMIT -1 OFFSET 10"
        );
    }

    #[test]
    fn test_aggregate_in_filter_rejected() {
        let query = SelectQuery::from("T").filter(Expr::col("a").max().gt(1));
        assert!(matches!(
            compile(&query.into()),
            Err(SqliteError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_insert_union_of_keys() {
        let query = InsertQuery::many(
            "Users",
            vec![record(json!({"name": "a"})), record(json!({"email": "b@x", "name": "b"}))],
        );
        let statement = sql(query);
        assert_eq!(
            statement.sql,
            r#"INSERT INTO "Users" ("name", "email") VALUES (?, ?), (?, ?)"#
        );
        assert_eq!(
            statement.params,
            vec![json!("a"), Value::Null, json!("b"), json!("b@x")]
        );
    }

    #[test]
    fn test_insert_errors() {
        let empty_target = InsertQuery::one("", record(json!({"a": 1})));
        assert!(matches!(
            compile(&empty_target.into()),
            Err(SqliteError::InvalidCollectionReference(_))
        ));
        let no_rows = InsertQuery::many("T", Vec::new());
        assert!(matches!(
            compile(&no_rows.into()),
            Err(SqliteError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_update_by_key() {
        let object = record(json!({"id": 4, "name": "x"}));
        let statement = sql(UpdateQuery::by_key("Users", "id", &object).unwrap());
        assert_eq!(statement.sql, r#"UPDATE "Users" SET "name" = ? WHERE "id" = ?"#);
        assert_eq!(statement.params, vec![json!("x"), json!(4)]);

        let empty = UpdateQuery::new("Users", Record::new());
        assert!(matches!(
            compile(&empty.into()),
            Err(SqliteError::UnsupportedExpression(_))
        ));
    }

    #[test]
    fn test_delete() {
        let statement = sql(DeleteQuery::by_key("Users", "id", &json!(9)).unwrap());
        assert_eq!(statement.sql, r#"DELETE FROM "Users" WHERE "id" = ?"#);
        assert_eq!(sql(DeleteQuery::new("Users")).sql, r#"DELETE FROM "Users""#);
    }

    #[test]
    fn test_string_and_math_functions() {
        let query = SelectQuery::from("T").select([
            Field::aliased(Expr::col("a").index_of("b"), "i"),
            Field::aliased(Expr::col("a").substring(1, Some(2)), "s"),
            Field::aliased(Expr::col("a").concat("-").concat(Expr::col("b")), "c"),
            Field::aliased(Expr::col("p").round(2), "r"),
        ]);
        let statement = sql(query);
        assert_eq!(
            statement.sql,
            "SELECT (INSTR(\"a\", ?) - 1) AS \"i\", SUBSTR(\"a\", ? + 1, ?) AS \"s\", \
             ((\"a\" || ?) || \"b\") AS \"c\", ROUND(\"p\", ?) AS \"r\" FROM \"T\""
        );
        assert_eq!(statement.params.len(), 5);
    }

    #[test]
    fn test_inline_literals_for_views() {
        let query = SelectQuery::from("Users")
            .filter(Expr::col("name").eq("O'Brien"))
            .filter(Expr::col("active").eq(true));
        assert_eq!(
            compile_inline(&query).unwrap(),
            r#"SELECT * FROM "Users" WHERE ("name" = 'O''Brien' AND "active" = 1)"#
        );
    }

    #[test]
    fn test_missing_function_argument() {
        let call = Expr::Call {
            func: Function::StartsWith,
            args: vec![Expr::col("a")],
        };
        assert!(matches!(
            compile(&SelectQuery::from("T").filter(call).into()),
            Err(SqliteError::UnsupportedExpression(_))
        ));
    }
}
