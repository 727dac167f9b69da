//! Structured query model.
//!
//! A [`Query`] is one of four statement shapes (select, insert, update,
//! delete) built from an [`Expr`] tree. Backends turn it into something they
//! can run: the SQLite backend compiles it into SQL text with positional
//! parameters, the memory backend into a closure over a container.
//!
//! # Example
//!
//! ```
//! use schema_adapter_core::{Expr, Join, Query, SelectQuery};
//!
//! let query = SelectQuery::from("Orders")
//!     .select(["OrderID", "Customer/CustomerName as CustomerName"])
//!     .join(Join::left(
//!         "Customers",
//!         "Customer",
//!         Expr::column("Customer", "CustomerID").eq(Expr::col("Customer")),
//!     ))
//!     .filter(Expr::col("OrderDate").year().eq(1996))
//!     .take(10);
//!
//! assert_eq!(Query::from(query).target(), "Orders");
//! ```

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Row type shared by every backend: an ordered JSON object.
pub type Record = serde_json::Map<String, Value>;

/// Errors raised while building or translating a structured query.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum QueryError {
    /// The query shape has no translation rule.
    #[error("unsupported expression: {0}")]
    UnsupportedExpression(String),

    /// The statement names no target collection, or more than one.
    #[error("invalid collection reference: {0}")]
    InvalidCollectionReference(String),

    /// Index columns are neither a string nor a sequence of strings.
    #[error("invalid index specification: {0}")]
    InvalidIndexSpec(String),

    /// An object lacks the identity attribute needed to address it.
    #[error("missing key attribute: {0}")]
    MissingKey(String),
}

/// A structured statement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Query {
    Select(SelectQuery),
    Insert(InsertQuery),
    Update(UpdateQuery),
    Delete(DeleteQuery),
}

impl Query {
    /// Returns the name of the collection the statement targets.
    pub fn target(&self) -> &str {
        match self {
            Query::Select(q) => &q.from,
            Query::Insert(q) => &q.into,
            Query::Update(q) => &q.table,
            Query::Delete(q) => &q.table,
        }
    }
}

impl From<SelectQuery> for Query {
    fn from(query: SelectQuery) -> Self {
        Query::Select(query)
    }
}

impl From<InsertQuery> for Query {
    fn from(query: InsertQuery) -> Self {
        Query::Insert(query)
    }
}

impl From<UpdateQuery> for Query {
    fn from(query: UpdateQuery) -> Self {
        Query::Update(query)
    }
}

impl From<DeleteQuery> for Query {
    fn from(query: DeleteQuery) -> Self {
        Query::Delete(query)
    }
}

/// Reference to a column, optionally qualified by a collection or join alias.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnRef {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table: Option<String>,
    pub name: String,
}

impl ColumnRef {
    /// Parses `name` or `Related/name`. For deeper paths the segment right
    /// before the attribute is taken as the qualifier.
    pub fn parse(path: &str) -> Self {
        let path = path.trim();
        match path.rsplit_once('/') {
            Some((related, name)) => {
                let table = related.rsplit('/').next().unwrap_or(related);
                Self {
                    table: Some(table.trim().to_string()),
                    name: name.trim().to_string(),
                }
            }
            None => Self {
                table: None,
                name: path.to_string(),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompareOp {
    Eq,
    Ne,
    Gt,
    Ge,
    Lt,
    Le,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArithmeticOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

/// Scalar and aggregate functions understood by every backend.
///
/// String positions are zero-based: `IndexOf` yields `-1` when the needle is
/// absent and `Substring` takes a zero-based start plus an optional length.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Function {
    StartsWith,
    EndsWith,
    Contains,
    NotContains,
    IndexOf,
    Substring,
    Concat,
    Length,
    ToLower,
    ToUpper,
    Trim,
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Date,
    Floor,
    Ceil,
    Round,
    Count,
    Min,
    Max,
    Sum,
    Avg,
}

impl Function {
    /// Returns `true` for functions that fold many rows into one value.
    pub fn is_aggregate(self) -> bool {
        matches!(
            self,
            Function::Count | Function::Min | Function::Max | Function::Sum | Function::Avg
        )
    }
}

/// Expression tree used in projections, filters, ordering and joins.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Expr {
    Column(ColumnRef),
    Literal(Value),
    Compare {
        op: CompareOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Vec<Expr>),
    Or(Vec<Expr>),
    Not(Box<Expr>),
    Arithmetic {
        op: ArithmeticOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    In {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Between {
        expr: Box<Expr>,
        low: Box<Expr>,
        high: Box<Expr>,
    },
    Call {
        func: Function,
        args: Vec<Expr>,
    },
}

macro_rules! literal_from {
    ($($ty:ty),* $(,)?) => {
        $(
            impl From<$ty> for Expr {
                fn from(value: $ty) -> Self {
                    Expr::Literal(Value::from(value))
                }
            }
        )*
    };
}

literal_from!(bool, i32, i64, u32, u64, f64, &str, String, Value);

impl Expr {
    /// Column reference parsed from `name` or `Related/name`.
    pub fn col(path: &str) -> Self {
        Expr::Column(ColumnRef::parse(path))
    }

    /// Column reference explicitly qualified by `table`.
    pub fn column(table: impl Into<String>, name: impl Into<String>) -> Self {
        Expr::Column(ColumnRef {
            table: Some(table.into()),
            name: name.into(),
        })
    }

    pub fn lit(value: impl Into<Value>) -> Self {
        Expr::Literal(value.into())
    }

    fn compare(self, op: CompareOp, right: impl Into<Expr>) -> Self {
        Expr::Compare {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    fn arithmetic(self, op: ArithmeticOp, right: impl Into<Expr>) -> Self {
        Expr::Arithmetic {
            op,
            left: Box::new(self),
            right: Box::new(right.into()),
        }
    }

    fn call(self, func: Function, extra: Vec<Expr>) -> Self {
        let mut args = Vec::with_capacity(extra.len() + 1);
        args.push(self);
        args.extend(extra);
        Expr::Call { func, args }
    }

    pub fn eq(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Eq, right)
    }

    pub fn ne(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ne, right)
    }

    pub fn gt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Gt, right)
    }

    pub fn ge(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Ge, right)
    }

    pub fn lt(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Lt, right)
    }

    pub fn le(self, right: impl Into<Expr>) -> Self {
        self.compare(CompareOp::Le, right)
    }

    /// Conjunction; nested `And` nodes are flattened.
    pub fn and(self, other: Expr) -> Self {
        match self {
            Expr::And(mut operands) => {
                operands.push(other);
                Expr::And(operands)
            }
            first => Expr::And(vec![first, other]),
        }
    }

    /// Disjunction; nested `Or` nodes are flattened.
    pub fn or(self, other: Expr) -> Self {
        match self {
            Expr::Or(mut operands) => {
                operands.push(other);
                Expr::Or(operands)
            }
            first => Expr::Or(vec![first, other]),
        }
    }

    pub fn negate(self) -> Self {
        Expr::Not(Box::new(self))
    }

    pub fn plus(self, right: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOp::Add, right)
    }

    pub fn minus(self, right: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOp::Subtract, right)
    }

    pub fn times(self, right: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOp::Multiply, right)
    }

    pub fn divided_by(self, right: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOp::Divide, right)
    }

    pub fn modulo(self, right: impl Into<Expr>) -> Self {
        self.arithmetic(ArithmeticOp::Modulo, right)
    }

    pub fn between(self, low: impl Into<Expr>, high: impl Into<Expr>) -> Self {
        Expr::Between {
            expr: Box::new(self),
            low: Box::new(low.into()),
            high: Box::new(high.into()),
        }
    }

    pub fn in_list<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::In {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: false,
        }
    }

    pub fn not_in_list<I, T>(self, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Expr>,
    {
        Expr::In {
            expr: Box::new(self),
            list: values.into_iter().map(Into::into).collect(),
            negated: true,
        }
    }

    pub fn is_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: false,
        }
    }

    pub fn is_not_null(self) -> Self {
        Expr::IsNull {
            expr: Box::new(self),
            negated: true,
        }
    }

    pub fn starts_with(self, prefix: impl Into<Expr>) -> Self {
        self.call(Function::StartsWith, vec![prefix.into()])
    }

    pub fn ends_with(self, suffix: impl Into<Expr>) -> Self {
        self.call(Function::EndsWith, vec![suffix.into()])
    }

    pub fn contains(self, needle: impl Into<Expr>) -> Self {
        self.call(Function::Contains, vec![needle.into()])
    }

    pub fn not_contains(self, needle: impl Into<Expr>) -> Self {
        self.call(Function::NotContains, vec![needle.into()])
    }

    pub fn index_of(self, needle: impl Into<Expr>) -> Self {
        self.call(Function::IndexOf, vec![needle.into()])
    }

    pub fn substring(self, start: i64, length: Option<i64>) -> Self {
        let mut extra = vec![Expr::lit(start)];
        if let Some(length) = length {
            extra.push(Expr::lit(length));
        }
        self.call(Function::Substring, extra)
    }

    pub fn concat(self, other: impl Into<Expr>) -> Self {
        self.call(Function::Concat, vec![other.into()])
    }

    pub fn length(self) -> Self {
        self.call(Function::Length, Vec::new())
    }

    pub fn to_lower(self) -> Self {
        self.call(Function::ToLower, Vec::new())
    }

    pub fn to_upper(self) -> Self {
        self.call(Function::ToUpper, Vec::new())
    }

    pub fn trim(self) -> Self {
        self.call(Function::Trim, Vec::new())
    }

    pub fn year(self) -> Self {
        self.call(Function::Year, Vec::new())
    }

    pub fn month(self) -> Self {
        self.call(Function::Month, Vec::new())
    }

    pub fn day(self) -> Self {
        self.call(Function::Day, Vec::new())
    }

    pub fn hour(self) -> Self {
        self.call(Function::Hour, Vec::new())
    }

    pub fn minute(self) -> Self {
        self.call(Function::Minute, Vec::new())
    }

    pub fn second(self) -> Self {
        self.call(Function::Second, Vec::new())
    }

    pub fn date(self) -> Self {
        self.call(Function::Date, Vec::new())
    }

    pub fn floor(self) -> Self {
        self.call(Function::Floor, Vec::new())
    }

    pub fn ceil(self) -> Self {
        self.call(Function::Ceil, Vec::new())
    }

    pub fn round(self, digits: i64) -> Self {
        self.call(Function::Round, vec![Expr::lit(digits)])
    }

    /// `COUNT(*)`.
    pub fn count_all() -> Self {
        Expr::Call {
            func: Function::Count,
            args: Vec::new(),
        }
    }

    pub fn count(self) -> Self {
        self.call(Function::Count, Vec::new())
    }

    pub fn min(self) -> Self {
        self.call(Function::Min, Vec::new())
    }

    pub fn max(self) -> Self {
        self.call(Function::Max, Vec::new())
    }

    pub fn sum(self) -> Self {
        self.call(Function::Sum, Vec::new())
    }

    pub fn avg(self) -> Self {
        self.call(Function::Avg, Vec::new())
    }

    /// Returns `true` if an aggregate call appears anywhere in the tree.
    pub fn contains_aggregate(&self) -> bool {
        match self {
            Expr::Column(_) | Expr::Literal(_) => false,
            Expr::Compare { left, right, .. } | Expr::Arithmetic { left, right, .. } => {
                left.contains_aggregate() || right.contains_aggregate()
            }
            Expr::And(operands) | Expr::Or(operands) => {
                operands.iter().any(Expr::contains_aggregate)
            }
            Expr::Not(inner) | Expr::IsNull { expr: inner, .. } => inner.contains_aggregate(),
            Expr::In { expr, list, .. } => {
                expr.contains_aggregate() || list.iter().any(Expr::contains_aggregate)
            }
            Expr::Between { expr, low, high } => {
                expr.contains_aggregate() || low.contains_aggregate() || high.contains_aggregate()
            }
            Expr::Call { func, args } => {
                func.is_aggregate() || args.iter().any(Expr::contains_aggregate)
            }
        }
    }
}

/// A projected expression with an optional output name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    pub expr: Expr,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

impl Field {
    pub fn new(expr: Expr) -> Self {
        Self { expr, alias: None }
    }

    pub fn aliased(expr: Expr, alias: impl Into<String>) -> Self {
        Self {
            expr,
            alias: Some(alias.into()),
        }
    }

    /// Parses `Attribute`, `Related/Attribute` or either form followed by
    /// `as Alias` (case-insensitive).
    ///
    /// ```
    /// use schema_adapter_core::{ColumnRef, Expr, Field};
    ///
    /// let field = Field::parse("Customer/CustomerName as CustomerName");
    /// assert_eq!(field.alias.as_deref(), Some("CustomerName"));
    /// assert_eq!(
    ///     field.expr,
    ///     Expr::Column(ColumnRef { table: Some("Customer".into()), name: "CustomerName".into() })
    /// );
    /// ```
    pub fn parse(text: &str) -> Self {
        let lowered = text.to_ascii_lowercase();
        match lowered.find(" as ") {
            Some(at) => Self {
                expr: Expr::col(&text[..at]),
                alias: Some(text[at + 4..].trim().to_string()),
            },
            None => Self::new(Expr::col(text)),
        }
    }

    /// Name of the output column this field produces when it can be derived
    /// without the backend's help.
    pub fn output_name(&self) -> Option<&str> {
        match (&self.alias, &self.expr) {
            (Some(alias), _) => Some(alias),
            (None, Expr::Column(column)) => Some(&column.name),
            _ => None,
        }
    }
}

impl From<&str> for Field {
    fn from(text: &str) -> Self {
        Field::parse(text)
    }
}

impl From<Expr> for Field {
    fn from(expr: Expr) -> Self {
        Field::new(expr)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JoinKind {
    Inner,
    Left,
}

/// Expansion of a related collection into the current row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Join {
    pub kind: JoinKind,
    /// Related collection name.
    pub collection: String,
    /// Qualifier used by column references into the related rows.
    pub alias: String,
    pub on: Expr,
}

impl Join {
    pub fn inner(collection: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self {
            kind: JoinKind::Inner,
            collection: collection.into(),
            alias: alias.into(),
            on,
        }
    }

    pub fn left(collection: impl Into<String>, alias: impl Into<String>, on: Expr) -> Self {
        Self {
            kind: JoinKind::Left,
            collection: collection.into(),
            alias: alias.into(),
            on,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderBy {
    pub expr: Expr,
    #[serde(default)]
    pub descending: bool,
}

/// `SELECT` shape. An empty projection selects every attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectQuery {
    pub from: String,
    #[serde(default)]
    pub fields: Vec<Field>,
    #[serde(default)]
    pub distinct: bool,
    #[serde(default)]
    pub joins: Vec<Join>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
    #[serde(default)]
    pub group_by: Vec<Expr>,
    #[serde(default)]
    pub order_by: Vec<OrderBy>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<u64>,
}

impl SelectQuery {
    pub fn from(collection: impl Into<String>) -> Self {
        Self {
            from: collection.into(),
            fields: Vec::new(),
            distinct: false,
            joins: Vec::new(),
            filter: None,
            group_by: Vec::new(),
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    /// Appends projected fields.
    pub fn select<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<Field>,
    {
        self.fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn distinct(mut self) -> Self {
        self.distinct = true;
        self
    }

    pub fn join(mut self, join: Join) -> Self {
        self.joins.push(join);
        self
    }

    /// Adds a predicate; successive calls are combined with `AND`.
    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    pub fn group_by(mut self, expr: Expr) -> Self {
        self.group_by.push(expr);
        self
    }

    pub fn order_by(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderBy {
            expr,
            descending: false,
        });
        self
    }

    pub fn order_by_desc(mut self, expr: Expr) -> Self {
        self.order_by.push(OrderBy {
            expr,
            descending: true,
        });
        self
    }

    pub fn take(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn skip(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }
}

/// `INSERT` of one or more records into a single collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsertQuery {
    pub into: String,
    pub rows: Vec<Record>,
}

impl InsertQuery {
    pub fn one(into: impl Into<String>, record: Record) -> Self {
        Self {
            into: into.into(),
            rows: vec![record],
        }
    }

    pub fn many(into: impl Into<String>, records: Vec<Record>) -> Self {
        Self {
            into: into.into(),
            rows: records,
        }
    }

    /// Reads the `{"Collection": object | [object, ...]}` shape.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::InvalidCollectionReference`] when the object
    /// names zero or several collections, and
    /// [`QueryError::UnsupportedExpression`] when the payload is not an object
    /// or an array of objects.
    ///
    /// ```
    /// use schema_adapter_core::{InsertQuery, QueryError};
    /// use serde_json::json;
    ///
    /// let query = InsertQuery::from_value(&json!({"Users": [{"name": "a"}, {"name": "b"}]})).unwrap();
    /// assert_eq!(query.into, "Users");
    /// assert_eq!(query.rows.len(), 2);
    ///
    /// let err = InsertQuery::from_value(&json!({"A": {}, "B": {}})).unwrap_err();
    /// assert!(matches!(err, QueryError::InvalidCollectionReference(_)));
    /// ```
    pub fn from_value(value: &Value) -> Result<Self, QueryError> {
        let object = value.as_object().ok_or_else(|| {
            QueryError::InvalidCollectionReference("expected an object keyed by collection".into())
        })?;
        let mut entries = object.iter();
        let (collection, payload) = match (entries.next(), entries.next()) {
            (Some(entry), None) => entry,
            (None, _) => {
                return Err(QueryError::InvalidCollectionReference(
                    "no target collection".into(),
                ));
            }
            (Some(_), Some(_)) => {
                return Err(QueryError::InvalidCollectionReference(format!(
                    "ambiguous target collection among {} keys",
                    object.len()
                )));
            }
        };
        let rows = match payload {
            Value::Object(record) => vec![record.clone()],
            Value::Array(items) => items
                .iter()
                .map(|item| {
                    item.as_object().cloned().ok_or_else(|| {
                        QueryError::UnsupportedExpression(
                            "expected an object or an array of objects".into(),
                        )
                    })
                })
                .collect::<Result<Vec<_>, _>>()?,
            _ => {
                return Err(QueryError::UnsupportedExpression(
                    "expected an object or an array of objects".into(),
                ));
            }
        };
        Ok(Self {
            into: collection.clone(),
            rows,
        })
    }
}

/// `UPDATE` of the records matching `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateQuery {
    pub table: String,
    pub values: Record,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

impl UpdateQuery {
    pub fn new(table: impl Into<String>, values: Record) -> Self {
        Self {
            table: table.into(),
            values,
            filter: None,
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Builds an update from an object carrying its identity attribute `key`;
    /// every other attribute becomes part of the change set.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingKey`] if `object` has no `key` attribute.
    pub fn by_key(table: impl Into<String>, key: &str, object: &Record) -> Result<Self, QueryError> {
        let id = object
            .get(key)
            .cloned()
            .ok_or_else(|| QueryError::MissingKey(key.to_string()))?;
        let values: Record = object
            .iter()
            .filter(|(name, _)| name.as_str() != key)
            .map(|(name, value)| (name.clone(), value.clone()))
            .collect();
        Ok(Self::new(table, values).filter(Expr::col(key).eq(id)))
    }
}

/// `DELETE` of the records matching `filter`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeleteQuery {
    pub table: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<Expr>,
}

impl DeleteQuery {
    pub fn new(table: impl Into<String>) -> Self {
        Self {
            table: table.into(),
            filter: None,
        }
    }

    pub fn filter(mut self, predicate: Expr) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(predicate),
            None => predicate,
        });
        self
    }

    /// Builds a delete addressed by identity. `target` is either the key
    /// value itself or an object carrying the `key` attribute.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::MissingKey`] if `target` is an object without
    /// `key`.
    pub fn by_key(table: impl Into<String>, key: &str, target: &Value) -> Result<Self, QueryError> {
        let id = match target {
            Value::Object(object) => object
                .get(key)
                .cloned()
                .ok_or_else(|| QueryError::MissingKey(key.to_string()))?,
            other => other.clone(),
        };
        Ok(Self::new(table).filter(Expr::col(key).eq(id)))
    }
}
