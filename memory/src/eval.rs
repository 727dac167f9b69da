//! Expression evaluation over records.
//!
//! Evaluation follows SQLite semantics closely enough that a filter gives the
//! same answer in memory as through the SQL backend:
//!
//! - `NULL` propagates through comparisons, arithmetic and string functions;
//!   `AND` / `OR` use three-valued logic and a filter keeps a row only when
//!   its predicate is true.
//! - Values of different kinds order as `NULL` < numbers < text < anything
//!   else; numbers compare numerically regardless of integer or float form.
//! - Integer division truncates and division by zero yields `NULL`.
//! - String positions are zero-based and count characters, not bytes.
//! - Date parts come from ISO-8601 text parsed with chrono; offsets are
//!   normalized to UTC.

use std::cmp::Ordering;

use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, Timelike};
use schema_adapter_core::{ArithmeticOp, ColumnRef, CompareOp, Expr, Function, Record};
use serde_json::{Number, Value};

use crate::error::{MemoryError, Result};

/// Records visible to an expression: the root collection plus joined aliases.
#[derive(Debug, Clone)]
pub(crate) struct Scope<'a> {
    bindings: Vec<(&'a str, Option<&'a Record>)>,
}

impl<'a> Scope<'a> {
    pub(crate) fn root(name: &'a str, record: &'a Record) -> Self {
        Self {
            bindings: vec![(name, Some(record))],
        }
    }

    pub(crate) fn with(&self, alias: &'a str, record: Option<&'a Record>) -> Self {
        let mut bindings = self.bindings.clone();
        bindings.push((alias, record));
        Self { bindings }
    }

    fn lookup(&self, column: &ColumnRef) -> Result<Value> {
        match &column.table {
            Some(table) => {
                let (_, record) = self
                    .bindings
                    .iter()
                    .find(|(alias, _)| *alias == table.as_str())
                    .ok_or_else(|| {
                        MemoryError::InvalidCollectionReference(format!("unknown alias {table}"))
                    })?;
                Ok(record
                    .and_then(|r| r.get(&column.name))
                    .cloned()
                    .unwrap_or(Value::Null))
            }
            None => Ok(self
                .bindings
                .iter()
                .find_map(|(_, record)| record.and_then(|r| r.get(&column.name)))
                .cloned()
                .unwrap_or(Value::Null)),
        }
    }

    /// Every attribute in scope, root attributes first; used for `SELECT *`.
    pub(crate) fn merged(&self) -> Record {
        let mut merged = Record::new();
        for record in self.bindings.iter().filter_map(|(_, r)| *r) {
            for (key, value) in record {
                if !merged.contains_key(key) {
                    merged.insert(key.clone(), value.clone());
                }
            }
        }
        merged
    }
}

#[derive(Debug, Clone, Copy)]
pub(crate) enum Num {
    Int(i64),
    Float(f64),
}

impl Num {
    pub(crate) fn as_f64(self) -> f64 {
        match self {
            Num::Int(i) => i as f64,
            Num::Float(f) => f,
        }
    }

    pub(crate) fn into_value(self) -> Value {
        match self {
            Num::Int(i) => Value::from(i),
            Num::Float(f) => Number::from_f64(f).map_or(Value::Null, Value::Number),
        }
    }
}

/// Numeric reading of a value; text that is not a number reads as `0`.
pub(crate) fn to_num(value: &Value) -> Option<Num> {
    match value {
        Value::Number(n) => Some(match n.as_i64() {
            Some(i) => Num::Int(i),
            None => Num::Float(n.as_f64().unwrap_or_default()),
        }),
        Value::Bool(b) => Some(Num::Int(i64::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            Some(if let Ok(i) = s.parse::<i64>() {
                Num::Int(i)
            } else {
                Num::Float(s.parse::<f64>().unwrap_or(0.0))
            })
        }
        _ => None,
    }
}

fn to_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Bool(b) => Some(if *b { "1" } else { "0" }.to_string()),
        other => Some(other.to_string()),
    }
}

/// SQL truth value; `None` stands for `NULL`.
pub(crate) fn truth(value: &Value) -> Option<bool> {
    match value {
        Value::Null => None,
        Value::Bool(b) => Some(*b),
        Value::Number(n) => Some(n.as_f64().is_some_and(|f| f != 0.0)),
        Value::String(s) => Some(s.trim().parse::<f64>().is_ok_and(|f| f != 0.0)),
        _ => Some(true),
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) => 2,
        _ => 3,
    }
}

/// Total order used for comparisons, sorting, `MIN` and `MAX`.
pub(crate) fn compare_values(a: &Value, b: &Value) -> Ordering {
    match (rank(a), rank(b)) {
        (1, 1) => match (to_num(a), to_num(b)) {
            (Some(Num::Int(x)), Some(Num::Int(y))) => x.cmp(&y),
            (Some(x), Some(y)) => x.as_f64().total_cmp(&y.as_f64()),
            _ => Ordering::Equal,
        },
        (2, 2) => a.as_str().cmp(&b.as_str()),
        (0, 0) => Ordering::Equal,
        (3, 3) => a.to_string().cmp(&b.to_string()),
        (x, y) => x.cmp(&y),
    }
}

pub(crate) fn arithmetic(op: ArithmeticOp, a: &Value, b: &Value) -> Value {
    let (Some(x), Some(y)) = (to_num(a), to_num(b)) else {
        return Value::Null;
    };
    let result = match (x, y) {
        (Num::Int(x), Num::Int(y)) => match op {
            ArithmeticOp::Add => x.checked_add(y).map(Num::Int),
            ArithmeticOp::Subtract => x.checked_sub(y).map(Num::Int),
            ArithmeticOp::Multiply => x.checked_mul(y).map(Num::Int),
            ArithmeticOp::Divide | ArithmeticOp::Modulo if y == 0 => return Value::Null,
            ArithmeticOp::Divide => x.checked_div(y).map(Num::Int),
            ArithmeticOp::Modulo => x.checked_rem(y).map(Num::Int),
        }
        .unwrap_or_else(|| float_arithmetic(op, x as f64, y as f64)),
        (x, y) => float_arithmetic(op, x.as_f64(), y.as_f64()),
    };
    result.into_value()
}

fn float_arithmetic(op: ArithmeticOp, x: f64, y: f64) -> Num {
    match op {
        ArithmeticOp::Add => Num::Float(x + y),
        ArithmeticOp::Subtract => Num::Float(x - y),
        ArithmeticOp::Multiply => Num::Float(x * y),
        ArithmeticOp::Divide if y == 0.0 => Num::Float(f64::NAN),
        ArithmeticOp::Divide => Num::Float(x / y),
        ArithmeticOp::Modulo => {
            let (x, y) = (x as i64, y as i64);
            if y == 0 {
                Num::Float(f64::NAN)
            } else {
                Num::Int(x.wrapping_rem(y))
            }
        }
    }
}

fn parse_datetime(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(text) {
        return Some(dt.naive_utc());
    }
    for format in [
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(text, format) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

fn char_index(haystack: &str, needle: &str) -> i64 {
    match haystack.find(needle) {
        Some(at) => haystack[..at].chars().count() as i64,
        None => -1,
    }
}

fn round(value: f64, digits: i64) -> f64 {
    let factor = 10f64.powi(digits.clamp(0, 15) as i32);
    (value * factor).round() / factor
}

/// Applies a scalar function to already evaluated arguments.
pub(crate) fn apply(func: Function, args: &[Value]) -> Result<Value> {
    let arg = |i: usize| {
        args.get(i).ok_or_else(|| {
            MemoryError::UnsupportedExpression(format!(
                "{func:?} expects at least {} argument(s)",
                i + 1
            ))
        })
    };

    if func.is_aggregate() {
        return Err(MemoryError::UnsupportedExpression(format!(
            "{func:?} is only allowed in a projection"
        )));
    }

    let text = |i: usize| arg(i).map(to_text);
    Ok(match func {
        Function::StartsWith | Function::EndsWith | Function::Contains | Function::NotContains => {
            let (Some(a), Some(b)) = (text(0)?, text(1)?) else {
                return Ok(Value::Null);
            };
            Value::Bool(match func {
                Function::StartsWith => a.starts_with(&b),
                Function::EndsWith => a.ends_with(&b),
                Function::Contains => a.contains(&b),
                _ => !a.contains(&b),
            })
        }
        Function::IndexOf => match (text(0)?, text(1)?) {
            (Some(a), Some(b)) => Value::from(char_index(&a, &b)),
            _ => Value::Null,
        },
        Function::Substring => {
            let Some(a) = text(0)? else {
                return Ok(Value::Null);
            };
            let start = match to_num(arg(1)?) {
                Some(n) => n.as_f64().max(0.0) as usize,
                None => return Ok(Value::Null),
            };
            let chars = a.chars().skip(start);
            Value::String(match args.get(2).and_then(to_num) {
                Some(length) => chars.take(length.as_f64().max(0.0) as usize).collect(),
                None => chars.collect(),
            })
        }
        Function::Concat => {
            arg(0)?;
            let mut joined = String::new();
            for value in args {
                match to_text(value) {
                    Some(part) => joined.push_str(&part),
                    None => return Ok(Value::Null),
                }
            }
            Value::String(joined)
        }
        Function::Length => text(0)?.map_or(Value::Null, |a| Value::from(a.chars().count())),
        Function::ToLower => text(0)?.map_or(Value::Null, |a| Value::String(a.to_lowercase())),
        Function::ToUpper => text(0)?.map_or(Value::Null, |a| Value::String(a.to_uppercase())),
        Function::Trim => text(0)?.map_or(Value::Null, |a| Value::String(a.trim().to_string())),
        Function::Year
        | Function::Month
        | Function::Day
        | Function::Hour
        | Function::Minute
        | Function::Second
        | Function::Date => {
            let Some(dt) = arg(0)?.as_str().and_then(parse_datetime) else {
                return Ok(Value::Null);
            };
            match func {
                Function::Year => Value::from(dt.year()),
                Function::Month => Value::from(dt.month()),
                Function::Day => Value::from(dt.day()),
                Function::Hour => Value::from(dt.hour()),
                Function::Minute => Value::from(dt.minute()),
                Function::Second => Value::from(dt.second()),
                _ => Value::String(dt.format("%Y-%m-%d").to_string()),
            }
        }
        Function::Floor | Function::Ceil => match to_num(arg(0)?) {
            None => Value::Null,
            Some(Num::Int(i)) => Value::from(i),
            Some(Num::Float(f)) => {
                let f = if func == Function::Floor { f.floor() } else { f.ceil() };
                Value::from(f as i64)
            }
        },
        Function::Round => {
            let digits = args.get(1).and_then(to_num).map_or(0, |d| d.as_f64() as i64);
            match to_num(arg(0)?) {
                None => Value::Null,
                Some(n) => Num::Float(round(n.as_f64(), digits)).into_value(),
            }
        }
        Function::Count | Function::Min | Function::Max | Function::Sum | Function::Avg => {
            Value::Null
        }
    })
}

/// Evaluates `expr` against one row.
pub(crate) fn eval(expr: &Expr, scope: &Scope<'_>) -> Result<Value> {
    Ok(match expr {
        Expr::Column(column) => scope.lookup(column)?,
        Expr::Literal(value) => value.clone(),
        Expr::Compare { op, left, right } => {
            let (left, right) = (eval(left, scope)?, eval(right, scope)?);
            if left.is_null() || right.is_null() {
                return Ok(Value::Null);
            }
            let ordering = compare_values(&left, &right);
            Value::Bool(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
            })
        }
        Expr::And(operands) => {
            let mut unknown = false;
            for operand in operands {
                match truth(&eval(operand, scope)?) {
                    Some(false) => return Ok(Value::Bool(false)),
                    None => unknown = true,
                    Some(true) => {}
                }
            }
            if unknown { Value::Null } else { Value::Bool(true) }
        }
        Expr::Or(operands) => {
            let mut unknown = false;
            for operand in operands {
                match truth(&eval(operand, scope)?) {
                    Some(true) => return Ok(Value::Bool(true)),
                    None => unknown = true,
                    Some(false) => {}
                }
            }
            if unknown { Value::Null } else { Value::Bool(false) }
        }
        Expr::Not(inner) => truth(&eval(inner, scope)?).map_or(Value::Null, |b| Value::Bool(!b)),
        Expr::Arithmetic { op, left, right } => {
            arithmetic(*op, &eval(left, scope)?, &eval(right, scope)?)
        }
        Expr::In { expr, list, negated } => {
            let value = eval(expr, scope)?;
            if value.is_null() {
                return Ok(Value::Null);
            }
            let mut unknown = false;
            let mut found = false;
            for item in list {
                let item = eval(item, scope)?;
                if item.is_null() {
                    unknown = true;
                } else if compare_values(&value, &item) == Ordering::Equal {
                    found = true;
                    break;
                }
            }
            match (found, unknown) {
                (true, _) => Value::Bool(!negated),
                (false, true) => Value::Null,
                (false, false) => Value::Bool(*negated),
            }
        }
        Expr::IsNull { expr, negated } => Value::Bool(eval(expr, scope)?.is_null() != *negated),
        Expr::Between { expr, low, high } => {
            let (value, low, high) = (eval(expr, scope)?, eval(low, scope)?, eval(high, scope)?);
            if value.is_null() || low.is_null() || high.is_null() {
                return Ok(Value::Null);
            }
            Value::Bool(
                compare_values(&value, &low) != Ordering::Less
                    && compare_values(&value, &high) != Ordering::Greater,
            )
        }
        Expr::Call { func, args } => {
            if func.is_aggregate() {
                return Err(MemoryError::UnsupportedExpression(format!(
                    "{func:?} is only allowed in a projection"
                )));
            }
            let args = args
                .iter()
                .map(|a| eval(a, scope))
                .collect::<Result<Vec<_>>>()?;
            apply(*func, &args)?
        }
    })
}

/// Returns `true` only when `expr` evaluates to SQL true.
pub(crate) fn matches(expr: &Expr, scope: &Scope<'_>) -> Result<bool> {
    Ok(truth(&eval(expr, scope)?) == Some(true))
}
