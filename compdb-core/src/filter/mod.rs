// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Typed filter predicates and their left-to-right combination.
//!
//! A [`Filter`] binds one column to an operator and a value and is validated
//! against the [`SchemaRegistry`] when it is built, so a filter that exists
//! is always translatable. [`Combinator`] joins filters with AND/OR and
//! evaluates strictly left to right: `a | b & c` means `(a | b) & c`.

mod parse;

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::schema::{ColumnRef, SchemaRegistry, Table};
use crate::value::{ColumnType, Value};

/// Comparison operator of a filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum Operator {
    #[display("=")]
    Eq,
    #[display("!=")]
    Ne,
    #[display(">")]
    Gt,
    #[display("<")]
    Lt,
    #[display(">=")]
    Ge,
    #[display("<=")]
    Le,
    #[display("in")]
    In,
    #[display("contains")]
    Contains,
    #[display("startsWith")]
    StartsWith,
    #[display("endsWith")]
    EndsWith,
}

impl Operator {
    /// Operators matching substrings; only valid on text fields.
    pub fn is_string_match(self) -> bool {
        matches!(
            self,
            Operator::Contains | Operator::StartsWith | Operator::EndsWith
        )
    }

    /// Operators taking a set of values rather than a single one.
    pub fn takes_set(self) -> bool {
        self == Operator::In
    }
}

impl FromStr for Operator {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "=" | "==" => Operator::Eq,
            "!=" => Operator::Ne,
            ">" => Operator::Gt,
            "<" => Operator::Lt,
            ">=" => Operator::Ge,
            "<=" => Operator::Le,
            "%in%" => Operator::In,
            word => match word.to_ascii_lowercase().as_str() {
                "in" => Operator::In,
                "contains" => Operator::Contains,
                "startswith" => Operator::StartsWith,
                "endswith" => Operator::EndsWith,
                _ => return Err(FilterError::UnknownOperator(s.to_owned())),
            },
        })
    }
}

/// Boolean connective between two filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogicOp {
    #[display("AND")]
    And,
    #[display("OR")]
    Or,
}

impl FromStr for LogicOp {
    type Err = FilterError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "&" | "&&" => Ok(LogicOp::And),
            "|" | "||" => Ok(LogicOp::Or),
            word if word.eq_ignore_ascii_case("and") => Ok(LogicOp::And),
            word if word.eq_ignore_ascii_case("or") => Ok(LogicOp::Or),
            _ => Err(FilterError::UnknownOperator(s.to_owned())),
        }
    }
}

/// Right-hand side of a filter.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Scalar(Value),
    Set(Vec<Value>),
}

macro_rules! scalar_from {
    ($($ty:ty),*) => {
        $(
            impl From<$ty> for FilterValue {
                fn from(v: $ty) -> Self {
                    FilterValue::Scalar(v.into())
                }
            }
        )*
    };
}

scalar_from!(Value, i64, i32, f64, bool, &str, String);

impl From<Vec<Value>> for FilterValue {
    fn from(values: Vec<Value>) -> Self {
        FilterValue::Set(values)
    }
}

impl FilterValue {
    /// A set of values for the `in` operator.
    pub fn set<T: Into<Value>>(values: impl IntoIterator<Item = T>) -> Self {
        FilterValue::Set(values.into_iter().map(Into::into).collect())
    }
}

/// A single validated predicate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawFilter")]
pub struct Filter {
    column: ColumnRef,
    qualified: bool,
    op: Operator,
    value: FilterValue,
}

/// Serialized form of a [`Filter`], checked again before use.
#[derive(Deserialize)]
struct RawFilter {
    column: ColumnRef,
    qualified: bool,
    op: Operator,
    value: FilterValue,
}

impl TryFrom<RawFilter> for Filter {
    type Error = FilterError;

    fn try_from(raw: RawFilter) -> Result<Self, Self::Error> {
        let value = check_value(&raw.column, raw.op, raw.value)?;
        Ok(Self {
            column: raw.column,
            qualified: raw.qualified,
            op: raw.op,
            value,
        })
    }
}

impl Filter {
    /// Build a filter on `field`, validated against `registry`.
    ///
    /// `field` may be qualified as `table.column`. Unqualified fields bind
    /// to the first table holding the column; the translator rebinds the
    /// shared `compound_id` key to the start table of a query.
    pub fn new(
        registry: &SchemaRegistry,
        field: &str,
        op: Operator,
        value: impl Into<FilterValue>,
    ) -> Result<Self, FilterError> {
        let column = registry.resolve(field, None)?;
        let value = check_value(&column, op, value.into())?;
        Ok(Self {
            qualified: field.contains('.'),
            column,
            op,
            value,
        })
    }

    pub fn column(&self) -> &ColumnRef {
        &self.column
    }

    pub fn op(&self) -> Operator {
        self.op
    }

    pub fn value(&self) -> &FilterValue {
        &self.value
    }

    /// Whether the field was written as `table.column`.
    pub fn is_qualified(&self) -> bool {
        self.qualified
    }
}

fn incompatible(column: &ColumnRef, reason: impl Into<String>) -> FilterError {
    FilterError::IncompatibleValue {
        field: column.column.clone(),
        reason: reason.into(),
    }
}

/// Coerce a single value to the column's type, rejecting mismatches.
fn coerce(column: &ColumnRef, value: Value) -> Result<Value, FilterError> {
    match (column.ty, value) {
        (_, Value::Null) => Ok(Value::Null),
        (ColumnType::Text, v) => Ok(Value::Text(v.to_text().unwrap_or_default())),
        (_, v @ (Value::Integer(_) | Value::Real(_))) => Ok(v),
        (ty, Value::Text(s)) => Err(incompatible(
            column,
            format!("expected a {ty} value, got text '{s}'"),
        )),
    }
}

/// Validate `value` for `op` on `column`, coercing it to the column type.
pub(crate) fn check_value(
    column: &ColumnRef,
    op: Operator,
    value: FilterValue,
) -> Result<FilterValue, FilterError> {
    if op.is_string_match() && !column.ty.is_text() {
        return Err(FilterError::IncompatibleOperator {
            field: column.column.clone(),
            op,
            ty: column.ty,
        });
    }

    match (op, value) {
        (Operator::In, FilterValue::Set(values)) => {
            if values.is_empty() {
                return Err(incompatible(column, "'in' needs at least one value"));
            }
            if values.iter().any(Value::is_null) {
                return Err(incompatible(column, "'in' does not accept null"));
            }
            let values = values
                .into_iter()
                .map(|v| coerce(column, v))
                .collect::<Result<_, _>>()?;
            Ok(FilterValue::Set(values))
        }
        (Operator::In, FilterValue::Scalar(v)) => check_value(column, op, FilterValue::Set(vec![v])),
        (op, FilterValue::Set(_)) => Err(incompatible(
            column,
            format!("operator '{op}' takes a single value"),
        )),
        (op, FilterValue::Scalar(Value::Null)) => match op {
            Operator::Eq | Operator::Ne => Ok(FilterValue::Scalar(Value::Null)),
            _ => Err(incompatible(
                column,
                format!("operator '{op}' does not accept null"),
            )),
        },
        (op, FilterValue::Scalar(v)) if op.is_string_match() => match v {
            Value::Text(_) => Ok(FilterValue::Scalar(v)),
            _ => Err(incompatible(
                column,
                format!("operator '{op}' needs a text value"),
            )),
        },
        (_, FilterValue::Scalar(v)) => Ok(FilterValue::Scalar(coerce(column, v)?)),
    }
}

/// Filters joined by logical operators, evaluated left to right.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "RawCombinator")]
pub struct Combinator {
    filters: Vec<FilterExpr>,
    ops: Vec<LogicOp>,
}

#[derive(Deserialize)]
struct RawCombinator {
    filters: Vec<FilterExpr>,
    ops: Vec<LogicOp>,
}

impl TryFrom<RawCombinator> for Combinator {
    type Error = FilterError;

    fn try_from(raw: RawCombinator) -> Result<Self, Self::Error> {
        Self::new(raw.filters, raw.ops)
    }
}

impl Combinator {
    /// Combine `filters` with `ops`; there must be exactly one operator
    /// between each pair of neighbouring filters.
    pub fn new(filters: Vec<FilterExpr>, ops: Vec<LogicOp>) -> Result<Self, FilterError> {
        if filters.is_empty() {
            return Err(FilterError::Empty);
        }
        if ops.len() + 1 != filters.len() {
            return Err(FilterError::Arity {
                filters: filters.len(),
                operators: ops.len(),
            });
        }
        Ok(Self { filters, ops })
    }

    pub fn filters(&self) -> &[FilterExpr] {
        &self.filters
    }

    pub fn ops(&self) -> &[LogicOp] {
        &self.ops
    }
}

/// A filter tree: a single predicate or a combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterExpr {
    Filter(Filter),
    Combined(Combinator),
}

impl From<Filter> for FilterExpr {
    fn from(f: Filter) -> Self {
        FilterExpr::Filter(f)
    }
}

impl From<Combinator> for FilterExpr {
    fn from(c: Combinator) -> Self {
        FilterExpr::Combined(c)
    }
}

impl FilterExpr {
    /// Parse a textual expression such as
    /// `exactmass > 190 & name startsWith 'Caff'`.
    pub fn parse(registry: &SchemaRegistry, input: &str) -> Result<Self, FilterError> {
        parse::parse(registry, input)
    }

    /// Append `other` with AND. The result still evaluates left to right.
    pub fn and(self, other: impl Into<FilterExpr>) -> Self {
        self.push(LogicOp::And, other.into())
    }

    /// Append `other` with OR. The result still evaluates left to right.
    pub fn or(self, other: impl Into<FilterExpr>) -> Self {
        self.push(LogicOp::Or, other.into())
    }

    fn push(self, op: LogicOp, other: FilterExpr) -> Self {
        match self {
            FilterExpr::Combined(mut c) => {
                c.filters.push(other);
                c.ops.push(op);
                FilterExpr::Combined(c)
            }
            single => FilterExpr::Combined(Combinator {
                filters: vec![single, other],
                ops: vec![op],
            }),
        }
    }

    /// All leaf predicates, left to right.
    pub fn leaves(&self) -> Vec<&Filter> {
        match self {
            FilterExpr::Filter(f) => vec![f],
            FilterExpr::Combined(c) => c.filters.iter().flat_map(FilterExpr::leaves).collect(),
        }
    }

    /// Tables referenced by any leaf.
    pub fn tables(&self) -> Vec<Table> {
        let mut tables: Vec<Table> = self.leaves().iter().map(|f| f.column.table).collect();
        tables.sort_unstable();
        tables.dedup();
        tables
    }
}
