// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Cell values and column types.

use std::str::FromStr;

use derive_more::Display;
use serde::{Deserialize, Serialize};

/// A single cell of a tabular record.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    #[default]
    Null,
    Integer(i64),
    Real(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Integer(_) | Value::Real(_))
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Value::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Numeric view of the value; integers widen to `f64`.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Real(r) => Some(*r),
            _ => None,
        }
    }

    /// The storage type this value would need, `None` for null.
    pub fn column_type(&self) -> Option<ColumnType> {
        match self {
            Value::Null => None,
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Real(_) => Some(ColumnType::Real),
            Value::Text(_) => Some(ColumnType::Text),
        }
    }

    /// Text rendering used when a number lands in a text column.
    ///
    /// Reals without a fractional part render like integers, so `1.0` and `1`
    /// both become `"1"`.
    pub fn to_text(&self) -> Option<String> {
        match self {
            Value::Null => None,
            Value::Integer(i) => Some(i.to_string()),
            Value::Real(r) if r.fract() == 0.0 && r.abs() < i64::MAX as f64 => {
                Some((*r as i64).to_string())
            }
            Value::Real(r) => Some(r.to_string()),
            Value::Text(s) => Some(s.clone()),
        }
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Integer(v.into())
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Real(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Integer(v.into())
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Storage class of a column.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    #[display("INTEGER")]
    Integer,
    #[display("REAL")]
    Real,
    #[display("TEXT")]
    Text,
}

impl ColumnType {
    pub fn is_text(self) -> bool {
        self == ColumnType::Text
    }

    pub fn is_numeric(self) -> bool {
        !self.is_text()
    }

    /// Map a declared SQLite column type onto a storage class using the
    /// SQLite affinity rules.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.to_ascii_uppercase();
        if upper.contains("INT") {
            ColumnType::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            ColumnType::Text
        } else if upper.contains("REAL") || upper.contains("FLOA") || upper.contains("DOUB") {
            ColumnType::Real
        } else {
            ColumnType::Text
        }
    }

    /// Infer the narrowest column type able to hold all given values.
    pub fn infer<'a>(values: impl IntoIterator<Item = &'a Value>) -> Self {
        let mut inferred: Option<ColumnType> = None;
        for value in values {
            inferred = match (inferred, value.column_type()) {
                (acc, None) => acc,
                (None, Some(ty)) => Some(ty),
                (Some(ColumnType::Text), _) | (_, Some(ColumnType::Text)) => {
                    Some(ColumnType::Text)
                }
                (Some(a), Some(b)) if a == b => Some(a),
                // integer mixed with real
                _ => Some(ColumnType::Real),
            };
            if inferred == Some(ColumnType::Text) {
                break;
            }
        }
        inferred.unwrap_or(ColumnType::Text)
    }

    /// Convert `value` to this storage class, or `None` if it cannot hold
    /// it. Null fits every column; numeric text is parsed for numeric
    /// columns and reals only become integers when they are whole.
    pub fn coerce(self, value: Value) -> Option<Value> {
        match (self, value) {
            (_, Value::Null) => Some(Value::Null),
            (ColumnType::Text, v) => v.to_text().map(Value::Text),
            (ColumnType::Integer, v @ Value::Integer(_)) => Some(v),
            (ColumnType::Integer, Value::Real(r)) => {
                (r.fract() == 0.0 && r.abs() < i64::MAX as f64).then_some(Value::Integer(r as i64))
            }
            (ColumnType::Integer, Value::Text(s)) => s.trim().parse().ok().map(Value::Integer),
            (ColumnType::Real, Value::Integer(i)) => Some(Value::Real(i as f64)),
            (ColumnType::Real, v @ Value::Real(_)) => Some(v),
            (ColumnType::Real, Value::Text(s)) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|r| r.is_finite())
                .map(Value::Real),
        }
    }
}

impl FromStr for ColumnType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from_declared(s))
    }
}
