// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Error types for filters and tabular records.

use thiserror::Error;

use crate::filter::Operator;
use crate::value::ColumnType;

/// A filter expression was rejected at construction time.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FilterError {
    #[error("unknown filter field '{0}'")]
    UnknownField(String),

    #[error("unknown table '{0}'")]
    UnknownTable(String),

    #[error("unknown operator '{0}'")]
    UnknownOperator(String),

    #[error("operator '{op}' is not supported for {ty} field '{field}'")]
    IncompatibleOperator {
        field: String,
        op: Operator,
        ty: ColumnType,
    },

    #[error("invalid value for field '{field}': {reason}")]
    IncompatibleValue { field: String, reason: String },

    #[error("{filters} filters need {} logical operators, got {operators}", .filters.saturating_sub(1))]
    Arity { filters: usize, operators: usize },

    #[error("a filter combinator needs at least one filter")]
    Empty,

    #[error("malformed filter expression at byte {position}: {message}")]
    Parse { position: usize, message: String },
}

/// A tabular record could not be built or decoded.
#[derive(Error, Debug)]
pub enum RecordError {
    #[error("row has {found} values but the batch has {expected} columns")]
    RowWidth { expected: usize, found: usize },

    #[error("column '{0}' appears more than once")]
    DuplicateColumn(String),

    #[error("required column '{0}' is missing or null")]
    MissingColumn(String),

    #[error("column '{column}' expects a {expected} value")]
    InvalidValue {
        column: String,
        expected: ColumnType,
    },

    #[error("column '{column}' holds malformed JSON: {source}")]
    Decode {
        column: String,
        #[source]
        source: serde_json::Error,
    },
}
