// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Non-fatal diagnostics returned alongside mutation results.

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::schema::Table;

/// Something about the request did not match the live schema, but the
/// operation went ahead.
#[derive(Debug, Clone, PartialEq, Eq, Display, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum Warning {
    /// The caller supplied values for a store-assigned identity column.
    #[display("provided values for '{column}' in {table} were replaced by store-assigned identities")]
    IdentityOverwritten { table: Table, column: String },

    /// Columns absent from the live schema were not written.
    #[display("columns {columns:?} are not present in {table} and were dropped")]
    ColumnsDropped { table: Table, columns: Vec<String> },

    /// Identities passed to a delete did not match any row.
    #[display("{} of the provided identities were not found in {table}", ids.len())]
    MissingIdentities { table: Table, ids: Vec<String> },
}

/// The result of an operation together with its warnings.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Outcome<T> {
    pub value: T,
    pub warnings: Vec<Warning>,
}

impl<T> Outcome<T> {
    pub fn new(value: T, warnings: Vec<Warning>) -> Self {
        Self { value, warnings }
    }

    pub fn into_value(self) -> T {
        self.value
    }

    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        Outcome {
            value: f(self.value),
            warnings: self.warnings,
        }
    }
}
