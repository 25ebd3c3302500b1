// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Column-tagged tabular records exchanged with import and export
//! collaborators.

use serde::{Deserialize, Serialize};

use crate::error::RecordError;
use crate::value::Value;

/// Rows of values under an ordered list of column names.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Batch {
    columns: Vec<String>,
    rows: Vec<Vec<Value>>,
}

impl Batch {
    /// An empty batch with the given columns.
    pub fn new<I, S>(columns: I) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut names: Vec<String> = Vec::new();
        for column in columns {
            let column = column.into();
            if names.contains(&column) {
                return Err(RecordError::DuplicateColumn(column));
            }
            names.push(column);
        }
        Ok(Self {
            columns: names,
            rows: Vec::new(),
        })
    }

    /// Build a batch from columns and rows in one go.
    pub fn from_rows<I, S>(columns: I, rows: Vec<Vec<Value>>) -> Result<Self, RecordError>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut batch = Self::new(columns)?;
        for row in rows {
            batch.push(row)?;
        }
        Ok(batch)
    }

    pub fn push(&mut self, row: Vec<Value>) -> Result<(), RecordError> {
        if row.len() != self.columns.len() {
            return Err(RecordError::RowWidth {
                expected: self.columns.len(),
                found: row.len(),
            });
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Value>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.column_index(name).is_some()
    }

    /// Values of one column, top to bottom.
    pub fn column(&self, name: &str) -> Option<impl Iterator<Item = &Value>> {
        let idx = self.column_index(name)?;
        Some(self.rows.iter().map(move |row| &row[idx]))
    }

    pub fn get(&self, row: usize, column: &str) -> Option<&Value> {
        let idx = self.column_index(column)?;
        self.rows.get(row).map(|r| &r[idx])
    }

    /// Iterate rows as `(column, value)` pairs.
    pub fn records(&self) -> impl Iterator<Item = Vec<(&str, &Value)>> {
        self.rows.iter().map(|row| {
            self.columns
                .iter()
                .map(String::as_str)
                .zip(row.iter())
                .collect()
        })
    }

    /// Remove a column, returning whether it was present.
    pub fn drop_column(&mut self, name: &str) -> bool {
        let Some(idx) = self.column_index(name) else {
            return false;
        };
        self.columns.remove(idx);
        for row in &mut self.rows {
            row.remove(idx);
        }
        true
    }

    /// Rename column `from` to `to`. Fails if `to` already names another
    /// column; renaming an absent column does nothing.
    pub fn rename_column(&mut self, from: &str, to: &str) -> Result<(), RecordError> {
        if from == to {
            return Ok(());
        }
        if self.has_column(to) {
            return Err(RecordError::DuplicateColumn(to.to_owned()));
        }
        if let Some(idx) = self.column_index(from) {
            self.columns[idx] = to.to_owned();
        }
        Ok(())
    }

    /// Replace a column's values, appending the column if it is absent.
    pub fn set_column(
        &mut self,
        name: &str,
        values: impl IntoIterator<Item = Value>,
    ) -> Result<(), RecordError> {
        let values: Vec<Value> = values.into_iter().collect();
        if values.len() != self.rows.len() {
            return Err(RecordError::RowWidth {
                expected: self.rows.len(),
                found: values.len(),
            });
        }
        match self.column_index(name) {
            Some(idx) => {
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row[idx] = value;
                }
            }
            None => {
                self.columns.push(name.to_owned());
                for (row, value) in self.rows.iter_mut().zip(values) {
                    row.push(value);
                }
            }
        }
        Ok(())
    }

    /// Rewrite every value of a column in place.
    pub fn map_column<E>(
        &mut self,
        name: &str,
        mut f: impl FnMut(Value) -> Result<Value, E>,
    ) -> Result<(), E> {
        let Some(idx) = self.column_index(name) else {
            return Ok(());
        };
        for row in &mut self.rows {
            let value = std::mem::take(&mut row[idx]);
            row[idx] = f(value)?;
        }
        Ok(())
    }
}
