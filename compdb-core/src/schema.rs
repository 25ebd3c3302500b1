// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Table and column registry for the compound database.
//!
//! The registry is the single source of truth for which columns exist in
//! which table. It starts out with the built-in columns and is widened when
//! the store adds columns on request.

use std::collections::BTreeMap;
use std::fmt;

use derive_more::Display;
use serde::{Deserialize, Serialize};

use crate::error::FilterError;
use crate::value::ColumnType;

/// The tables of a compound database.
///
/// The declaration order is also the resolution order for unqualified
/// column names that are not found on the start table.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Display, Serialize, Deserialize,
)]
#[serde(rename_all = "lowercase")]
pub enum Table {
    #[display("ms_compound")]
    Compound,
    #[display("ms_ion")]
    Ion,
    #[display("ms_spectrum")]
    Spectrum,
    #[display("metadata")]
    Metadata,
}

/// Column shared by all entity tables and used for every join.
pub const COMPOUND_ID: &str = "compound_id";

impl Table {
    /// Tables reachable through queries and filters.
    pub const QUERYABLE: [Table; 3] = [Table::Compound, Table::Ion, Table::Spectrum];

    pub const ALL: [Table; 4] = [Table::Compound, Table::Ion, Table::Spectrum, Table::Metadata];

    /// SQL name of the table.
    pub fn name(self) -> &'static str {
        match self {
            Table::Compound => "ms_compound",
            Table::Ion => "ms_ion",
            Table::Spectrum => "ms_spectrum",
            Table::Metadata => "metadata",
        }
    }

    pub fn from_name(name: &str) -> Option<Table> {
        Table::ALL.into_iter().find(|t| t.name() == name)
    }

    pub fn primary_key(self) -> &'static str {
        match self {
            Table::Compound => COMPOUND_ID,
            Table::Ion => "ion_id",
            Table::Spectrum => "spectrum_id",
            Table::Metadata => "key",
        }
    }

    /// The table this one references through `compound_id`.
    pub fn parent(self) -> Option<Table> {
        match self {
            Table::Ion | Table::Spectrum => Some(Table::Compound),
            Table::Compound | Table::Metadata => None,
        }
    }

    /// Tables referencing this one.
    pub fn dependents(self) -> &'static [Table] {
        match self {
            Table::Compound => &[Table::Ion, Table::Spectrum],
            _ => &[],
        }
    }

    /// Whether the store assigns the primary key on insert.
    pub fn has_generated_identity(self) -> bool {
        matches!(self, Table::Ion | Table::Spectrum)
    }

    pub fn is_queryable(self) -> bool {
        self != Table::Metadata
    }
}

/// A column of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub ty: ColumnType,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }
}

/// A column resolved to exactly one table.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ColumnRef {
    pub table: Table,
    pub column: String,
    pub ty: ColumnType,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.table, self.column)
    }
}

fn builtin_columns(table: Table) -> Vec<ColumnDef> {
    use ColumnType::{Integer, Real, Text};

    let cols: &[(&str, ColumnType)] = match table {
        Table::Compound => &[
            (COMPOUND_ID, Text),
            ("name", Text),
            ("inchi", Text),
            ("inchikey", Text),
            ("formula", Text),
            ("exactmass", Real),
            ("synonyms", Text),
        ],
        Table::Ion => &[
            ("ion_id", Integer),
            (COMPOUND_ID, Text),
            ("ion_adduct", Text),
            ("ion_mz", Real),
            ("ion_rt", Real),
        ],
        Table::Spectrum => &[
            ("spectrum_id", Integer),
            (COMPOUND_ID, Text),
            ("msLevel", Integer),
            ("precursorMz", Real),
            ("polarity", Integer),
            ("collision_energy", Real),
            ("instrument", Text),
            ("peaks", Text),
        ],
        Table::Metadata => &[("key", Text), ("value", Text)],
    };
    cols.iter()
        .map(|(name, ty)| ColumnDef::new(*name, *ty))
        .collect()
}

/// Ordered column lists per table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SchemaRegistry {
    tables: BTreeMap<Table, Vec<ColumnDef>>,
}

impl Default for SchemaRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}

impl SchemaRegistry {
    /// Registry holding only the built-in columns.
    pub fn builtin() -> Self {
        Self {
            tables: Table::ALL
                .into_iter()
                .map(|t| (t, builtin_columns(t)))
                .collect(),
        }
    }

    /// Build a registry from column lists read off a live database.
    pub fn from_columns(tables: impl IntoIterator<Item = (Table, Vec<ColumnDef>)>) -> Self {
        Self {
            tables: tables.into_iter().collect(),
        }
    }

    pub fn columns(&self, table: Table) -> &[ColumnDef] {
        self.tables.get(&table).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn column_names(&self, table: Table) -> Vec<&str> {
        self.columns(table).iter().map(|c| c.name.as_str()).collect()
    }

    /// Look up a column. Names compare ASCII case-insensitively, as in
    /// SQLite; the returned definition carries the stored spelling.
    pub fn column(&self, table: Table, name: &str) -> Option<&ColumnDef> {
        self.columns(table)
            .iter()
            .find(|c| c.name.eq_ignore_ascii_case(name))
    }

    pub fn has_column(&self, table: Table, name: &str) -> bool {
        self.column(table, name).is_some()
    }

    /// Resolve a possibly qualified column name to one table.
    ///
    /// `table.column` binds to that table. A bare name binds to `prefer` when
    /// it has the column, otherwise to the first queryable table that does.
    pub fn resolve(&self, name: &str, prefer: Option<Table>) -> Result<ColumnRef, FilterError> {
        if let Some((table_name, column)) = name.split_once('.') {
            let table = Table::from_name(table_name)
                .filter(|t| t.is_queryable())
                .ok_or_else(|| FilterError::UnknownTable(table_name.to_owned()))?;
            return self
                .column_ref(table, column)
                .ok_or_else(|| FilterError::UnknownField(name.to_owned()));
        }

        prefer
            .filter(|t| t.is_queryable())
            .into_iter()
            .chain(Table::QUERYABLE)
            .find_map(|t| self.column_ref(t, name))
            .ok_or_else(|| FilterError::UnknownField(name.to_owned()))
    }

    fn column_ref(&self, table: Table, name: &str) -> Option<ColumnRef> {
        self.column(table, name).map(|c| ColumnRef {
            table,
            column: c.name.clone(),
            ty: c.ty,
        })
    }

    /// Record a new column. Returns `false` if the column already existed.
    pub fn add_column(&mut self, table: Table, column: ColumnDef) -> bool {
        let columns = self.tables.entry(table).or_default();
        if columns.iter().any(|c| c.name.eq_ignore_ascii_case(&column.name)) {
            return false;
        }
        columns.push(column);
        true
    }

    /// Columns usable as filter fields, in table then column order.
    pub fn filter_fields(&self) -> Vec<ColumnRef> {
        Table::QUERYABLE
            .into_iter()
            .flat_map(|t| {
                self.columns(t).iter().map(move |c| ColumnRef {
                    table: t,
                    column: c.name.clone(),
                    ty: c.ty,
                })
            })
            .collect()
    }
}
