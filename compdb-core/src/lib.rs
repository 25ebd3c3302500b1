// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Core semantics of a compound database.
//!
//! This crate holds everything about compound, ion and spectrum tables that
//! does not need a database connection: the schema registry, cell values and
//! tabular batches, typed records, the filter model and the translation of
//! filters into SQL.
//!
//! **Architecture**: This is the Core Layer. The `compdb-store` crate executes
//! what this crate describes against SQLite.
//!
//! # Example
//!
//! ```
//! use compdb_core::{FilterExpr, SchemaRegistry, Table, translate};
//!
//! let registry = SchemaRegistry::builtin();
//! let filter = FilterExpr::parse(&registry, "exactmass > 190 & ion_adduct == '[M+H]+'")?;
//! let query = translate(&registry, Table::Compound, &["name"], Some(&filter))?
//!     .expect("columns were requested");
//! assert!(query.sql.contains("JOIN ms_ion"));
//! # Ok::<(), compdb_core::FilterError>(())
//! ```

mod batch;
mod error;
pub mod filter;
mod query;
pub mod record;
mod schema;
mod value;
mod warning;

pub use batch::Batch;
pub use error::{FilterError, RecordError};
pub use filter::{Combinator, Filter, FilterExpr, FilterValue, LogicOp, Operator};
pub use query::{Query, translate};
pub use record::{Compound, Ion, Metadata, Peak, Spectrum, TableRecord};
pub use schema::{COMPOUND_ID, ColumnDef, ColumnRef, SchemaRegistry, Table};
pub use value::{ColumnType, Value};
pub use warning::{Outcome, Warning};
