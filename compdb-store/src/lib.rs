// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! SQLite store for compounds, ion adducts and MS/MS spectra.
//!
//! This crate executes the queries built by `compdb-core` and applies
//! validated, transactional inserts and deletes, including schema widening
//! and cascading compound deletes.
//!
//! **Architecture**: This is the Database Layer. Filters, records and the
//! schema registry live in `compdb-core` and are re-exported here.
//!
//! # Key Features
//!
//! - Filtered projections across compound, ion and spectrum tables
//! - Store-assigned ion and spectrum identities that are never reused
//! - Referential checks before any row is written
//! - Opt-in column widening on insert
//! - Read-only, read-write and path-backed handles
//!
//! # Example
//!
//! ```
//! use compdb_store::{CompDb, Compound, InsertOptions, Operator};
//!
//! let mut db = CompDb::open_memory()?;
//! db.insert_compounds(
//!     [
//!         Compound::new("1").with_name("Caffeine").with_exactmass(194.080375584),
//!         Compound::new("2").with_name("Glucose").with_exactmass(180.063388116),
//!     ],
//!     InsertOptions::default(),
//! )?;
//!
//! let heavy = db.filter("exactmass", Operator::Gt, 190.0)?;
//! let batch = db.compounds(&["name"], Some(&heavy))?;
//! assert_eq!(batch.len(), 1);
//! # Ok::<(), compdb_store::Error>(())
//! ```

mod config;
mod connection;
mod error;
mod query;
mod schema;
mod write;

pub use compdb_core::{
    Batch, ColumnDef, ColumnRef, ColumnType, Combinator, Compound, Filter, FilterError,
    FilterExpr, FilterValue, Ion, LogicOp, Metadata, Operator, Outcome, Peak, RecordError,
    SchemaRegistry, Spectrum, Table, Value, Warning,
};
pub use config::{ConfigError, JournalMode, StoreConfig};
pub use connection::{CompDb, OpenMode, State};
pub use error::{Error, Result};
pub use schema::SCHEMA_SQL;
pub use write::InsertOptions;
