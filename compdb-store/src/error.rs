// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Error types for compound database operations.

use std::path::PathBuf;

use compdb_core::{FilterError, RecordError, Table};
use thiserror::Error;

use crate::config::ConfigError;

/// Result type for compound database operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur during compound database operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SQLite error
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Failed to open database with context
    #[error("Failed to open database at '{path}': {source}")]
    DatabaseOpen {
        path: PathBuf,
        #[source]
        source: rusqlite::Error,
    },

    /// Database file not found
    #[error("Database not found at: {0}")]
    DatabaseNotFound(PathBuf),

    /// The handle has no live connection, or the database lacks the
    /// compound tables.
    #[error("Store is not initialized")]
    StoreNotInitialized,

    /// A mutation was attempted through a read-only handle.
    #[error("Store was opened read-only")]
    ReadOnlyViolation,

    /// A filter or projection was rejected.
    #[error("Invalid filter: {0}")]
    InvalidFilter(#[from] FilterError),

    /// A batch could not be converted to or from typed records.
    #[error("Invalid record: {0}")]
    Record(#[from] RecordError),

    /// Rows reference compounds that do not exist.
    #[error("{} {table} rows reference missing compounds: {}", missing.len(), missing.join(", "))]
    ReferentialIntegrity { table: Table, missing: Vec<String> },

    /// Compounds cannot be deleted while ions or spectra reference them.
    #[error("{blocked} compound(s) still have ions or spectra; delete them recursively")]
    DependentRowsExist { blocked: usize },

    /// Keys that must be unique already exist.
    #[error("Duplicate keys in {table}: {}", keys.join(", "))]
    DuplicateKey { table: Table, keys: Vec<String> },

    /// A required key column is absent or null.
    #[error("Column '{column}' is required for {table}")]
    MissingKey { table: Table, column: String },

    /// A column to add is not a plain identifier.
    #[error("Invalid column name: '{0}'")]
    InvalidColumnName(String),

    /// The operation does not apply to this table.
    #[error("Operation not supported on table {0}")]
    UnsupportedTable(Table),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
}
