// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Database connection management.

use std::ops::Deref;
use std::path::{Path, PathBuf};
use std::time::Duration;

use compdb_core::{ColumnDef, ColumnType, Metadata, SchemaRegistry, Table};
use rusqlite::{Connection, OpenFlags};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{JournalMode, StoreConfig};
use crate::error::{Error, Result};
use crate::schema::SCHEMA_SQL;

/// Database open mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum OpenMode {
    /// Read-only access to an existing store
    ReadOnly,
    /// Read-write access to an existing store
    ReadWrite,
    /// Create the store if it doesn't exist, then open read-write
    Create,
}

impl OpenMode {
    fn is_writable(self) -> bool {
        self != OpenMode::ReadOnly
    }
}

/// Lifecycle state of a [`CompDb`] handle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    ReadOnly,
    ReadWrite,
    Closed,
}

/// Connection settings applied to every connection a handle opens.
#[derive(Debug, Clone, Copy)]
struct Settings {
    busy_timeout: Duration,
    journal_mode: JournalMode,
}

impl Default for Settings {
    fn default() -> Self {
        let config = StoreConfig::default();
        Self {
            busy_timeout: config.busy_timeout(),
            journal_mode: config.journal_mode,
        }
    }
}

/// Where a handle gets its connection from.
#[derive(Debug)]
enum Backing {
    /// One connection owned for the life of the handle.
    Connection(Connection),
    /// Only a path; every operation opens and releases its own connection.
    Path(PathBuf),
}

/// A connection for the duration of one operation.
///
/// A leased connection of a path-backed handle is closed when the lease is
/// dropped, on every exit path.
pub(crate) enum Lease<'a> {
    Borrowed(&'a Connection),
    Owned(Connection),
}

impl Deref for Lease<'_> {
    type Target = Connection;

    fn deref(&self) -> &Connection {
        match self {
            Lease::Borrowed(conn) => conn,
            Lease::Owned(conn) => conn,
        }
    }
}

impl Drop for Lease<'_> {
    fn drop(&mut self) {
        if let Lease::Owned(_) = self {
            debug!("Releasing transient connection");
        }
    }
}

/// SQLite database holding compounds, ions and spectra.
#[derive(Debug)]
pub struct CompDb {
    backing: Option<Backing>,
    mode: OpenMode,
    settings: Settings,
    pub(crate) registry: SchemaRegistry,
}

fn connect(path: &Path, mode: OpenMode, settings: Settings) -> Result<Connection> {
    let flags = match mode {
        OpenMode::ReadOnly => {
            if !path.exists() {
                return Err(Error::DatabaseNotFound(path.to_owned()));
            }
            OpenFlags::SQLITE_OPEN_READ_ONLY
        }
        OpenMode::ReadWrite => {
            if !path.exists() {
                return Err(Error::DatabaseNotFound(path.to_owned()));
            }
            OpenFlags::SQLITE_OPEN_READ_WRITE
        }
        OpenMode::Create => OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
    };

    let conn = Connection::open_with_flags(path, flags).map_err(|e| Error::DatabaseOpen {
        path: path.to_owned(),
        source: e,
    })?;
    configure_pragmas(&conn, mode, settings)?;
    Ok(conn)
}

/// Configure SQLite pragmas for a fresh connection.
fn configure_pragmas(conn: &Connection, mode: OpenMode, settings: Settings) -> Result<()> {
    conn.busy_timeout(settings.busy_timeout)?;
    conn.execute_batch("PRAGMA foreign_keys = ON;")?;
    if mode.is_writable() {
        conn.execute_batch(&format!(
            "PRAGMA journal_mode = {};\nPRAGMA synchronous = NORMAL;",
            settings.journal_mode.as_sql()
        ))?;
    }
    Ok(())
}

/// Read the column lists of all tables off a live database.
fn load_registry(conn: &Connection) -> Result<SchemaRegistry> {
    let mut tables = Vec::new();
    for table in Table::ALL {
        let columns = table_columns(conn, table)?;
        if columns.is_empty() {
            debug!("Table {table} is missing; not a compound database");
            return Err(Error::StoreNotInitialized);
        }
        tables.push((table, columns));
    }
    Ok(SchemaRegistry::from_columns(tables))
}

fn table_columns(conn: &Connection, table: Table) -> Result<Vec<ColumnDef>> {
    let mut stmt = conn.prepare(&format!("PRAGMA table_info({})", table.name()))?;
    let columns = stmt
        .query_map([], |row| {
            let name: String = row.get(1)?;
            let declared: String = row.get(2)?;
            Ok(ColumnDef::new(name, ColumnType::from_declared(&declared)))
        })?
        .collect::<rusqlite::Result<Vec<_>>>()?;
    Ok(columns)
}

impl CompDb {
    /// Open or create a store at `path`.
    ///
    /// With [`OpenMode::Create`] the schema is created if it is missing.
    /// Opening a database that lacks the compound tables fails with
    /// [`Error::StoreNotInitialized`].
    pub fn open<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_with_settings(path.as_ref(), mode, Settings::default())
    }

    fn open_with_settings(path: &Path, mode: OpenMode, settings: Settings) -> Result<Self> {
        let conn = connect(path, mode, settings)?;
        if mode == OpenMode::Create {
            create_schema(&conn)?;
        }
        let registry = load_registry(&conn)?;

        debug!("Opened database at {} ({:?})", path.display(), mode);
        Ok(Self {
            backing: Some(Backing::Connection(conn)),
            mode,
            settings,
            registry,
        })
    }

    /// Create a store at `path` and record its provenance.
    pub fn create<P: AsRef<Path>>(path: P, metadata: &Metadata) -> Result<Self> {
        let mut db = Self::open(path, OpenMode::Create)?;
        db.set_metadata(metadata)?;
        Ok(db)
    }

    /// Open a handle that keeps only the path.
    ///
    /// Every operation opens its own connection and closes it before
    /// returning. The schema is read once here.
    pub fn open_path_backed<P: AsRef<Path>>(path: P, mode: OpenMode) -> Result<Self> {
        Self::open_path_backed_with_settings(path.as_ref(), mode, Settings::default())
    }

    fn open_path_backed_with_settings(
        path: &Path,
        mode: OpenMode,
        settings: Settings,
    ) -> Result<Self> {
        let registry = {
            let conn = connect(path, mode, settings)?;
            if mode == OpenMode::Create {
                create_schema(&conn)?;
            }
            load_registry(&conn)?
        };

        debug!(
            "Opened path-backed database at {} ({:?})",
            path.display(),
            mode
        );
        Ok(Self {
            backing: Some(Backing::Path(path.to_owned())),
            mode: if mode == OpenMode::Create {
                OpenMode::ReadWrite
            } else {
                mode
            },
            settings,
            registry,
        })
    }

    /// Open a store as described by `config`.
    pub fn open_with_config(config: &StoreConfig) -> Result<Self> {
        let settings = Settings {
            busy_timeout: config.busy_timeout(),
            journal_mode: config.journal_mode,
        };
        if config.path_backed {
            Self::open_path_backed_with_settings(&config.path, config.mode, settings)
        } else {
            Self::open_with_settings(&config.path, config.mode, settings)
        }
    }

    /// Create an in-memory store (for testing).
    ///
    /// The store is initialized with the full schema and opened read-write.
    pub fn open_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        create_schema(&conn)?;
        let registry = load_registry(&conn)?;
        debug!("Created in-memory database");
        Ok(Self {
            backing: Some(Backing::Connection(conn)),
            mode: OpenMode::ReadWrite,
            settings: Settings::default(),
            registry,
        })
    }

    /// Current lifecycle state.
    pub fn state(&self) -> State {
        match (&self.backing, self.mode.is_writable()) {
            (None, _) => State::Closed,
            (Some(_), true) => State::ReadWrite,
            (Some(_), false) => State::ReadOnly,
        }
    }

    pub fn is_path_backed(&self) -> bool {
        matches!(self.backing, Some(Backing::Path(_)))
    }

    /// Close the handle. Every later operation fails with
    /// [`Error::StoreNotInitialized`].
    pub fn close(&mut self) -> Result<()> {
        match self.backing.take() {
            Some(Backing::Connection(conn)) => {
                conn.close().map_err(|(_, e)| e)?;
                debug!("Closed database");
            }
            Some(Backing::Path(path)) => debug!("Closed path-backed database {}", path.display()),
            None => {}
        }
        Ok(())
    }

    /// Resolve the backing to a live connection for one operation.
    pub(crate) fn lease(&self) -> Result<Lease<'_>> {
        match &self.backing {
            None => Err(Error::StoreNotInitialized),
            Some(Backing::Connection(conn)) => Ok(Lease::Borrowed(conn)),
            Some(Backing::Path(path)) => {
                let conn = connect(path, self.mode, self.settings)?;
                debug!("Opened transient connection to {}", path.display());
                Ok(Lease::Owned(conn))
            }
        }
    }

    /// Fail with [`Error::StoreNotInitialized`] once the handle is closed.
    pub(crate) fn ensure_open(&self) -> Result<()> {
        match self.backing {
            None => Err(Error::StoreNotInitialized),
            Some(_) => Ok(()),
        }
    }

    /// Like [`CompDb::lease`], but only for handles that may write.
    pub(crate) fn lease_writable(&self) -> Result<Lease<'_>> {
        match self.state() {
            State::Closed => Err(Error::StoreNotInitialized),
            State::ReadOnly => Err(Error::ReadOnlyViolation),
            State::ReadWrite => self.lease(),
        }
    }

    /// The schema registry, including columns added through this handle.
    pub fn registry(&self) -> Result<&SchemaRegistry> {
        self.ensure_open()?;
        Ok(&self.registry)
    }

    /// Column definitions of `table` as they exist in the database.
    pub fn live_columns(&self, table: Table) -> Result<Vec<ColumnDef>> {
        let conn = self.lease()?;
        table_columns(&conn, table)
    }

    /// Check if the database has the compound tables.
    pub fn has_schema(&self) -> Result<bool> {
        let conn = self.lease()?;
        let count: i32 = conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name='ms_compound'",
            [],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

/// Create the database schema.
fn create_schema(conn: &Connection) -> Result<()> {
    conn.execute_batch(SCHEMA_SQL)?;
    debug!("Created database schema");
    Ok(())
}
