// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Write operations for the compound database.
//!
//! Every call validates its input first, then runs all of its statements in
//! one transaction. A failure at any point leaves the store unchanged.

use std::collections::BTreeSet;

use compdb_core::record::to_batch;
use compdb_core::{
    Batch, COMPOUND_ID, ColumnDef, ColumnType, Compound, Ion, Metadata, Outcome, RecordError,
    SchemaRegistry, Spectrum, Table, TableRecord, Value, Warning,
};
use rusqlite::{Connection, OptionalExtension, params, params_from_iter};
use tracing::{debug, warn};

use crate::connection::CompDb;
use crate::error::{Error, Result};
use crate::query::{from_sql, to_sql};
use crate::schema::{MAX_PARAMS, ident, is_plain_identifier, placeholders};

/// Options for [`CompDb::insert`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct InsertOptions {
    /// Add columns missing from the table instead of dropping them.
    pub add_columns: bool,
}

impl InsertOptions {
    pub fn adding_columns() -> Self {
        Self { add_columns: true }
    }
}

/// What one insert changed, before the registry is updated.
#[derive(Default)]
struct Inserted {
    keys: Vec<Value>,
    added: Vec<ColumnDef>,
    warnings: Vec<Warning>,
}

/// Canonical form of a `compound_id`: trimmed text. Null and blank are
/// missing.
fn normalize_key(value: Value) -> Option<Value> {
    let text = match value {
        Value::Null => return None,
        Value::Text(s) => s.trim().to_owned(),
        other => other.to_text()?,
    };
    (!text.is_empty()).then_some(Value::Text(text))
}

fn key_text(value: &Value) -> String {
    value.to_text().unwrap_or_default()
}

/// Drop repeated keys, keeping the first occurrence.
fn distinct(keys: &[Value]) -> Vec<Value> {
    let mut seen = BTreeSet::new();
    keys.iter()
        .filter(|k| seen.insert(key_text(k)))
        .cloned()
        .collect()
}

/// Which of `keys` exist in `table.column`.
fn existing_keys(
    conn: &Connection,
    table: Table,
    column: &str,
    keys: &[Value],
) -> Result<BTreeSet<String>> {
    let mut found = BTreeSet::new();
    for chunk in keys.chunks(MAX_PARAMS) {
        let sql = format!(
            "SELECT {col} FROM {table} WHERE {col} IN ({})",
            placeholders(chunk.len()),
            col = ident(column),
        );
        let mut stmt = conn.prepare_cached(&sql)?;
        let rows = stmt.query_map(params_from_iter(chunk.iter().map(to_sql)), |row| {
            row.get_ref(0).map(from_sql)
        })?;
        for value in rows {
            found.insert(key_text(&value?));
        }
    }
    Ok(found)
}

fn delete_keys(conn: &Connection, table: Table, column: &str, keys: &[Value]) -> Result<usize> {
    let mut deleted = 0;
    for chunk in keys.chunks(MAX_PARAMS) {
        let sql = format!(
            "DELETE FROM {table} WHERE {} IN ({})",
            ident(column),
            placeholders(chunk.len())
        );
        deleted += conn.execute(&sql, params_from_iter(chunk.iter().map(to_sql)))?;
    }
    Ok(deleted)
}

/// Keys that match no row of `table`.
fn missing_identities(conn: &Connection, table: Table, keys: &[Value]) -> Result<Vec<String>> {
    let found = existing_keys(conn, table, table.primary_key(), keys)?;
    Ok(keys
        .iter()
        .map(key_text)
        .filter(|k| !found.contains(k))
        .collect())
}

fn unresolved(table: Table, ids: Vec<String>) -> Vec<Warning> {
    if ids.is_empty() {
        return Vec::new();
    }
    vec![Warning::MissingIdentities { table, ids }]
}

/// Rename batch columns to the spelling the registry stores. SQLite column
/// names are case-insensitive, so `Name` and `name` are one column.
fn canonicalize_columns(registry: &SchemaRegistry, table: Table, batch: &mut Batch) -> Result<()> {
    let mut seen = BTreeSet::new();
    for name in batch.columns().to_vec() {
        if !seen.insert(name.to_ascii_lowercase()) {
            return Err(RecordError::DuplicateColumn(name).into());
        }
        if let Some(column) = registry.column(table, &name) {
            batch.rename_column(&name, &column.name)?;
        }
    }
    Ok(())
}

/// Convert the values of every known column to its storage class.
/// Store-assigned identities are skipped; they are replaced anyway.
fn coerce_columns(registry: &SchemaRegistry, table: Table, batch: &mut Batch) -> Result<()> {
    for column in registry.columns(table) {
        if table.has_generated_identity() && column.name == table.primary_key() {
            continue;
        }
        let ty = column.ty;
        batch.map_column(&column.name, |value| {
            ty.coerce(value).ok_or_else(|| RecordError::InvalidValue {
                column: column.name.clone(),
                expected: ty,
            })
        })?;
    }
    Ok(())
}

/// Highest identity ever issued for `table`.
///
/// `sqlite_sequence` remembers ids of rows that were deleted since, so they
/// are never handed out again.
fn identity_base(conn: &Connection, table: Table) -> Result<i64> {
    let max: Option<i64> = conn.query_row(
        &format!("SELECT MAX({}) FROM {table}", ident(table.primary_key())),
        [],
        |row| row.get(0),
    )?;
    let seq: Option<i64> = conn
        .query_row(
            "SELECT seq FROM sqlite_sequence WHERE name = ?1",
            params![table.name()],
            |row| row.get(0),
        )
        .optional()?;
    Ok(max.unwrap_or(0).max(seq.unwrap_or(0)))
}

fn emit(warnings: &[Warning]) {
    for warning in warnings {
        warn!("{warning}");
    }
}

impl CompDb {
    /// Insert the rows of `batch` into `table`.
    ///
    /// `compound_id` is required on every row and normalized to trimmed
    /// text. Ions and spectra must reference existing compounds and get
    /// fresh store-assigned identities; compounds must not repeat an
    /// existing id. Column names match existing columns regardless of case,
    /// and values are converted to the column's type or rejected. Columns
    /// unknown to the table are added when `options.add_columns` is set and
    /// dropped with a warning otherwise.
    ///
    /// Returns the `compound_id`s of inserted compounds, or the assigned
    /// identities of inserted ions and spectra.
    pub fn insert(
        &mut self,
        table: Table,
        batch: Batch,
        options: InsertOptions,
    ) -> Result<Outcome<Vec<Value>>> {
        let rows = batch.len();
        let inserted = self.insert_batch(table, batch, options)?;
        for column in inserted.added {
            self.registry.add_column(table, column);
        }
        emit(&inserted.warnings);
        debug!("Inserted {rows} rows into {table}");
        Ok(Outcome::new(inserted.keys, inserted.warnings))
    }

    fn insert_batch(
        &self,
        table: Table,
        mut batch: Batch,
        options: InsertOptions,
    ) -> Result<Inserted> {
        let conn = self.lease_writable()?;
        if !table.is_queryable() {
            return Err(Error::UnsupportedTable(table));
        }
        if batch.is_empty() {
            return Ok(Inserted::default());
        }

        canonicalize_columns(&self.registry, table, &mut batch)?;

        let missing_key = || Error::MissingKey {
            table,
            column: COMPOUND_ID.to_owned(),
        };
        if !batch.has_column(COMPOUND_ID) {
            return Err(missing_key());
        }
        batch.map_column(COMPOUND_ID, |v| normalize_key(v).ok_or_else(missing_key))?;

        let mut warnings = Vec::new();
        let unknown: Vec<String> = batch
            .columns()
            .iter()
            .filter(|c| !self.registry.has_column(table, c))
            .cloned()
            .collect();
        let mut added = Vec::new();
        if !unknown.is_empty() {
            if options.add_columns {
                if let Some(bad) = unknown.iter().find(|c| !is_plain_identifier(c)) {
                    return Err(Error::InvalidColumnName(bad.clone()));
                }
                for name in unknown {
                    let ty = ColumnType::infer(batch.column(&name).into_iter().flatten());
                    added.push(ColumnDef::new(name, ty));
                }
            } else {
                for name in &unknown {
                    batch.drop_column(name);
                }
                warnings.push(Warning::ColumnsDropped {
                    table,
                    columns: unknown,
                });
            }
        }
        coerce_columns(&self.registry, table, &mut batch)?;

        let tx = conn.unchecked_transaction()?;

        let compound_ids: Vec<Value> = batch
            .column(COMPOUND_ID)
            .into_iter()
            .flatten()
            .cloned()
            .collect();
        let wanted = distinct(&compound_ids);
        let found = existing_keys(&tx, Table::Compound, COMPOUND_ID, &wanted)?;
        let mut keys = compound_ids;
        if table == Table::Compound {
            let mut seen = BTreeSet::new();
            let mut duplicates: BTreeSet<String> = keys
                .iter()
                .map(key_text)
                .filter(|k| !seen.insert(k.clone()))
                .collect();
            duplicates.extend(found);
            if !duplicates.is_empty() {
                return Err(Error::DuplicateKey {
                    table,
                    keys: duplicates.into_iter().collect(),
                });
            }
        } else {
            let missing: Vec<String> = wanted
                .iter()
                .map(key_text)
                .filter(|k| !found.contains(k))
                .collect();
            if !missing.is_empty() {
                return Err(Error::ReferentialIntegrity { table, missing });
            }
        }

        if table.has_generated_identity() {
            let column = table.primary_key();
            if batch
                .column(column)
                .is_some_and(|mut values| values.any(|v| !v.is_null()))
            {
                warnings.push(Warning::IdentityOverwritten {
                    table,
                    column: column.to_owned(),
                });
            }
            let base = identity_base(&tx, table)?;
            keys = (1..=batch.len() as i64)
                .map(|i| Value::Integer(base + i))
                .collect();
            batch.set_column(column, keys.iter().cloned())?;
        }

        for column in &added {
            tx.execute_batch(&format!(
                "ALTER TABLE {table} ADD COLUMN {} {}",
                ident(&column.name),
                column.ty
            ))?;
            debug!("Added column {} {} to {table}", column.name, column.ty);
        }

        let columns = batch
            .columns()
            .iter()
            .map(|c| ident(c))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "INSERT INTO {table} ({columns}) VALUES ({})",
            placeholders(batch.columns().len())
        );
        {
            let mut stmt = tx.prepare(&sql)?;
            for row in batch.rows() {
                stmt.execute(params_from_iter(row.iter().map(to_sql)))?;
            }
        }
        tx.commit()?;

        Ok(Inserted {
            keys,
            added,
            warnings,
        })
    }

    fn insert_records<R: TableRecord>(
        &mut self,
        records: impl IntoIterator<Item = R>,
        options: InsertOptions,
    ) -> Result<Outcome<Vec<Value>>> {
        let batch = to_batch(records)?;
        self.insert(R::TABLE, batch, options)
    }

    /// Insert compounds, returning their ids.
    pub fn insert_compounds(
        &mut self,
        compounds: impl IntoIterator<Item = Compound>,
        options: InsertOptions,
    ) -> Result<Outcome<Vec<String>>> {
        let outcome = self.insert_records(compounds, options)?;
        Ok(outcome.map(|keys| keys.iter().map(key_text).collect()))
    }

    /// Insert ions, returning the assigned `ion_id`s.
    pub fn insert_ions(
        &mut self,
        ions: impl IntoIterator<Item = Ion>,
        options: InsertOptions,
    ) -> Result<Outcome<Vec<i64>>> {
        let outcome = self.insert_records(ions, options)?;
        Ok(outcome.map(|keys| keys.iter().filter_map(Value::as_i64).collect()))
    }

    /// Insert spectra, returning the assigned `spectrum_id`s.
    pub fn insert_spectra(
        &mut self,
        spectra: impl IntoIterator<Item = Spectrum>,
        options: InsertOptions,
    ) -> Result<Outcome<Vec<i64>>> {
        let outcome = self.insert_records(spectra, options)?;
        Ok(outcome.map(|keys| keys.iter().filter_map(Value::as_i64).collect()))
    }

    fn delete_rows(&self, table: Table, keys: &[Value]) -> Result<Outcome<usize>> {
        let conn = self.lease_writable()?;
        let keys = distinct(keys);
        if keys.is_empty() {
            return Ok(Outcome::new(0, Vec::new()));
        }

        let tx = conn.unchecked_transaction()?;
        let warnings = unresolved(table, missing_identities(&tx, table, &keys)?);
        let deleted = delete_keys(&tx, table, table.primary_key(), &keys)?;
        tx.commit()?;

        emit(&warnings);
        debug!("Deleted {deleted} rows from {table}");
        Ok(Outcome::new(deleted, warnings))
    }

    /// Delete ions by `ion_id`. Ids that match nothing produce a warning.
    pub fn delete_ions(&mut self, ids: &[i64]) -> Result<Outcome<usize>> {
        let keys: Vec<Value> = ids.iter().map(|&id| Value::Integer(id)).collect();
        self.delete_rows(Table::Ion, &keys)
    }

    /// Delete spectra by `spectrum_id`. Ids that match nothing produce a
    /// warning.
    pub fn delete_spectra(&mut self, ids: &[i64]) -> Result<Outcome<usize>> {
        let keys: Vec<Value> = ids.iter().map(|&id| Value::Integer(id)).collect();
        self.delete_rows(Table::Spectrum, &keys)
    }

    /// Delete compounds by `compound_id`. Ids that match nothing, blank ids
    /// included, produce a warning.
    ///
    /// Without `recursive`, the call fails with
    /// [`Error::DependentRowsExist`] if any of the compounds still has ions
    /// or spectra, and nothing is deleted. With `recursive`, dependent rows
    /// are deleted first, then the compounds. Returns the number of
    /// compounds deleted.
    pub fn delete_compounds<S: AsRef<str>>(
        &mut self,
        ids: &[S],
        recursive: bool,
    ) -> Result<Outcome<usize>> {
        let conn = self.lease_writable()?;
        let mut keys = Vec::new();
        let mut blank = Vec::new();
        for id in ids {
            match normalize_key(Value::from(id.as_ref())) {
                Some(key) => keys.push(key),
                None => blank.push(id.as_ref().to_owned()),
            }
        }
        let keys = distinct(&keys);
        if keys.is_empty() {
            let warnings = unresolved(Table::Compound, blank);
            emit(&warnings);
            return Ok(Outcome::new(0, warnings));
        }

        let tx = conn.unchecked_transaction()?;
        let mut missing = missing_identities(&tx, Table::Compound, &keys)?;
        missing.extend(blank);
        let warnings = unresolved(Table::Compound, missing);

        let mut blocked = BTreeSet::new();
        for dependent in Table::Compound.dependents() {
            blocked.extend(existing_keys(&tx, *dependent, COMPOUND_ID, &keys)?);
        }
        if !blocked.is_empty() {
            if !recursive {
                return Err(Error::DependentRowsExist {
                    blocked: blocked.len(),
                });
            }
            for dependent in Table::Compound.dependents() {
                let deleted = delete_keys(&tx, *dependent, COMPOUND_ID, &keys)?;
                debug!("Deleted {deleted} dependent rows from {dependent}");
            }
        }
        let deleted = delete_keys(&tx, Table::Compound, COMPOUND_ID, &keys)?;
        tx.commit()?;

        emit(&warnings);
        debug!("Deleted {deleted} compounds");
        Ok(Outcome::new(deleted, warnings))
    }

    /// Replace the provenance record.
    pub fn set_metadata(&mut self, metadata: &Metadata) -> Result<()> {
        let conn = self.lease_writable()?;
        let tx = conn.unchecked_transaction()?;
        tx.execute("DELETE FROM metadata", [])?;
        {
            let mut stmt = tx.prepare_cached("INSERT INTO metadata (key, value) VALUES (?1, ?2)")?;
            for (key, value) in metadata.to_pairs() {
                stmt.execute(params![key, value])?;
            }
        }
        tx.commit()?;
        debug!("Updated metadata");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use compdb_core::Operator;
    use rstest::rstest;

    use super::*;

    fn db_with_caffeine() -> CompDb {
        let mut db = CompDb::open_memory().unwrap();
        db.insert_compounds(
            [Compound::new("1").with_name("Caffeine")],
            InsertOptions::default(),
        )
        .unwrap();
        db
    }

    #[rstest]
    #[case(Value::from(" HMDB01 "), Some(Value::from("HMDB01")))]
    #[case(Value::Integer(12), Some(Value::from("12")))]
    #[case(Value::Real(3.0), Some(Value::from("3")))]
    #[case(Value::from("   "), None)]
    #[case(Value::Null, None)]
    fn keys_are_normalized(#[case] input: Value, #[case] expected: Option<Value>) {
        assert_eq!(normalize_key(input), expected);
    }

    #[test]
    fn numeric_compound_ids_become_text() {
        let mut db = CompDb::open_memory().unwrap();
        let batch = Batch::from_rows(
            ["compound_id", "name"],
            vec![vec![Value::Integer(5), Value::from("Adenine")]],
        )
        .unwrap();
        let outcome = db.insert(Table::Compound, batch, InsertOptions::default()).unwrap();
        assert_eq!(outcome.value, vec![Value::from("5")]);

        let f = db.filter("compound_id", Operator::Eq, "5").unwrap();
        assert_eq!(db.compounds(&["name"], Some(&f)).unwrap().len(), 1);
    }

    #[test]
    fn missing_compound_id_is_rejected() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(["ion_mz"], vec![vec![Value::Real(1.0)]]).unwrap();
        let err = db.insert(Table::Ion, batch, InsertOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingKey { table: Table::Ion, .. }));

        let batch = Batch::from_rows(
            ["compound_id", "ion_mz"],
            vec![vec![Value::from("1"), Value::Real(1.0)], vec![Value::Null, Value::Real(2.0)]],
        )
        .unwrap();
        let err = db.insert(Table::Ion, batch, InsertOptions::default()).unwrap_err();
        assert!(matches!(err, Error::MissingKey { .. }));
        assert_eq!(db.count(Table::Ion).unwrap(), 0);
    }

    #[test]
    fn duplicate_compounds_are_rejected() {
        let mut db = db_with_caffeine();
        let err = db
            .insert_compounds(
                [Compound::new("2"), Compound::new("2"), Compound::new("1")],
                InsertOptions::default(),
            )
            .unwrap_err();
        match err {
            Error::DuplicateKey { table, keys } => {
                assert_eq!(table, Table::Compound);
                assert_eq!(keys, vec!["1".to_string(), "2".to_string()]);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(db.count(Table::Compound).unwrap(), 1);
    }

    #[test]
    fn supplied_identities_are_overwritten() {
        let mut db = db_with_caffeine();
        let mut ion = Ion::new("1").with_adduct("[M+H]+", 195.08);
        ion.ion_id = Some(42);
        let outcome = db.insert_ions([ion], InsertOptions::default()).unwrap();
        assert_eq!(outcome.value, vec![1]);
        assert_eq!(
            outcome.warnings,
            vec![Warning::IdentityOverwritten {
                table: Table::Ion,
                column: "ion_id".into()
            }]
        );
    }

    #[test]
    fn identities_are_never_reused() {
        let mut db = db_with_caffeine();
        let ids = db
            .insert_ions(
                [Ion::new("1"), Ion::new("1"), Ion::new("1")],
                InsertOptions::default(),
            )
            .unwrap()
            .into_value();
        assert_eq!(ids, vec![1, 2, 3]);

        db.delete_ions(&[3]).unwrap();
        let ids = db
            .insert_ions([Ion::new("1")], InsertOptions::default())
            .unwrap()
            .into_value();
        assert_eq!(ids, vec![4]);
    }

    #[test]
    fn invalid_column_names_are_rejected() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["compound_id", "bad name"],
            vec![vec![Value::from("2"), Value::from("x")]],
        )
        .unwrap();
        let err = db
            .insert(Table::Compound, batch, InsertOptions::adding_columns())
            .unwrap_err();
        assert!(matches!(err, Error::InvalidColumnName(name) if name == "bad name"));
        assert_eq!(db.count(Table::Compound).unwrap(), 1);
    }

    #[test]
    fn added_column_types_are_inferred() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["compound_id", "kegg", "logp", "rings"],
            vec![
                vec![Value::from("2"), Value::from("C00031"), Value::Real(-2.9), Value::Integer(1)],
                vec![Value::from("3"), Value::Null, Value::Integer(0), Value::Null],
            ],
        )
        .unwrap();
        db.insert(Table::Compound, batch, InsertOptions::adding_columns())
            .unwrap();

        let registry = db.registry().unwrap();
        assert_eq!(registry.column(Table::Compound, "kegg").unwrap().ty, ColumnType::Text);
        assert_eq!(registry.column(Table::Compound, "logp").unwrap().ty, ColumnType::Real);
        assert_eq!(registry.column(Table::Compound, "rings").unwrap().ty, ColumnType::Integer);
        assert_eq!(
            registry.columns(Table::Compound),
            db.live_columns(Table::Compound).unwrap()
        );
    }

    #[test]
    fn values_must_fit_column_types() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["compound_id", "name", "exactmass"],
            vec![vec![Value::from("2"), Value::from("Bogus"), Value::from("heavy")]],
        )
        .unwrap();
        let err = db.insert(Table::Compound, batch, InsertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Record(RecordError::InvalidValue { column, expected: ColumnType::Real })
                if column == "exactmass"
        ));
        assert_eq!(db.count(Table::Compound).unwrap(), 1);

        let batch = Batch::from_rows(
            ["compound_id", "name", "exactmass"],
            vec![vec![Value::from("2"), Value::from("Glucose"), Value::from("180.06")]],
        )
        .unwrap();
        db.insert(Table::Compound, batch, InsertOptions::default())
            .unwrap();

        let heavy = db.filter("exactmass", Operator::Gt, 190.0).unwrap();
        assert!(db.compounds(&["name"], Some(&heavy)).unwrap().is_empty());
        let f = db.filter("compound_id", Operator::Eq, "2").unwrap();
        let stored = db.compound_records(Some(&f)).unwrap();
        assert_eq!(stored[0].exactmass, Some(180.06));
    }

    #[test]
    fn integer_columns_reject_fractions() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["compound_id", "msLevel"],
            vec![vec![Value::from("1"), Value::Real(2.5)]],
        )
        .unwrap();
        let err = db.insert(Table::Spectrum, batch, InsertOptions::default()).unwrap_err();
        assert!(matches!(
            err,
            Error::Record(RecordError::InvalidValue { expected: ColumnType::Integer, .. })
        ));
        assert_eq!(db.count(Table::Spectrum).unwrap(), 0);
    }

    #[test]
    fn column_names_match_regardless_of_case() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["Compound_ID", "Name", "EXACTMASS"],
            vec![vec![Value::from("2"), Value::from("Glucose"), Value::Real(180.06)]],
        )
        .unwrap();
        let outcome = db.insert(Table::Compound, batch, InsertOptions::default()).unwrap();
        assert!(!outcome.has_warnings());

        let f = db.filter("compound_id", Operator::Eq, "2").unwrap();
        let batch = db.compounds(&["name", "exactmass"], Some(&f)).unwrap();
        assert_eq!(batch.rows(), [vec![Value::from("Glucose"), Value::Real(180.06)]]);
        assert_eq!(
            db.registry().unwrap().columns(Table::Compound),
            db.live_columns(Table::Compound).unwrap()
        );
    }

    #[test]
    fn columns_differing_only_in_case_collide() {
        let mut db = db_with_caffeine();
        let batch = Batch::from_rows(
            ["compound_id", "name", "Name"],
            vec![vec![Value::from("2"), Value::from("a"), Value::from("b")]],
        )
        .unwrap();
        let err = db
            .insert(Table::Compound, batch, InsertOptions::adding_columns())
            .unwrap_err();
        assert!(matches!(err, Error::Record(RecordError::DuplicateColumn(c)) if c == "Name"));

        let batch = Batch::from_rows(
            ["compound_id", "kegg", "KEGG"],
            vec![vec![Value::from("2"), Value::from("a"), Value::from("b")]],
        )
        .unwrap();
        let err = db
            .insert(Table::Compound, batch, InsertOptions::adding_columns())
            .unwrap_err();
        assert!(matches!(err, Error::Record(RecordError::DuplicateColumn(c)) if c == "KEGG"));
        assert_eq!(db.count(Table::Compound).unwrap(), 1);
    }

    #[test]
    fn failed_insert_rolls_back_added_columns() {
        let mut db = db_with_caffeine();
        db.lease()
            .unwrap()
            .execute_batch(
                "CREATE TRIGGER refuse_compounds BEFORE INSERT ON ms_compound \
                 BEGIN SELECT RAISE(ABORT, 'refused'); END;",
            )
            .unwrap();

        let batch = Batch::from_rows(
            ["compound_id", "kegg"],
            vec![vec![Value::from("2"), Value::from("C00031")]],
        )
        .unwrap();
        let err = db
            .insert(Table::Compound, batch, InsertOptions::adding_columns())
            .unwrap_err();
        assert!(matches!(err, Error::Sqlite(_)));

        assert_eq!(db.count(Table::Compound).unwrap(), 1);
        assert!(!db.registry().unwrap().has_column(Table::Compound, "kegg"));
        assert_eq!(
            db.registry().unwrap().columns(Table::Compound),
            db.live_columns(Table::Compound).unwrap()
        );
    }

    #[test]
    fn metadata_is_replaced() {
        let mut db = CompDb::open_memory().unwrap();
        let metadata = Metadata {
            source: Some("HMDB".into()),
            source_version: Some("5.0".into()),
            ..Default::default()
        };
        db.set_metadata(&metadata).unwrap();
        assert_eq!(db.metadata().unwrap(), metadata);

        let replacement = Metadata {
            organism: Some("Hsapiens".into()),
            ..Default::default()
        };
        db.set_metadata(&replacement).unwrap();
        assert_eq!(db.metadata().unwrap(), replacement);
    }

    #[test]
    fn metadata_table_cannot_take_batches() {
        let mut db = CompDb::open_memory().unwrap();
        let batch = Batch::from_rows(["key"], vec![vec![Value::from("a")]]).unwrap();
        let err = db.insert(Table::Metadata, batch, InsertOptions::default()).unwrap_err();
        assert!(matches!(err, Error::UnsupportedTable(Table::Metadata)));
    }

    #[test]
    fn deleting_unknown_ids_warns() {
        let mut db = db_with_caffeine();
        let outcome = db.delete_compounds(&["1", "404"], false).unwrap();
        assert_eq!(outcome.value, 1);
        assert_eq!(
            outcome.warnings,
            vec![Warning::MissingIdentities {
                table: Table::Compound,
                ids: vec!["404".into()]
            }]
        );

        let outcome = db.delete_compounds(&["  ", "1"], true).unwrap();
        assert_eq!(outcome.value, 0);
        assert_eq!(
            outcome.warnings,
            vec![Warning::MissingIdentities {
                table: Table::Compound,
                ids: vec!["1".into(), "  ".into()]
            }]
        );

        let outcome = db.delete_compounds(&[""], false).unwrap();
        assert_eq!(outcome.value, 0);
        assert_eq!(
            outcome.warnings,
            vec![Warning::MissingIdentities {
                table: Table::Compound,
                ids: vec!["".into()]
            }]
        );

        let outcome = db.delete_spectra(&[]).unwrap();
        assert_eq!(outcome.value, 0);
        assert!(!outcome.has_warnings());
    }
}
