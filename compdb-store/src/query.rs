// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Read query operations for the compound database.

use compdb_core::record::from_batch;
use compdb_core::{
    Batch, ColumnRef, Compound, Filter, FilterExpr, FilterValue, Ion, Metadata, Operator,
    Spectrum, Table, TableRecord, Value, translate,
};
use rusqlite::params_from_iter;
use rusqlite::types::{self, ValueRef};
use tracing::debug;

use crate::connection::CompDb;
use crate::error::Result;

/// Bind a cell value as an SQL parameter.
pub(crate) fn to_sql(value: &Value) -> types::Value {
    match value {
        Value::Null => types::Value::Null,
        Value::Integer(i) => types::Value::Integer(*i),
        Value::Real(f) => types::Value::Real(*f),
        Value::Text(s) => types::Value::Text(s.clone()),
    }
}

/// Read an SQL cell back into a value. Blobs are decoded as UTF-8 text.
pub(crate) fn from_sql(value: ValueRef<'_>) -> Value {
    match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(i) => Value::Integer(i),
        ValueRef::Real(f) => Value::Real(f),
        ValueRef::Text(s) | ValueRef::Blob(s) => {
            Value::Text(String::from_utf8_lossy(s).into_owned())
        }
    }
}

impl CompDb {
    /// Run a projection anchored at `start`, restricted by `filter`.
    ///
    /// Result columns follow the requested order. No columns yields an empty
    /// batch without touching the database. Filters are validated against
    /// the schema before anything executes.
    pub fn select<S: AsRef<str>>(
        &self,
        start: Table,
        columns: &[S],
        filter: Option<&FilterExpr>,
    ) -> Result<Batch> {
        self.ensure_open()?;
        let Some(query) = translate(&self.registry, start, columns, filter)? else {
            return Ok(Batch::default());
        };

        let conn = self.lease()?;
        debug!(sql = %query, params = query.params.len(), "Running query");
        let mut stmt = conn.prepare_cached(&query.sql)?;
        let width = query.names.len();
        let rows = stmt
            .query_map(params_from_iter(query.params.iter().map(to_sql)), |row| {
                (0..width)
                    .map(|i| row.get_ref(i).map(from_sql))
                    .collect::<rusqlite::Result<Vec<_>>>()
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        Ok(Batch::from_rows(query.names, rows)?)
    }

    /// Columns of `ms_compound` and anything joined to it.
    pub fn compounds<S: AsRef<str>>(
        &self,
        columns: &[S],
        filter: Option<&FilterExpr>,
    ) -> Result<Batch> {
        self.select(Table::Compound, columns, filter)
    }

    /// Columns anchored at `ms_ion`.
    pub fn ions<S: AsRef<str>>(&self, columns: &[S], filter: Option<&FilterExpr>) -> Result<Batch> {
        self.select(Table::Ion, columns, filter)
    }

    /// Columns anchored at `ms_spectrum`.
    pub fn spectra<S: AsRef<str>>(
        &self,
        columns: &[S],
        filter: Option<&FilterExpr>,
    ) -> Result<Batch> {
        self.select(Table::Spectrum, columns, filter)
    }

    fn records<R: TableRecord>(&self, filter: Option<&FilterExpr>) -> Result<Vec<R>> {
        let columns = self.registry.column_names(R::TABLE);
        let batch = self.select(R::TABLE, &columns, filter)?;
        Ok(from_batch(&batch)?)
    }

    /// All columns of every matching compound, as typed records.
    pub fn compound_records(&self, filter: Option<&FilterExpr>) -> Result<Vec<Compound>> {
        self.records(filter)
    }

    pub fn ion_records(&self, filter: Option<&FilterExpr>) -> Result<Vec<Ion>> {
        self.records(filter)
    }

    pub fn spectrum_records(&self, filter: Option<&FilterExpr>) -> Result<Vec<Spectrum>> {
        self.records(filter)
    }

    /// Build a filter on `field` checked against this store's schema.
    pub fn filter(
        &self,
        field: &str,
        op: Operator,
        value: impl Into<FilterValue>,
    ) -> Result<FilterExpr> {
        Ok(Filter::new(self.registry()?, field, op, value)?.into())
    }

    /// Parse a textual filter expression such as
    /// `exactmass > 190 & name startsWith 'Caf'`.
    pub fn parse_filter(&self, input: &str) -> Result<FilterExpr> {
        Ok(FilterExpr::parse(self.registry()?, input)?)
    }

    /// Column names of `table`, including columns added to the store.
    pub fn variables(&self, table: Table) -> Result<Vec<&str>> {
        Ok(self.registry()?.column_names(table))
    }

    /// Every field a filter may reference.
    pub fn supported_filters(&self) -> Result<Vec<ColumnRef>> {
        Ok(self.registry()?.filter_fields())
    }

    /// Provenance record of the store.
    pub fn metadata(&self) -> Result<Metadata> {
        let conn = self.lease()?;
        let mut stmt = conn.prepare_cached("SELECT key, value FROM metadata ORDER BY key")?;
        let pairs = stmt
            .query_map([], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .filter_map(|pair| match pair {
                Ok((key, Some(value))) => Some(Ok((key, value))),
                Ok((_, None)) => None,
                Err(e) => Some(Err(e)),
            })
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(Metadata::from_pairs(pairs))
    }

    /// Number of rows in `table`.
    pub fn count(&self, table: Table) -> Result<usize> {
        let conn = self.lease()?;
        let count: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| {
            row.get(0)
        })?;
        Ok(count as usize)
    }

    pub fn has_ions(&self) -> Result<bool> {
        Ok(self.count(Table::Ion)? > 0)
    }

    pub fn has_spectra(&self) -> Result<bool> {
        Ok(self.count(Table::Spectrum)? > 0)
    }
}

#[cfg(test)]
mod tests {
    use compdb_core::{ColumnType, FilterError, LogicOp};
    use rstest::rstest;

    use super::*;
    use crate::error::Error;
    use crate::write::InsertOptions;

    fn sample_db() -> CompDb {
        let mut db = CompDb::open_memory().unwrap();
        db.insert_compounds(
            [
                Compound::new("1")
                    .with_name("Caffeine")
                    .with_formula("C8H10N4O2")
                    .with_exactmass(194.080375584),
                Compound::new("2")
                    .with_name("Glucose")
                    .with_formula("C6H12O6")
                    .with_exactmass(180.063388116),
                Compound::new("3").with_name("Theobromine"),
            ],
            InsertOptions::default(),
        )
        .unwrap();
        db.insert_ions(
            [
                Ion::new("1").with_adduct("[M+H]+", 195.087652),
                Ion::new("1").with_adduct("[M+Na]+", 217.069596),
                Ion::new("2").with_adduct("[M+Na]+", 203.052583),
            ],
            InsertOptions::default(),
        )
        .unwrap();
        db
    }

    fn names(batch: &Batch) -> Vec<String> {
        let mut names: Vec<String> = batch
            .column("name")
            .unwrap()
            .filter_map(|v| v.as_str().map(str::to_owned))
            .collect();
        names.sort();
        names
    }

    #[test]
    fn values_convert_both_ways() {
        for value in [
            Value::Null,
            Value::Integer(7),
            Value::Real(1.5),
            Value::from("x"),
        ] {
            let sql = to_sql(&value);
            assert_eq!(from_sql(ValueRef::from(&sql)), value);
        }
    }

    #[test]
    fn empty_projection_returns_empty_batch() {
        let db = sample_db();
        let batch = db.compounds::<&str>(&[], None).unwrap();
        assert!(batch.is_empty());
        assert!(batch.columns().is_empty());
    }

    #[test]
    fn columns_follow_requested_order() {
        let db = sample_db();
        let f = db.filter("compound_id", Operator::Eq, "1").unwrap();
        let batch = db.compounds(&["exactmass", "name", "compound_id"], Some(&f)).unwrap();
        assert_eq!(batch.columns(), ["exactmass", "name", "compound_id"]);
        assert_eq!(
            batch.rows(),
            [vec![
                Value::Real(194.080375584),
                Value::from("Caffeine"),
                Value::from("1")
            ]]
        );
    }

    #[rstest]
    #[case("exactmass > 190", &["Caffeine"])]
    #[case("exactmass <= 190", &["Glucose"])]
    #[case("formula == NULL", &["Theobromine"])]
    #[case("name startsWith 'caf'", &["Caffeine"])]
    #[case("name endsWith 'ose'", &["Glucose"])]
    #[case("name contains 'e'", &["Caffeine", "Glucose", "Theobromine"])]
    #[case("compound_id in ('2', '3')", &["Glucose", "Theobromine"])]
    #[case("ion_adduct == '[M+Na]+'", &["Caffeine", "Glucose"])]
    #[case("ion_adduct == '[M+H]+' | name == 'Glucose'", &["Caffeine", "Glucose"])]
    fn textual_filters(#[case] input: &str, #[case] expected: &[&str]) {
        let db = sample_db();
        let f = db.parse_filter(input).unwrap();
        let batch = db.compounds(&["name"], Some(&f)).unwrap();
        assert_eq!(names(&batch), expected);
    }

    #[test]
    fn filter_table_is_joined_and_rows_are_distinct() {
        let db = sample_db();
        // Caffeine has two ions; the projection only asks for the name.
        let f = db.filter("ion_mz", Operator::Gt, 190.0).unwrap();
        let batch = db.compounds(&["name"], Some(&f)).unwrap();
        assert_eq!(names(&batch), ["Caffeine", "Glucose"]);
    }

    #[test]
    fn ions_start_at_the_ion_table() {
        let db = sample_db();
        let f = db
            .filter("name", Operator::Eq, "Caffeine")
            .unwrap()
            .and(db.filter("ion_adduct", Operator::Eq, "[M+Na]+").unwrap());
        let batch = db.ions(&["ion_adduct", "compound_id", "name"], Some(&f)).unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch.get(0, "compound_id"), Some(&Value::from("1")));
        assert_eq!(batch.get(0, "ion_adduct"), Some(&Value::from("[M+Na]+")));
    }

    #[test]
    fn unknown_filter_field_fails_before_querying() {
        let db = sample_db();
        let err = db.filter("weight", Operator::Gt, 1).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));

        let err = db.compounds(&["weight"], None).unwrap_err();
        assert!(matches!(err, Error::InvalidFilter(_)));
    }

    #[test]
    fn exchanged_filters_are_checked_before_querying() {
        let db = sample_db();
        let caffeine = db.filter("name", Operator::Eq, "Caffeine").unwrap();
        let glucose = db.filter("name", Operator::Eq, "Glucose").unwrap();
        let light = db.filter("exactmass", Operator::Lt, 0.0).unwrap();

        let mut json = serde_json::to_value(caffeine.or(glucose)).unwrap();
        json["filters"]
            .as_array_mut()
            .unwrap()
            .push(serde_json::to_value(&light).unwrap());
        assert!(serde_json::from_value::<FilterExpr>(json).is_err());

        // A filter claiming `exactmass` is text passes on its own but not
        // against the store's schema.
        let contains = db.filter("name", Operator::Contains, "5").unwrap();
        let mut json = serde_json::to_value(&contains).unwrap();
        json["column"]["column"] = serde_json::json!("exactmass");
        let edited: FilterExpr = serde_json::from_value(json).unwrap();
        let err = db.compounds(&["name"], Some(&edited)).unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidFilter(FilterError::IncompatibleOperator { .. })
        ));
    }

    #[test]
    fn typed_records_round_trip() {
        let db = sample_db();
        let f = db.filter("compound_id", Operator::Eq, "2").unwrap();
        let compounds = db.compound_records(Some(&f)).unwrap();
        assert_eq!(
            compounds,
            vec![
                Compound::new("2")
                    .with_name("Glucose")
                    .with_formula("C6H12O6")
                    .with_exactmass(180.063388116)
            ]
        );

        let ions = db.ion_records(None).unwrap();
        assert_eq!(ions.len(), 3);
        assert!(ions.iter().all(|ion| ion.ion_id.is_some()));
    }

    #[test]
    fn catalogue_lists_tables_and_fields() {
        let db = sample_db();
        assert_eq!(
            db.variables(Table::Ion).unwrap(),
            ["ion_id", "compound_id", "ion_adduct", "ion_mz", "ion_rt"]
        );
        let fields = db.supported_filters().unwrap();
        assert!(fields.iter().any(|f| f.table == Table::Spectrum
            && f.column == "precursorMz"
            && f.ty == ColumnType::Real));
    }

    #[test]
    fn counts() {
        let db = sample_db();
        assert_eq!(db.count(Table::Compound).unwrap(), 3);
        assert!(db.has_ions().unwrap());
        assert!(!db.has_spectra().unwrap());
    }

    #[test]
    fn combinator_built_by_hand() {
        let db = sample_db();
        let expr = FilterExpr::Combined(
            compdb_core::Combinator::new(
                vec![
                    db.filter("name", Operator::Eq, "Theobromine").unwrap(),
                    db.filter("exactmass", Operator::Lt, 185.0).unwrap(),
                    db.filter("formula", Operator::Ne, Value::Null).unwrap(),
                ],
                vec![LogicOp::Or, LogicOp::And],
            )
            .unwrap(),
        );
        // ((Theobromine OR mass < 185) AND formula IS NOT NULL)
        let batch = db.compounds(&["name"], Some(&expr)).unwrap();
        assert_eq!(names(&batch), ["Glucose"]);
    }
}
