// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Typed rows for each table.
//!
//! Every record carries the built-in columns of its table as fields and keeps
//! any other column in `extra`, so widened schemas survive a round trip
//! through the typed API.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::batch::Batch;
use crate::error::RecordError;
use crate::schema::{COMPOUND_ID, Table};
use crate::value::{ColumnType, Value};

/// Columns outside the built-in set, keyed by name.
pub type Extra = BTreeMap<String, Value>;

/// Conversion between a typed row and a batch row.
pub trait TableRecord: Sized {
    const TABLE: Table;

    /// Built-in column names in table order.
    fn builtin_columns() -> &'static [&'static str];

    /// Built-in values, aligned with [`TableRecord::builtin_columns`].
    fn builtin_values(&self) -> Result<Vec<Value>, RecordError>;

    fn extra(&self) -> &Extra;

    /// Build a record from one row. Columns that are not built in go to the
    /// extra bag.
    fn from_row(row: &[(&str, &Value)]) -> Result<Self, RecordError>;
}

/// Collect typed records into a batch.
///
/// The batch holds the built-in columns followed by the union of all extra
/// columns in name order; records without a given extra get null.
pub fn to_batch<R: TableRecord>(records: impl IntoIterator<Item = R>) -> Result<Batch, RecordError> {
    let records: Vec<R> = records.into_iter().collect();
    let builtin = R::builtin_columns();

    let mut extras: Vec<&str> = Vec::new();
    for record in &records {
        for key in record.extra().keys() {
            if !builtin.contains(&key.as_str()) && !extras.contains(&key.as_str()) {
                extras.push(key);
            }
        }
    }
    extras.sort_unstable();

    let mut batch = Batch::new(builtin.iter().copied().chain(extras.iter().copied()))?;
    for record in &records {
        let mut row = record.builtin_values()?;
        row.extend(
            extras
                .iter()
                .map(|k| record.extra().get(*k).cloned().unwrap_or_default()),
        );
        batch.push(row)?;
    }
    Ok(batch)
}

/// Decode every row of a batch into typed records.
pub fn from_batch<R: TableRecord>(batch: &Batch) -> Result<Vec<R>, RecordError> {
    batch.records().map(|row| R::from_row(&row)).collect()
}

fn lookup<'a>(row: &'a [(&str, &'a Value)], column: &str) -> Option<&'a Value> {
    row.iter()
        .find(|(name, _)| *name == column)
        .map(|(_, value)| *value)
        .filter(|v| !v.is_null())
}

fn text(row: &[(&str, &Value)], column: &str) -> Result<Option<String>, RecordError> {
    match lookup(row, column) {
        None => Ok(None),
        Some(v) => v.to_text().map(Some).ok_or(RecordError::InvalidValue {
            column: column.to_owned(),
            expected: ColumnType::Text,
        }),
    }
}

fn required_text(row: &[(&str, &Value)], column: &str) -> Result<String, RecordError> {
    text(row, column)?.ok_or_else(|| RecordError::MissingColumn(column.to_owned()))
}

fn real(row: &[(&str, &Value)], column: &str) -> Result<Option<f64>, RecordError> {
    match lookup(row, column) {
        None => Ok(None),
        Some(v) => v.as_f64().map(Some).ok_or(RecordError::InvalidValue {
            column: column.to_owned(),
            expected: ColumnType::Real,
        }),
    }
}

fn integer(row: &[(&str, &Value)], column: &str) -> Result<Option<i64>, RecordError> {
    match lookup(row, column) {
        None => Ok(None),
        Some(v) => v.as_i64().map(Some).ok_or(RecordError::InvalidValue {
            column: column.to_owned(),
            expected: ColumnType::Integer,
        }),
    }
}

fn json<T: serde::de::DeserializeOwned + Default>(
    row: &[(&str, &Value)],
    column: &str,
) -> Result<T, RecordError> {
    match text(row, column)? {
        None => Ok(T::default()),
        Some(s) => serde_json::from_str(&s).map_err(|source| RecordError::Decode {
            column: column.to_owned(),
            source,
        }),
    }
}

fn to_json<T: Serialize>(value: &T, column: &str) -> Result<Value, RecordError> {
    serde_json::to_string(value)
        .map(Value::Text)
        .map_err(|source| RecordError::Decode {
            column: column.to_owned(),
            source,
        })
}

fn extras(row: &[(&str, &Value)], builtin: &[&str]) -> Extra {
    row.iter()
        .filter(|(name, _)| !builtin.contains(name))
        .map(|(name, value)| ((*name).to_owned(), (*value).clone()))
        .collect()
}

/// A compound row of `ms_compound`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Compound {
    pub compound_id: String,
    pub name: Option<String>,
    pub inchi: Option<String>,
    pub inchikey: Option<String>,
    pub formula: Option<String>,
    pub exactmass: Option<f64>,
    /// Alternative names; persisted as a JSON array.
    pub synonyms: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Compound {
    pub fn new(compound_id: impl Into<String>) -> Self {
        Self {
            compound_id: compound_id.into(),
            ..Default::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_exactmass(mut self, exactmass: f64) -> Self {
        self.exactmass = Some(exactmass);
        self
    }

    pub fn with_formula(mut self, formula: impl Into<String>) -> Self {
        self.formula = Some(formula.into());
        self
    }

    pub fn with_extra(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.extra.insert(column.into(), value.into());
        self
    }
}

const COMPOUND_COLUMNS: &[&str] = &[
    COMPOUND_ID,
    "name",
    "inchi",
    "inchikey",
    "formula",
    "exactmass",
    "synonyms",
];

impl TableRecord for Compound {
    const TABLE: Table = Table::Compound;

    fn builtin_columns() -> &'static [&'static str] {
        COMPOUND_COLUMNS
    }

    fn builtin_values(&self) -> Result<Vec<Value>, RecordError> {
        let synonyms = if self.synonyms.is_empty() {
            Value::Null
        } else {
            to_json(&self.synonyms, "synonyms")?
        };
        Ok(vec![
            self.compound_id.clone().into(),
            self.name.clone().into(),
            self.inchi.clone().into(),
            self.inchikey.clone().into(),
            self.formula.clone().into(),
            self.exactmass.into(),
            synonyms,
        ])
    }

    fn extra(&self) -> &Extra {
        &self.extra
    }

    fn from_row(row: &[(&str, &Value)]) -> Result<Self, RecordError> {
        Ok(Self {
            compound_id: required_text(row, COMPOUND_ID)?,
            name: text(row, "name")?,
            inchi: text(row, "inchi")?,
            inchikey: text(row, "inchikey")?,
            formula: text(row, "formula")?,
            exactmass: real(row, "exactmass")?,
            synonyms: json(row, "synonyms")?,
            extra: extras(row, COMPOUND_COLUMNS),
        })
    }
}

/// An ion adduct row of `ms_ion`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Ion {
    /// Assigned by the store; ignored on insert.
    pub ion_id: Option<i64>,
    pub compound_id: String,
    pub ion_adduct: Option<String>,
    pub ion_mz: Option<f64>,
    pub ion_rt: Option<f64>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Ion {
    pub fn new(compound_id: impl Into<String>) -> Self {
        Self {
            compound_id: compound_id.into(),
            ..Default::default()
        }
    }

    pub fn with_adduct(mut self, adduct: impl Into<String>, mz: f64) -> Self {
        self.ion_adduct = Some(adduct.into());
        self.ion_mz = Some(mz);
        self
    }

    pub fn with_rt(mut self, rt: f64) -> Self {
        self.ion_rt = Some(rt);
        self
    }
}

const ION_COLUMNS: &[&str] = &["ion_id", COMPOUND_ID, "ion_adduct", "ion_mz", "ion_rt"];

impl TableRecord for Ion {
    const TABLE: Table = Table::Ion;

    fn builtin_columns() -> &'static [&'static str] {
        ION_COLUMNS
    }

    fn builtin_values(&self) -> Result<Vec<Value>, RecordError> {
        Ok(vec![
            self.ion_id.into(),
            self.compound_id.clone().into(),
            self.ion_adduct.clone().into(),
            self.ion_mz.into(),
            self.ion_rt.into(),
        ])
    }

    fn extra(&self) -> &Extra {
        &self.extra
    }

    fn from_row(row: &[(&str, &Value)]) -> Result<Self, RecordError> {
        Ok(Self {
            ion_id: integer(row, "ion_id")?,
            compound_id: required_text(row, COMPOUND_ID)?,
            ion_adduct: text(row, "ion_adduct")?,
            ion_mz: real(row, "ion_mz")?,
            ion_rt: real(row, "ion_rt")?,
            extra: extras(row, ION_COLUMNS),
        })
    }
}

/// One centroid of a fragment spectrum.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Peak {
    pub mz: f64,
    pub intensity: f64,
}

/// An MS/MS spectrum row of `ms_spectrum`.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Spectrum {
    /// Assigned by the store; ignored on insert.
    pub spectrum_id: Option<i64>,
    pub compound_id: String,
    pub ms_level: Option<i64>,
    pub precursor_mz: Option<f64>,
    pub polarity: Option<i64>,
    pub collision_energy: Option<f64>,
    pub instrument: Option<String>,
    /// Persisted as a JSON array of `{mz, intensity}` objects.
    pub peaks: Vec<Peak>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: Extra,
}

impl Spectrum {
    pub fn new(compound_id: impl Into<String>) -> Self {
        Self {
            compound_id: compound_id.into(),
            ..Default::default()
        }
    }

    pub fn with_precursor(mut self, ms_level: i64, precursor_mz: f64) -> Self {
        self.ms_level = Some(ms_level);
        self.precursor_mz = Some(precursor_mz);
        self
    }

    /// Set the peak list from parallel m/z and intensity sequences.
    ///
    /// Extra elements of the longer sequence are ignored.
    pub fn with_peaks(mut self, mz: &[f64], intensity: &[f64]) -> Self {
        self.peaks = mz
            .iter()
            .zip(intensity)
            .map(|(&mz, &intensity)| Peak { mz, intensity })
            .collect();
        self
    }

    pub fn mz(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.mz).collect()
    }

    pub fn intensity(&self) -> Vec<f64> {
        self.peaks.iter().map(|p| p.intensity).collect()
    }
}

const SPECTRUM_COLUMNS: &[&str] = &[
    "spectrum_id",
    COMPOUND_ID,
    "msLevel",
    "precursorMz",
    "polarity",
    "collision_energy",
    "instrument",
    "peaks",
];

impl TableRecord for Spectrum {
    const TABLE: Table = Table::Spectrum;

    fn builtin_columns() -> &'static [&'static str] {
        SPECTRUM_COLUMNS
    }

    fn builtin_values(&self) -> Result<Vec<Value>, RecordError> {
        Ok(vec![
            self.spectrum_id.into(),
            self.compound_id.clone().into(),
            self.ms_level.into(),
            self.precursor_mz.into(),
            self.polarity.into(),
            self.collision_energy.into(),
            self.instrument.clone().into(),
            to_json(&self.peaks, "peaks")?,
        ])
    }

    fn extra(&self) -> &Extra {
        &self.extra
    }

    fn from_row(row: &[(&str, &Value)]) -> Result<Self, RecordError> {
        Ok(Self {
            spectrum_id: integer(row, "spectrum_id")?,
            compound_id: required_text(row, COMPOUND_ID)?,
            ms_level: integer(row, "msLevel")?,
            precursor_mz: real(row, "precursorMz")?,
            polarity: integer(row, "polarity")?,
            collision_energy: real(row, "collision_energy")?,
            instrument: text(row, "instrument")?,
            peaks: json(row, "peaks")?,
            extra: extras(row, SPECTRUM_COLUMNS),
        })
    }
}

/// Provenance of the data in a store.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Metadata {
    pub source: Option<String>,
    pub url: Option<String>,
    pub source_version: Option<String>,
    pub source_date: Option<String>,
    pub organism: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub extra: BTreeMap<String, String>,
}

impl Metadata {
    /// Key/value pairs as persisted in the `metadata` table.
    pub fn to_pairs(&self) -> Vec<(String, String)> {
        let known = [
            ("source", &self.source),
            ("url", &self.url),
            ("source_version", &self.source_version),
            ("source_date", &self.source_date),
            ("organism", &self.organism),
        ];
        known
            .into_iter()
            .filter_map(|(k, v)| v.clone().map(|v| (k.to_owned(), v)))
            .chain(self.extra.iter().map(|(k, v)| (k.clone(), v.clone())))
            .collect()
    }

    pub fn from_pairs(pairs: impl IntoIterator<Item = (String, String)>) -> Self {
        let mut metadata = Metadata::default();
        for (key, value) in pairs {
            match key.as_str() {
                "source" => metadata.source = Some(value),
                "url" => metadata.url = Some(value),
                "source_version" => metadata.source_version = Some(value),
                "source_date" => metadata.source_date = Some(value),
                "organism" => metadata.organism = Some(value),
                _ => {
                    metadata.extra.insert(key, value);
                }
            }
        }
        metadata
    }
}
