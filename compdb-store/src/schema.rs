// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Database schema definitions for compound databases.

/// Compound, ion, spectrum and metadata tables.
pub const SCHEMA_SQL: &str = r#"
create table if not exists ms_compound (
    compound_id text primary key not null,
    name        text,
    inchi       text,
    inchikey    text,
    formula     text,
    exactmass   real,
    synonyms    text
);

create table if not exists ms_ion (
    ion_id      integer primary key autoincrement not null,
    compound_id text not null,
    ion_adduct  text,
    ion_mz      real,
    ion_rt      real,
    foreign key (compound_id) references ms_compound(compound_id) on delete restrict
);

create index if not exists IndexIonCompound on ms_ion(compound_id);

create table if not exists ms_spectrum (
    spectrum_id      integer primary key autoincrement not null,
    compound_id      text not null,
    msLevel          integer,
    precursorMz      real,
    polarity         integer,
    collision_energy real,
    instrument       text,
    peaks            text,
    foreign key (compound_id) references ms_compound(compound_id) on delete restrict
);

create index if not exists IndexSpectrumCompound on ms_spectrum(compound_id);

create table if not exists metadata (
    key   text primary key not null,
    value text
);
"#;

/// Largest number of bound parameters used in one statement.
///
/// Well below SQLite's `SQLITE_MAX_VARIABLE_NUMBER`.
pub(crate) const MAX_PARAMS: usize = 900;

/// Whether `name` can be used as a column name without quoting surprises.
pub(crate) fn is_plain_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}

/// Quote an identifier for use in SQL text.
pub(crate) fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// `?, ?, ?` with `n` placeholders.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}
