// SPDX-FileCopyrightText: 2025 Jörg Thalheim
// SPDX-License-Identifier: MIT

//! Translation of a projection and a filter tree into one SQL query.

use std::collections::BTreeSet;
use std::fmt;

use crate::error::FilterError;
use crate::filter::{Filter, FilterExpr, FilterValue, Operator, check_value};
use crate::schema::{COMPOUND_ID, ColumnRef, SchemaRegistry, Table};
use crate::value::Value;

/// A parameterized read query.
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sql: String,
    /// Positional parameters in placeholder order.
    pub params: Vec<Value>,
    /// Result column names, in requested order.
    pub names: Vec<String>,
    /// Resolved result columns, aligned with `names`.
    pub columns: Vec<ColumnRef>,
}

impl fmt::Display for Query {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.sql)
    }
}

fn ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

fn qualified(column: &ColumnRef) -> String {
    format!("{}.{}", column.table.name(), ident(&column.column))
}

/// Escape LIKE wildcards; used together with `ESCAPE '\'`.
fn escape_like(pattern: &str) -> String {
    let mut escaped = String::with_capacity(pattern.len());
    for c in pattern.chars() {
        if matches!(c, '\\' | '%' | '_') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped
}

struct Translator<'a> {
    registry: &'a SchemaRegistry,
    start: Table,
    tables: BTreeSet<Table>,
    params: Vec<Value>,
}

impl Translator<'_> {
    /// Bind a filter's column against the live registry and the start table.
    fn bind(&self, filter: &Filter) -> Result<ColumnRef, FilterError> {
        let column = filter.column();
        if filter.is_qualified() {
            return self.registry.resolve(&column.to_string(), None);
        }
        self.registry.resolve(&column.column, Some(self.start))
    }

    fn leaf(&mut self, filter: &Filter) -> Result<String, FilterError> {
        let column = self.bind(filter)?;
        // The live column type may differ from the one the filter was built
        // against.
        let value = check_value(&column, filter.op(), filter.value().clone())?;
        self.tables.insert(column.table);
        let lhs = qualified(&column);

        let sql = match (filter.op(), &value) {
            (Operator::Eq, FilterValue::Scalar(Value::Null)) => format!("{lhs} IS NULL"),
            (Operator::Ne, FilterValue::Scalar(Value::Null)) => format!("{lhs} IS NOT NULL"),
            (Operator::In, FilterValue::Set(values)) => {
                self.params.extend(values.iter().cloned());
                let placeholders = vec!["?"; values.len()].join(", ");
                format!("{lhs} IN ({placeholders})")
            }
            (op, FilterValue::Scalar(value)) if op.is_string_match() => {
                let needle = escape_like(value.as_str().unwrap_or_default());
                let pattern = match op {
                    Operator::StartsWith => format!("{needle}%"),
                    Operator::EndsWith => format!("%{needle}"),
                    _ => format!("%{needle}%"),
                };
                self.params.push(Value::Text(pattern));
                format!("{lhs} LIKE ? ESCAPE '\\'")
            }
            (op, FilterValue::Scalar(value)) => {
                self.params.push(value.clone());
                format!("{lhs} {op} ?")
            }
            (op, FilterValue::Set(_)) => {
                return Err(FilterError::IncompatibleValue {
                    field: column.column,
                    reason: format!("operator '{op}' takes a single value"),
                });
            }
        };
        Ok(sql)
    }

    /// Render strictly left to right: `((f1 op1 f2) op2 f3)`.
    fn expr(&mut self, expr: &FilterExpr) -> Result<String, FilterError> {
        match expr {
            FilterExpr::Filter(filter) => self.leaf(filter),
            FilterExpr::Combined(c) => {
                let (first, rest) = c.filters().split_first().ok_or(FilterError::Empty)?;
                if c.ops().len() != rest.len() {
                    return Err(FilterError::Arity {
                        filters: c.filters().len(),
                        operators: c.ops().len(),
                    });
                }
                let mut sql = self.expr(first)?;
                for (op, next) in c.ops().iter().zip(rest) {
                    let rhs = self.expr(next)?;
                    sql = format!("({sql} {op} {rhs})");
                }
                Ok(sql)
            }
        }
    }

    fn joins(&mut self) -> String {
        // Ion and Spectrum only meet through Compound.
        if self.start != Table::Compound && self.tables.iter().any(|t| *t != self.start) {
            self.tables.insert(Table::Compound);
        }

        let mut sql = String::new();
        for table in self.tables.iter().filter(|t| **t != self.start) {
            let left = match table {
                Table::Compound => self.start,
                _ => Table::Compound,
            };
            sql.push_str(&format!(
                " JOIN {table} ON {left}.{key} = {table}.{key}",
                key = ident(COMPOUND_ID),
            ));
        }
        sql
    }

    /// Whether a join can repeat rows of the start table: every table except
    /// compound holds many rows per compound.
    fn fans_out(&self) -> bool {
        self.tables
            .iter()
            .any(|t| *t != self.start && t.parent().is_some())
    }
}

/// Build the query for `columns` anchored at `start`, restricted by
/// `filter`.
///
/// Returns `Ok(None)` when no columns are requested. Tables are joined for
/// every projected column and every filter field, even when the filter
/// touches a table no projected column comes from.
///
/// Rows are only made `DISTINCT` when an ion or spectrum join can repeat
/// them. Such a query also merges distinct source rows whose projected
/// values are equal; a single-table query returns one row per stored row.
pub fn translate<S: AsRef<str>>(
    registry: &SchemaRegistry,
    start: Table,
    columns: &[S],
    filter: Option<&FilterExpr>,
) -> Result<Option<Query>, FilterError> {
    if !start.is_queryable() {
        return Err(FilterError::UnknownTable(start.name().to_owned()));
    }
    if columns.is_empty() {
        return Ok(None);
    }

    let mut translator = Translator {
        registry,
        start,
        tables: BTreeSet::from([start]),
        params: Vec::new(),
    };

    let mut names = Vec::new();
    let mut resolved: Vec<ColumnRef> = Vec::new();
    for name in columns {
        let column = registry.resolve(name.as_ref(), Some(start))?;
        if resolved.contains(&column) {
            continue;
        }
        translator.tables.insert(column.table);
        names.push(name.as_ref().to_owned());
        resolved.push(column);
    }

    let predicate = filter.map(|f| translator.expr(f)).transpose()?;
    let joins = translator.joins();

    let projection = resolved
        .iter()
        .map(qualified)
        .collect::<Vec<_>>()
        .join(", ");
    let distinct = if translator.fans_out() { " DISTINCT" } else { "" };
    let mut sql = format!("SELECT{distinct} {projection} FROM {start}{joins}");
    if let Some(predicate) = predicate {
        sql.push_str(" WHERE ");
        sql.push_str(&predicate);
    }

    Ok(Some(Query {
        sql,
        params: translator.params,
        names,
        columns: resolved,
    }))
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use rstest::rstest;

    use super::*;
    use crate::filter::{Combinator, LogicOp};

    fn registry() -> SchemaRegistry {
        SchemaRegistry::builtin()
    }

    fn filter(field: &str, op: Operator, value: impl Into<FilterValue>) -> FilterExpr {
        Filter::new(&registry(), field, op, value).unwrap().into()
    }

    #[test]
    fn no_columns_means_no_query() {
        let query = translate::<&str>(&registry(), Table::Compound, &[], None).unwrap();
        assert!(query.is_none());
    }

    #[test]
    fn single_table_projection() {
        let query = translate(&registry(), Table::Compound, &["name", "exactmass"], None)
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT ms_compound."name", ms_compound."exactmass" FROM ms_compound"#
        );
        assert_eq!(query.names, vec!["name", "exactmass"]);
        assert!(query.params.is_empty());
    }

    #[test]
    fn filter_tables_are_joined() {
        let f = filter("ion_adduct", Operator::Eq, "[M+H]+");
        let query = translate(&registry(), Table::Compound, &["name"], Some(&f))
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            concat!(
                r#"SELECT DISTINCT ms_compound."name" FROM ms_compound"#,
                r#" JOIN ms_ion ON ms_compound."compound_id" = ms_ion."compound_id""#,
                r#" WHERE ms_ion."ion_adduct" = ?"#
            )
        );
        assert_eq!(query.params, vec![Value::from("[M+H]+")]);
    }

    #[test]
    fn ion_and_spectrum_join_through_compound() {
        let query = translate(&registry(), Table::Ion, &["ion_mz", "precursorMz"], None)
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            concat!(
                r#"SELECT DISTINCT ms_ion."ion_mz", ms_spectrum."precursorMz" FROM ms_ion"#,
                r#" JOIN ms_compound ON ms_ion."compound_id" = ms_compound."compound_id""#,
                r#" JOIN ms_spectrum ON ms_compound."compound_id" = ms_spectrum."compound_id""#
            )
        );
    }

    #[test]
    fn compound_id_stays_on_start_table() {
        let f = filter("compound_id", Operator::Eq, "1");
        let query = translate(&registry(), Table::Ion, &["ion_id", "compound_id"], Some(&f))
            .unwrap()
            .unwrap();
        assert_eq!(
            query.sql,
            r#"SELECT ms_ion."ion_id", ms_ion."compound_id" FROM ms_ion WHERE ms_ion."compound_id" = ?"#
        );

        let f = filter("ms_compound.compound_id", Operator::Eq, "1");
        let query = translate(&registry(), Table::Ion, &["ion_id"], Some(&f))
            .unwrap()
            .unwrap();
        assert!(query.sql.starts_with("SELECT ms_ion"));
        assert!(query.sql.contains("JOIN ms_compound"));
        assert!(query.sql.ends_with(r#"WHERE ms_compound."compound_id" = ?"#));
    }

    #[test]
    fn duplicate_columns_collapse() {
        let query = translate(&registry(), Table::Compound, &["name", "name", "formula"], None)
            .unwrap()
            .unwrap();
        assert_eq!(query.names, vec!["name", "formula"]);
    }

    #[rstest]
    #[case(Operator::Contains, "caf", "%caf%")]
    #[case(Operator::StartsWith, "Caf", "Caf%")]
    #[case(Operator::EndsWith, "ine", "%ine")]
    #[case(Operator::Contains, "50%_\\", "%50\\%\\_\\\\%")]
    fn string_matches_become_like(
        #[case] op: Operator,
        #[case] needle: &str,
        #[case] pattern: &str,
    ) {
        let f = filter("name", op, needle);
        let query = translate(&registry(), Table::Compound, &["name"], Some(&f))
            .unwrap()
            .unwrap();
        assert!(query.sql.ends_with(r#"WHERE ms_compound."name" LIKE ? ESCAPE '\'"#));
        assert_eq!(query.params, vec![Value::from(pattern)]);
    }

    #[test]
    fn set_membership_and_nulls() {
        let f = filter("compound_id", Operator::In, FilterValue::set(["1", "2", "3"]))
            .and(filter("formula", Operator::Ne, Value::Null));
        let query = translate(&registry(), Table::Compound, &["name"], Some(&f))
            .unwrap()
            .unwrap();
        assert!(query.sql.ends_with(
            r#"WHERE (ms_compound."compound_id" IN (?, ?, ?) AND ms_compound."formula" IS NOT NULL)"#
        ));
        assert_eq!(query.params.len(), 3);
    }

    #[test]
    fn nested_combinators_stay_grouped() {
        let inner = filter("exactmass", Operator::Gt, 100.0).or(filter("exactmass", Operator::Lt, 10.0));
        let f = filter("name", Operator::Eq, "x").and(FilterExpr::Combined(
            Combinator::new(vec![inner], vec![]).unwrap(),
        ));
        let query = translate(&registry(), Table::Compound, &["name"], Some(&f))
            .unwrap()
            .unwrap();
        assert!(query.sql.ends_with(
            r#"WHERE (ms_compound."name" = ? AND (ms_compound."exactmass" > ? OR ms_compound."exactmass" < ?))"#
        ));
    }

    #[test]
    fn unknown_projection_column_fails() {
        let err = translate(&registry(), Table::Compound, &["weight"], None).unwrap_err();
        assert_eq!(err, FilterError::UnknownField("weight".into()));
    }

    #[test]
    fn filter_on_column_missing_from_live_schema_fails() {
        let mut widened = registry();
        widened.add_column(
            Table::Compound,
            crate::schema::ColumnDef::new("kegg", crate::value::ColumnType::Text),
        );
        let f: FilterExpr = Filter::new(&widened, "kegg", Operator::Eq, "C1").unwrap().into();
        let err = translate(&registry(), Table::Compound, &["name"], Some(&f)).unwrap_err();
        assert_eq!(err, FilterError::UnknownField("kegg".into()));
    }

    #[test]
    fn filters_are_checked_against_live_column_types() {
        let mut text_mass = registry();
        text_mass.add_column(
            Table::Ion,
            crate::schema::ColumnDef::new("ion_note", crate::value::ColumnType::Text),
        );
        let f: FilterExpr = Filter::new(&text_mass, "ion_note", Operator::Contains, "5")
            .unwrap()
            .into();
        assert!(translate(&text_mass, Table::Ion, &["ion_id"], Some(&f)).is_ok());

        let mut real_note = registry();
        real_note.add_column(
            Table::Ion,
            crate::schema::ColumnDef::new("ion_note", crate::value::ColumnType::Real),
        );
        let err = translate(&real_note, Table::Ion, &["ion_id"], Some(&f)).unwrap_err();
        assert!(matches!(err, FilterError::IncompatibleOperator { .. }));
    }

    #[test]
    fn metadata_is_not_a_start_table() {
        assert!(translate(&registry(), Table::Metadata, &["key"], None).is_err());
    }

    fn logic_op() -> impl Strategy<Value = LogicOp> {
        prop_oneof![Just(LogicOp::And), Just(LogicOp::Or)]
    }

    proptest! {
        #[test]
        fn predicates_associate_left_to_right(
            ops in prop::collection::vec(logic_op(), 0..8)
        ) {
            let leaves: Vec<FilterExpr> = (0..=ops.len())
                .map(|i| filter("exactmass", Operator::Gt, i as f64))
                .collect();
            let expr = FilterExpr::Combined(Combinator::new(leaves, ops.clone()).unwrap());
            let query = translate(&registry(), Table::Compound, &["name"], Some(&expr))
                .unwrap()
                .unwrap();

            let leaf = r#"ms_compound."exactmass" > ?"#;
            let mut expected = leaf.to_string();
            for op in &ops {
                expected = format!("({expected} {op} {leaf})");
            }
            let predicate = query.sql.split(" WHERE ").nth(1).unwrap();
            prop_assert_eq!(predicate, expected.as_str());
            prop_assert_eq!(
                query.params,
                (0..=ops.len()).map(|i| Value::Real(i as f64)).collect::<Vec<_>>()
            );
        }
    }
}
