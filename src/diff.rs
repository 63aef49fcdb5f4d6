//! Dataset Differ: a reference extract against a comparison extract.
//!
//! The reference side is treated as the source of truth. Steps:
//!
//! 1. column-set difference (common / missing / extra);
//! 2. key-set difference over non-empty keys;
//! 3. trimmed value comparison for every common key and common column;
//! 4. completeness and accuracy percentages.
//!
//! Rows without a usable key are kept aside as [`Notice::EmptyKeyRecord`]
//! entries. When a key repeats, the later row replaces the earlier one and a
//! [`Notice::DuplicateKeyRecord`] is recorded.

use std::collections::{HashMap, HashSet};

use anyhow::{Context, Result};
use log::{info, warn};
use serde::Serialize;

use crate::{
    cli::DiffArgs,
    config::ReconcileConfig,
    error::ReconcileError,
    ingest::{self, RawTable},
    io_utils,
    model::{DiffFinding, DiffKind, Notice},
    report,
};

const PREVIEW_COLUMNS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Reference,
    Comparison,
}

impl Side {
    pub fn label(self) -> &'static str {
        match self {
            Self::Reference => "reference",
            Self::Comparison => "comparison",
        }
    }
}

#[derive(Debug, Clone)]
pub struct KeyedRow {
    pub key: String,
    pub row: usize,
}

/// A table indexed by its key column. Keys are unique and non-empty.
#[derive(Debug, Clone)]
pub struct KeyedDataset<'a> {
    pub side: Side,
    pub table: &'a RawTable,
    pub key_column: usize,
    pub rows: Vec<KeyedRow>,
    pub notices: Vec<Notice>,
    index: HashMap<String, usize>,
}

impl<'a> KeyedDataset<'a> {
    pub fn build(table: &'a RawTable, key: &str, side: Side) -> Result<Self, ReconcileError> {
        let key_column =
            table
                .column_index(key)
                .ok_or_else(|| ReconcileError::KeyColumnNotFound {
                    column: key.to_string(),
                    side: side.label().to_string(),
                })?;
        let mut rows: Vec<KeyedRow> = Vec::new();
        let mut index: HashMap<String, usize> = HashMap::new();
        let mut notices = Vec::new();

        for row in 0..table.rows.len() {
            let present = table.rows[row].len() > key_column;
            let value = table.cell(row, key_column);
            if !present || value.is_empty() {
                notices.push(Notice::EmptyKeyRecord {
                    scope: key.to_string(),
                    source: side.label().to_string(),
                    row_number: RawTable::row_number(row),
                    preview: table.preview(row, PREVIEW_COLUMNS),
                });
                continue;
            }
            match index.get(value) {
                Some(&slot) => {
                    notices.push(Notice::DuplicateKeyRecord {
                        source: side.label().to_string(),
                        key: value.to_string(),
                        row_number: RawTable::row_number(row),
                        replaced_row: RawTable::row_number(rows[slot].row),
                    });
                    rows[slot].row = row;
                }
                None => {
                    index.insert(value.to_string(), rows.len());
                    rows.push(KeyedRow {
                        key: value.to_string(),
                        row,
                    });
                }
            }
        }

        Ok(Self {
            side,
            table,
            key_column,
            rows,
            notices,
            index,
        })
    }

    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    pub fn row_of(&self, key: &str) -> Option<usize> {
        self.index.get(key).map(|&slot| self.rows[slot].row)
    }

    /// Trimmed value; an absent column or short row reads as empty.
    pub fn value(&self, key: &str, column: &str) -> &str {
        match (self.row_of(key), self.table.column_index(column)) {
            (Some(row), Some(col)) => self.table.cell(row, col),
            _ => "",
        }
    }

    pub fn empty_key_count(&self) -> usize {
        self.notices
            .iter()
            .filter(|n| matches!(n, Notice::EmptyKeyRecord { .. }))
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ColumnComparison {
    pub common: Vec<String>,
    pub missing: Vec<String>,
    pub extra: Vec<String>,
}

/// Common and missing columns follow reference order; extra columns follow comparison order.
pub fn compare_columns(reference: &[String], comparison: &[String]) -> ColumnComparison {
    let in_reference = reference.iter().collect::<HashSet<_>>();
    let in_comparison = comparison.iter().collect::<HashSet<_>>();
    let mut seen = HashSet::new();
    let mut common = Vec::new();
    let mut missing = Vec::new();
    for column in reference {
        if !seen.insert(column) {
            continue;
        }
        if in_comparison.contains(column) {
            common.push(column.clone());
        } else {
            missing.push(column.clone());
        }
    }
    let mut extra = Vec::new();
    for column in comparison {
        if !in_reference.contains(column) && !extra.contains(column) {
            extra.push(column.clone());
        }
    }
    ColumnComparison {
        common,
        missing,
        extra,
    }
}

/// Key column choice: explicit, else the first configured identifier present in both.
pub fn select_key_column(
    reference: &[String],
    comparison: &[String],
    explicit: Option<&str>,
    candidates: &[String],
) -> Result<String, ReconcileError> {
    if let Some(key) = explicit {
        for (headers, side) in [(reference, Side::Reference), (comparison, Side::Comparison)] {
            if !headers.iter().any(|h| h == key) {
                return Err(ReconcileError::KeyColumnNotFound {
                    column: key.to_string(),
                    side: side.label().to_string(),
                });
            }
        }
        return Ok(key.to_string());
    }
    if let Some(found) = candidates
        .iter()
        .find(|c| reference.contains(c) && comparison.contains(c))
    {
        return Ok(found.clone());
    }
    let mut common = compare_columns(reference, comparison).common;
    common.sort();
    Err(ReconcileError::KeyColumnUnresolved {
        common: common.join(", "),
    })
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct KeyedRowSummary {
    pub key: String,
    pub row_number: usize,
    pub preview: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DiffReport {
    pub reference_name: String,
    pub comparison_name: String,
    pub key_column: String,
    pub reference_columns: usize,
    pub comparison_columns: usize,
    pub columns: ColumnComparison,
    pub reference_rows: usize,
    pub comparison_rows: usize,
    pub reference_keys: usize,
    pub comparison_keys: usize,
    pub missing_keys: Vec<KeyedRowSummary>,
    pub extra_keys: Vec<KeyedRowSummary>,
    pub common_keys: Vec<String>,
    pub matching_keys: Vec<String>,
    pub differences: Vec<DiffFinding>,
    pub notices: Vec<Notice>,
    pub completeness: f64,
    pub accuracy: f64,
}

impl DiffReport {
    pub fn rows_with_differences(&self) -> usize {
        self.common_keys.len() - self.matching_keys.len()
    }

    pub fn missing_key_set(&self) -> HashSet<&str> {
        self.missing_keys.iter().map(|k| k.key.as_str()).collect()
    }

    pub fn extra_key_set(&self) -> HashSet<&str> {
        self.extra_keys.iter().map(|k| k.key.as_str()).collect()
    }
}

pub fn percentage(part: usize, whole: usize) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64 * 100.0
    }
}

fn summarize(dataset: &KeyedDataset<'_>, key: &KeyedRow) -> KeyedRowSummary {
    KeyedRowSummary {
        key: key.key.clone(),
        row_number: RawTable::row_number(key.row),
        preview: dataset.table.preview(key.row, PREVIEW_COLUMNS),
    }
}

/// Full comparison of two tables sharing `key_column`.
pub fn diff_tables(
    reference: &RawTable,
    comparison: &RawTable,
    key_column: &str,
) -> Result<DiffReport, ReconcileError> {
    let left = KeyedDataset::build(reference, key_column, Side::Reference)?;
    let right = KeyedDataset::build(comparison, key_column, Side::Comparison)?;
    let columns = compare_columns(&reference.headers, &comparison.headers);

    let missing_keys = left
        .rows
        .iter()
        .filter(|row| !right.contains(&row.key))
        .map(|row| summarize(&left, row))
        .collect::<Vec<_>>();
    let extra_keys = right
        .rows
        .iter()
        .filter(|row| !left.contains(&row.key))
        .map(|row| summarize(&right, row))
        .collect::<Vec<_>>();
    let common_keys = left
        .rows
        .iter()
        .filter(|row| right.contains(&row.key))
        .map(|row| row.key.clone())
        .collect::<Vec<_>>();

    let compared_columns = columns
        .common
        .iter()
        .filter(|c| c.as_str() != key_column)
        .collect::<Vec<_>>();
    let mut differences = Vec::new();
    let mut matching_keys = Vec::new();
    for key in &common_keys {
        let before = differences.len();
        for column in &compared_columns {
            let expected = left.value(key, column);
            let actual = right.value(key, column);
            if expected != actual {
                let kind = if actual.is_empty() && !expected.is_empty() {
                    DiffKind::Missing
                } else {
                    DiffKind::Different
                };
                differences.push(DiffFinding {
                    key: key.clone(),
                    column: (*column).clone(),
                    reference: expected.to_string(),
                    comparison: actual.to_string(),
                    kind,
                });
            }
        }
        if differences.len() == before {
            matching_keys.push(key.clone());
        }
    }

    let mut notices = left.notices.clone();
    notices.extend(right.notices.iter().cloned());
    let report = DiffReport {
        reference_name: reference.partition.clone(),
        comparison_name: comparison.partition.clone(),
        key_column: key_column.to_string(),
        reference_columns: reference.headers.len(),
        comparison_columns: comparison.headers.len(),
        columns,
        reference_rows: reference.rows.len(),
        comparison_rows: comparison.rows.len(),
        reference_keys: left.rows.len(),
        comparison_keys: right.rows.len(),
        completeness: percentage(common_keys.len(), left.rows.len()),
        accuracy: percentage(matching_keys.len(), common_keys.len()),
        missing_keys,
        extra_keys,
        common_keys,
        matching_keys,
        differences,
        notices,
    };
    if left.empty_key_count() + right.empty_key_count() > 0 {
        warn!(
            "{} reference and {} comparison row(s) have an empty '{}' and were set aside",
            left.empty_key_count(),
            right.empty_key_count(),
            key_column
        );
    }
    Ok(report)
}

pub fn execute(args: &DiffArgs) -> Result<()> {
    let config = ReconcileConfig::load_or_default(args.config.as_deref())?;
    let encoding = io_utils::resolve_encoding(args.input_encoding.as_deref())?;
    let names = ingest::partition_names(&[args.reference.clone(), args.comparison.clone()]);
    let reference = ingest::load_table(&args.reference, &names[0], args.delimiter, encoding)
        .with_context(|| format!("Loading reference {:?}", args.reference))?;
    let comparison = ingest::load_table(&args.comparison, &names[1], args.delimiter, encoding)
        .with_context(|| format!("Loading comparison {:?}", args.comparison))?;

    if args.columns_only {
        let columns = compare_columns(&reference.headers, &comparison.headers);
        print!("{}", report::render_column_comparison(&columns));
        if let Some(path) = &args.json {
            report::write_json(path, &columns)?;
        }
        return Ok(());
    }

    let key = select_key_column(
        &reference.headers,
        &comparison.headers,
        args.key.as_deref(),
        &config.key_candidates,
    )?;
    info!(
        "Comparing '{}' against reference '{}' on key '{}'",
        comparison.partition, reference.partition, key
    );
    let diff = diff_tables(&reference, &comparison, &key)?;
    info!(
        "Completeness {:.1}%, accuracy {:.1}%, {} value difference(s)",
        diff.completeness,
        diff.accuracy,
        diff.differences.len()
    );

    print!("{}", report::render_diff_summary(&diff));
    if let Some(path) = &args.json {
        report::write_json(path, &report::DiffDocument::new(&diff)?)?;
    }
    if let Some(dir) = &args.report_dir {
        report::write_diff_bundle(dir, &diff)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn column_comparison_keeps_source_order() {
        let result = compare_columns(
            &headers(&["id", "email", "name", "dept"]),
            &headers(&["name", "id", "phone"]),
        );
        assert_eq!(result.common, headers(&["id", "name"]));
        assert_eq!(result.missing, headers(&["email", "dept"]));
        assert_eq!(result.extra, headers(&["phone"]));
    }

    #[test]
    fn key_detection_uses_candidate_priority() {
        let candidates = headers(&["sys_id", "id", "email"]);
        let key = select_key_column(
            &headers(&["email", "id"]),
            &headers(&["id", "email"]),
            None,
            &candidates,
        )
        .expect("key");
        assert_eq!(key, "id");
    }

    #[test]
    fn key_detection_requires_presence_in_both() {
        let candidates = headers(&["sys_id", "email"]);
        let err = select_key_column(
            &headers(&["sys_id", "name"]),
            &headers(&["name", "email"]),
            None,
            &candidates,
        )
        .unwrap_err();
        match err {
            ReconcileError::KeyColumnUnresolved { common } => assert_eq!(common, "name"),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn explicit_key_must_exist_on_both_sides() {
        let err = select_key_column(&headers(&["a"]), &headers(&["b"]), Some("a"), &[])
            .unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::KeyColumnNotFound { ref side, .. } if side == "comparison"
        ));
    }

    #[test]
    fn percentages_guard_empty_denominators() {
        assert_eq!(percentage(0, 0), 0.0);
        assert_eq!(percentage(1, 4), 25.0);
    }
}
