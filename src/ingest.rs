//! Loading delimited exports into uniform in-memory tables.
//!
//! Each input file becomes one [`RawTable`] (a "source partition"), the same
//! role a worksheet plays in a multi-sheet workbook.

use std::{collections::HashSet, path::Path};

use anyhow::{Context, Result};
use encoding_rs::Encoding;
use log::info;

use crate::io_utils;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawTable {
    pub partition: String,
    pub encoding: String,
    pub headers: Vec<String>,
    pub rows: Vec<Vec<String>>,
}

impl RawTable {
    pub fn new(partition: impl Into<String>, headers: Vec<String>, rows: Vec<Vec<String>>) -> Self {
        Self {
            partition: partition.into(),
            encoding: "UTF-8".to_string(),
            headers,
            rows,
        }
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.headers.iter().position(|h| h == name)
    }

    /// Trimmed cell value; short rows read as empty.
    pub fn cell(&self, row: usize, column: usize) -> &str {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .map(|v| v.trim())
            .unwrap_or("")
    }

    /// Physical line of a data row, counting the header as row 1.
    pub fn row_number(row: usize) -> usize {
        row + 2
    }

    /// `header: value` pairs for the first few columns of a row.
    pub fn preview(&self, row: usize, columns: usize) -> String {
        self.headers
            .iter()
            .enumerate()
            .take(columns)
            .filter_map(|(idx, header)| {
                self.rows
                    .get(row)
                    .and_then(|r| r.get(idx))
                    .map(|value| format!("{header}: {value}"))
            })
            .collect::<Vec<_>>()
            .join(" | ")
    }
}

pub fn load_table(
    path: &Path,
    partition: &str,
    delimiter: Option<u8>,
    encoding: Option<&'static Encoding>,
) -> Result<RawTable> {
    io_utils::ensure_delimited_format(path)?;
    let delimiter = io_utils::resolve_input_delimiter(path, delimiter);
    let bytes = io_utils::read_input_bytes(path)?;
    let (text, used) = io_utils::decode_with_fallback(path, &bytes, encoding)?;

    let mut reader = io_utils::open_csv_reader(text.as_bytes(), delimiter);
    let headers = reader
        .headers()
        .with_context(|| format!("Reading headers from {path:?}"))?
        .iter()
        .map(|h| h.trim().to_string())
        .collect::<Vec<_>>();
    let mut rows = Vec::new();
    for (idx, record) in reader.records().enumerate() {
        let record = record
            .with_context(|| format!("Reading row {} in {path:?}", RawTable::row_number(idx)))?;
        rows.push(record.iter().map(|v| v.to_string()).collect());
    }

    info!(
        "Read {} row(s) x {} column(s) from {:?} as partition '{}' ({})",
        rows.len(),
        headers.len(),
        path,
        partition,
        used.name()
    );
    Ok(RawTable {
        partition: partition.to_string(),
        encoding: used.name().to_string(),
        headers,
        rows,
    })
}

/// Loads several files, naming partitions after their file stems.
pub fn load_partitions(
    paths: &[std::path::PathBuf],
    delimiter: Option<u8>,
    encoding: Option<&'static Encoding>,
) -> Result<Vec<RawTable>> {
    let names = partition_names(paths);
    paths
        .iter()
        .zip(names)
        .map(|(path, name)| load_table(path, &name, delimiter, encoding))
        .collect()
}

pub fn partition_names(paths: &[std::path::PathBuf]) -> Vec<String> {
    let mut seen = HashSet::new();
    paths
        .iter()
        .map(|path| {
            let stem = if io_utils::is_dash(path) {
                "stdin".to_string()
            } else {
                path.file_stem()
                    .map(|s| s.to_string_lossy().into_owned())
                    .unwrap_or_else(|| "input".to_string())
            };
            let mut name = stem.clone();
            let mut counter = 2usize;
            while !seen.insert(name.clone()) {
                name = format!("{stem}_{counter}");
                counter += 1;
            }
            name
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn partition_names_are_unique() {
        let paths = vec![
            PathBuf::from("a/plan.csv"),
            PathBuf::from("b/plan.csv"),
            PathBuf::from("-"),
        ];
        assert_eq!(partition_names(&paths), vec!["plan", "plan_2", "stdin"]);
    }

    #[test]
    fn cell_and_preview_tolerate_short_rows() {
        let table = RawTable::new(
            "t",
            vec!["id".into(), "name".into(), "email".into()],
            vec![vec!["1".into(), " Ann ".into()]],
        );
        assert_eq!(table.cell(0, 1), "Ann");
        assert_eq!(table.cell(0, 2), "");
        assert_eq!(table.preview(0, 4), "id: 1 | name:  Ann ");
    }
}
