//! Delimited-file plumbing shared by ingestion and report writing.
//!
//! - **Delimiter resolution**: `.tsv` implies tab, anything else comma, unless
//!   overridden.
//! - **Encoding**: an explicit label is honoured strictly; without one, input
//!   is tried as UTF-8 (BOM-sniffed, so UTF-16 exports work too) and then as
//!   Windows-1252, which covers the latin-1 family.
//! - **Formats**: spreadsheet containers are rejected up front; they must be
//!   exported to CSV by the caller.

use std::{
    fs::{self, File},
    io::{BufWriter, Read, Write},
    path::Path,
};

use anyhow::{Context, Result, anyhow};
use csv::QuoteStyle;
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};

use crate::error::ReconcileError;

pub const DEFAULT_CSV_DELIMITER: u8 = b',';
pub const DEFAULT_TSV_DELIMITER: u8 = b'\t';

const SPREADSHEET_EXTENSIONS: &[&str] = &["xlsx", "xls", "xlsm", "xlsb", "ods"];

pub fn is_dash(path: &Path) -> bool {
    path == Path::new("-")
}

pub fn resolve_encoding(label: Option<&str>) -> Result<Option<&'static Encoding>> {
    label
        .map(|value| {
            Encoding::for_label(value.trim().as_bytes())
                .ok_or_else(|| anyhow!("Unknown encoding '{value}'"))
        })
        .transpose()
}

pub fn resolve_input_delimiter(path: &Path, provided: Option<u8>) -> u8 {
    provided.unwrap_or_else(|| match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("tsv") => DEFAULT_TSV_DELIMITER,
        _ => DEFAULT_CSV_DELIMITER,
    })
}

pub fn ensure_delimited_format(path: &Path) -> Result<(), ReconcileError> {
    let extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .unwrap_or_default();
    if SPREADSHEET_EXTENSIONS
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(extension))
    {
        return Err(ReconcileError::UnsupportedInputFormat {
            path: path.to_path_buf(),
            extension: extension.to_string(),
        });
    }
    Ok(())
}

pub fn read_input_bytes(path: &Path) -> Result<Vec<u8>> {
    if is_dash(path) {
        let mut buffer = Vec::new();
        std::io::stdin()
            .lock()
            .read_to_end(&mut buffer)
            .context("Reading stdin")?;
        Ok(buffer)
    } else {
        fs::read(path).with_context(|| format!("Opening input file {path:?}"))
    }
}

/// Decodes `bytes`, returning the text and the encoding that succeeded.
pub fn decode_with_fallback(
    path: &Path,
    bytes: &[u8],
    explicit: Option<&'static Encoding>,
) -> Result<(String, &'static Encoding), ReconcileError> {
    let chain: Vec<&'static Encoding> = match explicit {
        Some(encoding) => vec![encoding],
        None => vec![UTF_8, WINDOWS_1252],
    };
    for encoding in chain {
        let (text, used, had_errors) = encoding.decode(bytes);
        if !had_errors {
            return Ok((text.into_owned(), used));
        }
    }
    Err(ReconcileError::Undecodable {
        path: path.to_path_buf(),
    })
}

pub fn open_csv_reader<R>(reader: R, delimiter: u8) -> csv::Reader<R>
where
    R: Read,
{
    let mut builder = csv::ReaderBuilder::new();
    builder
        .has_headers(true)
        .delimiter(delimiter)
        .double_quote(true)
        .flexible(true);
    builder.from_reader(reader)
}

pub fn open_csv_writer(path: &Path) -> Result<csv::Writer<Box<dyn Write>>> {
    let sink: Box<dyn Write> = if is_dash(path) {
        Box::new(std::io::stdout())
    } else {
        Box::new(BufWriter::new(
            File::create(path).with_context(|| format!("Creating output file {path:?}"))?,
        ))
    };
    let mut builder = csv::WriterBuilder::new();
    builder
        .delimiter(DEFAULT_CSV_DELIMITER)
        .quote_style(QuoteStyle::Necessary)
        .double_quote(true);
    Ok(builder.from_writer(sink))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn spreadsheet_extensions_are_rejected() {
        let err = ensure_delimited_format(Path::new("plan.XLSX")).unwrap_err();
        assert!(matches!(
            err,
            ReconcileError::UnsupportedInputFormat { ref extension, .. } if extension == "XLSX"
        ));
        assert!(ensure_delimited_format(Path::new("plan.csv")).is_ok());
        assert!(ensure_delimited_format(Path::new("-")).is_ok());
    }

    #[test]
    fn latin1_bytes_fall_back_to_windows_1252() {
        let (encoded, _, _) = WINDOWS_1252.encode("name\nCaf\u{e9}\n");
        let (text, used) =
            decode_with_fallback(&PathBuf::from("x.csv"), &encoded, None).expect("decode");
        assert_eq!(used, WINDOWS_1252);
        assert!(text.contains("Caf\u{e9}"));
    }

    #[test]
    fn explicit_encoding_is_not_second_guessed() {
        let bytes = [0x66, 0xff, 0x66];
        let err = decode_with_fallback(&PathBuf::from("x.csv"), &bytes, Some(UTF_8)).unwrap_err();
        assert!(matches!(err, ReconcileError::Undecodable { .. }));
    }

    #[test]
    fn tsv_extension_selects_tab() {
        assert_eq!(resolve_input_delimiter(Path::new("a.TSV"), None), b'\t');
        assert_eq!(resolve_input_delimiter(Path::new("a.csv"), None), b',');
        assert_eq!(resolve_input_delimiter(Path::new("a.tsv"), Some(b';')), b';');
    }
}
