use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Reconcile configuration-item exports: duplicates, attribute-loss risk, policy violations and dataset diffs",
    long_about = None
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    /// Detect duplicates, attribute-loss risk and policy violations in one or more CI exports
    Analyze(AnalyzeArgs),
    /// Compare a comparison extract against a reference extract on a key column
    Diff(DiffArgs),
    /// Write the built-in configuration as an editable YAML file
    Config(ConfigArgs),
}

#[derive(Debug, Args)]
pub struct AnalyzeArgs {
    /// Input CSV export; repeat for several partitions (one per file)
    #[arg(short = 'i', long = "input", required = true, action = clap::ArgAction::Append)]
    pub inputs: Vec<PathBuf>,
    /// Later export of the same records; enables the removal audit
    #[arg(long = "after", action = clap::ArgAction::Append)]
    pub after: Vec<PathBuf>,
    /// YAML configuration overriding the built-in column and policy rules
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Write the full findings as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,
    /// Write one CSV per finding category into this directory
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the inputs (defaults to utf-8 with windows-1252 fallback)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct DiffArgs {
    /// Authoritative extract
    #[arg(short = 'r', long = "reference")]
    pub reference: PathBuf,
    /// Extract checked against the reference
    #[arg(short = 'm', long = "comparison")]
    pub comparison: PathBuf,
    /// Key column present in both extracts (auto-detected when omitted)
    #[arg(short, long)]
    pub key: Option<String>,
    /// YAML configuration supplying key candidates
    #[arg(short, long)]
    pub config: Option<PathBuf>,
    /// Write the diff as JSON to this path
    #[arg(long)]
    pub json: Option<PathBuf>,
    /// Write missing/extra keys and value differences as CSV files into this directory
    #[arg(long = "report-dir")]
    pub report_dir: Option<PathBuf>,
    /// Only compare the column sets; no key is required
    #[arg(long = "columns-only")]
    pub columns_only: bool,
    /// CSV delimiter character (supports ',', 'tab', ';', '|')
    #[arg(long, value_parser = parse_delimiter)]
    pub delimiter: Option<u8>,
    /// Character encoding of the inputs (defaults to utf-8 with windows-1252 fallback)
    #[arg(long = "input-encoding")]
    pub input_encoding: Option<String>,
}

#[derive(Debug, Args)]
pub struct ConfigArgs {
    /// Destination YAML file
    #[arg(short = 'o', long = "output")]
    pub output: PathBuf,
    /// Overwrite an existing file
    #[arg(long)]
    pub force: bool,
}

pub fn parse_delimiter(value: &str) -> Result<u8, String> {
    match value {
        "tab" | "\t" => Ok(b'\t'),
        "comma" | "," => Ok(b','),
        "|" | "pipe" => Ok(b'|'),
        ";" | "semicolon" => Ok(b';'),
        other => {
            let mut chars = other.chars();
            let first = chars
                .next()
                .ok_or_else(|| "Delimiter cannot be empty".to_string())?;
            if chars.next().is_some() {
                return Err("Delimiter must be a single character".to_string());
            }
            if !first.is_ascii() {
                return Err("Delimiter must be ASCII".to_string());
            }
            Ok(first as u8)
        }
    }
}
