//! Error taxonomy for the reconciliation engine.
//!
//! Fatal conditions surface as [`ReconcileError`]. Conditions that only
//! narrow what gets analyzed (ambiguous header candidates, rows with blank
//! keys) are never errors; they travel with the output as
//! [`crate::model::Notice`] values so they stay observable.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error(
        "partition '{partition}': required column '{field}' not found (accepted names: {candidates})"
    )]
    MissingRequiredColumn {
        partition: String,
        field: String,
        candidates: String,
    },
    #[error("unsupported input format '{extension}' for {path:?}; export the sheet to CSV first")]
    UnsupportedInputFormat { path: PathBuf, extension: String },
    #[error("key column '{column}' not present in {side} dataset")]
    KeyColumnNotFound { column: String, side: String },
    #[error("no key column could be detected; pass --key with one of: {common}")]
    KeyColumnUnresolved { common: String },
    #[error("could not decode {path:?} with any supported encoding")]
    Undecodable { path: PathBuf },
}
