//! Error types for the atomic file store

use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by store primitives.
///
/// `NotFound` and `Corrupt` are expected conditions callers branch on
/// (missing capability files, poison payloads); `Io` is the transient
/// catch-all that retry loops convert into "try again next pass".
#[derive(Error, Debug)]
pub enum StoreError {
    /// File does not exist
    #[error("Not found: {path}")]
    NotFound { path: PathBuf },

    /// File exists but does not decode as the expected record
    #[error("Corrupt record in {path}: {source}")]
    Corrupt {
        path: PathBuf,
        source: serde_json::Error,
    },

    /// File I/O error
    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl StoreError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io { path: path.into(), source }
    }

    /// True for the poison class: the file is present but unreadable as data.
    pub fn is_corrupt(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}
