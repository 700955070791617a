//! Error types for dataset file operations.

use std::path::{Path, PathBuf};
use thiserror::Error;

/// Errors that can occur while reading or encoding dataset files.
#[derive(Error, Debug)]
pub enum FormatError {
    /// I/O error during file operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The file is not parseable as CSV
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// A required column is absent from the header row
    #[error("Missing required column: {column}")]
    MissingColumn {
        /// Name of the missing column
        column: String,
    },
}

impl FormatError {
    /// Create a missing column error.
    pub fn missing_column(column: impl Into<String>) -> Self {
        Self::MissingColumn {
            column: column.into(),
        }
    }
}

/// A detection row that was rejected during load.
#[derive(Error, Debug, Clone, PartialEq)]
#[error("Malformed detection at data row {row}: {reason}")]
pub struct MalformedRecordError {
    /// 1-based data row (header excluded)
    pub row: usize,
    /// Why the row was rejected
    pub reason: String,
}

/// A durable write failed. The operation it belonged to did not take effect,
/// unless [`PersistenceError::rollback`] says otherwise.
#[derive(Error, Debug)]
#[error("Failed to write {path:?}: {source}{}", rollback_note(.rollback.as_deref()))]
pub struct PersistenceError {
    /// File that could not be written
    pub path: PathBuf,
    #[source]
    pub source: FormatError,
    /// Undoing the partial write failed too; the table on disk holds rows
    /// the checkpoint does not account for until a retry succeeds.
    pub rollback: Option<Box<PersistenceError>>,
}

impl PersistenceError {
    pub fn new(path: impl AsRef<Path>, source: impl Into<FormatError>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            source: source.into(),
            rollback: None,
        }
    }

    /// Record that the rollback after this error failed as well.
    pub fn with_failed_rollback(mut self, rollback: PersistenceError) -> Self {
        self.rollback = Some(Box::new(rollback));
        self
    }

    /// Whether the files on disk disagree with each other after this error.
    pub fn left_inconsistent(&self) -> bool {
        self.rollback.is_some()
    }
}

fn rollback_note(rollback: Option<&PersistenceError>) -> String {
    match rollback {
        Some(e) => format!(" (rollback also failed: {e})"),
        None => String::new(),
    }
}
