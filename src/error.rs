//! Session-level errors.

use std::path::PathBuf;
use thiserror::Error;

use crate::config::ConfigError;
use crate::format::{FormatError, PersistenceError};

/// A discovered tile whose raster disappeared before it could be opened.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Tile {tile_id} no longer exists at {path:?}")]
pub struct MissingTileFileError {
    pub tile_id: String,
    pub path: PathBuf,
}

/// Errors that end or prevent a review session.
#[derive(Error, Debug)]
pub enum SessionError {
    /// Configuration could not be loaded or is invalid
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The dataset files could not be loaded
    #[error("Failed to load dataset: {0}")]
    Load(#[from] FormatError),

    /// A durable write failed and the reviewer chose not to retry
    #[error(transparent)]
    Persistence(#[from] PersistenceError),

    /// A commit was abandoned after its rollback failed, so the table on disk
    /// already holds the tile's new detections while the tile is unprocessed
    #[error("Tile {tile_id} was not committed but its new detections remain in the table: {source}")]
    PartialCommit {
        tile_id: String,
        #[source]
        source: PersistenceError,
    },

    /// Fresh start was requested but the template is missing
    #[error("Fresh start template not found: {path:?}")]
    MissingTemplate { path: PathBuf },

    /// The tile directory could not be scanned
    #[error("Cannot scan tile directory {path:?}: {source}")]
    TileDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
