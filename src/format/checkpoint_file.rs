//! CSV codec for the processed-tiles checkpoint.
//!
//! The file is a single `imgName` column listing reviewed tile ids in review order.

use std::io::{Read, Write};
use std::path::Path;

use crate::format::error::FormatError;
use crate::state::CheckpointTracker;

/// Header of the checkpoint column.
pub const CHECKPOINT_COLUMN: &str = "imgName";

/// Read a checkpoint list. Only the first column is used; blank rows are skipped.
pub fn read_checkpoint<R: Read>(reader: R) -> Result<CheckpointTracker, FormatError> {
    let mut csv_reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_reader(reader);
    let headers = csv_reader.headers()?;
    if headers.get(0).map(str::trim) != Some(CHECKPOINT_COLUMN) {
        log::warn!(
            "Checkpoint header is {:?}, expected {:?}; reading first column anyway",
            headers.get(0).unwrap_or(""),
            CHECKPOINT_COLUMN
        );
    }

    let mut ids = Vec::new();
    for record in csv_reader.records() {
        let record = record?;
        let id = record.get(0).unwrap_or("").trim();
        if !id.is_empty() {
            ids.push(id.to_string());
        }
    }
    Ok(CheckpointTracker::from_ids(ids))
}

/// Load the checkpoint from disk. A missing file is an empty checkpoint.
pub fn load_checkpoint(path: &Path) -> Result<CheckpointTracker, FormatError> {
    if !path.exists() {
        log::info!("No checkpoint at {:?}, starting from the first tile", path);
        return Ok(CheckpointTracker::new());
    }
    let file = std::fs::File::open(path)?;
    let tracker = read_checkpoint(std::io::BufReader::new(file))?;
    log::info!("Loaded {} processed tiles from {:?}", tracker.len(), path);
    Ok(tracker)
}

/// Write the full checkpoint list.
pub fn write_checkpoint<W: Write>(writer: W, tracker: &CheckpointTracker) -> Result<(), FormatError> {
    let mut csv_writer = csv::Writer::from_writer(writer);
    csv_writer.write_record([CHECKPOINT_COLUMN])?;
    for id in tracker.processed() {
        csv_writer.write_record([id])?;
    }
    csv_writer.flush()?;
    Ok(())
}

/// Encode the checkpoint into an in-memory buffer.
pub fn checkpoint_to_bytes(tracker: &CheckpointTracker) -> Result<Vec<u8>, FormatError> {
    let mut bytes = Vec::new();
    write_checkpoint(&mut bytes, tracker)?;
    Ok(bytes)
}
