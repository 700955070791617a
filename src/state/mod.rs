//! Review progress and tile collection state.

mod checkpoint;
mod project;

pub use checkpoint::CheckpointTracker;
pub use project::{TileCatalog, has_extension};
