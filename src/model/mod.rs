//! Data models for the review engine.

mod detection;
mod tile;

pub use detection::{
    Detection, DetectionId, MarkerKind, Point, UnknownVerification, Verification,
};
pub use tile::{Bounds, Tile, tile_id_from_path};
