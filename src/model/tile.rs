//! Tiles under review.

use std::path::{Path, PathBuf};

use super::Point;

/// Axis-aligned extent of a tile in its coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Bounds {
    /// Create bounds from two opposite corners in any order.
    pub fn new(x1: f64, y1: f64, x2: f64, y2: f64) -> Self {
        Self {
            min_x: x1.min(x2),
            min_y: y1.min(y2),
            max_x: x1.max(x2),
            max_y: y1.max(y2),
        }
    }

    /// Check if a point lies inside the bounds (edges inclusive).
    pub fn contains(&self, point: &Point) -> bool {
        point.x >= self.min_x && point.x <= self.max_x && point.y >= self.min_y && point.y <= self.max_y
    }
}

/// One raster unit under review.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    /// Identifier derived from the file stem.
    pub id: String,
    pub path: PathBuf,
    /// Extent reported by the rendering collaborator, if known.
    pub bounds: Option<Bounds>,
}

impl Tile {
    /// Build a tile from a raster path. Returns `None` for paths without a usable stem.
    pub fn from_path(path: impl Into<PathBuf>) -> Option<Self> {
        let path = path.into();
        let id = tile_id_from_path(&path)?;
        Some(Self {
            id,
            path,
            bounds: None,
        })
    }

    /// Check whether a point can be acted on. Unknown bounds accept everything.
    pub fn accepts(&self, point: &Point) -> bool {
        self.bounds.is_none_or(|b| b.contains(point))
    }
}

/// Derive a tile id from a raster path: the file name without its extension.
pub fn tile_id_from_path(path: &Path) -> Option<String> {
    path.file_stem()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .map(String::from)
}
