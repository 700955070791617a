//! Detection records and their reviewer verification state.

use std::fmt;
use std::str::FromStr;

use crate::constants::BOAT_CLASS;

/// Stable identifier for a detection, assigned by the store at load or append time.
pub type DetectionId = u64;

/// A 2D point in tile coordinate space.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance to another point.
    pub fn distance_to(&self, other: &Point) -> f64 {
        let dx = self.x - other.x;
        let dy = self.y - other.y;
        (dx * dx + dy * dy).sqrt()
    }
}

/// Reviewer outcome for a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Verification {
    /// Not reviewed yet.
    #[default]
    Unverified,
    /// The object exists but carries the wrong class.
    Misclassified,
    /// Not an object at all.
    Bad,
}

impl Verification {
    /// Tag written to the detection table. Unverified is written as an empty cell.
    pub fn as_tag(&self) -> &'static str {
        match self {
            Verification::Unverified => "",
            Verification::Misclassified => "misclassified",
            Verification::Bad => "bad",
        }
    }
}

impl fmt::Display for Verification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Verification::Unverified => f.write_str("unverified"),
            other => f.write_str(other.as_tag()),
        }
    }
}

/// Error returned when a verification cell holds an unknown tag.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown verification tag '{0}'")]
pub struct UnknownVerification(pub String);

impl FromStr for Verification {
    type Err = UnknownVerification;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Ok(Verification::Unverified);
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "unverified" | "none" => Ok(Verification::Unverified),
            "misclassified" => Ok(Verification::Misclassified),
            "bad" => Ok(Verification::Bad),
            _ => Err(UnknownVerification(trimmed.to_string())),
        }
    }
}

/// One row of the detection table.
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    /// Owning tile (or a chip name the tile id is a prefix of).
    pub tile_id: String,
    /// Position in tile coordinates. `None` for rows without coordinates.
    pub position: Option<Point>,
    /// Open-vocabulary class tag from the detector or reviewer.
    pub class: String,
    pub verification: Verification,
    /// Cells of non-core table columns, in header order.
    pub extra: Vec<String>,
}

impl Detection {
    /// Create an unverified detection.
    pub fn new(tile_id: impl Into<String>, position: Option<Point>, class: impl Into<String>) -> Self {
        Self {
            tile_id: tile_id.into(),
            position,
            class: class.into(),
            verification: Verification::Unverified,
            extra: Vec::new(),
        }
    }

    /// Create a detection at a point.
    pub fn at(tile_id: impl Into<String>, x: f64, y: f64, class: impl Into<String>) -> Self {
        Self::new(tile_id, Some(Point::new(x, y)), class)
    }

    /// Set the verification tag.
    pub fn with_verification(mut self, verification: Verification) -> Self {
        self.verification = verification;
        self
    }

    /// Whether this detection belongs to the tile, by exact id or chip-name prefix.
    pub fn belongs_to(&self, tile_id: &str) -> bool {
        self.tile_id.starts_with(tile_id)
    }
}

/// How the rendering collaborator should mark a detection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarkerKind {
    /// Added this tile, not yet committed.
    Pending,
    /// Reviewed and tagged.
    Verified(Verification),
    /// Unreviewed boat detection.
    Boat,
    /// Unreviewed detection of any other class.
    Other,
}

impl MarkerKind {
    /// Marker for a committed detection.
    pub fn for_detection(detection: &Detection) -> Self {
        match detection.verification {
            Verification::Unverified if detection.class == BOAT_CLASS => MarkerKind::Boat,
            Verification::Unverified => MarkerKind::Other,
            tag @ (Verification::Misclassified | Verification::Bad) => MarkerKind::Verified(tag),
        }
    }
}
