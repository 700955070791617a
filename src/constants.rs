//! Global constants for the tilecheck review engine

/// Class assigned to detections the reviewer places by hand.
pub const NEW_DETECTION_CLASS: &str = "new_detection";

/// Detector class for boats.
pub const BOAT_CLASS: &str = "boat";

/// Detector class for boat wakes.
pub const BOAT_WAKE_CLASS: &str = "boat_wake";

/// Classes the presentation layer always reports, even when absent from a tile.
pub const COUNTED_CLASSES: &[&str] = &[BOAT_CLASS, BOAT_WAKE_CLASS];

/// Default click-to-detection selection radius, in tile coordinate units.
pub const DEFAULT_SELECTION_TOLERANCE: f64 = 500.0;

/// Press/release drift per axis at which a pointer gesture stops counting as a click.
pub const CLICK_DRIFT_TOLERANCE: f64 = 5.0;

/// Default number of backup pairs kept on disk.
pub const DEFAULT_KEEP_BACKUPS: usize = 5;

/// Default raster extensions scanned during tile discovery.
pub const DEFAULT_TILE_EXTENSIONS: &[&str] = &["tif", "tiff"];

/// Default checkpoint file name.
pub const DEFAULT_CHECKPOINT_FILE: &str = "processed.csv";

/// Default backup directory name.
pub const DEFAULT_BACKUP_DIR: &str = "backups";
