//! Detection table storage and per-tile slicing.
//!
//! The store owns every committed [`Detection`] in table order. Each row gets a
//! [`DetectionId`] when it enters the store; ids increase monotonically and are
//! never reused, so selections stay valid no matter how the table is written out.

use std::collections::BTreeMap;

use crate::constants::COUNTED_CLASSES;
use crate::model::{Detection, DetectionId, Verification};

/// A mutation targeted a detection id the store does not hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
#[error("no detection with id {0}")]
pub struct NotFoundError(pub DetectionId);

/// Position in the table that [`DetectionStore::rollback_to`] can return to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StoreMark {
    len: usize,
    next_id: DetectionId,
}

/// Per-class detection counts for one tile.
///
/// Lookups of classes that never occur return 0.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClassCounts(BTreeMap<String, usize>);

impl ClassCounts {
    /// Count for a class, 0 when absent.
    pub fn get(&self, class: &str) -> usize {
        self.0.get(class).copied().unwrap_or(0)
    }

    /// All classes with their counts, sorted by class name.
    pub fn iter(&self) -> impl Iterator<Item = (&str, usize)> {
        self.0.iter().map(|(class, count)| (class.as_str(), *count))
    }

    fn bump(&mut self, class: &str) {
        *self.0.entry(class.to_string()).or_insert(0) += 1;
    }
}

/// Storage for the full detection table.
#[derive(Debug, Clone)]
pub struct DetectionStore {
    /// Rows in table order. Ids are strictly increasing along the vector.
    rows: Vec<(DetectionId, Detection)>,
    /// Counter for generating unique detection ids.
    next_id: DetectionId,
    /// Set when rows or verifications change; cleared after a successful write.
    dirty: bool,
}

impl Default for DetectionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl DetectionStore {
    pub fn new() -> Self {
        Self {
            rows: Vec::new(),
            next_id: 1,
            dirty: false,
        }
    }

    /// Build a store from rows in table order.
    pub fn from_detections(detections: impl IntoIterator<Item = Detection>) -> Self {
        let mut store = Self::new();
        store.append_detections(detections);
        store.dirty = false;
        store
    }

    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    #[inline]
    pub fn clear_dirty(&mut self) {
        self.dirty = false;
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// All rows in table order.
    pub fn iter(&self) -> impl Iterator<Item = (DetectionId, &Detection)> {
        self.rows.iter().map(|(id, det)| (*id, det))
    }

    /// Get a detection by id.
    pub fn get(&self, id: DetectionId) -> Option<&Detection> {
        self.position_of(id).map(|pos| &self.rows[pos].1)
    }

    /// All detections of a tile (exact id or chip-name prefix), in table order.
    pub fn detections_for_tile(&self, tile_id: &str) -> Vec<(DetectionId, &Detection)> {
        self.iter().filter(|(_, det)| det.belongs_to(tile_id)).collect()
    }

    /// Record a reviewer outcome for a detection.
    pub fn set_verification(
        &mut self,
        id: DetectionId,
        status: Verification,
    ) -> Result<(), NotFoundError> {
        let pos = self.position_of(id).ok_or(NotFoundError(id))?;
        let detection = &mut self.rows[pos].1;
        if detection.verification != status {
            log::debug!(
                "Detection {} verification {} -> {}",
                id,
                detection.verification,
                status
            );
            detection.verification = status;
            self.dirty = true;
        }
        Ok(())
    }

    /// Append rows to the end of the table, returning their new ids in order.
    pub fn append_detections(
        &mut self,
        detections: impl IntoIterator<Item = Detection>,
    ) -> Vec<DetectionId> {
        let mut ids = Vec::new();
        for detection in detections {
            let id = self.next_id;
            self.next_id += 1;
            self.rows.push((id, detection));
            ids.push(id);
        }
        if !ids.is_empty() {
            self.dirty = true;
        }
        ids
    }

    /// Per-class counts for a tile. Boat and wake classes are always present.
    pub fn class_counts(&self, tile_id: &str) -> ClassCounts {
        let mut counts = ClassCounts::default();
        for class in COUNTED_CLASSES {
            counts.0.insert((*class).to_string(), 0);
        }
        for (_, det) in self.iter().filter(|(_, det)| det.belongs_to(tile_id)) {
            counts.bump(&det.class);
        }
        counts
    }

    /// Remember the current end of the table.
    pub fn mark(&self) -> StoreMark {
        StoreMark {
            len: self.rows.len(),
            next_id: self.next_id,
        }
    }

    /// Drop every row appended after `mark`, returning them in order.
    ///
    /// Ids handed out after the mark are released so a retried append gets the
    /// same ids again.
    pub fn rollback_to(&mut self, mark: StoreMark) -> Vec<Detection> {
        if mark.len >= self.rows.len() {
            return Vec::new();
        }
        let removed: Vec<Detection> = self.rows.drain(mark.len..).map(|(_, det)| det).collect();
        self.next_id = mark.next_id;
        self.dirty = true;
        log::debug!("Rolled back {} appended detections", removed.len());
        removed
    }

    fn position_of(&self, id: DetectionId) -> Option<usize> {
        self.rows.binary_search_by_key(&id, |(row_id, _)| *row_id).ok()
    }
}
