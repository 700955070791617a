//! Record of fully reviewed tiles.

use std::collections::HashSet;

/// Ordered, duplicate-free set of processed tile ids.
///
/// Pure in-memory state; the checkpoint file codec in `format` loads and
/// writes it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CheckpointTracker {
    /// Processed ids in the order they were marked.
    order: Vec<String>,
    seen: HashSet<String>,
}

impl CheckpointTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tracker from ids in file order. Duplicates keep their first position.
    pub fn from_ids(ids: impl IntoIterator<Item = String>) -> Self {
        let mut tracker = Self::new();
        for id in ids {
            tracker.mark_processed(&id);
        }
        tracker
    }

    pub fn is_processed(&self, tile_id: &str) -> bool {
        self.seen.contains(tile_id)
    }

    /// Mark a tile as reviewed. Returns `false` if it already was.
    pub fn mark_processed(&mut self, tile_id: &str) -> bool {
        if !self.seen.insert(tile_id.to_string()) {
            return false;
        }
        self.order.push(tile_id.to_string());
        true
    }

    /// Undo the most recent mark of `tile_id`. Used when its commit fails.
    pub(crate) fn unmark(&mut self, tile_id: &str) {
        if self.seen.remove(tile_id) {
            self.order.retain(|id| id != tile_id);
        }
    }

    /// Tiles from `all_tile_ids` not yet processed, in input order.
    pub fn remaining<'a, S: AsRef<str>>(&self, all_tile_ids: &'a [S]) -> Vec<&'a str> {
        let mut remaining = Vec::new();
        for id in all_tile_ids {
            let id: &'a str = id.as_ref();
            if !self.is_processed(id) {
                remaining.push(id);
            }
        }
        remaining
    }

    /// Processed ids in marking order.
    pub fn processed(&self) -> &[String] {
        &self.order
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
