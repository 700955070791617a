//! Durable storage of the detection table and checkpoint.
//!
//! All file I/O of a review session goes through [`PersistenceManager`]. A tile
//! counts as committed only once both the table and the checkpoint are on disk;
//! the table is always written first, and a failed checkpoint write rolls the
//! table back so a retried tile never duplicates its added detections.

use std::path::{Path, PathBuf};

use super::atomic::write_atomically;
use super::backup::{BackupRotation, BackupSet};
use super::checkpoint_file::{checkpoint_to_bytes, load_checkpoint};
use super::detection_table::{LoadReport, RejectedRow, TableLayout, load_table, table_to_bytes};
use super::error::{FormatError, PersistenceError};
use crate::model::{Detection, DetectionId};
use crate::state::CheckpointTracker;
use crate::store::DetectionStore;

/// Locations of the dataset files.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatasetPaths {
    /// Detection table (read at open, rewritten on every commit)
    pub table: PathBuf,
    /// Processed-tiles checkpoint
    pub checkpoint: PathBuf,
    /// Directory for timestamped backups
    pub backups: PathBuf,
}

/// Everything loaded when a dataset is opened.
#[derive(Debug)]
pub struct OpenedDataset {
    pub persistence: PersistenceManager,
    pub store: DetectionStore,
    pub tracker: CheckpointTracker,
    pub report: LoadReport,
}

/// Durable replace of one file.
pub(crate) type WriteFn = fn(&Path, &[u8]) -> Result<(), PersistenceError>;

/// Writes session state to disk.
#[derive(Debug, Clone)]
pub struct PersistenceManager {
    paths: DatasetPaths,
    layout: TableLayout,
    /// Unparseable rows of the loaded table, written back on every save
    rejected: Vec<RejectedRow>,
    write: WriteFn,
}

impl PersistenceManager {
    pub fn new(paths: DatasetPaths, layout: TableLayout) -> Self {
        Self {
            paths,
            layout,
            rejected: Vec::new(),
            write: write_atomically,
        }
    }

    /// Carry these rows through every table write.
    pub fn with_rejected(mut self, rejected: Vec<RejectedRow>) -> Self {
        self.rejected = rejected;
        self
    }

    #[cfg(test)]
    pub(crate) fn with_writer(mut self, write: WriteFn) -> Self {
        self.write = write;
        self
    }

    /// Load the table and checkpoint. A missing checkpoint starts empty; a missing or
    /// unparseable table is an error.
    pub fn open(paths: DatasetPaths) -> Result<OpenedDataset, FormatError> {
        let (store, layout, report) = load_table(&paths.table)?;
        let tracker = load_checkpoint(&paths.checkpoint)?;
        Ok(OpenedDataset {
            persistence: Self::new(paths, layout).with_rejected(report.rejected.clone()),
            store,
            tracker,
            report,
        })
    }

    /// Reset the dataset: copy `template` over the table and clear the checkpoint.
    pub fn restore_template(paths: &DatasetPaths, template: &Path) -> Result<(), PersistenceError> {
        let bytes = std::fs::read(template).map_err(|e| PersistenceError::new(template, e))?;
        write_atomically(&paths.table, &bytes)?;
        let empty = checkpoint_to_bytes(&CheckpointTracker::new())
            .map_err(|e| PersistenceError::new(&paths.checkpoint, e))?;
        write_atomically(&paths.checkpoint, &empty)?;
        log::warn!(
            "Fresh start: restored {:?} from {:?} and cleared {:?}",
            paths.table,
            template,
            paths.checkpoint
        );
        Ok(())
    }

    pub fn paths(&self) -> &DatasetPaths {
        &self.paths
    }

    pub fn layout(&self) -> &TableLayout {
        &self.layout
    }

    /// Write the whole detection table.
    pub fn save_table(&self, store: &mut DetectionStore) -> Result<(), PersistenceError> {
        let bytes = table_to_bytes(store, &self.layout, &self.rejected)
            .map_err(|e| PersistenceError::new(&self.paths.table, e))?;
        (self.write)(&self.paths.table, &bytes)?;
        store.clear_dirty();
        log::debug!("Saved {} detections to {:?}", store.len(), self.paths.table);
        Ok(())
    }

    /// Write the whole checkpoint list.
    pub fn save_checkpoint(&self, tracker: &CheckpointTracker) -> Result<(), PersistenceError> {
        let bytes = checkpoint_to_bytes(tracker)
            .map_err(|e| PersistenceError::new(&self.paths.checkpoint, e))?;
        (self.write)(&self.paths.checkpoint, &bytes)
    }

    /// Merge a tile's pending detections, mark it processed and persist both files.
    ///
    /// On error nothing is committed: the appended rows are removed from `store`,
    /// the tile stays unprocessed, and the caller still holds `pending` for a retry.
    /// If the table cannot be rewritten without the appended rows after a failed
    /// checkpoint write, the error carries that failure in
    /// [`PersistenceError::rollback`]; a successful retry repairs the table.
    pub fn commit_tile(
        &self,
        tile_id: &str,
        pending: &[Detection],
        store: &mut DetectionStore,
        tracker: &mut CheckpointTracker,
    ) -> Result<Vec<DetectionId>, PersistenceError> {
        let mark = store.mark();
        let ids = store.append_detections(pending.iter().cloned());

        if let Err(e) = self.save_table(store) {
            store.rollback_to(mark);
            return Err(e);
        }

        let newly_marked = tracker.mark_processed(tile_id);
        if let Err(e) = self.save_checkpoint(tracker) {
            if newly_marked {
                tracker.unmark(tile_id);
            }
            if !store.rollback_to(mark).is_empty() {
                if let Err(restore) = self.save_table(store) {
                    log::error!(
                        "Could not roll back detection table after failed checkpoint write: {}",
                        restore
                    );
                    return Err(e.with_failed_rollback(restore));
                }
            }
            return Err(e);
        }

        log::info!(
            "Committed tile {} ({} new detections, {} tiles processed)",
            tile_id,
            ids.len(),
            tracker.len()
        );
        Ok(ids)
    }

    /// Merge detections without marking any tile, e.g. when exiting mid-tile.
    ///
    /// Also writes out pending verification changes. Rolls back on error.
    pub fn merge_detections(
        &self,
        pending: &[Detection],
        store: &mut DetectionStore,
    ) -> Result<Vec<DetectionId>, PersistenceError> {
        if pending.is_empty() && !store.is_dirty() {
            return Ok(Vec::new());
        }
        let mark = store.mark();
        let ids = store.append_detections(pending.iter().cloned());
        if let Err(e) = self.save_table(store) {
            store.rollback_to(mark);
            return Err(e);
        }
        Ok(ids)
    }

    /// Copy both dataset files into the backup directory, keeping the newest `keep_last`.
    pub fn backup(&self, keep_last: usize) -> Result<BackupSet, PersistenceError> {
        BackupRotation::new(&self.paths.backups, keep_last)
            .backup(&self.paths.table, &self.paths.checkpoint)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::detection_table::read_table;
    use crate::model::Verification;

    const TABLE: &str = "tileId,x,y,class,verification\nT1,0,0,boat,\nT1,100,100,boat_wake,\n";

    fn setup(dir: &Path) -> DatasetPaths {
        let paths = DatasetPaths {
            table: dir.join("detections.csv"),
            checkpoint: dir.join("processed.csv"),
            backups: dir.join("backups"),
        };
        std::fs::write(&paths.table, TABLE).unwrap();
        paths
    }

    fn new_detection(x: f64, y: f64) -> Detection {
        Detection::at("T1", x, y, "new_detection")
    }

    #[test]
    fn test_open_missing_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let opened = PersistenceManager::open(setup(dir.path())).unwrap();
        assert_eq!(opened.store.len(), 2);
        assert!(opened.tracker.is_empty());
    }

    #[test]
    fn test_open_missing_table_fails() {
        let dir = tempfile::tempdir().unwrap();
        let paths = setup(dir.path());
        std::fs::remove_file(&paths.table).unwrap();
        assert!(matches!(
            PersistenceManager::open(paths),
            Err(FormatError::Io(_))
        ));
    }

    #[test]
    fn test_commit_persists_table_and_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let OpenedDataset {
            persistence,
            mut store,
            mut tracker,
            ..
        } = PersistenceManager::open(setup(dir.path())).unwrap();

        store.set_verification(1, Verification::Bad).unwrap();
        let ids = persistence
            .commit_tile("T1", &[new_detection(50.0, 50.0)], &mut store, &mut tracker)
            .unwrap();
        assert_eq!(ids, vec![3]);
        assert!(!store.is_dirty());

        let reopened = PersistenceManager::open(persistence.paths().clone()).unwrap();
        assert!(reopened.tracker.is_processed("T1"));
        let rows = reopened.store.detections_for_tile("T1");
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].1.verification, Verification::Bad);
        assert_eq!(rows[2].1.class, "new_detection");
    }

    #[test]
    fn test_failed_checkpoint_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut paths = setup(dir.path());
        // A regular file where the checkpoint's directory should be
        let blocker = dir.path().join("blocked");
        std::fs::write(&blocker, "").unwrap();
        paths.checkpoint = blocker.join("processed.csv");

        let OpenedDataset {
            persistence,
            mut store,
            mut tracker,
            ..
        } = PersistenceManager::open(paths.clone()).unwrap();
        let pending = vec![new_detection(50.0, 50.0)];

        let err = persistence
            .commit_tile("T1", &pending, &mut store, &mut tracker)
            .unwrap_err();
        assert_eq!(err.path, paths.checkpoint);
        assert!(!tracker.is_processed("T1"));
        assert_eq!(store.len(), 2);

        // What a restarted session would see
        let on_disk = std::fs::read(&paths.table).unwrap();
        let (reloaded, _, _) = read_table(on_disk.as_slice()).unwrap();
        assert_eq!(reloaded.len(), 2);

        // Unblock and retry: the new detection lands exactly once
        std::fs::remove_file(&blocker).unwrap();
        persistence
            .commit_tile("T1", &pending, &mut store, &mut tracker)
            .unwrap();
        let reopened = PersistenceManager::open(paths).unwrap();
        assert!(reopened.tracker.is_processed("T1"));
        let added: Vec<_> = reopened
            .store
            .iter()
            .filter(|(_, d)| d.class == "new_detection")
            .collect();
        assert_eq!(added.len(), 1);
    }

    #[test]
    fn test_failed_table_write_rolls_back() {
        let dir = tempfile::tempdir().unwrap();
        let paths = setup(dir.path());
        let OpenedDataset {
            mut store,
            mut tracker,
            persistence,
            ..
        } = PersistenceManager::open(paths.clone()).unwrap();

        let broken = PersistenceManager::new(
            DatasetPaths {
                table: paths.checkpoint.join("nested/detections.csv"),
                ..paths.clone()
            },
            persistence.layout().clone(),
        );
        // Make the table's parent a file so the write fails
        std::fs::write(&paths.checkpoint, "imgName\n").unwrap();

        assert!(broken
            .commit_tile("T1", &[new_detection(1.0, 1.0)], &mut store, &mut tracker)
            .is_err());
        assert_eq!(store.len(), 2);
        assert!(tracker.is_empty());
    }

    #[test]
    fn test_merge_without_commit() {
        let dir = tempfile::tempdir().unwrap();
        let OpenedDataset {
            persistence,
            mut store,
            tracker,
            ..
        } = PersistenceManager::open(setup(dir.path())).unwrap();

        persistence
            .merge_detections(&[new_detection(5.0, 5.0)], &mut store)
            .unwrap();
        assert!(tracker.is_empty());

        let reopened = PersistenceManager::open(persistence.paths().clone()).unwrap();
        assert_eq!(reopened.store.len(), 3);
        assert!(reopened.tracker.is_empty());
    }

    #[test]
    fn test_restore_template() {
        let dir = tempfile::tempdir().unwrap();
        let paths = setup(dir.path());
        std::fs::write(&paths.checkpoint, "imgName\nT1\n").unwrap();
        std::fs::write(&paths.table, "garbage").unwrap();
        let template = dir.path().join("template.csv");
        std::fs::write(&template, TABLE).unwrap();

        PersistenceManager::restore_template(&paths, &template).unwrap();
        let opened = PersistenceManager::open(paths).unwrap();
        assert_eq!(opened.store.len(), 2);
        assert!(opened.tracker.is_empty());
    }

    #[test]
    fn test_backup_from_manager() {
        let dir = tempfile::tempdir().unwrap();
        let OpenedDataset {
            persistence,
            mut store,
            mut tracker,
            ..
        } = PersistenceManager::open(setup(dir.path())).unwrap();
        persistence
            .commit_tile("T1", &[], &mut store, &mut tracker)
            .unwrap();

        let set = persistence.backup(5).unwrap();
        assert!(set.table.starts_with(dir.path().join("backups")));
        assert!(set.checkpoint.is_some());
    }

    thread_local! {
        static WRITES: std::cell::Cell<usize> = const { std::cell::Cell::new(0) };
    }

    /// Lets the first write through, fails every later one.
    fn fail_after_first_write(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
        let n = WRITES.with(|w| {
            w.set(w.get() + 1);
            w.get()
        });
        if n == 1 {
            write_atomically(path, bytes)
        } else {
            Err(PersistenceError::new(path, std::io::Error::other("no space left on device")))
        }
    }

    #[test]
    fn test_failed_rollback_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let paths = setup(dir.path());
        let OpenedDataset {
            persistence,
            mut store,
            mut tracker,
            ..
        } = PersistenceManager::open(paths.clone()).unwrap();
        let failing = persistence.clone().with_writer(fail_after_first_write);
        let pending = vec![new_detection(50.0, 50.0)];

        let err = failing
            .commit_tile("T1", &pending, &mut store, &mut tracker)
            .unwrap_err();
        assert_eq!(err.path, paths.checkpoint);
        assert!(err.left_inconsistent());
        assert_eq!(err.rollback.as_ref().unwrap().path, paths.table);
        assert!(err.to_string().contains("rollback also failed"));
        assert!(!tracker.is_processed("T1"));
        assert_eq!(store.len(), 2);

        // The table on disk still has the appended row
        let on_disk = std::fs::read(&paths.table).unwrap();
        let (reloaded, _, _) = read_table(on_disk.as_slice()).unwrap();
        assert_eq!(reloaded.len(), 3);

        // A retry rewrites the table from memory, so the row lands once
        persistence
            .commit_tile("T1", &pending, &mut store, &mut tracker)
            .unwrap();
        let reopened = PersistenceManager::open(paths).unwrap();
        assert!(reopened.tracker.is_processed("T1"));
        assert_eq!(reopened.store.len(), 3);
    }

    #[test]
    fn test_rejected_rows_survive_commit() {
        let dir = tempfile::tempdir().unwrap();
        let paths = setup(dir.path());
        std::fs::write(
            &paths.table,
            "tileId,x,y,class,verification\nT1,0,0,boat,\nT2,4,,boat,\nT3,1,1,boat,good\n",
        )
        .unwrap();
        let OpenedDataset {
            persistence,
            mut store,
            mut tracker,
            report,
        } = PersistenceManager::open(paths.clone()).unwrap();
        assert_eq!(report.rejected.len(), 2);

        persistence
            .commit_tile("T1", &[new_detection(5.0, 5.0)], &mut store, &mut tracker)
            .unwrap();

        let text = std::fs::read_to_string(&paths.table).unwrap();
        assert_eq!(
            text,
            "tileId,x,y,class,verification\nT1,0,0,boat,\nT2,4,,boat,\nT3,1,1,boat,good\nT1,5,5,new_detection,\n"
        );
        let reopened = PersistenceManager::open(paths).unwrap();
        assert_eq!(reopened.store.len(), 2);
        assert_eq!(reopened.report.rejected.len(), 2);
    }
}
