//! Timestamped backups of the dataset files with a retention limit.
//!
//! Each backup is a pair of files sharing one timestamp:
//! `detectionTable_<stamp>.csv` and `checkpoint_<stamp>.csv`. Retention only
//! ever touches files that follow this naming scheme.

use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{Local, NaiveDateTime};

use super::error::PersistenceError;

/// Kind tag for detection table backups.
pub const TABLE_KIND: &str = "detectionTable";
/// Kind tag for checkpoint backups.
pub const CHECKPOINT_KIND: &str = "checkpoint";

const STAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.6f";
const EXTENSION: &str = "csv";

/// Files written by one backup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupSet {
    pub table: PathBuf,
    /// Absent when there was no checkpoint file to copy.
    pub checkpoint: Option<PathBuf>,
}

/// Backup directory with a keep-last-N policy.
#[derive(Debug, Clone)]
pub struct BackupRotation {
    dir: PathBuf,
    keep_last: usize,
}

impl BackupRotation {
    /// Create a rotation. `keep_last` below 1 is raised to 1.
    pub fn new(dir: impl Into<PathBuf>, keep_last: usize) -> Self {
        Self {
            dir: dir.into(),
            keep_last: keep_last.max(1),
        }
    }

    pub fn keep_last(&self) -> usize {
        self.keep_last
    }

    /// Copy the dataset files into the backup directory, then prune old backups.
    pub fn backup(&self, table: &Path, checkpoint: &Path) -> Result<BackupSet, PersistenceError> {
        let set = self.create(table, checkpoint)?;
        let removed = self.prune()?;
        log::info!(
            "Backed up dataset to {:?} ({} old backup files removed)",
            set.table,
            removed.len()
        );
        Ok(set)
    }

    /// Copy the dataset files under a fresh timestamp.
    pub fn create(&self, table: &Path, checkpoint: &Path) -> Result<BackupSet, PersistenceError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| PersistenceError::new(&self.dir, e))?;

        let stamp = Local::now().format(STAMP_FORMAT).to_string();
        let (table_dst, checkpoint_dst) = self.free_names(&stamp);

        std::fs::copy(table, &table_dst).map_err(|e| PersistenceError::new(&table_dst, e))?;

        let checkpoint = if checkpoint.exists() {
            std::fs::copy(checkpoint, &checkpoint_dst)
                .map_err(|e| PersistenceError::new(&checkpoint_dst, e))?;
            Some(checkpoint_dst)
        } else {
            log::debug!("No checkpoint at {:?}, backing up the table only", checkpoint);
            None
        };

        Ok(BackupSet {
            table: table_dst,
            checkpoint,
        })
    }

    /// Delete the oldest backups of each kind beyond `keep_last`.
    ///
    /// Age is file modification time, ties broken by name. Returns the deleted paths.
    pub fn prune(&self) -> Result<Vec<PathBuf>, PersistenceError> {
        let mut removed = Vec::new();
        for kind in [TABLE_KIND, CHECKPOINT_KIND] {
            let mut files = self.list(kind)?;
            if files.len() <= self.keep_last {
                continue;
            }
            files.sort();
            let excess = files.len() - self.keep_last;
            for (_, path) in files.into_iter().take(excess) {
                std::fs::remove_file(&path).map_err(|e| PersistenceError::new(&path, e))?;
                log::debug!("Removed old backup {:?}", path);
                removed.push(path);
            }
        }
        Ok(removed)
    }

    /// Backups of one kind, oldest first.
    pub fn backups(&self, kind: &str) -> Result<Vec<PathBuf>, PersistenceError> {
        let mut files = self.list(kind)?;
        files.sort();
        Ok(files.into_iter().map(|(_, path)| path).collect())
    }

    fn list(&self, kind: &str) -> Result<Vec<((SystemTime, String), PathBuf)>, PersistenceError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(PersistenceError::new(&self.dir, e)),
        };

        let mut files = Vec::new();
        for entry in entries.filter_map(|e| e.ok()) {
            let name = entry.file_name().to_string_lossy().into_owned();
            if !is_backup_name(&name, kind) {
                continue;
            }
            let modified = entry
                .metadata()
                .and_then(|m| m.modified())
                .map_err(|e| PersistenceError::new(entry.path(), e))?;
            files.push(((modified, name), entry.path()));
        }
        Ok(files)
    }

    /// Pick file names for `stamp` that collide with no existing backup.
    fn free_names(&self, stamp: &str) -> (PathBuf, PathBuf) {
        let mut suffix = String::new();
        let mut n = 0;
        loop {
            let table = self.dir.join(format!("{TABLE_KIND}_{stamp}{suffix}.{EXTENSION}"));
            let checkpoint = self
                .dir
                .join(format!("{CHECKPOINT_KIND}_{stamp}{suffix}.{EXTENSION}"));
            if !table.exists() && !checkpoint.exists() {
                return (table, checkpoint);
            }
            n += 1;
            suffix = format!("_{n}");
        }
    }
}

/// `<kind>_<stamp>.csv` or `<kind>_<stamp>_<n>.csv`, with `stamp` in [`STAMP_FORMAT`].
fn is_backup_name(name: &str, kind: &str) -> bool {
    let Some(stem) = name
        .strip_prefix(kind)
        .and_then(|rest| rest.strip_prefix('_'))
        .and_then(|rest| rest.strip_suffix(EXTENSION))
        .and_then(|rest| rest.strip_suffix('.'))
    else {
        return false;
    };
    let stamp = match stem.rsplit_once('_') {
        Some((stamp, n)) if !n.is_empty() && n.bytes().all(|b| b.is_ascii_digit()) => stamp,
        _ => stem,
    };
    NaiveDateTime::parse_from_str(stamp, STAMP_FORMAT).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dataset(dir: &Path) -> (PathBuf, PathBuf) {
        let table = dir.join("table.csv");
        let checkpoint = dir.join("processed.csv");
        std::fs::write(&table, "tileId,x,y,class,verification\n").unwrap();
        std::fs::write(&checkpoint, "imgName\nT1\n").unwrap();
        (table, checkpoint)
    }

    #[test]
    fn test_backup_name_matching() {
        assert!(is_backup_name("detectionTable_20240101T000000.000001.csv", TABLE_KIND));
        assert!(is_backup_name("checkpoint_20240101T000000.000001_2.csv", CHECKPOINT_KIND));
        assert!(!is_backup_name("checkpoint_20240101T000000.000001.csv", TABLE_KIND));
        assert!(!is_backup_name("detectionTable.csv", TABLE_KIND));
        assert!(!is_backup_name("detectionTable_notes.txt", TABLE_KIND));
    }

    #[test]
    fn test_backup_copies_both_files() {
        let dir = tempfile::tempdir().unwrap();
        let (table, checkpoint) = dataset(dir.path());
        let rotation = BackupRotation::new(dir.path().join("backups"), 5);

        let set = rotation.backup(&table, &checkpoint).unwrap();
        assert_eq!(
            std::fs::read_to_string(&set.table).unwrap(),
            std::fs::read_to_string(&table).unwrap()
        );
        let copied = set.checkpoint.expect("checkpoint should be backed up");
        assert_eq!(std::fs::read_to_string(copied).unwrap(), "imgName\nT1\n");
    }

    #[test]
    fn test_backup_without_checkpoint() {
        let dir = tempfile::tempdir().unwrap();
        let (table, checkpoint) = dataset(dir.path());
        std::fs::remove_file(&checkpoint).unwrap();
        let rotation = BackupRotation::new(dir.path().join("backups"), 5);

        let set = rotation.backup(&table, &checkpoint).unwrap();
        assert!(set.table.exists());
        assert_eq!(set.checkpoint, None);
    }

    #[test]
    fn test_rotation_keeps_most_recent() {
        let dir = tempfile::tempdir().unwrap();
        let (table, checkpoint) = dataset(dir.path());
        let rotation = BackupRotation::new(dir.path().join("backups"), 5);

        let mut created = Vec::new();
        for _ in 0..7 {
            created.push(rotation.backup(&table, &checkpoint).unwrap());
            std::thread::sleep(std::time::Duration::from_millis(5));
        }

        let tables = rotation.backups(TABLE_KIND).unwrap();
        let checkpoints = rotation.backups(CHECKPOINT_KIND).unwrap();
        assert_eq!(tables.len(), 5);
        assert_eq!(checkpoints.len(), 5);

        let expected_tables: Vec<PathBuf> = created[2..].iter().map(|s| s.table.clone()).collect();
        let expected_checkpoints: Vec<PathBuf> = created[2..]
            .iter()
            .map(|s| s.checkpoint.clone().unwrap())
            .collect();
        assert_eq!(tables, expected_tables);
        assert_eq!(checkpoints, expected_checkpoints);
        for old in &created[..2] {
            assert!(!old.table.exists());
        }
    }

    #[test]
    fn test_prune_ignores_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        let (table, checkpoint) = dataset(dir.path());
        let backups = dir.path().join("backups");
        std::fs::create_dir_all(&backups).unwrap();
        std::fs::write(backups.join("notes.txt"), "keep me").unwrap();
        std::fs::write(backups.join("detectionTable_notes.csv"), "keep me too").unwrap();

        let rotation = BackupRotation::new(&backups, 1);
        rotation.backup(&table, &checkpoint).unwrap();
        rotation.backup(&table, &checkpoint).unwrap();

        assert!(backups.join("notes.txt").exists());
        assert!(backups.join("detectionTable_notes.csv").exists());
        assert_eq!(rotation.backups(TABLE_KIND).unwrap().len(), 1);
    }

    #[test]
    fn test_backup_name_scheme() {
        assert!(is_backup_name("detectionTable_20240301T101500.123456.csv", TABLE_KIND));
        assert!(is_backup_name("checkpoint_20240301T101500.123456_2.csv", CHECKPOINT_KIND));
        assert!(!is_backup_name("detectionTable_notes.csv", TABLE_KIND));
        assert!(!is_backup_name("detectionTable_20240301T101500.123456_x.csv", TABLE_KIND));
        assert!(!is_backup_name("checkpoint_20240301T101500.123456.csv", TABLE_KIND));
        assert!(!is_backup_name("detectionTable_.csv", TABLE_KIND));
    }

    #[test]
    fn test_keep_last_zero_keeps_one() {
        let rotation = BackupRotation::new("unused", 0);
        assert_eq!(rotation.keep_last(), 1);
    }

    #[test]
    fn test_same_stamp_gets_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let rotation = BackupRotation::new(dir.path(), 5);
        let (first, _) = rotation.free_names("S");
        std::fs::write(&first, "").unwrap();
        let (second, second_cp) = rotation.free_names("S");
        assert_eq!(second, dir.path().join("detectionTable_S_1.csv"));
        assert_eq!(second_cp, dir.path().join("checkpoint_S_1.csv"));
    }
}
