//! Replace-by-rename file writes.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;

use super::error::PersistenceError;

/// Write `bytes` to `path` so readers see either the old file or the new one.
///
/// Data goes to a temporary file next to `path`, is synced, then renamed over it.
pub fn write_atomically(path: &Path, bytes: &[u8]) -> Result<(), PersistenceError> {
    let parent = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from("."));
    std::fs::create_dir_all(&parent).map_err(|e| PersistenceError::new(path, e))?;

    let mut tmp = NamedTempFile::new_in(&parent).map_err(|e| PersistenceError::new(path, e))?;
    tmp.write_all(bytes).map_err(|e| PersistenceError::new(path, e))?;
    tmp.flush().map_err(|e| PersistenceError::new(path, e))?;
    tmp.as_file()
        .sync_all()
        .map_err(|e| PersistenceError::new(path, e))?;
    tmp.persist(path)
        .map_err(|e| PersistenceError::new(path, e.error))?;
    log::trace!("Wrote {} bytes to {:?}", bytes.len(), path);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_replaces_existing_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("table.csv");
        std::fs::write(&path, "old").unwrap();

        write_atomically(&path, b"new").unwrap();
        assert_eq!(std::fs::read_to_string(&path).unwrap(), "new");
        // No temporary files left behind
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 1);
    }

    #[test]
    fn test_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/out.csv");
        write_atomically(&path, b"x").unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_failure_leaves_target_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "i am a file").unwrap();

        let err = write_atomically(&blocker.join("out.csv"), b"x").unwrap_err();
        assert_eq!(err.path, blocker.join("out.csv"));
        assert_eq!(std::fs::read_to_string(&blocker).unwrap(), "i am a file");
    }
}
