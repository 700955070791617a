//! Tile discovery on disk.

use std::path::{Path, PathBuf};

use crate::model::Tile;

/// Check if a path has one of the given extensions (case-insensitive).
pub fn has_extension(path: &Path, extensions: &[String]) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| extensions.iter().any(|e| e.eq_ignore_ascii_case(ext)))
        .unwrap_or(false)
}

/// The ordered collection of tiles found under a directory.
#[derive(Clone, Debug)]
pub struct TileCatalog {
    /// Root folder that was scanned
    pub folder: PathBuf,
    /// Tiles in lexical path order
    pub tiles: Vec<Tile>,
}

impl TileCatalog {
    /// Discover raster files recursively, sorted by full path.
    ///
    /// Unreadable subdirectories are logged and skipped; an unreadable root is an error.
    /// When two files share a stem, the first in path order wins and the rest are dropped.
    pub fn discover(folder: impl Into<PathBuf>, extensions: &[String]) -> std::io::Result<Self> {
        let folder = folder.into();
        let mut paths = Vec::new();
        scan_folder_recursive(&folder, extensions, &mut paths)?;
        paths.sort();

        let mut tiles: Vec<Tile> = Vec::with_capacity(paths.len());
        for path in paths {
            let Some(tile) = Tile::from_path(&path) else {
                log::warn!("Skipping tile with unusable name {:?}", path);
                continue;
            };
            if tiles.iter().any(|t| t.id == tile.id) {
                log::warn!("Duplicate tile id {} at {:?}, skipping", tile.id, path);
                continue;
            }
            tiles.push(tile);
        }

        log::info!(
            "Recursively scanned folder {:?}: found {} tiles",
            folder,
            tiles.len()
        );

        Ok(Self { folder, tiles })
    }

    /// Tile ids in discovery order.
    pub fn ids(&self) -> Vec<&str> {
        self.tiles.iter().map(|t| t.id.as_str()).collect()
    }

    /// Look up a tile by id.
    pub fn get(&self, tile_id: &str) -> Option<&Tile> {
        self.tiles.iter().find(|t| t.id == tile_id)
    }

    pub fn len(&self) -> usize {
        self.tiles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tiles.is_empty()
    }
}

fn scan_folder_recursive(
    folder: &Path,
    extensions: &[String],
    paths: &mut Vec<PathBuf>,
) -> std::io::Result<()> {
    for entry in std::fs::read_dir(folder)?.filter_map(|e| e.ok()) {
        let path = entry.path();

        if path.is_file() && has_extension(&path, extensions) {
            paths.push(path);
        } else if path.is_dir() {
            if let Err(e) = scan_folder_recursive(&path, extensions, paths) {
                log::warn!("Failed to scan subdirectory {:?}: {}", path, e);
            }
        }
    }
    Ok(())
}
