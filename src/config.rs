//! Configuration file support for tilecheck.
//!
//! A session is described by a JSON file naming the tile directory, the dataset
//! files and the review preferences. Relative paths are resolved against the
//! directory containing the config file.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::constants::{
    DEFAULT_BACKUP_DIR, DEFAULT_CHECKPOINT_FILE, DEFAULT_KEEP_BACKUPS,
    DEFAULT_SELECTION_TOLERANCE, DEFAULT_TILE_EXTENSIONS,
};
use crate::format::DatasetPaths;
use crate::keybindings::KeyBindings;

/// Log level setting for the application.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Show only errors
    Error,
    /// Show errors and warnings
    Warn,
    /// Show errors, warnings, and info messages
    #[default]
    Info,
    /// Show debug-level logging
    Debug,
    /// Show all log messages including trace
    Trace,
}

impl LogLevel {
    /// Convert to log crate's LevelFilter.
    pub fn to_level_filter(&self) -> log::LevelFilter {
        match self {
            LogLevel::Error => log::LevelFilter::Error,
            LogLevel::Warn => log::LevelFilter::Warn,
            LogLevel::Info => log::LevelFilter::Info,
            LogLevel::Debug => log::LevelFilter::Debug,
            LogLevel::Trace => log::LevelFilter::Trace,
        }
    }
}

/// Current configuration file format version.
/// Increment this when making breaking changes to the config format.
pub const CONFIG_VERSION: u32 = 1;

/// Review session configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Version of the configuration file format
    pub version: u32,

    /// Root folder scanned recursively for tiles
    pub tile_directory: PathBuf,

    /// Raster extensions considered tiles
    #[serde(default = "default_tile_extensions")]
    pub tile_extensions: Vec<String>,

    /// Detection table read at start and rewritten on every commit
    pub detection_database_path: PathBuf,

    /// Processed-tiles checkpoint
    #[serde(default = "default_checkpoint_path")]
    pub checkpoint_path: PathBuf,

    /// Backup directory
    #[serde(default = "default_backup_directory")]
    pub backup_directory: PathBuf,

    /// Number of backup pairs to keep
    #[serde(default = "default_keep_backups")]
    pub keep_backups: usize,

    /// Click-to-detection selection radius in tile coordinates
    #[serde(default = "default_selection_tolerance")]
    pub selection_tolerance: f64,

    /// Restore the table from `template_path` and clear the checkpoint before starting
    #[serde(default)]
    pub fresh_start: bool,

    /// Pristine detection table used by fresh start
    #[serde(default)]
    pub template_path: Option<PathBuf>,

    /// Keybinding configuration
    #[serde(default)]
    pub keybindings: KeyBindings,

    /// Log verbosity level
    #[serde(default)]
    pub log_level: LogLevel,
}

fn default_tile_extensions() -> Vec<String> {
    DEFAULT_TILE_EXTENSIONS.iter().map(|e| e.to_string()).collect()
}

fn default_checkpoint_path() -> PathBuf {
    PathBuf::from(DEFAULT_CHECKPOINT_FILE)
}

fn default_backup_directory() -> PathBuf {
    PathBuf::from(DEFAULT_BACKUP_DIR)
}

fn default_keep_backups() -> usize {
    DEFAULT_KEEP_BACKUPS
}

fn default_selection_tolerance() -> f64 {
    DEFAULT_SELECTION_TOLERANCE
}

impl SessionConfig {
    /// Create a configuration with default preferences.
    pub fn new(tile_directory: impl Into<PathBuf>, detection_database_path: impl Into<PathBuf>) -> Self {
        Self {
            version: CONFIG_VERSION,
            tile_directory: tile_directory.into(),
            tile_extensions: default_tile_extensions(),
            detection_database_path: detection_database_path.into(),
            checkpoint_path: default_checkpoint_path(),
            backup_directory: default_backup_directory(),
            keep_backups: default_keep_backups(),
            selection_tolerance: default_selection_tolerance(),
            fresh_start: false,
            template_path: None,
            keybindings: KeyBindings::default(),
            log_level: LogLevel::default(),
        }
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Deserialize and validate configuration from JSON.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;

        // Validate version compatibility
        if config.version > CONFIG_VERSION {
            return Err(ConfigError::VersionTooNew {
                file_version: config.version,
                supported_version: CONFIG_VERSION,
            });
        }

        config.validate()?;
        Ok(config)
    }

    /// Load a config file, resolving relative paths against its directory.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path)?;
        let mut config = Self::from_json(&json)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Check values serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.selection_tolerance.is_finite() && self.selection_tolerance > 0.0) {
            return Err(ConfigError::invalid(format!(
                "selection_tolerance must be a positive number, got {}",
                self.selection_tolerance
            )));
        }
        if self.tile_extensions.is_empty() {
            return Err(ConfigError::invalid("tile_extensions is empty"));
        }
        if self.fresh_start && self.template_path.is_none() {
            return Err(ConfigError::invalid("fresh_start requires template_path"));
        }
        if let Some(key) = self.keybindings.find_conflict() {
            return Err(ConfigError::invalid(format!(
                "key '{key}' is bound to more than one command"
            )));
        }
        Ok(())
    }

    /// Make every relative path absolute against `base`.
    pub fn resolve_relative_to(&mut self, base: &Path) {
        let resolve = |p: &mut PathBuf| {
            if p.is_relative() {
                *p = base.join(&*p);
            }
        };
        resolve(&mut self.tile_directory);
        resolve(&mut self.detection_database_path);
        resolve(&mut self.checkpoint_path);
        resolve(&mut self.backup_directory);
        if let Some(template) = self.template_path.as_mut() {
            resolve(template);
        }
    }

    /// Dataset file locations.
    pub fn dataset_paths(&self) -> DatasetPaths {
        DatasetPaths {
            table: self.detection_database_path.clone(),
            checkpoint: self.checkpoint_path.clone(),
            backups: self.backup_directory.clone(),
        }
    }

    /// Get the default filename for the session config.
    pub fn default_filename() -> &'static str {
        "tilecheck.json"
    }

    /// Get the default config file path when none is given.
    pub fn default_path() -> Option<PathBuf> {
        // Try to use XDG config directory, fall back to home directory
        if let Some(config_dir) = dirs::config_dir() {
            Some(config_dir.join("tilecheck").join(Self::default_filename()))
        } else {
            dirs::home_dir().map(|home_dir| {
                home_dir
                    .join(".config")
                    .join("tilecheck")
                    .join(Self::default_filename())
            })
        }
    }
}

/// Errors that can occur when loading configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// JSON parsing error
    #[error("Failed to parse configuration: {0}")]
    ParseError(#[from] serde_json::Error),

    /// Configuration version is newer than supported
    #[error(
        "Configuration file version {file_version} is newer than supported version {supported_version}"
    )]
    VersionTooNew {
        file_version: u32,
        supported_version: u32,
    },

    /// A value is out of range or inconsistent
    #[error("Invalid configuration: {0}")]
    Invalid(String),

    /// I/O error when reading config
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Invalid(message.into())
    }
}
