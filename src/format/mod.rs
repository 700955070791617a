//! Dataset file formats and crash-safe persistence.
//!
//! ## Files
//!
//! - **Detection table**: CSV, one row per detection, extra detector columns
//!   preserved (see [`detection_table`])
//! - **Checkpoint**: single-column CSV of reviewed tile ids
//! - **Backups**: timestamped copies of both, rotated by age
//!
//! Every write replaces its target atomically, and [`PersistenceManager`] is the
//! only code that touches these files during a session.

mod atomic;
pub mod backup;
pub mod checkpoint_file;
pub mod detection_table;
mod error;
mod persistence;

pub use atomic::write_atomically;
pub use backup::{BackupRotation, BackupSet};
pub use detection_table::{LoadReport, RejectedRow, TableLayout};
pub use error::{FormatError, MalformedRecordError, PersistenceError};
pub use persistence::{DatasetPaths, OpenedDataset, PersistenceManager};
