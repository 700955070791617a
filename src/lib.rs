//! tilecheck - Tile Review Annotation Tool
//!
//! A session engine for reviewing object detections tile by tile: label detector
//! output as misclassified or bad, add missed detections, and resume where the
//! last session stopped.

pub mod config;
pub mod constants;
pub mod error;
pub mod format;
pub mod interaction;
pub mod keybindings;
pub mod model;
pub mod selection;
pub mod session;
pub mod state;
pub mod store;
pub mod terminal;

pub use config::SessionConfig;
pub use error::SessionError;
pub use session::{ReviewHost, SessionController, SessionSummary};
