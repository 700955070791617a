//! Review session orchestration.
//!
//! [`SessionController`] walks the unprocessed tiles in discovery order, hands
//! each one to a [`ReviewHost`] for display and input, and commits it through
//! the [`PersistenceManager`] once the reviewer declares it done. Exiting merges
//! whatever was added on the current tile and takes a backup.

use crate::config::{ConfigError, SessionConfig};
use crate::constants::{BOAT_CLASS, BOAT_WAKE_CLASS};
use crate::error::{MissingTileFileError, SessionError};
use crate::format::{BackupSet, OpenedDataset, PersistenceError, PersistenceManager};
use crate::interaction::{InputEvent, InteractionStateMachine, Mode, SessionState, Transition};
use crate::model::{Bounds, Detection, DetectionId, MarkerKind, Point, Tile};
use crate::state::{CheckpointTracker, TileCatalog};
use crate::store::{ClassCounts, DetectionStore};

/// What to do after a failed write.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitDecision {
    Retry,
    Abort,
}

/// The rendering and input collaborator driving a session.
pub trait ReviewHost {
    /// Extent of the tile's raster, if the host can read it. Clicks outside are ignored.
    fn tile_bounds(&mut self, _tile: &Tile) -> Option<Bounds> {
        None
    }

    /// Show the current state of a tile.
    fn present(&mut self, frame: &Frame<'_>);

    /// Block until the next input event. `None` means input is closed and ends the session.
    fn next_event(&mut self) -> Option<InputEvent>;

    /// A durable write failed; decide whether to try again.
    fn persist_failed(&mut self, _error: &PersistenceError) -> CommitDecision {
        CommitDecision::Abort
    }

    /// A discovered tile could not be opened and was skipped.
    fn tile_skipped(&mut self, _error: &MissingTileFileError) {}
}

/// One drawable marker.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Marker {
    /// `None` for pending detections
    pub id: Option<DetectionId>,
    pub position: Point,
    pub kind: MarkerKind,
    pub selected: bool,
}

/// Read-only snapshot of a tile under review.
#[derive(Debug)]
pub struct Frame<'a> {
    pub tile: &'a Tile,
    pub mode: Mode,
    pub selected: Option<DetectionId>,
    /// The tile's committed detections in table order
    pub detections: Vec<(DetectionId, &'a Detection)>,
    /// Detections added on this tile, not yet committed
    pub pending: &'a [Detection],
    pub counts: ClassCounts,
}

impl<'a> Frame<'a> {
    pub fn new(state: &'a SessionState, store: &'a DetectionStore) -> Self {
        let tile = state.tile();
        Self {
            tile,
            mode: state.mode(),
            selected: state.selected(),
            detections: store.detections_for_tile(&tile.id),
            pending: state.pending(),
            counts: store.class_counts(&tile.id),
        }
    }

    /// Markers for every detection with coordinates, committed first, then pending.
    pub fn markers(&self) -> Vec<Marker> {
        let committed = self.detections.iter().filter_map(|(id, det)| {
            det.position.map(|position| Marker {
                id: Some(*id),
                position,
                kind: MarkerKind::for_detection(det),
                selected: self.selected == Some(*id),
            })
        });
        let pending = self.pending.iter().filter_map(|det| {
            det.position.map(|position| Marker {
                id: None,
                position,
                kind: MarkerKind::Pending,
                selected: false,
            })
        });
        committed.chain(pending).collect()
    }

    /// One-line heading for the tile.
    pub fn title(&self) -> String {
        format!(
            "Image {}, boats: {}, wakes: {}",
            self.tile.id,
            self.counts.get(BOAT_CLASS),
            self.counts.get(BOAT_WAKE_CLASS)
        )
    }
}

/// How a session ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionOutcome {
    /// Every remaining tile was visited.
    #[default]
    Finished,
    /// The reviewer exited early.
    Exited,
}

/// Result of a completed session.
#[derive(Debug, Clone, Default)]
pub struct SessionSummary {
    /// Tiles committed this session, in order
    pub reviewed: Vec<String>,
    /// Tiles skipped because their raster was gone
    pub skipped_missing: Vec<String>,
    /// Tiles still unprocessed afterwards
    pub remaining: usize,
    pub outcome: SessionOutcome,
    pub backup: Option<BackupSet>,
}

enum TileEnd {
    Complete,
    Exit,
}

/// Drives the per-tile review loop.
#[derive(Debug)]
pub struct SessionController {
    catalog: TileCatalog,
    store: DetectionStore,
    tracker: CheckpointTracker,
    persistence: PersistenceManager,
    machine: InteractionStateMachine,
    keep_backups: usize,
}

impl SessionController {
    pub fn new(
        catalog: TileCatalog,
        store: DetectionStore,
        tracker: CheckpointTracker,
        persistence: PersistenceManager,
        machine: InteractionStateMachine,
        keep_backups: usize,
    ) -> Self {
        Self {
            catalog,
            store,
            tracker,
            persistence,
            machine,
            keep_backups,
        }
    }

    /// Prepare a session: optional fresh start, dataset load, tile discovery.
    pub fn open(config: &SessionConfig) -> Result<Self, SessionError> {
        config.validate()?;
        let paths = config.dataset_paths();

        if config.fresh_start {
            let Some(template) = config.template_path.as_ref() else {
                return Err(ConfigError::Invalid("fresh_start requires template_path".into()).into());
            };
            if !template.is_file() {
                return Err(SessionError::MissingTemplate {
                    path: template.clone(),
                });
            }
            PersistenceManager::restore_template(&paths, template)?;
        }

        let OpenedDataset {
            persistence,
            store,
            tracker,
            report,
        } = PersistenceManager::open(paths)?;
        if !report.rejected.is_empty() {
            log::warn!(
                "{} malformed detection rows cannot be reviewed; they are kept unchanged in the table",
                report.rejected.len()
            );
        }

        let catalog = TileCatalog::discover(&config.tile_directory, &config.tile_extensions)
            .map_err(|source| SessionError::TileDirectory {
                path: config.tile_directory.clone(),
                source,
            })?;

        let machine =
            InteractionStateMachine::new(config.keybindings.clone(), config.selection_tolerance);
        Ok(Self::new(
            catalog,
            store,
            tracker,
            persistence,
            machine,
            config.keep_backups,
        ))
    }

    pub fn store(&self) -> &DetectionStore {
        &self.store
    }

    pub fn tracker(&self) -> &CheckpointTracker {
        &self.tracker
    }

    /// Unprocessed tiles in discovery order.
    pub fn remaining_tiles(&self) -> Vec<&Tile> {
        let ids = self.catalog.ids();
        self.tracker
            .remaining(&ids)
            .into_iter()
            .filter_map(|id| self.catalog.get(id))
            .collect()
    }

    /// Review tiles until the queue is empty or the reviewer exits.
    pub fn run<H: ReviewHost>(&mut self, host: &mut H) -> Result<SessionSummary, SessionError> {
        let queue: Vec<Tile> = self.remaining_tiles().into_iter().cloned().collect();
        log::info!(
            "{} of {} tiles left to review",
            queue.len(),
            self.catalog.len()
        );

        let mut summary = SessionSummary::default();
        for mut tile in queue {
            if !tile.path.exists() {
                let err = MissingTileFileError {
                    tile_id: tile.id.clone(),
                    path: tile.path.clone(),
                };
                log::warn!("{}", err);
                host.tile_skipped(&err);
                summary.skipped_missing.push(tile.id);
                continue;
            }

            tile.bounds = host.tile_bounds(&tile);
            let mut state = SessionState::new(tile);
            match self.review_tile(host, &mut state) {
                TileEnd::Complete => {
                    self.commit(host, &mut state)?;
                    summary.reviewed.push(state.tile().id.clone());
                }
                TileEnd::Exit => {
                    self.merge_unfinished(host, &mut state)?;
                    return self.finish(host, summary, SessionOutcome::Exited);
                }
            }
        }

        self.finish(host, summary, SessionOutcome::Finished)
    }

    fn review_tile<H: ReviewHost>(&mut self, host: &mut H, state: &mut SessionState) -> TileEnd {
        log::info!("Reviewing tile {}", state.tile().id);
        host.present(&Frame::new(state, &self.store));
        loop {
            let Some(event) = host.next_event() else {
                log::info!("Input closed, ending session");
                return TileEnd::Exit;
            };
            match self.machine.handle(state, event, &mut self.store) {
                Transition::Unchanged => {}
                Transition::Redraw => host.present(&Frame::new(state, &self.store)),
                Transition::TileComplete => return TileEnd::Complete,
                Transition::Exit => return TileEnd::Exit,
            }
        }
    }

    fn commit<H: ReviewHost>(&mut self, host: &mut H, state: &mut SessionState) -> Result<(), SessionError> {
        let tile_id = &state.tile().id;
        let pending = state.pending();
        retry_persist(host, || {
            self.persistence
                .commit_tile(tile_id, pending, &mut self.store, &mut self.tracker)
        })
        .map_err(|e| match e {
            SessionError::Persistence(source) if source.left_inconsistent() => {
                SessionError::PartialCommit {
                    tile_id: tile_id.clone(),
                    source,
                }
            }
            other => other,
        })?;
        state.take_pending();
        Ok(())
    }

    fn merge_unfinished<H: ReviewHost>(
        &mut self,
        host: &mut H,
        state: &mut SessionState,
    ) -> Result<(), SessionError> {
        let pending = state.pending();
        if !pending.is_empty() {
            log::info!(
                "Merging {} detections from unfinished tile {}",
                pending.len(),
                state.tile().id
            );
        }
        retry_persist(host, || {
            self.persistence.merge_detections(pending, &mut self.store)
        })?;
        state.take_pending();
        Ok(())
    }

    fn finish<H: ReviewHost>(
        &mut self,
        host: &mut H,
        mut summary: SessionSummary,
        outcome: SessionOutcome,
    ) -> Result<SessionSummary, SessionError> {
        let keep = self.keep_backups;
        let backup = retry_persist(host, || self.persistence.backup(keep))?;
        summary.outcome = outcome;
        summary.remaining = self.remaining_tiles().len();
        summary.backup = Some(backup);
        log::info!(
            "Session ended: {} reviewed, {} skipped, {} remaining",
            summary.reviewed.len(),
            summary.skipped_missing.len(),
            summary.remaining
        );
        Ok(summary)
    }
}

fn retry_persist<H: ReviewHost, T>(
    host: &mut H,
    mut op: impl FnMut() -> Result<T, PersistenceError>,
) -> Result<T, SessionError> {
    loop {
        match op() {
            Ok(value) => return Ok(value),
            Err(e) => {
                log::error!("{}", e);
                if host.persist_failed(&e) == CommitDecision::Abort {
                    return Err(e.into());
                }
                log::info!("Retrying write");
            }
        }
    }
}
