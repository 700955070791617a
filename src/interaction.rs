//! Reviewer interaction state machine.
//!
//! [`SessionState`] holds everything that lives for one tile's review: the
//! current [`Mode`], the selected detection and the detections added but not yet
//! merged. [`InteractionStateMachine::handle`] is the single transition function;
//! hosts translate their raw input into [`InputEvent`]s and feed them in.

use crate::constants::{CLICK_DRIFT_TOLERANCE, NEW_DETECTION_CLASS};
use crate::keybindings::KeyBindings;
use crate::model::{Detection, DetectionId, Point, Tile, Verification};
use crate::selection::SpatialSelector;
use crate::store::DetectionStore;

/// Reviewer mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Mode {
    /// Clicks place new detections.
    Add,
    /// Clicks select existing detections for classification.
    #[default]
    Label,
}

impl Mode {
    /// Get the display name for this mode.
    pub fn name(&self) -> &'static str {
        match self {
            Mode::Add => "ADD",
            Mode::Label => "LABEL",
        }
    }
}

/// Abstract command decoded from a key press.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    SetMode(Mode),
    /// Redraw the tile from the store.
    Reset,
    /// Tag the selected detection.
    Classify(Verification),
    /// The reviewer is done with this tile.
    CompleteTile,
    Exit,
}

/// Input delivered by the host, already debounced.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputEvent {
    /// A deliberate primary-button click in tile coordinates.
    Click(Point),
    /// A key press, decoded through [`KeyBindings`].
    Key(char),
    /// A decoded command, for hosts with their own bindings.
    Command(Command),
}

impl InputEvent {
    /// Debounce a pointer press/release pair. Returns `None` when the pointer
    /// drifted on either axis far enough for the gesture to be a pan rather than a click.
    pub fn from_gesture(press: Point, release: Point) -> Option<Self> {
        let dx = (release.x - press.x).abs();
        let dy = (release.y - press.y).abs();
        (dx < CLICK_DRIFT_TOLERANCE && dy < CLICK_DRIFT_TOLERANCE)
            .then_some(InputEvent::Click(release))
    }
}

/// What the controller should do after an event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Nothing visible changed.
    Unchanged,
    /// State changed; present the tile again.
    Redraw,
    /// Commit this tile and move on.
    TileComplete,
    /// End the session after merging this tile's pending work.
    Exit,
}

/// Per-tile reviewer state.
#[derive(Debug, Clone)]
pub struct SessionState {
    tile: Tile,
    mode: Mode,
    selected: Option<DetectionId>,
    pending: Vec<Detection>,
}

impl SessionState {
    /// Fresh state for a tile: Label mode, nothing selected, nothing pending.
    pub fn new(tile: Tile) -> Self {
        Self {
            tile,
            mode: Mode::default(),
            selected: None,
            pending: Vec::new(),
        }
    }

    pub fn tile(&self) -> &Tile {
        &self.tile
    }

    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn selected(&self) -> Option<DetectionId> {
        self.selected
    }

    /// Detections added this tile, in click order.
    pub fn pending(&self) -> &[Detection] {
        &self.pending
    }

    /// Hand the pending detections over for merging.
    pub fn take_pending(&mut self) -> Vec<Detection> {
        std::mem::take(&mut self.pending)
    }
}

/// Transition function over [`SessionState`].
#[derive(Debug, Clone)]
pub struct InteractionStateMachine {
    bindings: KeyBindings,
    tolerance: f64,
}

impl InteractionStateMachine {
    pub fn new(bindings: KeyBindings, tolerance: f64) -> Self {
        Self {
            bindings,
            tolerance,
        }
    }

    /// Apply one input event.
    pub fn handle(
        &self,
        state: &mut SessionState,
        event: InputEvent,
        store: &mut DetectionStore,
    ) -> Transition {
        match event {
            InputEvent::Click(point) => self.click(state, point, store),
            InputEvent::Key(key) => match self.bindings.command_for_key(key) {
                Some(command) => self.apply(state, command, store),
                None => {
                    log::trace!("Ignoring unbound key {:?}", key);
                    Transition::Unchanged
                }
            },
            InputEvent::Command(command) => self.apply(state, command, store),
        }
    }

    /// Apply a decoded command.
    pub fn apply(
        &self,
        state: &mut SessionState,
        command: Command,
        store: &mut DetectionStore,
    ) -> Transition {
        match command {
            Command::SetMode(mode) => {
                if state.mode == mode {
                    return Transition::Unchanged;
                }
                state.mode = mode;
                state.selected = None;
                log::info!("Switched to {} mode", mode.name());
                Transition::Redraw
            }
            Command::Reset => Transition::Redraw,
            Command::Classify(tag) => classify(state, tag, store),
            Command::CompleteTile => Transition::TileComplete,
            Command::Exit => Transition::Exit,
        }
    }

    fn click(&self, state: &mut SessionState, point: Point, store: &DetectionStore) -> Transition {
        if !state.tile.accepts(&point) {
            log::debug!("Click at ({}, {}) outside tile {}", point.x, point.y, state.tile.id);
            return Transition::Unchanged;
        }
        match state.mode {
            Mode::Add => {
                state.pending.push(Detection::new(
                    state.tile.id.clone(),
                    Some(point),
                    NEW_DETECTION_CLASS,
                ));
                log::debug!("Queued new detection at ({}, {})", point.x, point.y);
                Transition::Redraw
            }
            Mode::Label => {
                let view = store.detections_for_tile(&state.tile.id);
                let selector = SpatialSelector::new(self.tolerance).with_bounds(state.tile.bounds);
                match selector.select(&view, point) {
                    Some(id) => {
                        log::info!("Selected detection {}", id);
                        state.selected = Some(id);
                        Transition::Redraw
                    }
                    None => Transition::Unchanged,
                }
            }
        }
    }
}

fn classify(state: &mut SessionState, tag: Verification, store: &mut DetectionStore) -> Transition {
    if state.mode != Mode::Label {
        return Transition::Unchanged;
    }
    let Some(id) = state.selected else {
        return Transition::Unchanged;
    };
    let tag = match tag {
        Verification::Unverified => return Transition::Unchanged,
        tag @ (Verification::Misclassified | Verification::Bad) => tag,
    };
    state.selected = None;
    match store.set_verification(id, tag) {
        Ok(()) => log::info!("Labeled detection {} as {}", id, tag),
        Err(e) => log::warn!("Dropping stale selection: {}", e),
    }
    Transition::Redraw
}
