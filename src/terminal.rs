//! Line-oriented review host for terminals.
//!
//! Reads one command per line: `x y` or `click x y` for a click, `drag x1 y1 x2 y2`
//! for a press/release gesture, and single characters for key presses. End of
//! input ends the session. Raster display is left to an external viewer.

use std::io::{BufRead, Write};

use crate::error::MissingTileFileError;
use crate::format::PersistenceError;
use crate::interaction::InputEvent;
use crate::model::{MarkerKind, Point, Verification};
use crate::session::{CommitDecision, Frame, ReviewHost};

/// Parse one input line. Returns `None` for lines that are not commands.
pub fn parse_line(line: &str) -> Option<InputEvent> {
    let line = line.trim();
    let mut words = line.split_whitespace();
    let first = words.next()?;

    let numbers: Option<Vec<f64>> = match first.to_ascii_lowercase().as_str() {
        "click" | "drag" => words.map(|w| w.parse().ok()).collect(),
        _ => line.split_whitespace().map(|w| w.parse().ok()).collect(),
    };
    let keyword = first.eq_ignore_ascii_case("drag");

    match numbers.as_deref() {
        Some([x, y]) if !keyword => Some(InputEvent::Click(Point::new(*x, *y))),
        Some([x1, y1, x2, y2]) if keyword => {
            InputEvent::from_gesture(Point::new(*x1, *y1), Point::new(*x2, *y2))
        }
        _ => {
            let mut chars = line.chars();
            match (chars.next(), chars.next()) {
                (Some(key), None) => Some(InputEvent::Key(key)),
                _ => None,
            }
        }
    }
}

fn marker_label(kind: MarkerKind) -> &'static str {
    match kind {
        MarkerKind::Pending => "new",
        MarkerKind::Verified(Verification::Misclassified) => "misclassified",
        MarkerKind::Verified(_) => "bad",
        MarkerKind::Boat => "boat",
        MarkerKind::Other => "unverified",
    }
}

/// [`ReviewHost`] over a text reader and writer.
pub struct TerminalHost<R, W> {
    input: R,
    output: W,
}

impl<R: BufRead, W: Write> TerminalHost<R, W> {
    pub fn new(input: R, output: W) -> Self {
        Self { input, output }
    }

    pub fn into_output(self) -> W {
        self.output
    }

    fn render(&mut self, frame: &Frame<'_>) -> std::io::Result<()> {
        writeln!(self.output, "== {} [{}]", frame.title(), frame.mode.name())?;
        for marker in frame.markers() {
            let cursor = if marker.selected { '*' } else { ' ' };
            match marker.id {
                Some(id) => write!(self.output, "{cursor} {id:>4}")?,
                None => write!(self.output, "{cursor}    +")?,
            }
            writeln!(
                self.output,
                "  ({}, {})  {}",
                marker.position.x,
                marker.position.y,
                marker_label(marker.kind)
            )?;
        }
        self.output.flush()
    }

    fn prompt(&mut self) -> std::io::Result<()> {
        write!(self.output, "> ")?;
        self.output.flush()
    }

    fn read_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) => None,
            Ok(_) => Some(line),
            Err(e) => {
                log::error!("Failed to read input: {}", e);
                None
            }
        }
    }
}

impl<R: BufRead, W: Write> ReviewHost for TerminalHost<R, W> {
    fn present(&mut self, frame: &Frame<'_>) {
        if let Err(e) = self.render(frame) {
            log::error!("Failed to draw tile {}: {}", frame.tile.id, e);
        }
    }

    fn next_event(&mut self) -> Option<InputEvent> {
        loop {
            if let Err(e) = self.prompt() {
                log::warn!("Failed to write prompt: {}", e);
            }
            let line = self.read_line()?;
            if line.trim().is_empty() {
                continue;
            }
            match parse_line(&line) {
                Some(event) => return Some(event),
                None => log::warn!("Ignoring unrecognized input {:?}", line.trim()),
            }
        }
    }

    fn persist_failed(&mut self, error: &PersistenceError) -> CommitDecision {
        // Best effort: the answer is read even if the question could not be printed
        let _ = writeln!(self.output, "Write failed: {error}");
        let _ = write!(self.output, "Retry? [y/N] ");
        let _ = self.output.flush();
        match self.read_line() {
            Some(answer) if answer.trim().eq_ignore_ascii_case("y") => CommitDecision::Retry,
            _ => CommitDecision::Abort,
        }
    }

    fn tile_skipped(&mut self, error: &MissingTileFileError) {
        let _ = writeln!(self.output, "Skipping: {error}");
    }
}
