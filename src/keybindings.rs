//! Customizable keybindings for the review session.
//!
//! Keys are single characters and match case-insensitively. The defaults follow
//! the long-standing review workflow: `a`/`l` switch modes, `m`/`b` classify the
//! selected detection, `r` redraws, `n` finishes the tile and `q` quits.

use serde::{Deserialize, Serialize};

use crate::interaction::{Command, Mode};
use crate::model::Verification;

/// Keybinding configuration for the session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct KeyBindings {
    /// Switch to Add mode
    pub mode_add: char,
    /// Switch to Label mode
    pub mode_label: char,
    /// Redraw the tile from the store
    pub reset: char,
    /// Tag the selected detection as misclassified
    pub misclassified: char,
    /// Tag the selected detection as bad
    pub bad: char,
    /// Declare the current tile reviewed
    pub next_tile: char,
    /// End the session
    pub exit: char,
}

impl Default for KeyBindings {
    fn default() -> Self {
        Self {
            mode_add: 'a',
            mode_label: 'l',
            reset: 'r',
            misclassified: 'm',
            bad: 'b',
            next_tile: 'n',
            exit: 'q',
        }
    }
}

impl KeyBindings {
    /// Get the command that corresponds to a key press, if any.
    pub fn command_for_key(&self, key: char) -> Option<Command> {
        self.bindings()
            .into_iter()
            .find(|(bound, _)| keys_match(*bound, key))
            .map(|(_, command)| command)
    }

    /// Find the first key bound to two different commands.
    pub fn find_conflict(&self) -> Option<char> {
        let bindings = self.bindings();
        bindings.iter().enumerate().find_map(|(i, (key, _))| {
            bindings[i + 1..]
                .iter()
                .any(|(other, _)| keys_match(*key, *other))
                .then_some(*key)
        })
    }

    fn bindings(&self) -> [(char, Command); 7] {
        [
            (self.mode_add, Command::SetMode(Mode::Add)),
            (self.mode_label, Command::SetMode(Mode::Label)),
            (self.reset, Command::Reset),
            (self.misclassified, Command::Classify(Verification::Misclassified)),
            (self.bad, Command::Classify(Verification::Bad)),
            (self.next_tile, Command::CompleteTile),
            (self.exit, Command::Exit),
        ]
    }
}

fn keys_match(a: char, b: char) -> bool {
    a.to_lowercase().eq(b.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_commands() {
        let keys = KeyBindings::default();
        assert_eq!(keys.command_for_key('a'), Some(Command::SetMode(Mode::Add)));
        assert_eq!(keys.command_for_key('l'), Some(Command::SetMode(Mode::Label)));
        assert_eq!(
            keys.command_for_key('m'),
            Some(Command::Classify(Verification::Misclassified))
        );
        assert_eq!(
            keys.command_for_key('b'),
            Some(Command::Classify(Verification::Bad))
        );
        assert_eq!(keys.command_for_key('q'), Some(Command::Exit));
    }

    #[test]
    fn test_case_insensitive() {
        let keys = KeyBindings::default();
        assert_eq!(keys.command_for_key('B'), Some(Command::Classify(Verification::Bad)));
        assert_eq!(keys.command_for_key('A'), Some(Command::SetMode(Mode::Add)));
    }

    #[test]
    fn test_unbound_key() {
        let keys = KeyBindings::default();
        assert_eq!(keys.command_for_key('g'), None);
        assert_eq!(keys.command_for_key('z'), None);
    }

    #[test]
    fn test_conflict_detection() {
        assert_eq!(KeyBindings::default().find_conflict(), None);
        let keys = KeyBindings {
            bad: 'M',
            ..KeyBindings::default()
        };
        assert_eq!(keys.find_conflict(), Some('m'));
    }
}
