//! # Key Map Module
//!
//! Maps MIDI note numbers to pilot commands.
//!
//! ## Default Layout
//!
//! The default layout binds 52 keys of a 61-key keyboard starting at C2
//! (note 36):
//!
//! | Notes | Command | Magnitudes |
//! |-------|---------|------------|
//! | 36 | Takeoff / land | - |
//! | 37 | Record | - |
//! | 38 | Hover | - |
//! | 39-44 | Down | 1 down to 1/6 |
//! | 45-50 | Up | 1/6 up to 1 |
//! | 51-56 | Turn left | 1 down to 1/6 |
//! | 57-62 | Turn right | 1/6 up to 1 |
//! | 63-68 | Backward | 1 down to 1/6 |
//! | 69-74 | Forward | 1/6 up to 1 |
//! | 75-80 | Left | 1 down to 1/6 |
//! | 81-86 | Right | 1/6 up to 1 |
//! | 88 | Emergency (press 3x) | - |

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::command::Command;
use crate::config::KeyBindingConfig;

/// Command and magnitude bound to a single key.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct KeyBinding {
    pub command: Command,
    pub magnitude: f32,
}

/// Directional blocks of the default layout: first note, command, and whether
/// magnitude increases with pitch.
const DIRECTIONAL_BLOCKS: [(u8, Command, bool); 8] = [
    (39, Command::Down, false),
    (45, Command::Up, true),
    (51, Command::TurnLeft, false),
    (57, Command::TurnRight, true),
    (63, Command::Backward, false),
    (69, Command::Forward, true),
    (75, Command::Left, false),
    (81, Command::Right, true),
];

/// Number of graded keys per directional block.
const BLOCK_STEPS: u8 = 6;

/// Lookup table from MIDI note to [`KeyBinding`].
///
/// # Examples
///
/// ```
/// use midi_pilot::command::Command;
/// use midi_pilot::keymap::KeyMap;
///
/// let keymap = KeyMap::default();
/// let binding = keymap.lookup(50).unwrap();
/// assert_eq!(binding.command, Command::Up);
/// assert_eq!(binding.magnitude, 1.0);
/// assert!(keymap.lookup(20).is_none());
/// ```
#[derive(Debug, Clone)]
pub struct KeyMap {
    bindings: HashMap<u8, KeyBinding>,
}

impl Default for KeyMap {
    fn default() -> Self {
        let mut bindings = HashMap::new();

        bindings.insert(36, KeyBinding { command: Command::TakeoffLand, magnitude: 0.0 });
        bindings.insert(37, KeyBinding { command: Command::Record, magnitude: 0.0 });
        bindings.insert(38, KeyBinding { command: Command::Hover, magnitude: 0.0 });
        bindings.insert(88, KeyBinding { command: Command::Emergency, magnitude: 0.0 });

        for (first, command, ascending) in DIRECTIONAL_BLOCKS {
            for step in 0..BLOCK_STEPS {
                let sixths = if ascending { step + 1 } else { BLOCK_STEPS - step };
                let magnitude = f32::from(sixths) / f32::from(BLOCK_STEPS);
                bindings.insert(first + step, KeyBinding { command, magnitude });
            }
        }

        Self { bindings }
    }
}

impl KeyMap {
    /// Builds a key map from configured bindings.
    ///
    /// An empty list yields the default layout.
    pub fn from_config(bindings: &[KeyBindingConfig]) -> Self {
        if bindings.is_empty() {
            return Self::default();
        }

        let bindings = bindings
            .iter()
            .map(|b| (b.note, KeyBinding { command: b.command, magnitude: b.magnitude }))
            .collect();

        let keymap = Self { bindings };
        for command in keymap.unbound_commands() {
            warn!("No key is bound to {}", command);
        }
        keymap
    }

    /// Commands no key issues, in key-map order.
    #[must_use]
    pub fn unbound_commands(&self) -> Vec<Command> {
        Command::ALL
            .into_iter()
            .filter(|command| !self.bindings.values().any(|b| b.command == *command))
            .collect()
    }

    /// Returns the binding for a note, if any.
    #[must_use]
    pub fn lookup(&self, note: u8) -> Option<KeyBinding> {
        let binding = self.bindings.get(&note).copied();
        if binding.is_none() {
            debug!("Note {} is not mapped", note);
        }
        binding
    }

    /// Number of mapped keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bindings.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bindings.is_empty()
    }
}
