//! # Pilot Commands
//!
//! The commands a key press can issue, and the motion directions understood by
//! the flight transport.

use serde::Deserialize;
use std::fmt;

/// A command produced by one key-down event.
///
/// Directional commands carry a magnitude alongside them (see
/// [`Controller::handle_command`](crate::controller::Controller::handle_command));
/// the others ignore it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Command {
    /// Take off when grounded, land when flying.
    TakeoffLand,
    /// Start or stop the capture session.
    Record,
    /// Stop all movement.
    Hover,
    Down,
    Up,
    TurnLeft,
    TurnRight,
    Backward,
    Forward,
    Left,
    Right,
    /// Emergency motor cut, armed after repeated presses.
    Emergency,
}

/// Motion axis passed to [`FlightTransport::move_by`](crate::flight::FlightTransport::move_by).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Down,
    Up,
    /// Counter-clockwise yaw.
    Ccw,
    /// Clockwise yaw.
    Cw,
    Backward,
    Forward,
    Left,
    Right,
}

impl Command {
    /// All commands, in key-map order.
    pub const ALL: [Command; 12] = [
        Command::TakeoffLand,
        Command::Record,
        Command::Hover,
        Command::Down,
        Command::Up,
        Command::TurnLeft,
        Command::TurnRight,
        Command::Backward,
        Command::Forward,
        Command::Left,
        Command::Right,
        Command::Emergency,
    ];

    /// Returns the motion direction for directional commands.
    ///
    /// # Examples
    ///
    /// ```
    /// use midi_pilot::command::{Command, Direction};
    ///
    /// assert_eq!(Command::TurnLeft.direction(), Some(Direction::Ccw));
    /// assert_eq!(Command::Hover.direction(), None);
    /// ```
    #[must_use]
    pub fn direction(self) -> Option<Direction> {
        match self {
            Command::Down => Some(Direction::Down),
            Command::Up => Some(Direction::Up),
            Command::TurnLeft => Some(Direction::Ccw),
            Command::TurnRight => Some(Direction::Cw),
            Command::Backward => Some(Direction::Backward),
            Command::Forward => Some(Direction::Forward),
            Command::Left => Some(Direction::Left),
            Command::Right => Some(Direction::Right),
            Command::TakeoffLand | Command::Record | Command::Hover | Command::Emergency => None,
        }
    }

    /// Whether the command uses its magnitude.
    #[must_use]
    pub fn is_directional(self) -> bool {
        self.direction().is_some()
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Command::TakeoffLand => "takeoff_land",
            Command::Record => "record",
            Command::Hover => "hover",
            Command::Down => "down",
            Command::Up => "up",
            Command::TurnLeft => "turn_left",
            Command::TurnRight => "turn_right",
            Command::Backward => "backward",
            Command::Forward => "forward",
            Command::Left => "left",
            Command::Right => "right",
            Command::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Direction::Down => "down",
            Direction::Up => "up",
            Direction::Ccw => "ccw",
            Direction::Cw => "cw",
            Direction::Backward => "backward",
            Direction::Forward => "forward",
            Direction::Left => "left",
            Direction::Right => "right",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_directional_commands_map_to_directions() {
        let expected = [
            (Command::Down, Direction::Down),
            (Command::Up, Direction::Up),
            (Command::TurnLeft, Direction::Ccw),
            (Command::TurnRight, Direction::Cw),
            (Command::Backward, Direction::Backward),
            (Command::Forward, Direction::Forward),
            (Command::Left, Direction::Left),
            (Command::Right, Direction::Right),
        ];
        for (command, direction) in expected {
            assert_eq!(
                command.direction(),
                Some(direction),
                "{} should map to {}",
                command,
                direction
            );
        }
    }

    #[test]
    fn test_non_directional_commands() {
        for command in [Command::TakeoffLand, Command::Record, Command::Hover, Command::Emergency] {
            assert!(!command.is_directional(), "{} should not be directional", command);
        }
    }

    #[test]
    fn test_all_has_every_command_once() {
        let unique: std::collections::HashSet<_> = Command::ALL.iter().collect();
        assert_eq!(unique.len(), Command::ALL.len());
        assert_eq!(Command::ALL.iter().filter(|c| c.is_directional()).count(), 8);
    }

    #[test]
    fn test_deserialize_snake_case() {
        #[derive(Deserialize)]
        struct Wrapper {
            command: Command,
        }

        let parsed: Wrapper = toml::from_str("command = \"turn_right\"").unwrap();
        assert_eq!(parsed.command, Command::TurnRight);

        let parsed: Wrapper = toml::from_str("command = \"takeoff_land\"").unwrap();
        assert_eq!(parsed.command, Command::TakeoffLand);

        assert!(toml::from_str::<Wrapper>("command = \"flip\"").is_err());
    }

    #[test]
    fn test_display_matches_config_names() {
        #[derive(Deserialize)]
        struct Wrapper {
            command: Command,
        }

        for command in Command::ALL {
            let source = format!("command = \"{}\"", command);
            let parsed: Wrapper = toml::from_str(&source).unwrap();
            assert_eq!(parsed.command, command);
        }
    }
}
