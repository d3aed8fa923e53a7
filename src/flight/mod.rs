//! # Flight Module
//!
//! The command channel to the vehicle.
//!
//! This module handles:
//! - The [`FlightTransport`] capability interface consumed by the controller
//! - The [`FlightState`] tracked by the controller
//! - A simulated vehicle for dry runs ([`sim::SimulatedDrone`])

pub mod sim;

use std::time::Duration;

use crate::command::Direction;
use crate::error::Result;

/// Whether the vehicle is airborne, as last commanded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlightState {
    Grounded,
    Flying,
}

/// Command and telemetry channel of a quadcopter.
///
/// Implementations are shared between the input dispatch context and the
/// capture thread, so every method takes `&self`.
#[cfg_attr(test, mockall::automock)]
pub trait FlightTransport: Send + Sync {
    fn takeoff(&self) -> Result<()>;

    fn land(&self) -> Result<()>;

    /// Stop all movement and hold position.
    fn hover(&self) -> Result<()>;

    /// Move along one axis. `magnitude` is a fraction of the maximum rate.
    fn move_by(&self, direction: Direction, magnitude: f32) -> Result<()>;

    /// Cut the motors immediately.
    fn emergency(&self) -> Result<()>;

    /// Block until navigation telemetry is flowing. Returns `false` on timeout.
    fn wait_telemetry_ready(&self, timeout: Duration) -> bool;

    /// Block until the video feed is producing frames. Returns `false` on timeout.
    fn wait_video_ready(&self, timeout: Duration) -> bool;
}
