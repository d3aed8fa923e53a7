//! # Error Types
//!
//! Custom error types for MIDI Pilot using `thiserror`.

use std::time::Duration;

use thiserror::Error;

/// Main error type for MIDI Pilot
#[derive(Debug, Error)]
pub enum MidiPilotError {
    /// Operator asked for something the current state does not allow
    #[error("{0}")]
    UserMisuse(String),

    /// Flight transport rejected or failed a command
    #[error("Flight transport error: {0}")]
    Transport(String),

    /// Telemetry never became ready before takeoff
    #[error("Telemetry not ready after {0:?}")]
    TelemetryTimeout(Duration),

    /// Video feed never became ready for a capture session
    #[error("Video feed not ready after {0:?}")]
    VideoTimeout(Duration),

    /// Sustained loss of video frames during a capture session
    #[error("Video link lost: {missed} consecutive frames missing")]
    LinkLoss { missed: u32 },

    /// Encoder could not be opened, written or finalized
    #[error("Encoder error: {0}")]
    Encoder(String),

    /// Capture thread could not be spawned or panicked
    #[error("Capture thread error: {0}")]
    CaptureThread(String),

    /// MIDI stream errors
    #[error("MIDI error: {0}")]
    Midi(String),

    /// No MIDI device could be opened
    #[error("No MIDI device found (tried: {0})")]
    MidiDeviceNotFound(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for MIDI Pilot
pub type Result<T> = std::result::Result<T, MidiPilotError>;
