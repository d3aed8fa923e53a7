//! # Configuration Module
//!
//! Handles loading and validating configuration from TOML files.

use serde::de::Error;
use serde::Deserialize;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::command::Command;
use crate::error::{MidiPilotError, Result};

/// Main configuration structure
#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub midi: MidiConfig,
    #[serde(default)]
    pub flight: FlightConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub sim: SimConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// Replaces the default key map when non-empty.
    #[serde(default)]
    pub keymap: Vec<KeyBindingConfig>,
}

/// MIDI input configuration
#[derive(Debug, Deserialize, Clone)]
pub struct MidiConfig {
    /// Raw MIDI device path. Empty means auto-detect.
    #[serde(default)]
    pub device_path: String,

    /// Only accept note events on this channel (0-15).
    #[serde(default)]
    pub channel: Option<u8>,
}

/// What happens to the emergency counter once the emergency stop has fired.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum EmergencyResetPolicy {
    /// The counter latches; the emergency stop fires once per controller.
    Never,
    /// The counter returns to zero so another full sequence fires again.
    AfterFire,
}

/// Flight command configuration
#[derive(Debug, Deserialize, Clone)]
pub struct FlightConfig {
    #[serde(default = "default_telemetry_timeout_ms")]
    pub telemetry_timeout_ms: u64,

    #[serde(default = "default_emergency_threshold")]
    pub emergency_threshold: u32,

    #[serde(default = "default_emergency_hold_ms")]
    pub emergency_hold_ms: u64,

    #[serde(default = "default_emergency_reset")]
    pub emergency_reset: EmergencyResetPolicy,
}

/// Capture session configuration
#[derive(Debug, Deserialize, Clone)]
pub struct CaptureConfig {
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    #[serde(default = "default_frame_rate")]
    pub frame_rate: u32,

    /// Consecutive missing frames treated as a lost video link.
    #[serde(default = "default_link_loss_frames")]
    pub link_loss_frames: u32,

    #[serde(default = "default_video_ready_timeout_ms")]
    pub video_ready_timeout_ms: u64,
}

/// Simulated drone configuration
#[derive(Debug, Deserialize, Clone)]
pub struct SimConfig {
    #[serde(default = "default_sim_frame_width")]
    pub frame_width: u32,

    #[serde(default = "default_sim_frame_height")]
    pub frame_height: u32,

    #[serde(default = "default_sim_frame_rate")]
    pub frame_rate: u32,
}

/// Log output configuration
#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    #[serde(default = "default_log_file_enabled")]
    pub file_enabled: bool,

    #[serde(default = "default_log_dir")]
    pub dir: PathBuf,
}

/// One key binding: a MIDI note and the command it issues.
#[derive(Debug, Deserialize, Clone, PartialEq)]
pub struct KeyBindingConfig {
    pub note: u8,
    pub command: Command,
    #[serde(default)]
    pub magnitude: f32,
}

// Default value functions
fn default_telemetry_timeout_ms() -> u64 { 5000 }
fn default_emergency_threshold() -> u32 { 3 }
fn default_emergency_hold_ms() -> u64 { 3000 }
fn default_emergency_reset() -> EmergencyResetPolicy { EmergencyResetPolicy::Never }

fn default_output_dir() -> PathBuf { PathBuf::from("./videos") }
fn default_frame_rate() -> u32 { 20 }
fn default_link_loss_frames() -> u32 { 15 }
fn default_video_ready_timeout_ms() -> u64 { 5000 }

fn default_sim_frame_width() -> u32 { 640 }
fn default_sim_frame_height() -> u32 { 360 }
fn default_sim_frame_rate() -> u32 { 30 }

fn default_log_file_enabled() -> bool { false }
fn default_log_dir() -> PathBuf { PathBuf::from("./logs") }

impl Default for MidiConfig {
    fn default() -> Self {
        Self { device_path: String::new(), channel: None }
    }
}

impl Default for FlightConfig {
    fn default() -> Self {
        Self {
            telemetry_timeout_ms: default_telemetry_timeout_ms(),
            emergency_threshold: default_emergency_threshold(),
            emergency_hold_ms: default_emergency_hold_ms(),
            emergency_reset: default_emergency_reset(),
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            output_dir: default_output_dir(),
            frame_rate: default_frame_rate(),
            link_loss_frames: default_link_loss_frames(),
            video_ready_timeout_ms: default_video_ready_timeout_ms(),
        }
    }
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            frame_width: default_sim_frame_width(),
            frame_height: default_sim_frame_height(),
            frame_rate: default_sim_frame_rate(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self { file_enabled: default_log_file_enabled(), dir: default_log_dir() }
    }
}

impl FlightConfig {
    pub fn telemetry_timeout(&self) -> Duration {
        Duration::from_millis(self.telemetry_timeout_ms)
    }

    pub fn emergency_hold(&self) -> Duration {
        Duration::from_millis(self.emergency_hold_ms)
    }
}

impl CaptureConfig {
    pub fn video_ready_timeout(&self) -> Duration {
        Duration::from_millis(self.video_ready_timeout_ms)
    }

    /// Time between two capture loop iterations.
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.frame_rate.max(1)
    }
}

fn invalid(message: impl std::fmt::Display) -> MidiPilotError {
    MidiPilotError::Config(toml::de::Error::custom(message))
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the configuration file
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - File cannot be read
    /// - TOML parsing fails
    /// - Validation fails
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use midi_pilot::config::Config;
    ///
    /// let config = Config::load("config/default.toml")?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        Self::parse(&contents)
    }

    /// Parse and validate configuration from TOML text
    pub fn parse(contents: &str) -> Result<Self> {
        let config: Config = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration values
    ///
    /// # Errors
    ///
    /// Returns error if any configuration value is out of valid range
    pub fn validate(&self) -> Result<()> {
        if let Some(channel) = self.midi.channel {
            if channel > 15 {
                return Err(invalid("midi channel must be between 0 and 15"));
            }
        }

        // Flight
        if self.flight.telemetry_timeout_ms == 0 || self.flight.telemetry_timeout_ms > 60000 {
            return Err(invalid("telemetry_timeout_ms must be between 1 and 60000"));
        }

        if self.flight.emergency_threshold == 0 {
            return Err(invalid("emergency_threshold must be greater than 0"));
        }

        if self.flight.emergency_hold_ms > 30000 {
            return Err(invalid("emergency_hold_ms must be at most 30000"));
        }

        // Capture
        if self.capture.output_dir.as_os_str().is_empty() {
            return Err(invalid("capture output_dir cannot be empty"));
        }

        if self.capture.frame_rate == 0 || self.capture.frame_rate > 120 {
            return Err(invalid("capture frame_rate must be between 1 and 120"));
        }

        if self.capture.link_loss_frames == 0 {
            return Err(invalid("link_loss_frames must be greater than 0"));
        }

        if self.capture.video_ready_timeout_ms == 0 || self.capture.video_ready_timeout_ms > 60000 {
            return Err(invalid("video_ready_timeout_ms must be between 1 and 60000"));
        }

        // Simulator frames are I420, which needs even dimensions
        if self.sim.frame_width == 0 || self.sim.frame_width % 2 != 0
            || self.sim.frame_height == 0 || self.sim.frame_height % 2 != 0 {
            return Err(invalid("sim frame dimensions must be non-zero and even"));
        }

        if self.sim.frame_rate == 0 || self.sim.frame_rate > 120 {
            return Err(invalid("sim frame_rate must be between 1 and 120"));
        }

        if self.logging.file_enabled && self.logging.dir.as_os_str().is_empty() {
            return Err(invalid("logging dir cannot be empty when file logging is enabled"));
        }

        // Key bindings
        let mut seen = HashSet::new();
        for binding in &self.keymap {
            if binding.note > 127 {
                return Err(invalid(format!(
                    "keymap note {} is out of range (0-127)",
                    binding.note
                )));
            }
            if !(0.0..=1.0).contains(&binding.magnitude) {
                return Err(invalid(format!(
                    "keymap note {} magnitude must be between 0.0 and 1.0",
                    binding.note
                )));
            }
            if !binding.command.is_directional() && binding.magnitude != 0.0 {
                return Err(invalid(format!(
                    "keymap note {}: magnitude only applies to directional commands, not {}",
                    binding.note, binding.command
                )));
            }
            if !seen.insert(binding.note) {
                return Err(invalid(format!("keymap note {} is bound twice", binding.note)));
            }
        }

        Ok(())
    }
}
