//! # MIDI Pilot
//!
//! Fly a quadcopter from a MIDI keyboard and record its camera feed.
//!
//! This application reads key presses from a raw MIDI device, maps them to
//! pilot commands and dispatches them to the command & capture controller.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use midi_pilot::capture::y4m::Y4mEncoderFactory;
use midi_pilot::capture::HeadlessPreview;
use midi_pilot::config::{Config, LoggingConfig};
use midi_pilot::controller::Controller;
use midi_pilot::flight::sim::SimulatedDrone;
use midi_pilot::keymap::KeyMap;
use midi_pilot::midi::MidiInput;

/// Default configuration file path
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix inside the log directory
const LOG_FILE_PREFIX: &str = "midi-pilot.log";

#[derive(Debug, Parser)]
#[command(name = "midi-pilot", version, about = "Fly a quadcopter from a MIDI keyboard")]
struct Cli {
    /// Configuration file
    #[arg(long, default_value = DEFAULT_CONFIG_PATH)]
    config: PathBuf,

    /// Raw MIDI device, overrides `midi.device_path`
    #[arg(long)]
    midi_device: Option<String>,
}

/// Main entry point for MIDI Pilot
///
/// # Control Flow
///
/// 1. **Initialization**
///    - Load and validate the configuration
///    - Set up logging (console, plus a daily log file when enabled)
///    - Start the simulated drone and the controller
///    - Open the MIDI device
///
/// 2. **Main Loop**
///    - Wait for MIDI events
///    - Map each key-down to a command and dispatch it
///    - Handle Ctrl+C for graceful shutdown
///
/// 3. **Graceful Shutdown**
///    - Stop and join any capture session so the recording is finalized
///
/// # Errors
///
/// Returns error if:
/// - The configuration cannot be loaded
/// - No MIDI device can be opened
/// - Reading the MIDI device fails
#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = Config::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;

    let _log_guard = init_logging(&config.logging);

    info!("MIDI Pilot v{} starting...", env!("CARGO_PKG_VERSION"));

    let drone = Arc::new(
        SimulatedDrone::start(&config.sim).context("Failed to start simulated drone")?,
    );
    let keymap = KeyMap::from_config(&config.keymap);
    info!("Key map loaded with {} keys", keymap.len());

    let mut controller = Controller::new(
        config.flight.clone(),
        config.capture.clone(),
        drone.clone(),
        drone.clone(),
        Arc::new(HeadlessPreview::new(config.capture.frame_rate)),
        Arc::new(Y4mEncoderFactory),
    );

    let device_path = cli.midi_device.unwrap_or_else(|| config.midi.device_path.clone());
    let mut input = MidiInput::open(&device_path)
        .await
        .context("Failed to open MIDI device")?;
    info!("MIDI keyboard opened at: {}", input.device_path());
    info!("Press Ctrl+C to exit");

    let result = run(&mut input, &keymap, &mut controller, config.midi.channel).await;

    info!("Shutting down...");
    controller.shutdown();

    result
}

/// Dispatch MIDI key presses until Ctrl+C or the keyboard goes away.
async fn run<R>(
    input: &mut MidiInput<R>,
    keymap: &KeyMap,
    controller: &mut Controller,
    channel: Option<u8>,
) -> Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
{
    loop {
        tokio::select! {
            event = input.next_event() => {
                let Some(event) = event.context("Failed to read MIDI input")? else {
                    warn!("MIDI device closed");
                    return Ok(());
                };

                let Some(note) = event.key_down(channel) else {
                    continue;
                };

                if let Some(binding) = keymap.lookup(note) {
                    debug!(note, command = %binding.command, "Key pressed");
                    // Dispatch blocks on flight and capture transitions
                    tokio::task::block_in_place(|| {
                        controller.handle_command(binding.command, binding.magnitude);
                    });
                }
            }

            _ = tokio::signal::ctrl_c() => {
                info!("Received Ctrl+C");
                return Ok(());
            }
        }
    }
}

/// Install the tracing subscriber.
///
/// The returned guard flushes the file writer and must live until exit.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let console_layer = tracing_subscriber::fmt::layer();

    if config.file_enabled {
        let appender = tracing_appender::rolling::daily(&config.dir, LOG_FILE_PREFIX);
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let file_layer = tracing_subscriber::fmt::layer().with_ansi(false).with_writer(writer);

        tracing_subscriber::registry()
            .with(filter)
            .with(console_layer)
            .with(file_layer)
            .init();
        Some(guard)
    } else {
        tracing_subscriber::registry().with(filter).with(console_layer).init();
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_cli_defaults() {
        let cli = Cli::parse_from(["midi-pilot"]);
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.midi_device.is_none());
    }

    #[test]
    fn test_cli_overrides() {
        let cli = Cli::parse_from([
            "midi-pilot",
            "--config",
            "flight.toml",
            "--midi-device",
            "/dev/midi2",
        ]);
        assert_eq!(cli.config, PathBuf::from("flight.toml"));
        assert_eq!(cli.midi_device.as_deref(), Some("/dev/midi2"));
    }

    #[test]
    fn test_default_config_file_is_valid() {
        let path = concat!(env!("CARGO_MANIFEST_DIR"), "/config/default.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config.flight.emergency_threshold, 3);
        assert_eq!(config.capture.link_loss_frames, 15);
    }
}
