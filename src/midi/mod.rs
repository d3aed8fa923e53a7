//! # MIDI Input Module
//!
//! Reads key events from a MIDI keyboard.
//!
//! This module handles:
//! - Opening a raw MIDI character device (ALSA `/dev/snd/midiC*D*` or OSS `/dev/midi*`)
//! - Async reads of the byte stream
//! - Decoding note on / note off messages

pub mod parser;

use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::net::unix::pipe;
use tracing::{debug, info, warn};

use crate::error::{MidiPilotError, Result};
use parser::MidiParser;
use std::collections::VecDeque;

/// Default raw MIDI device paths to try (in order of preference)
const DEFAULT_DEVICE_PATHS: &[&str] = &[
    "/dev/snd/midiC1D0", // First USB keyboard (card 0 is usually onboard audio)
    "/dev/snd/midiC0D0",
    "/dev/midi1",
    "/dev/midi",
];

/// Read buffer size for the device stream
const READ_CHUNK: usize = 64;

/// A decoded MIDI message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MidiEvent {
    /// Key pressed.
    NoteOn { channel: u8, note: u8, velocity: u8 },
    /// Key released.
    NoteOff { channel: u8, note: u8, velocity: u8 },
    /// Any other complete message, identified by its status byte.
    Other { status: u8 },
}

impl MidiEvent {
    /// Returns the note of a key-down event accepted by the channel filter.
    ///
    /// # Examples
    ///
    /// ```
    /// use midi_pilot::midi::MidiEvent;
    ///
    /// let event = MidiEvent::NoteOn { channel: 2, note: 36, velocity: 90 };
    /// assert_eq!(event.key_down(None), Some(36));
    /// assert_eq!(event.key_down(Some(2)), Some(36));
    /// assert_eq!(event.key_down(Some(0)), None);
    /// ```
    #[must_use]
    pub fn key_down(&self, channel_filter: Option<u8>) -> Option<u8> {
        match *self {
            MidiEvent::NoteOn { channel, note, .. }
                if channel_filter.map_or(true, |wanted| wanted == channel) =>
            {
                Some(note)
            }
            _ => None,
        }
    }
}

/// Async MIDI event reader over any byte stream.
pub struct MidiInput<R> {
    reader: R,
    parser: MidiParser,
    pending: VecDeque<MidiEvent>,
    device_path: String,
}

impl<R> std::fmt::Debug for MidiInput<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiInput")
            .field("device_path", &self.device_path)
            .field("pending", &self.pending.len())
            .finish_non_exhaustive()
    }
}

impl MidiInput<pipe::Receiver> {
    /// Open the configured MIDI device, or auto-detect one when `path` is empty.
    ///
    /// # Errors
    ///
    /// Returns `MidiDeviceNotFound` if no candidate device could be opened.
    pub async fn open(path: &str) -> Result<Self> {
        if path.is_empty() {
            Self::open_with_paths(DEFAULT_DEVICE_PATHS).await
        } else {
            Self::open_with_paths(&[path]).await
        }
    }

    /// Open the first MIDI device that succeeds from a list of paths.
    ///
    /// The device is opened non-blocking and polled by the runtime's reactor,
    /// so a pending read is dropped with its future and never holds up
    /// runtime shutdown.
    pub async fn open_with_paths(paths: &[&str]) -> Result<Self> {
        for path in paths {
            debug!("Trying to open MIDI device: {}", path);

            // Character devices are not FIFOs; skip the file type check
            match pipe::OpenOptions::new().unchecked(true).open_receiver(path) {
                Ok(receiver) => {
                    info!("Opened MIDI device at {}", path);
                    return Ok(Self::new(receiver, *path));
                }
                Err(e) => {
                    warn!("Failed to open {}: {}", path, e);
                    continue;
                }
            }
        }

        Err(MidiPilotError::MidiDeviceNotFound(paths.join(", ")))
    }
}

impl<R: AsyncRead + Unpin> MidiInput<R> {
    /// Wrap an already open byte stream.
    pub fn new(reader: R, device_path: impl Into<String>) -> Self {
        Self {
            reader,
            parser: MidiParser::new(),
            pending: VecDeque::new(),
            device_path: device_path.into(),
        }
    }

    pub fn device_path(&self) -> &str {
        &self.device_path
    }

    /// Wait for the next decoded event.
    ///
    /// Returns `Ok(None)` when the device stream ends (keyboard unplugged).
    /// Cancel safe: events already decoded stay queued.
    pub async fn next_event(&mut self) -> Result<Option<MidiEvent>> {
        let mut buf = [0u8; READ_CHUNK];

        loop {
            if let Some(event) = self.pending.pop_front() {
                return Ok(Some(event));
            }

            let n = self
                .reader
                .read(&mut buf)
                .await
                .map_err(|e| {
                    MidiPilotError::Midi(format!("Failed to read {}: {}", self.device_path, e))
                })?;

            if n == 0 {
                return Ok(None);
            }

            self.pending.extend(self.parser.feed(&buf[..n]));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_device_paths() {
        assert_eq!(DEFAULT_DEVICE_PATHS.len(), 4);
        assert_eq!(DEFAULT_DEVICE_PATHS[0], "/dev/snd/midiC1D0");
    }

    #[test]
    fn test_key_down_ignores_note_off() {
        let event = MidiEvent::NoteOff { channel: 0, note: 36, velocity: 0 };
        assert_eq!(event.key_down(None), None);

        let event = MidiEvent::Other { status: 0xF8 };
        assert_eq!(event.key_down(None), None);
    }

    #[tokio::test]
    async fn test_next_event_across_reads() {
        // Message split over two reads
        let stream = tokio_test::io::Builder::new()
            .read(&[0x90, 36])
            .read(&[100, 36, 0])
            .build();
        let mut input = MidiInput::new(stream, "mock");

        assert_eq!(
            input.next_event().await.unwrap(),
            Some(MidiEvent::NoteOn { channel: 0, note: 36, velocity: 100 })
        );
        assert_eq!(
            input.next_event().await.unwrap(),
            Some(MidiEvent::NoteOff { channel: 0, note: 36, velocity: 0 })
        );
        assert_eq!(input.next_event().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_next_event_queues_multiple() {
        let stream = tokio_test::io::Builder::new()
            .read(&[0x90, 36, 100, 37, 100, 38, 100])
            .build();
        let mut input = MidiInput::new(stream, "mock");

        let mut notes = Vec::new();
        while let Some(event) = input.next_event().await.unwrap() {
            notes.extend(event.key_down(None));
        }
        assert_eq!(notes, vec![36, 37, 38]);
    }

    #[tokio::test]
    async fn test_next_event_read_error() {
        let stream = tokio_test::io::Builder::new()
            .read_error(std::io::Error::new(std::io::ErrorKind::BrokenPipe, "unplugged"))
            .build();
        let mut input = MidiInput::new(stream, "mock");

        match input.next_event().await {
            Err(MidiPilotError::Midi(msg)) => assert!(msg.contains("mock")),
            other => panic!("Expected Midi error, got: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_open_with_invalid_paths_returns_error() {
        let result =
            MidiInput::open_with_paths(&["/dev/nonexistent_midi0", "/dev/nonexistent_midi1"])
                .await;

        match result {
            Err(MidiPilotError::MidiDeviceNotFound(msg)) => {
                assert!(msg.contains("/dev/nonexistent_midi0"));
                assert!(msg.contains("/dev/nonexistent_midi1"));
            }
            other => panic!("Expected MidiDeviceNotFound error, got: {:?}", other),
        }
    }

    /// Create a FIFO standing in for a raw MIDI device.
    fn make_fifo(dir: &std::path::Path) -> std::path::PathBuf {
        let fifo = dir.join("midiC9D0");
        let status = std::process::Command::new("mkfifo").arg(&fifo).status().unwrap();
        assert!(status.success(), "mkfifo failed");
        fifo
    }

    #[tokio::test]
    async fn test_open_device_reads_events() {
        use std::io::Write;

        let dir = tempfile::tempdir().unwrap();
        let fifo = make_fifo(dir.path());

        let mut input = MidiInput::open(fifo.to_str().unwrap()).await.unwrap();
        let mut keyboard = std::fs::OpenOptions::new().write(true).open(&fifo).unwrap();
        keyboard.write_all(&[0x90, 40, 90]).unwrap();

        let event = tokio::time::timeout(std::time::Duration::from_secs(2), input.next_event())
            .await
            .unwrap()
            .unwrap();
        assert_eq!(event, Some(MidiEvent::NoteOn { channel: 0, note: 40, velocity: 90 }));
    }

    #[test]
    fn test_idle_device_does_not_block_runtime_shutdown() {
        use std::sync::mpsc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let fifo = make_fifo(dir.path());

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .unwrap();

        // Keyboard connected but no key pressed
        let keyboard = runtime.block_on(async {
            let mut input = MidiInput::open(fifo.to_str().unwrap()).await.unwrap();
            let keyboard = std::fs::OpenOptions::new().write(true).open(&fifo).unwrap();

            tokio::select! {
                event = input.next_event() => panic!("unexpected event: {:?}", event),
                _ = tokio::time::sleep(Duration::from_millis(100)) => {}
            }
            keyboard
        });

        let (done_tx, done_rx) = mpsc::channel();
        std::thread::spawn(move || {
            drop(runtime);
            let _ = done_tx.send(());
        });

        assert!(
            done_rx.recv_timeout(Duration::from_secs(3)).is_ok(),
            "runtime shutdown waited on the MIDI device"
        );
        drop(keyboard);
    }

    #[tokio::test]
    #[ignore] // Run with: cargo test -- --ignored
    async fn test_open_with_real_hardware() {
        match MidiInput::open("").await {
            Ok(input) => println!("Opened MIDI device at: {}", input.device_path()),
            Err(_) => println!("No MIDI keyboard detected (this is OK for CI/CD)"),
        }
    }
}
