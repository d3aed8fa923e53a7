//! # YUV4MPEG2 Writer
//!
//! Uncompressed video container understood by ffmpeg, mpv and most players.
//!
//! ## File Layout
//!
//! ```text
//! YUV4MPEG2 W640 H360 F20:1 Ip A1:1 C420jpeg\n
//! FRAME\n<I420 bytes>
//! FRAME\n<I420 bytes>
//! ...
//! ```

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

use super::encoder::{EncoderFactory, VideoEncoder};
use super::Frame;
use crate::error::{MidiPilotError, Result};

/// Stream header magic
pub const Y4M_MAGIC: &str = "YUV4MPEG2";

/// Per-frame header
pub const Y4M_FRAME_HEADER: &[u8] = b"FRAME\n";

/// Builds the stream header line for the given geometry.
#[must_use]
pub fn stream_header(width: u32, height: u32, frame_rate: u32) -> String {
    format!("{} W{} H{} F{}:1 Ip A1:1 C420jpeg\n", Y4M_MAGIC, width, height, frame_rate)
}

/// Writes I420 frames to a `.y4m` file.
pub struct Y4mEncoder {
    writer: BufWriter<File>,
    path: PathBuf,
    width: u32,
    height: u32,
    frames_written: u64,
}

impl std::fmt::Debug for Y4mEncoder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Y4mEncoder")
            .field("path", &self.path)
            .field("width", &self.width)
            .field("height", &self.height)
            .field("frames_written", &self.frames_written)
            .finish_non_exhaustive()
    }
}

impl Y4mEncoder {
    /// Create the file and write the stream header.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` error if the geometry is invalid, or `Io` if the
    /// file cannot be created.
    pub fn create(path: &Path, width: u32, height: u32, frame_rate: u32) -> Result<Self> {
        if width == 0 || height == 0 || frame_rate == 0 {
            return Err(MidiPilotError::Encoder(format!(
                "Invalid stream {}x{} @ {} fps",
                width, height, frame_rate
            )));
        }

        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        writer.write_all(stream_header(width, height, frame_rate).as_bytes())?;

        debug!("Opened {} ({}x{} @ {} fps)", path.display(), width, height, frame_rate);

        Ok(Self {
            writer,
            path: path.to_path_buf(),
            width,
            height,
            frames_written: 0,
        })
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }
}

impl VideoEncoder for Y4mEncoder {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        if frame.width() != self.width || frame.height() != self.height {
            return Err(MidiPilotError::Encoder(format!(
                "Frame size changed from {}x{} to {}x{}",
                self.width,
                self.height,
                frame.width(),
                frame.height()
            )));
        }

        self.writer.write_all(Y4M_FRAME_HEADER)?;
        self.writer.write_all(frame.data())?;
        self.frames_written += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        let Y4mEncoder { writer, path, frames_written, .. } = *self;

        let file = writer.into_inner().map_err(|e| {
            MidiPilotError::Encoder(format!("Failed to flush {}: {}", path.display(), e.error()))
        })?;
        file.sync_all()?;

        debug!("Closed {} after {} frames", path.display(), frames_written);
        Ok(path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}

/// Opens a [`Y4mEncoder`] per session.
#[derive(Debug, Clone, Copy, Default)]
pub struct Y4mEncoderFactory;

impl EncoderFactory for Y4mEncoderFactory {
    fn extension(&self) -> &str {
        "y4m"
    }

    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<Box<dyn VideoEncoder>> {
        Ok(Box::new(Y4mEncoder::create(path, width, height, frame_rate)?))
    }
}
