//! # Video Encoder Interface
//!
//! Encoders own one open output file for the length of a capture session.

use chrono::{DateTime, TimeZone};
use std::fs;
use std::path::{Path, PathBuf};

use super::Frame;
use crate::error::Result;

/// Timestamp layout of recording file names (`MM-DD-YYYY--HH-MM-SS`).
pub const RECORDING_NAME_FORMAT: &str = "%m-%d-%Y--%H-%M-%S";

/// An open video file accepting frames.
///
/// Finalizing consumes the encoder, so a file can only be closed once.
pub trait VideoEncoder: Send {
    /// Append one frame.
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the file, returning its path.
    fn finish(self: Box<Self>) -> Result<PathBuf>;

    /// Path of the file being written.
    fn path(&self) -> &Path;
}

/// Opens a new encoder for each capture session.
pub trait EncoderFactory: Send + Sync {
    /// File extension of the container, without the dot.
    fn extension(&self) -> &str;

    fn open(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        frame_rate: u32,
    ) -> Result<Box<dyn VideoEncoder>>;
}

/// Picks the output path for a session started at `now`.
///
/// Creates `dir` if needed. When a file with the same timestamp already
/// exists (two sessions in the same second), a `-N` suffix is appended.
///
/// # Examples
///
/// ```
/// use chrono::{Local, TimeZone};
/// use midi_pilot::capture::encoder::recording_path;
///
/// let dir = tempfile::tempdir()?;
/// let now = Local.with_ymd_and_hms(2024, 3, 7, 14, 5, 9).unwrap();
/// let path = recording_path(dir.path(), "y4m", &now)?;
/// assert_eq!(path.file_name().unwrap(), "03-07-2024--14-05-09.y4m");
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub fn recording_path<Tz>(dir: &Path, extension: &str, now: &DateTime<Tz>) -> Result<PathBuf>
where
    Tz: TimeZone,
    Tz::Offset: std::fmt::Display,
{
    fs::create_dir_all(dir)?;

    let stem = now.format(RECORDING_NAME_FORMAT).to_string();
    let mut path = dir.join(format!("{}.{}", stem, extension));
    let mut suffix = 1;
    while path.exists() {
        path = dir.join(format!("{}-{}.{}", stem, suffix, extension));
        suffix += 1;
    }

    Ok(path)
}
