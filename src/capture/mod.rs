//! # Capture Module
//!
//! Records the vehicle's camera feed to video files.
//!
//! This module handles:
//! - The [`FrameSource`] capability interface over the live video feed
//! - The [`PreviewSink`] shown each recorded frame
//! - Video encoders and the YUV4MPEG2 file writer
//! - The capture session state machine run on the capture thread

pub mod encoder;
pub mod session;
pub mod y4m;

use bytes::Bytes;
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::debug;

use crate::error::{MidiPilotError, Result};

/// Whether a capture session is currently writing frames.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Recording,
}

/// One decoded camera frame in planar YUV 4:2:0 (I420) layout.
///
/// The buffer holds the full-resolution Y plane followed by the U and V planes
/// at half resolution in both directions (rounded up).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    data: Bytes,
}

impl Frame {
    /// Creates a frame, checking the buffer matches the dimensions.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` error if either dimension is zero or the buffer length
    /// does not match [`Frame::i420_len`].
    ///
    /// # Examples
    ///
    /// ```
    /// use bytes::Bytes;
    /// use midi_pilot::capture::Frame;
    ///
    /// let frame = Frame::new(4, 2, Bytes::from(vec![0u8; 12]))?;
    /// assert_eq!(frame.width(), 4);
    /// assert!(Frame::new(4, 2, Bytes::from(vec![0u8; 8])).is_err());
    /// # Ok::<(), midi_pilot::error::MidiPilotError>(())
    /// ```
    pub fn new(width: u32, height: u32, data: Bytes) -> Result<Self> {
        if width == 0 || height == 0 {
            return Err(MidiPilotError::Encoder(format!("Invalid frame size {}x{}", width, height)));
        }

        let expected = Self::i420_len(width, height);
        if data.len() != expected {
            return Err(MidiPilotError::Encoder(format!(
                "Frame buffer is {} bytes, expected {} for {}x{}",
                data.len(),
                expected,
                width,
                height
            )));
        }

        Ok(Self { width, height, data })
    }

    /// Byte length of an I420 buffer for the given dimensions.
    #[must_use]
    pub fn i420_len(width: u32, height: u32) -> usize {
        let luma = width as usize * height as usize;
        let chroma = width.div_ceil(2) as usize * height.div_ceil(2) as usize;
        luma + 2 * chroma
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &Bytes {
        &self.data
    }
}

/// Live video feed of the vehicle.
pub trait FrameSource: Send + Sync {
    /// The most recently received frame, or `None` if none is available.
    ///
    /// Must not block.
    fn current_frame(&self) -> Option<Frame>;
}

/// Live view of the frames being recorded.
pub trait PreviewSink: Send + Sync {
    /// Show a frame about to be written.
    fn show(&self, frame: &Frame);

    /// Reset the view once the session has closed.
    fn clear(&self);
}

/// Preview for deployments without a display: logs capture progress.
#[derive(Debug)]
pub struct HeadlessPreview {
    log_every: u64,
    shown: AtomicU64,
}

impl HeadlessPreview {
    /// Log progress once per `frame_rate` frames (once a second of video).
    pub fn new(frame_rate: u32) -> Self {
        Self {
            log_every: u64::from(frame_rate.max(1)),
            shown: AtomicU64::new(0),
        }
    }

    /// Frames shown since the last clear.
    pub fn shown(&self) -> u64 {
        self.shown.load(Ordering::Relaxed)
    }
}

impl PreviewSink for HeadlessPreview {
    fn show(&self, frame: &Frame) {
        let shown = self.shown.fetch_add(1, Ordering::Relaxed) + 1;
        if shown % self.log_every == 0 {
            debug!(frames = shown, width = frame.width(), height = frame.height(), "Capturing");
        }
    }

    fn clear(&self) {
        self.shown.store(0, Ordering::Relaxed);
    }
}
