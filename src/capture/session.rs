//! # Capture Session
//!
//! The body of the capture thread. One call to [`run`] is one recording
//! segment and walks the states
//!
//! ```text
//! Opening -> Streaming -> Closing -> Closed
//! ```
//!
//! - **Opening**: wait for the video feed, read one frame for its dimensions,
//!   open the encoder on a timestamp-named file, set `CaptureState::Recording`.
//! - **Streaming**: poll the frame source once per frame interval, show each
//!   frame on the preview and append it until the stop signal is set or the
//!   session faults.
//! - **Closing**: finalize the encoder and clear the preview. This runs on
//!   every exit path.
//! - **Closed**: set `CaptureState::Idle` and clear the liveness flag.
//!
//! Isolated missing frames are skipped. `link_loss_frames` consecutive misses
//! end the session with [`StreamEnd::LinkLoss`] and force the vehicle down.

use chrono::Local;
use std::path::PathBuf;
use std::sync::Arc;
use std::thread;
use std::time::Instant;
use tracing::{debug, error, info, warn};

use super::encoder::{recording_path, EncoderFactory, VideoEncoder};
use super::{CaptureState, Frame, FrameSource, PreviewSink};
use crate::config::CaptureConfig;
use crate::error::{MidiPilotError, Result};
use crate::flight::{FlightState, FlightTransport};
use crate::state::SharedState;

/// Everything the capture thread needs, moved into it at spawn time.
pub struct SessionContext {
    pub shared: Arc<SharedState>,
    pub transport: Arc<dyn FlightTransport>,
    pub frames: Arc<dyn FrameSource>,
    pub preview: Arc<dyn PreviewSink>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub config: CaptureConfig,
}

/// Why the streaming loop ended.
#[derive(Debug)]
pub enum StreamEnd {
    /// The stop signal was observed.
    Stopped,
    /// Too many consecutive frames were missing.
    LinkLoss { missed: u32 },
    /// The encoder rejected a frame.
    EncoderFault(MidiPilotError),
}

/// Summary of a session that got as far as opening its file.
#[derive(Debug)]
pub struct SessionReport {
    pub path: PathBuf,
    pub frames_written: u64,
    pub end: StreamEnd,
    /// Set when flushing or closing the file failed.
    pub finalize_error: Option<MidiPilotError>,
}

/// Result value returned by the capture thread.
#[derive(Debug)]
pub enum SessionOutcome {
    Recorded(SessionReport),
    /// No file was opened.
    OpenFailed(MidiPilotError),
}

impl SessionOutcome {
    pub fn report(&self) -> Option<&SessionReport> {
        match self {
            SessionOutcome::Recorded(report) => Some(report),
            SessionOutcome::OpenFailed(_) => None,
        }
    }

    pub fn is_link_loss(&self) -> bool {
        matches!(
            self,
            SessionOutcome::Recorded(SessionReport { end: StreamEnd::LinkLoss { .. }, .. })
        )
    }

    /// The session-ending fault, if it did not end on request.
    pub fn fault(&self) -> Option<MidiPilotError> {
        match self {
            SessionOutcome::Recorded(report) => match &report.end {
                StreamEnd::Stopped => None,
                StreamEnd::LinkLoss { missed } => {
                    Some(MidiPilotError::LinkLoss { missed: *missed })
                }
                StreamEnd::EncoderFault(e) => Some(MidiPilotError::Encoder(e.to_string())),
            },
            SessionOutcome::OpenFailed(e) => Some(MidiPilotError::CaptureThread(e.to_string())),
        }
    }
}

/// Run one capture session to completion.
///
/// Never panics on a faulty feed or encoder; faults are returned in the
/// outcome and reflected in the shared state.
pub fn run(ctx: SessionContext) -> SessionOutcome {
    let outcome = match open(&ctx) {
        Ok(mut encoder) => {
            let (end, frames_written) = stream(&ctx, encoder.as_mut());
            if let StreamEnd::LinkLoss { missed } = end {
                force_landing(&ctx, missed);
            }
            let outcome = close(encoder, end, frames_written);
            ctx.preview.clear();
            outcome
        }
        Err(e) => {
            error!("Capture session failed to open: {}", e);
            SessionOutcome::OpenFailed(e)
        }
    };

    ctx.shared.update(|s| {
        s.capture = CaptureState::Idle;
        s.capture_running = false;
        s.stop_requested = false;
    });
    debug!("Capture thread finished");

    outcome
}

fn open(ctx: &SessionContext) -> Result<Box<dyn VideoEncoder>> {
    let timeout = ctx.config.video_ready_timeout();

    info!("Waiting for drone video...");
    if !ctx.transport.wait_video_ready(timeout) {
        return Err(MidiPilotError::VideoTimeout(timeout));
    }

    let first = first_frame(ctx).ok_or(MidiPilotError::VideoTimeout(timeout))?;

    let path = recording_path(&ctx.config.output_dir, ctx.encoders.extension(), &Local::now())?;
    let encoder = ctx
        .encoders
        .open(&path, first.width(), first.height(), ctx.config.frame_rate)?;

    ctx.shared.update(|s| s.capture = CaptureState::Recording);
    info!(
        width = first.width(),
        height = first.height(),
        fps = ctx.config.frame_rate,
        "Recording to {}",
        path.display()
    );

    Ok(encoder)
}

/// Poll until the feed yields a frame, within the video ready timeout.
fn first_frame(ctx: &SessionContext) -> Option<Frame> {
    let deadline = Instant::now() + ctx.config.video_ready_timeout();
    loop {
        if let Some(frame) = ctx.frames.current_frame() {
            return Some(frame);
        }
        if Instant::now() >= deadline {
            return None;
        }
        thread::sleep(ctx.config.frame_interval());
    }
}

fn stream(ctx: &SessionContext, encoder: &mut dyn VideoEncoder) -> (StreamEnd, u64) {
    let interval = ctx.config.frame_interval();
    let threshold = ctx.config.link_loss_frames;

    let mut missed: u32 = 0;
    let mut frames_written: u64 = 0;
    let mut next_tick = Instant::now();

    loop {
        match ctx.frames.current_frame() {
            Some(frame) => {
                if missed > 0 {
                    debug!("Video recovered after {} missing frames", missed);
                }
                missed = 0;

                ctx.preview.show(&frame);
                if let Err(e) = encoder.write_frame(&frame) {
                    error!("Failed to write frame to {}: {}", encoder.path().display(), e);
                    return (StreamEnd::EncoderFault(e), frames_written);
                }
                frames_written += 1;
            }
            None => {
                missed += 1;
                if missed >= threshold {
                    return (StreamEnd::LinkLoss { missed }, frames_written);
                }
                debug!("Frame missing ({}/{})", missed, threshold);
            }
        }

        // Sleep until the next tick, waking early on a stop request
        next_tick += interval;
        let now = Instant::now();
        let wait = next_tick.saturating_duration_since(now);
        if wait.is_zero() {
            next_tick = now;
        }

        let (state, _) = ctx.shared.wait_while(wait, |s| !s.stop_requested);
        if state.stop_requested {
            return (StreamEnd::Stopped, frames_written);
        }
    }
}

fn force_landing(ctx: &SessionContext, missed: u32) {
    error!(missed, "Video link lost, forcing landing");

    if ctx.shared.snapshot().flight == FlightState::Flying {
        if let Err(e) = ctx.transport.land() {
            error!("Forced landing failed: {}", e);
        }
    } else {
        warn!("Video link lost while grounded");
    }

    ctx.shared.update(|s| s.flight = FlightState::Grounded);
}

fn close(encoder: Box<dyn VideoEncoder>, end: StreamEnd, frames_written: u64) -> SessionOutcome {
    let path = encoder.path().to_path_buf();

    let finalize_error = match encoder.finish() {
        Ok(path) => {
            info!(frames = frames_written, "Video is now closed. Written to: {}", path.display());
            None
        }
        Err(e) => {
            error!("Failed to finalize {}: {}", path.display(), e);
            Some(e)
        }
    };

    SessionOutcome::Recorded(SessionReport {
        path,
        frames_written,
        end,
        finalize_error,
    })
}
