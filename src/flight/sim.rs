//! # Simulated Drone
//!
//! An in-process quadcopter for dry runs without hardware. It accepts every
//! flight command, tracks whether it is airborne, and renders a synthetic
//! camera feed on a background thread.
//!
//! The feed can be cut and restored at runtime to exercise link loss handling.

use bytes::Bytes;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, info, warn};

use super::FlightTransport;
use crate::capture::{Frame, FrameSource};
use crate::command::Direction;
use crate::config::SimConfig;
use crate::error::{MidiPilotError, Result};

/// Most recent commands kept in the command log.
const COMMAND_LOG_LEN: usize = 256;

/// A command received by the simulated drone.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SimCommand {
    Takeoff,
    Land,
    Hover,
    Move(Direction, f32),
    Emergency,
}

#[derive(Debug)]
struct SimState {
    frame: Option<Frame>,
    video_enabled: bool,
    telemetry_ready: bool,
    flying: bool,
    commands: VecDeque<SimCommand>,
}

#[derive(Debug)]
struct Inner {
    state: Mutex<SimState>,
    changed: Condvar,
    stop: AtomicBool,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn wait_for<F>(&self, timeout: Duration, mut ready: F) -> bool
    where
        F: FnMut(&SimState) -> bool,
    {
        let guard = self.lock();
        let (guard, _) = self
            .changed
            .wait_timeout_while(guard, timeout, |state| !ready(state))
            .unwrap_or_else(PoisonError::into_inner);
        ready(&guard)
    }
}

/// Simulated quadcopter with a synthetic video feed.
#[derive(Debug)]
pub struct SimulatedDrone {
    inner: Arc<Inner>,
    renderer: Option<JoinHandle<()>>,
}

impl SimulatedDrone {
    /// Start the simulated drone and its frame renderer.
    ///
    /// # Errors
    ///
    /// Returns `Encoder` error for a zero frame size and `Io` error if the
    /// renderer thread cannot be spawned.
    pub fn start(config: &SimConfig) -> Result<Self> {
        if config.frame_width == 0 || config.frame_height == 0 {
            return Err(MidiPilotError::Encoder(format!(
                "Invalid simulated frame size {}x{}",
                config.frame_width, config.frame_height
            )));
        }

        let inner = Arc::new(Inner {
            state: Mutex::new(SimState {
                frame: None,
                video_enabled: true,
                telemetry_ready: true,
                flying: false,
                commands: VecDeque::with_capacity(COMMAND_LOG_LEN),
            }),
            changed: Condvar::new(),
            stop: AtomicBool::new(false),
        });

        let renderer = {
            let inner = Arc::clone(&inner);
            let (width, height) = (config.frame_width, config.frame_height);
            let interval = Duration::from_secs(1) / config.frame_rate.max(1);
            thread::Builder::new()
                .name("sim-video".to_string())
                .spawn(move || render_loop(&inner, width, height, interval))?
        };

        info!(
            width = config.frame_width,
            height = config.frame_height,
            fps = config.frame_rate,
            "Simulated drone started"
        );

        Ok(Self {
            inner,
            renderer: Some(renderer),
        })
    }

    /// Make navigation telemetry available or unavailable.
    #[cfg(test)]
    pub(crate) fn set_telemetry_ready(&self, ready: bool) {
        self.inner.lock().telemetry_ready = ready;
        self.inner.changed.notify_all();
    }

    /// Cut the video feed. Frames stop until [`restore_video`](Self::restore_video).
    pub fn drop_video(&self) {
        let mut state = self.inner.lock();
        state.video_enabled = false;
        state.frame = None;
        warn!("Simulated video feed dropped");
    }

    pub fn restore_video(&self) {
        self.inner.lock().video_enabled = true;
        info!("Simulated video feed restored");
    }

    pub fn is_flying(&self) -> bool {
        self.inner.lock().flying
    }

    /// The most recent commands received, oldest first.
    pub fn commands(&self) -> Vec<SimCommand> {
        self.inner.lock().commands.iter().copied().collect()
    }

    fn record(&self, command: SimCommand) {
        debug!(?command, "Simulated drone command");
        let mut state = self.inner.lock();
        match command {
            SimCommand::Takeoff => state.flying = true,
            SimCommand::Land | SimCommand::Emergency => state.flying = false,
            SimCommand::Hover | SimCommand::Move(..) => {}
        }
        if state.commands.len() == COMMAND_LOG_LEN {
            state.commands.pop_front();
        }
        state.commands.push_back(command);
    }
}

impl Drop for SimulatedDrone {
    fn drop(&mut self) {
        self.inner.stop.store(true, Ordering::SeqCst);
        if let Some(renderer) = self.renderer.take() {
            if renderer.join().is_err() {
                warn!("Simulated video renderer panicked");
            }
        }
    }
}

impl FlightTransport for SimulatedDrone {
    fn takeoff(&self) -> Result<()> {
        if self.is_flying() {
            warn!("Takeoff requested while already flying");
        }
        self.record(SimCommand::Takeoff);
        Ok(())
    }

    fn land(&self) -> Result<()> {
        self.record(SimCommand::Land);
        Ok(())
    }

    fn hover(&self) -> Result<()> {
        self.record(SimCommand::Hover);
        Ok(())
    }

    fn move_by(&self, direction: Direction, magnitude: f32) -> Result<()> {
        self.record(SimCommand::Move(direction, magnitude.clamp(0.0, 1.0)));
        Ok(())
    }

    fn emergency(&self) -> Result<()> {
        self.record(SimCommand::Emergency);
        Ok(())
    }

    fn wait_telemetry_ready(&self, timeout: Duration) -> bool {
        self.inner.wait_for(timeout, |s| s.telemetry_ready)
    }

    fn wait_video_ready(&self, timeout: Duration) -> bool {
        self.inner.wait_for(timeout, |s| s.frame.is_some())
    }
}

impl FrameSource for SimulatedDrone {
    fn current_frame(&self) -> Option<Frame> {
        self.inner.lock().frame.clone()
    }
}

fn render_loop(inner: &Inner, width: u32, height: u32, interval: Duration) {
    let mut index: u32 = 0;

    while !inner.stop.load(Ordering::SeqCst) {
        let enabled = inner.lock().video_enabled;
        if enabled {
            match render_frame(width, height, index) {
                Ok(frame) => {
                    let mut state = inner.lock();
                    // The feed may have been dropped while rendering
                    if state.video_enabled {
                        state.frame = Some(frame);
                    }
                    drop(state);
                    inner.changed.notify_all();
                }
                Err(e) => {
                    warn!("Failed to render simulated frame: {}", e);
                    return;
                }
            }
            index = index.wrapping_add(1);
        }

        thread::sleep(interval);
    }

    debug!("Simulated video renderer stopped");
}

/// Diagonal luma gradient scrolling by a few pixels per frame, grey chroma.
fn render_frame(width: u32, height: u32, index: u32) -> Result<Frame> {
    let len = Frame::i420_len(width, height);
    let offset = index.wrapping_mul(4);

    let mut data = Vec::with_capacity(len);
    for y in 0..height {
        for x in 0..width {
            data.push((x.wrapping_add(y).wrapping_add(offset) & 0xff) as u8);
        }
    }
    data.resize(len, 128);

    Frame::new(width, height, Bytes::from(data))
}
