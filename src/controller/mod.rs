//! # Command & Capture Controller
//!
//! Turns key commands into flight commands and owns the capture thread.
//!
//! ## Dispatch Rules
//!
//! | Command | Grounded | Flying |
//! |---------|----------|--------|
//! | Takeoff/land | wait for telemetry, take off | land |
//! | Record | stop a leftover session, else refuse | start or stop a session |
//! | Hover / directional | forwarded | forwarded |
//! | Emergency | counted; fires at the threshold | counted; fires at the threshold |
//!
//! ## Threading
//!
//! [`Controller::handle_command`] runs on the input dispatch context. A capture
//! session runs on its own thread, spawned lazily and always joined. At most
//! one capture thread exists at a time. Stopping a session is cooperative: the
//! controller sets the stop signal and joins, so the file is finalized before
//! the command returns.
//!
//! Faults on the capture thread become state changes (capture back to idle,
//! vehicle grounded on link loss) that the controller picks up on its next
//! command.

pub mod emergency;

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use crate::capture::encoder::EncoderFactory;
use crate::capture::session::{self, SessionContext, SessionOutcome, StreamEnd};
use crate::capture::{CaptureState, FrameSource, PreviewSink};
use crate::command::Command;
use crate::config::{CaptureConfig, FlightConfig};
use crate::error::{MidiPilotError, Result};
use crate::flight::{FlightState, FlightTransport};
use crate::state::SharedState;
use emergency::EmergencyCounter;

/// Extra time allowed for a session to leave its opening state, on top of the
/// video ready wait and first frame wait it performs itself.
const OPENING_GRACE: Duration = Duration::from_secs(1);

/// Owns flight state, capture state and the capture thread.
pub struct Controller {
    transport: Arc<dyn FlightTransport>,
    frames: Arc<dyn FrameSource>,
    preview: Arc<dyn PreviewSink>,
    encoders: Arc<dyn EncoderFactory>,
    flight_config: FlightConfig,
    capture_config: CaptureConfig,
    shared: Arc<SharedState>,
    capture_thread: Option<JoinHandle<SessionOutcome>>,
    emergency: EmergencyCounter,
    last_session: Option<SessionOutcome>,
}

impl std::fmt::Debug for Controller {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Controller")
            .field("state", &self.shared.snapshot())
            .field("emergency", &self.emergency)
            .field("capture_thread", &self.capture_thread.is_some())
            .finish_non_exhaustive()
    }
}

impl Controller {
    /// Create a controller for a grounded vehicle with no capture running.
    pub fn new(
        flight_config: FlightConfig,
        capture_config: CaptureConfig,
        transport: Arc<dyn FlightTransport>,
        frames: Arc<dyn FrameSource>,
        preview: Arc<dyn PreviewSink>,
        encoders: Arc<dyn EncoderFactory>,
    ) -> Self {
        let emergency = EmergencyCounter::new(
            flight_config.emergency_threshold,
            flight_config.emergency_reset,
        );

        Self {
            transport,
            frames,
            preview,
            encoders,
            flight_config,
            capture_config,
            shared: Arc::new(SharedState::new()),
            capture_thread: None,
            emergency,
            last_session: None,
        }
    }

    /// Dispatch one command from the input loop.
    ///
    /// Never fails: errors are logged so a misbehaving vehicle cannot stop the
    /// input loop.
    ///
    /// # Arguments
    ///
    /// * `command` - Command bound to the pressed key
    /// * `magnitude` - Fraction of the maximum rate (0.0 to 1.0), used by
    ///   directional commands only
    pub fn handle_command(&mut self, command: Command, magnitude: f32) {
        if let Err(e) = self.try_handle_command(command, magnitude) {
            match e {
                MidiPilotError::UserMisuse(_) => warn!("{}", e),
                _ => error!("Command {} failed: {}", command, e),
            }
        }
    }

    /// Dispatch one command, returning any failure.
    pub fn try_handle_command(&mut self, command: Command, magnitude: f32) -> Result<()> {
        self.reap_capture_thread();
        debug!(%command, magnitude, "Dispatching command");

        match command {
            Command::TakeoffLand => self.toggle_flight(),
            Command::Record => self.toggle_recording(),
            Command::Hover => self.transport.hover(),
            Command::Emergency => self.emergency_signal(),
            Command::Down
            | Command::Up
            | Command::TurnLeft
            | Command::TurnRight
            | Command::Backward
            | Command::Forward
            | Command::Left
            | Command::Right => match command.direction() {
                Some(direction) => self.transport.move_by(direction, magnitude),
                None => Ok(()),
            },
        }
    }

    pub fn flight_state(&self) -> FlightState {
        self.shared.snapshot().flight
    }

    pub fn capture_state(&self) -> CaptureState {
        self.shared.snapshot().capture
    }

    /// Whether a capture thread is alive.
    pub fn is_capture_running(&self) -> bool {
        self.shared.snapshot().capture_running
    }

    /// Emergency signals counted so far.
    pub fn emergency_count(&self) -> u32 {
        self.emergency.count()
    }

    /// Outcome of the most recently joined capture session, if not yet taken.
    pub fn take_last_session(&mut self) -> Option<SessionOutcome> {
        self.reap_capture_thread();
        self.last_session.take()
    }

    /// Stop any capture session and join its thread.
    pub fn shutdown(&mut self) {
        if let Err(e) = self.stop_capture() {
            error!("Failed to stop capture during shutdown: {}", e);
        }
    }

    fn toggle_flight(&mut self) -> Result<()> {
        match self.flight_state() {
            FlightState::Grounded => {
                let timeout = self.flight_config.telemetry_timeout();
                if !self.transport.wait_telemetry_ready(timeout) {
                    return Err(MidiPilotError::TelemetryTimeout(timeout));
                }

                self.transport.takeoff()?;
                self.shared.update(|s| s.flight = FlightState::Flying);
                info!("Took off");
            }
            FlightState::Flying => {
                self.transport.land()?;
                self.shared.update(|s| s.flight = FlightState::Grounded);
                info!("Landed");
            }
        }
        Ok(())
    }

    fn toggle_recording(&mut self) -> Result<()> {
        // Liveness and flight state are read in one critical section
        let state = self.shared.snapshot();

        match (state.flight, state.capture_running) {
            (FlightState::Grounded, true) => {
                info!("Recording was left on after landing, stopping it");
                self.stop_capture()
            }
            (FlightState::Grounded, false) => Err(MidiPilotError::UserMisuse(
                "Drone must be flying in order to record video!".to_string(),
            )),
            (FlightState::Flying, true) => self.stop_capture(),
            (FlightState::Flying, false) => self.start_capture(),
        }
    }

    fn start_capture(&mut self) -> Result<()> {
        // A finished thread not reaped yet must be joined before a new spawn
        if let Some(handle) = self.capture_thread.take() {
            self.collect(handle);
        }

        self.shared.update(|s| {
            s.capture_running = true;
            s.stop_requested = false;
        });

        let ctx = SessionContext {
            shared: Arc::clone(&self.shared),
            transport: Arc::clone(&self.transport),
            frames: Arc::clone(&self.frames),
            preview: Arc::clone(&self.preview),
            encoders: Arc::clone(&self.encoders),
            config: self.capture_config.clone(),
        };

        let handle = thread::Builder::new()
            .name("capture".to_string())
            .spawn(move || session::run(ctx))
            .map_err(|e| {
                self.shared.update(|s| s.capture_running = false);
                MidiPilotError::CaptureThread(format!("Failed to spawn capture thread: {}", e))
            })?;
        self.capture_thread = Some(handle);
        debug!("Capture thread spawned");

        // Wait for the session to leave its opening state
        let timeout = self.capture_config.video_ready_timeout() * 2 + OPENING_GRACE;
        let (state, timed_out) = self
            .shared
            .wait_while(timeout, |s| s.capture_running && s.capture == CaptureState::Idle);

        if state.capture == CaptureState::Recording {
            return Ok(());
        }

        if !state.capture_running {
            // The session ended while opening
            if let Some(handle) = self.capture_thread.take() {
                return match self.join(handle) {
                    Ok(SessionOutcome::OpenFailed(e)) => Err(e),
                    Ok(outcome) => {
                        self.log_outcome(&outcome);
                        self.last_session = Some(outcome);
                        Ok(())
                    }
                    Err(e) => Err(e),
                };
            }
        }

        if timed_out {
            warn!("Capture session still opening after {:?}", timeout);
        }
        Ok(())
    }

    /// Signal the capture thread to stop and join it.
    fn stop_capture(&mut self) -> Result<()> {
        let Some(handle) = self.capture_thread.take() else {
            return Ok(());
        };

        self.shared.update(|s| s.stop_requested = true);
        info!("Stopping capture session");

        let outcome = self.join(handle)?;
        self.log_outcome(&outcome);
        self.last_session = Some(outcome);
        Ok(())
    }

    fn emergency_signal(&mut self) -> Result<()> {
        if !self.emergency.signal() {
            info!(
                "Emergency signal {}/{}",
                self.emergency.count().min(self.emergency.threshold()),
                self.emergency.threshold()
            );
            return Ok(());
        }

        warn!(fired = self.emergency.fired(), "Emergency stop!");
        let result = self.transport.emergency();

        // Keep recording for a moment so the event is on video
        let hold = self.flight_config.emergency_hold();
        if self.capture_thread.is_some() && !hold.is_zero() {
            thread::sleep(hold);
        }
        self.stop_capture()?;

        result
    }

    /// Join the capture thread if it has already finished on its own.
    fn reap_capture_thread(&mut self) {
        if self.capture_thread.is_none() || self.shared.snapshot().capture_running {
            return;
        }

        if let Some(handle) = self.capture_thread.take() {
            self.collect(handle);
        }
    }

    /// Join a finished thread and record its outcome.
    fn collect(&mut self, handle: JoinHandle<SessionOutcome>) {
        match self.join(handle) {
            Ok(outcome) => {
                self.log_outcome(&outcome);
                self.last_session = Some(outcome);
            }
            Err(e) => error!("{}", e),
        }
    }

    fn join(&self, handle: JoinHandle<SessionOutcome>) -> Result<SessionOutcome> {
        handle.join().map_err(|_| {
            // The thread never reached its terminal transition
            self.shared.update(|s| {
                s.capture = CaptureState::Idle;
                s.capture_running = false;
                s.stop_requested = false;
            });
            MidiPilotError::CaptureThread("capture thread panicked".to_string())
        })
    }

    fn log_outcome(&self, outcome: &SessionOutcome) {
        match outcome {
            SessionOutcome::Recorded(report) => {
                match &report.end {
                    StreamEnd::Stopped => info!(
                        frames = report.frames_written,
                        "Capture session saved to {}",
                        report.path.display()
                    ),
                    StreamEnd::LinkLoss { missed } => error!(
                        "Capture session ended by video link loss ({} frames missing), saved to {}",
                        missed,
                        report.path.display()
                    ),
                    StreamEnd::EncoderFault(e) => {
                        error!("Capture session ended by encoder fault: {}", e)
                    }
                }
                if let Some(e) = &report.finalize_error {
                    error!("Recording {} may be incomplete: {}", report.path.display(), e);
                }
            }
            SessionOutcome::OpenFailed(e) => error!("Capture session failed to open: {}", e),
        }
    }
}

impl Drop for Controller {
    fn drop(&mut self) {
        self.shutdown();
    }
}
