//! Test doubles for the frame source, preview and encoder seams.

use bytes::Bytes;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use crate::capture::encoder::{EncoderFactory, VideoEncoder};
use crate::capture::{Frame, FrameSource, PreviewSink};
use crate::error::{MidiPilotError, Result};

/// A small valid frame.
pub fn test_frame() -> Frame {
    Frame::new(4, 2, Bytes::from(vec![128u8; Frame::i420_len(4, 2)])).unwrap()
}

/// Poll `condition` every few milliseconds until it holds or `timeout` passes.
pub fn wait_until<F: FnMut() -> bool>(timeout: Duration, mut condition: F) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        thread::sleep(Duration::from_millis(2));
    }
    condition()
}

/// Frame source replaying a script, then a fixed fallback forever.
pub struct ScriptedFrames {
    script: Mutex<VecDeque<Option<Frame>>>,
    fallback: Option<Frame>,
    polls: AtomicUsize,
}

impl ScriptedFrames {
    pub fn new(script: Vec<Option<Frame>>, fallback: Option<Frame>) -> Self {
        Self {
            script: Mutex::new(script.into()),
            fallback,
            polls: AtomicUsize::new(0),
        }
    }

    pub fn always(frame: Frame) -> Self {
        Self::new(Vec::new(), Some(frame))
    }

    pub fn never() -> Self {
        Self::new(Vec::new(), None)
    }

    pub fn polls(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }
}

impl FrameSource for ScriptedFrames {
    fn current_frame(&self) -> Option<Frame> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        match self.script.lock().unwrap().pop_front() {
            Some(entry) => entry,
            None => self.fallback.clone(),
        }
    }
}

/// Preview counting shown frames and clears.
#[derive(Default)]
pub struct RecordingPreview {
    shown: AtomicUsize,
    clears: AtomicUsize,
}

impl RecordingPreview {
    pub fn shown(&self) -> usize {
        self.shown.load(Ordering::SeqCst)
    }

    pub fn clears(&self) -> usize {
        self.clears.load(Ordering::SeqCst)
    }
}

impl PreviewSink for RecordingPreview {
    fn show(&self, _frame: &Frame) {
        self.shown.fetch_add(1, Ordering::SeqCst);
    }

    fn clear(&self) {
        self.clears.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct Counters {
    opened: AtomicUsize,
    finished: AtomicUsize,
    frames: AtomicU64,
}

/// Encoder factory counting open/finish calls without touching the disk.
pub struct CountingEncoders {
    counters: Arc<Counters>,
    fail_after: Option<u64>,
    fail_finish: bool,
}

impl CountingEncoders {
    pub fn new() -> Self {
        Self { counters: Arc::default(), fail_after: None, fail_finish: false }
    }

    /// Encoders that reject every frame after the first `frames`.
    pub fn failing_after(frames: u64) -> Self {
        Self { fail_after: Some(frames), ..Self::new() }
    }

    /// Encoders whose finalize step fails.
    pub fn failing_finish() -> Self {
        Self { fail_finish: true, ..Self::new() }
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn finished(&self) -> usize {
        self.counters.finished.load(Ordering::SeqCst)
    }

    pub fn frames(&self) -> u64 {
        self.counters.frames.load(Ordering::SeqCst)
    }
}

impl EncoderFactory for CountingEncoders {
    fn extension(&self) -> &str {
        "test"
    }

    fn open(
        &self,
        path: &Path,
        _width: u32,
        _height: u32,
        _frame_rate: u32,
    ) -> Result<Box<dyn VideoEncoder>> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(CountingEncoder {
            counters: Arc::clone(&self.counters),
            path: path.to_path_buf(),
            written: 0,
            fail_after: self.fail_after,
            fail_finish: self.fail_finish,
        }))
    }
}

struct CountingEncoder {
    counters: Arc<Counters>,
    path: PathBuf,
    written: u64,
    fail_after: Option<u64>,
    fail_finish: bool,
}

impl VideoEncoder for CountingEncoder {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        if self.fail_after.is_some_and(|limit| self.written >= limit) {
            return Err(MidiPilotError::Encoder("disk full".to_string()));
        }
        self.written += 1;
        self.counters.frames.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<PathBuf> {
        self.counters.finished.fetch_add(1, Ordering::SeqCst);
        if self.fail_finish {
            return Err(MidiPilotError::Encoder("flush failed".to_string()));
        }
        Ok(self.path)
    }

    fn path(&self) -> &Path {
        &self.path
    }
}
