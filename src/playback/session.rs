//! Playback session: the control-thread owner of one engine.
//!
//! State machine: `Idle → Loaded → Playing ⇄ RateAdjusting → Ended/Stopped → Idle`.
//! The session prepares buffers (rate floor), hands the engine to an
//! [`AudioBackend`], sends control messages, and turns engine reports into
//! events with a smoothed amplitude for visual feedback.

use std::sync::Arc;

use log::{error, info, warn};

use super::control::{
    ControlMessage, ControlSender, DEFAULT_CONTROL_CAPACITY, PlaybackBuffers, ReportSlot,
    RetiredReceiver, control_channel, retired_channel,
};
use super::engine::GrooveEngine;
use crate::dsp::resample::resample_cubic;
use crate::error::PlaybackError;

/// Buffers below this rate are upsampled once at load time.
pub const MIN_PLAYBACK_RATE: u32 = 8000;
/// Default processing block size in frames (one Web Audio render quantum).
pub const DEFAULT_BLOCK_SIZE: usize = 128;

/// Raise `buffers` to [`MIN_PLAYBACK_RATE`] with cubic interpolation if
/// they are recorded below it. Pitch is preserved; duration is unchanged.
pub fn enforce_rate_floor(buffers: PlaybackBuffers) -> PlaybackBuffers {
    let rate = buffers.sample_rate;
    if rate == 0 || rate >= MIN_PLAYBACK_RATE {
        return buffers;
    }
    warn!("upsampling {rate} Hz -> {MIN_PLAYBACK_RATE} Hz for playback");
    PlaybackBuffers {
        left: resample_cubic(&buffers.left, rate, MIN_PLAYBACK_RATE),
        right: buffers
            .right
            .map(|r| resample_cubic(&r, rate, MIN_PLAYBACK_RATE)),
        sample_rate: MIN_PLAYBACK_RATE,
    }
}

/// Fast-attack, slow-release smoothing of per-block RMS reports.
#[derive(Debug, Clone, Copy, Default)]
pub struct AmplitudeFollower {
    level: f64,
}

impl AmplitudeFollower {
    /// Weight of a rising report.
    pub const ATTACK: f64 = 0.6;
    /// Weight of a falling report.
    pub const RELEASE: f64 = 0.04;

    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, raw: f64) -> f64 {
        let weight = if raw > self.level {
            Self::ATTACK
        } else {
            Self::RELEASE
        };
        self.level = weight * raw + (1.0 - weight) * self.level;
        self.level
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn reset(&mut self) {
        self.level = 0.0;
    }
}

/// Where the real-time engine runs.
pub trait AudioBackend {
    /// Output sample rate of the device/context.
    fn output_rate(&self) -> u32;

    /// Take ownership of the engine and begin pulling blocks from it.
    fn start(&mut self, engine: GrooveEngine) -> Result<(), PlaybackError>;

    /// Stop pulling blocks and release the engine.
    fn shutdown(&mut self);
}

/// Backend that renders synchronously on demand. Used for tests and for
/// bouncing a playback (scratches included) to a buffer.
pub struct OfflineBackend {
    output_rate: u32,
    block_size: usize,
    engine: Option<GrooveEngine>,
    unavailable: Option<String>,
}

impl OfflineBackend {
    pub fn new(output_rate: u32, block_size: usize) -> Self {
        OfflineBackend {
            output_rate,
            block_size: block_size.max(1),
            engine: None,
            unavailable: None,
        }
    }

    /// A backend whose `start` always fails with `reason`.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        OfflineBackend {
            unavailable: Some(reason.into()),
            ..Self::new(44100, DEFAULT_BLOCK_SIZE)
        }
    }

    pub fn is_running(&self) -> bool {
        self.engine.is_some()
    }

    /// Render `blocks` blocks of stereo output.
    pub fn render(&mut self, blocks: usize) -> (Vec<f32>, Vec<f32>) {
        let mut left = vec![0.0; blocks * self.block_size];
        let mut right = vec![0.0; blocks * self.block_size];
        if let Some(engine) = self.engine.as_mut() {
            for (l, r) in left
                .chunks_mut(self.block_size)
                .zip(right.chunks_mut(self.block_size))
            {
                engine.process_block(l, r);
            }
        }
        (left, right)
    }

    /// Render until the engine reports the end, or `max_blocks` is reached.
    pub fn render_until_ended(&mut self, max_blocks: usize) -> (Vec<f32>, Vec<f32>) {
        let (mut left, mut right) = (Vec::new(), Vec::new());
        let Some(engine) = self.engine.as_mut() else {
            return (left, right);
        };
        let mut l = vec![0.0; self.block_size];
        let mut r = vec![0.0; self.block_size];
        for _ in 0..max_blocks {
            engine.process_block(&mut l, &mut r);
            left.extend_from_slice(&l);
            right.extend_from_slice(&r);
            if engine.is_ended() {
                break;
            }
        }
        (left, right)
    }
}

impl AudioBackend for OfflineBackend {
    fn output_rate(&self) -> u32 {
        self.output_rate
    }

    fn start(&mut self, engine: GrooveEngine) -> Result<(), PlaybackError> {
        if let Some(reason) = &self.unavailable {
            return Err(PlaybackError::BackendUnavailable(reason.clone()));
        }
        self.engine = Some(engine);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.engine = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Loaded,
    Playing,
    /// A new advance rate was sent and has not been confirmed by a report yet.
    RateAdjusting,
    Ended,
    Stopped,
}

/// What the UI observes after each poll.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlaybackEvent {
    /// Normalized position in [0, 1].
    pub position: f64,
    /// Envelope-followed amplitude.
    pub amplitude: f64,
    pub ended: bool,
}

pub type ErrorCallback = Box<dyn FnMut(&PlaybackError) + Send>;

pub struct PlaybackSession<B: AudioBackend> {
    backend: B,
    state: SessionState,
    control: Option<ControlSender>,
    retired: Option<RetiredReceiver>,
    reports: Arc<ReportSlot>,
    last_sequence: u64,
    follower: AmplitudeFollower,
    /// Advance applied by `play`.
    pending_advance: f64,
    buffer_len: usize,
    buffer_rate: u32,
    position: f64,
    on_error: Option<ErrorCallback>,
}

impl<B: AudioBackend> PlaybackSession<B> {
    pub fn new(backend: B) -> Self {
        PlaybackSession {
            backend,
            state: SessionState::Idle,
            control: None,
            retired: None,
            reports: Arc::new(ReportSlot::new()),
            last_sequence: 0,
            follower: AmplitudeFollower::new(),
            pending_advance: 1.0,
            buffer_len: 0,
            buffer_rate: 0,
            position: 0.0,
            on_error: None,
        }
    }

    /// Register the callback invoked when the backend fails.
    pub fn on_error(&mut self, callback: impl FnMut(&PlaybackError) + Send + 'static) {
        self.on_error = Some(Box::new(callback));
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    /// Latest normalized position.
    pub fn position(&self) -> f64 {
        self.position
    }

    /// Latest envelope-followed amplitude.
    pub fn amplitude(&self) -> f64 {
        self.follower.level()
    }

    /// Duration of the loaded audio in seconds.
    pub fn duration_secs(&self) -> f64 {
        if self.buffer_rate == 0 {
            0.0
        } else {
            self.buffer_len as f64 / self.buffer_rate as f64
        }
    }

    fn start_engine(&mut self) -> Result<(), PlaybackError> {
        let (tx, rx) = control_channel(DEFAULT_CONTROL_CAPACITY);
        let (retired_tx, retired_rx) = retired_channel();
        self.reports = Arc::new(ReportSlot::new());
        self.last_sequence = 0;
        let engine = GrooveEngine::new(
            self.backend.output_rate(),
            rx,
            retired_tx,
            Arc::clone(&self.reports),
        );
        match self.backend.start(engine) {
            Ok(()) => {
                info!("playback engine started at {} Hz", self.backend.output_rate());
                self.control = Some(tx);
                self.retired = Some(retired_rx);
                Ok(())
            }
            Err(err) => {
                self.fail(&err);
                Err(err)
            }
        }
    }

    /// Report a backend failure once and return to `Idle`.
    fn fail(&mut self, err: &PlaybackError) {
        error!("playback failed: {err}");
        if let Some(callback) = self.on_error.as_mut() {
            callback(err);
        }
        self.release();
    }

    fn release(&mut self) {
        self.backend.shutdown();
        if let Some(retired) = self.retired.as_mut() {
            retired.drain();
        }
        self.control = None;
        self.retired = None;
        self.buffer_len = 0;
        self.buffer_rate = 0;
        self.position = 0.0;
        self.follower.reset();
        self.state = SessionState::Idle;
    }

    fn send(&mut self, message: ControlMessage) -> Result<(), PlaybackError> {
        match self.control.as_mut() {
            Some(control) => control.send(message),
            None => Err(PlaybackError::NotLoaded),
        }
    }

    /// Load audio, frozen at `start_progress` (0..1). `advance` is the rate
    /// `play` will start with.
    pub fn load(
        &mut self,
        left: Vec<f32>,
        right: Option<Vec<f32>>,
        sample_rate: u32,
        start_progress: f64,
        advance: f64,
    ) -> Result<(), PlaybackError> {
        if left.is_empty() || sample_rate == 0 {
            return Err(PlaybackError::NotLoaded);
        }
        let buffers = PlaybackBuffers {
            left,
            right,
            sample_rate,
        };
        buffers.check_channels()?;
        let buffers = enforce_rate_floor(buffers);
        if self.control.is_none() {
            self.start_engine()?;
        }
        let len = buffers.len();
        let rate = buffers.sample_rate;
        let position = (start_progress.clamp(0.0, 1.0) * len.saturating_sub(1) as f64).round();
        self.send(ControlMessage::Load {
            buffers,
            position,
            advance: 0.0,
        })?;
        self.buffer_len = len;
        self.buffer_rate = rate;
        self.pending_advance = advance;
        self.position = start_progress.clamp(0.0, 1.0);
        self.follower.reset();
        self.state = SessionState::Loaded;
        info!(
            "loaded {len} samples at {rate} Hz ({:.2}s)",
            self.duration_secs()
        );
        Ok(())
    }

    /// Start moving at the advance given to `load` (or set while loaded).
    pub fn play(&mut self) -> Result<(), PlaybackError> {
        match self.state {
            SessionState::Loaded => {
                self.send(ControlMessage::SetAdvance(self.pending_advance))?;
                self.state = SessionState::Playing;
                Ok(())
            }
            SessionState::Playing | SessionState::RateAdjusting => Ok(()),
            _ => Err(PlaybackError::NotLoaded),
        }
    }

    /// Change the advance rate. Negative scratches backward, 0 freezes.
    pub fn set_advance(&mut self, rate: f64) -> Result<(), PlaybackError> {
        match self.state {
            SessionState::Loaded => {
                self.pending_advance = rate;
                Ok(())
            }
            SessionState::Playing | SessionState::RateAdjusting => {
                self.send(ControlMessage::SetAdvance(rate))?;
                self.state = SessionState::RateAdjusting;
                Ok(())
            }
            _ => Err(PlaybackError::NotLoaded),
        }
    }

    /// Jump to `progress` (0..1). Resumes an ended session.
    pub fn seek(&mut self, progress: f64) -> Result<(), PlaybackError> {
        if self.buffer_len == 0 {
            return Err(PlaybackError::NotLoaded);
        }
        let progress = progress.clamp(0.0, 1.0);
        let index = progress * self.buffer_len.saturating_sub(1) as f64;
        self.send(ControlMessage::Seek(index))?;
        self.position = progress;
        if self.state == SessionState::Ended {
            self.state = SessionState::Playing;
        }
        Ok(())
    }

    /// Read the latest engine report. Returns `None` when nothing new was
    /// published since the last poll.
    pub fn poll(&mut self) -> Option<PlaybackEvent> {
        if let Some(retired) = self.retired.as_mut() {
            retired.drain();
        }
        let report = self.reports.latest()?;
        if report.sequence == self.last_sequence {
            return None;
        }
        self.last_sequence = report.sequence;
        self.position = report.position;
        let amplitude = self.follower.update(report.amplitude);
        if report.ended {
            info!("playback reached the end");
            self.state = SessionState::Ended;
        } else if self.state == SessionState::RateAdjusting {
            self.state = SessionState::Playing;
        }
        Some(PlaybackEvent {
            position: report.position,
            amplitude,
            ended: report.ended,
        })
    }

    /// Stop output and release the buffers.
    pub fn stop(&mut self) {
        if self.control.is_none() {
            return;
        }
        let _ = self.send(ControlMessage::Stop);
        self.release();
        self.state = SessionState::Stopped;
        info!("playback stopped");
    }

    /// Return to `Idle`, stopping first if needed.
    pub fn close(&mut self) {
        self.stop();
        self.state = SessionState::Idle;
    }
}

impl<B: AudioBackend> Drop for PlaybackSession<B> {
    fn drop(&mut self) {
        self.backend.shutdown();
    }
}
