//! Message plumbing between the control thread and the real-time engine.
//!
//! - Control messages flow control → engine through a lock-free SPSC ring
//!   and are applied only between processing blocks.
//! - Retired sample buffers flow back engine → control through a second
//!   ring, so they are freed off the real-time thread.
//! - Position/amplitude reports flow engine → control through a single
//!   overwritable slot: only the latest report matters.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use ringbuf::{HeapRb, traits::*};
use serde::Serialize;

use crate::error::PlaybackError;

/// Default number of control messages that may be queued.
pub const DEFAULT_CONTROL_CAPACITY: usize = 64;
/// Number of retired buffer sets the return ring can hold.
pub const RETIRED_CAPACITY: usize = 8;

/// Decoded audio handed to the engine. `right` is `None` for mono.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PlaybackBuffers {
    pub left: Vec<f32>,
    pub right: Option<Vec<f32>>,
    /// Rate the buffers are recorded at (already at or above the floor).
    pub sample_rate: u32,
}

impl PlaybackBuffers {
    /// Playable frames: the shorter channel when the two disagree.
    pub fn len(&self) -> usize {
        match &self.right {
            Some(right) => self.left.len().min(right.len()),
            None => self.left.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Both channels of a stereo buffer must be the same length.
    pub fn check_channels(&self) -> Result<(), PlaybackError> {
        match &self.right {
            Some(right) if right.len() != self.left.len() => {
                Err(PlaybackError::ChannelLengthMismatch {
                    left: self.left.len(),
                    right: right.len(),
                })
            }
            _ => Ok(()),
        }
    }
}

/// Commands from the control thread to the engine.
#[derive(Debug)]
pub enum ControlMessage {
    /// Replace the playing buffers. `position` is a fractional sample index,
    /// `advance` the initial rate multiplier.
    Load {
        buffers: PlaybackBuffers,
        position: f64,
        advance: f64,
    },
    /// New rate multiplier (1.0 = normal speed, negative = backward).
    SetAdvance(f64),
    /// Jump to a fractional sample index, clamped to the buffer.
    Seek(f64),
    /// Stop output and retire the buffers.
    Stop,
}

/// Control-thread side of the message ring.
pub struct ControlSender {
    producer: ringbuf::HeapProd<ControlMessage>,
}

impl ControlSender {
    /// Queue a message without blocking.
    pub fn send(&mut self, message: ControlMessage) -> Result<(), PlaybackError> {
        self.producer
            .try_push(message)
            .map_err(|_| PlaybackError::ChannelFull)
    }
}

/// Engine side of the message ring.
pub struct ControlReceiver {
    consumer: ringbuf::HeapCons<ControlMessage>,
}

impl ControlReceiver {
    /// Next pending message, if any. Never blocks.
    pub fn try_recv(&mut self) -> Option<ControlMessage> {
        self.consumer.try_pop()
    }
}

/// Create a bounded SPSC control channel.
pub fn control_channel(capacity: usize) -> (ControlSender, ControlReceiver) {
    let (producer, consumer) = HeapRb::<ControlMessage>::new(capacity.max(1)).split();
    (ControlSender { producer }, ControlReceiver { consumer })
}

/// Engine side of the retired-buffer ring.
pub struct RetiredSender {
    producer: ringbuf::HeapProd<PlaybackBuffers>,
}

impl RetiredSender {
    /// Hand buffers back for deallocation. If the ring is full they are
    /// dropped in place.
    pub fn retire(&mut self, buffers: PlaybackBuffers) {
        let _ = self.producer.try_push(buffers);
    }
}

/// Control side of the retired-buffer ring.
pub struct RetiredReceiver {
    consumer: ringbuf::HeapCons<PlaybackBuffers>,
}

impl RetiredReceiver {
    /// Drop every retired buffer set; returns how many were released.
    pub fn drain(&mut self) -> usize {
        let mut count = 0;
        while self.consumer.try_pop().is_some() {
            count += 1;
        }
        count
    }
}

pub fn retired_channel() -> (RetiredSender, RetiredReceiver) {
    let (producer, consumer) = HeapRb::<PlaybackBuffers>::new(RETIRED_CAPACITY).split();
    (RetiredSender { producer }, RetiredReceiver { consumer })
}

/// One position/amplitude report.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Report {
    /// Normalized position in [0, 1].
    pub position: f64,
    /// RMS of the most recent block.
    pub amplitude: f64,
    /// Set on the single report published when playback runs off the end.
    pub ended: bool,
    /// Monotonic report counter, starting at 1.
    pub sequence: u64,
}

/// Latest-value slot written by the engine and read by the control thread.
///
/// A sequence counter brackets each write (odd while writing), so a reader
/// never sees a half-written report.
#[derive(Debug, Default)]
pub struct ReportSlot {
    sequence: AtomicU64,
    position: AtomicU64,
    amplitude: AtomicU64,
    ended: AtomicBool,
}

impl ReportSlot {
    pub fn new() -> Self {
        Self::default()
    }

    /// Overwrite the slot. Called only from the engine.
    pub fn publish(&self, position: f64, amplitude: f64, ended: bool) {
        self.sequence.fetch_add(1, Ordering::AcqRel);
        self.position.store(position.to_bits(), Ordering::Relaxed);
        self.amplitude.store(amplitude.to_bits(), Ordering::Relaxed);
        self.ended.store(ended, Ordering::Relaxed);
        self.sequence.fetch_add(1, Ordering::Release);
    }

    /// Most recent complete report, or `None` if nothing has been published
    /// (or a write kept racing the read).
    pub fn latest(&self) -> Option<Report> {
        for _ in 0..8 {
            let before = self.sequence.load(Ordering::Acquire);
            if before == 0 {
                return None;
            }
            if before % 2 == 1 {
                std::hint::spin_loop();
                continue;
            }
            let position = f64::from_bits(self.position.load(Ordering::Relaxed));
            let amplitude = f64::from_bits(self.amplitude.load(Ordering::Relaxed));
            let ended = self.ended.load(Ordering::Relaxed);
            std::sync::atomic::fence(Ordering::Acquire);
            if self.sequence.load(Ordering::Relaxed) == before {
                return Some(Report {
                    position,
                    amplitude,
                    ended,
                    sequence: before / 2,
                });
            }
        }
        None
    }
}
