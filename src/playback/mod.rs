//! Variable-rate playback of decoded grooves.
//!
//! The [`engine`] runs on the real-time thread; [`session`] and [`vinyl`]
//! run on the control thread; [`control`] connects the two.

pub mod control;
pub mod engine;
pub mod session;
pub mod vinyl;

pub use control::{ControlMessage, PlaybackBuffers, Report, ReportSlot};
pub use engine::GrooveEngine;
pub use session::{
    AmplitudeFollower, AudioBackend, MIN_PLAYBACK_RATE, OfflineBackend, PlaybackEvent,
    PlaybackSession, SessionState, enforce_rate_floor,
};
pub use vinyl::{VinylController, scratch_rate};
