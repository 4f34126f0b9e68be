//! Groove codec: the encode pipeline, its exact-inverse decode pipeline,
//! and their configuration.
//!
//! Both directions are pure functions over resident buffers with no shared
//! mutable state, so independent calls can run in parallel.

pub mod config;
pub mod decoder;
pub mod encoder;
pub mod quantize;

pub use config::{DecodeDefaults, EncoderConfig, Quality};
pub use decoder::{DecodedAudio, decode, decode_document, decode_groove, estimate_k};
pub use encoder::{EncodeSummary, EncodedGroove, encode, encode_document, encode_stereo};
pub use quantize::{ErrorDiffusion, GroovePoint, quantize_points};
