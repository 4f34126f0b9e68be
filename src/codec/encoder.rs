//! Forward pipeline: samples → spiral groove.
//!
//! Per channel: anti-alias → decimate → soft-limit → high-shelf boost, then
//! a joint peak limit across channels, mu-law compression, placement on the
//! spiral, and error-diffusion quantization. Stereo is carried as mid/side:
//! mid on the radial axis, side on the tangential axis.

use std::fmt;

use log::debug;
use serde::Serialize;

use crate::codec::config::EncoderConfig;
use crate::codec::quantize::{GroovePoint, quantize_points};
use crate::descriptor::{DESCRIPTOR_VERSION, Emphasis, GrooveDescriptor};
use crate::document::write_document;
use crate::dsp::analysis::limit_peak;
use crate::dsp::companding::mu_law_compress;
use crate::dsp::filter::high_shelf_f64;
use crate::dsp::fir::{anti_alias_filter, decimate};
use crate::dsp::limiter::soft_limit;
use crate::error::{ConfigError, Result};
use crate::geometry::{SpiralGeometry, arc_position};

/// Rough document bytes per vertex ("-12345,67890 " plus markup share).
const BYTES_PER_VERTEX: f64 = 14.0;

/// What the encoder did, for logs and UI.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EncodeSummary {
    pub original_count: usize,
    pub vertex_count: usize,
    pub decimation_factor: f64,
    pub effective_rate: u32,
    pub k: f64,
    pub turns: f64,
    pub points_per_turn: usize,
    pub approx_bytes: usize,
    pub stereo: bool,
    pub pipeline: String,
}

impl fmt::Display for EncodeSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Encoded {} samples -> {} vertices [{}] (~{} pts/turn, {} turns, k={:.4}, sr={}Hz, ~{:.1} MB)",
            self.original_count,
            self.vertex_count,
            self.pipeline,
            self.points_per_turn,
            self.turns,
            self.k,
            self.effective_rate,
            self.approx_bytes as f64 / (1024.0 * 1024.0),
        )
    }
}

/// Encoder output.
#[derive(Debug, Clone)]
pub struct EncodedGroove {
    pub geometry: SpiralGeometry,
    pub descriptor: GrooveDescriptor,
    pub points: Vec<GroovePoint>,
    pub summary: EncodeSummary,
}

impl EncodedGroove {
    /// Render the persisted document.
    pub fn to_document(&self) -> String {
        write_document(&self.geometry, &self.descriptor, &self.points)
    }
}

/// Encode a mono buffer.
pub fn encode(samples: &[f32], source_rate: u32, config: &EncoderConfig) -> Result<EncodedGroove> {
    let mono = samples.iter().map(|&s| s as f64).collect();
    encode_channels(vec![mono], source_rate, config)
}

/// Encode a stereo pair. A shorter `right` is padded with silence.
pub fn encode_stereo(
    left: &[f32],
    right: &[f32],
    source_rate: u32,
    config: &EncoderConfig,
) -> Result<EncodedGroove> {
    let len = left.len().max(right.len());
    let at = |ch: &[f32], i: usize| ch.get(i).copied().unwrap_or(0.0) as f64;
    let mut mid = Vec::with_capacity(len);
    let mut side = Vec::with_capacity(len);
    for i in 0..len {
        let (l, r) = (at(left, i), at(right, i));
        mid.push((l + r) * 0.5);
        side.push((l - r) * 0.5);
    }
    encode_channels(vec![mid, side], source_rate, config)
}

/// Encode straight to the persisted document text.
pub fn encode_document(
    left: &[f32],
    right: Option<&[f32]>,
    source_rate: u32,
    config: &EncoderConfig,
) -> Result<String> {
    let encoded = match right {
        Some(right) => encode_stereo(left, right, source_rate, config)?,
        None => encode(left, source_rate, config)?,
    };
    Ok(encoded.to_document())
}

/// Shared pipeline. `channels` is `[mono]` or `[mid, side]`.
fn encode_channels(
    mut channels: Vec<Vec<f64>>,
    source_rate: u32,
    config: &EncoderConfig,
) -> Result<EncodedGroove> {
    config.validate()?;
    if source_rate == 0 {
        return Err(ConfigError::InvalidSampleRate(source_rate).into());
    }
    let quality = config.quality()?;
    let geometry = config.spiral()?;
    let stereo = channels.len() == 2;

    let original_count = channels.first().map_or(0, Vec::len);
    let vertex_count = if original_count == 0 {
        0
    } else {
        quality.vertex_count(original_count, source_rate).max(1)
    };
    let decimation_factor = if vertex_count == 0 {
        1.0
    } else {
        original_count as f64 / vertex_count as f64
    };
    let effective_rate = if original_count == 0 {
        source_rate
    } else {
        ((vertex_count as f64 * source_rate as f64 / original_count as f64).round() as u32).max(1)
    };
    if config.riaa_corner_hz * 2.0 >= effective_rate as f64 {
        return Err(ConfigError::CornerAboveNyquist {
            corner_hz: config.riaa_corner_hz,
            sample_rate: effective_rate,
        }
        .into());
    }

    let k = config.sensitivity.min(geometry.max_deviation());

    // Per-channel chain
    for channel in channels.iter_mut() {
        let filtered = anti_alias_filter(channel.as_slice(), decimation_factor);
        let mut decimated = decimate(&filtered, vertex_count);
        soft_limit(&mut decimated, effective_rate, config.limiter_threshold);
        high_shelf_f64(
            &mut decimated,
            effective_rate,
            config.riaa_gain_db,
            config.riaa_corner_hz,
        );
        *channel = decimated;
    }

    {
        let mut views: Vec<&mut [f64]> = channels.iter_mut().map(|c| c.as_mut_slice()).collect();
        limit_peak(&mut views);
    }
    for channel in channels.iter_mut() {
        for s in channel.iter_mut() {
            *s = mu_law_compress(s.clamp(-1.0, 1.0));
        }
    }

    let disc = geometry.disc;
    let coords: Vec<(f64, f64)> = (0..vertex_count)
        .map(|i| {
            let t = arc_position(i, vertex_count);
            let theta = geometry.theta(t);
            let r_base = geometry.base_radius(t);
            let (sin, cos) = theta.sin_cos();
            let radial = r_base + k * channels[0][i];
            let tangential = if stereo { k * channels[1][i] } else { 0.0 };
            (
                disc.cx + radial * cos - tangential * sin,
                disc.cy + radial * sin + tangential * cos,
            )
        })
        .collect();
    let points = quantize_points(&coords, geometry.scale);

    let descriptor = GrooveDescriptor {
        version: DESCRIPTOR_VERSION,
        sample_rate: Some(effective_rate),
        source_rate: Some(source_rate),
        r_out: Some(disc.r_out),
        r_in: Some(disc.r_in),
        cx: Some(disc.cx),
        cy: Some(disc.cy),
        turns: Some(geometry.turns),
        k: Some(k),
        original_length: Some(original_count),
        companding: true,
        emphasis: Emphasis::Shelf {
            corner_hz: config.riaa_corner_hz,
            gain_db: config.riaa_gain_db,
        },
        stereo,
        scale: Some(geometry.scale),
    };

    let pipeline = if decimation_factor > 1.0 {
        format!("anti-alias -> {decimation_factor:.1}x decimate -> limit -> shelf -> mu-law -> diffuse")
    } else {
        "limit -> shelf -> mu-law -> diffuse".to_string()
    };
    let summary = EncodeSummary {
        original_count,
        vertex_count,
        decimation_factor,
        effective_rate,
        k,
        turns: geometry.turns,
        points_per_turn: (vertex_count as f64 / geometry.turns).round() as usize,
        approx_bytes: (vertex_count as f64 * BYTES_PER_VERTEX) as usize,
        stereo,
        pipeline,
    };
    debug!("{summary}");

    Ok(EncodedGroove {
        geometry,
        descriptor,
        points,
        summary,
    })
}
