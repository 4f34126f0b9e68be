//! Inverse pipeline: spiral groove → samples.
//!
//! Every stage mirrors an encoder stage in reverse. θ for point `i` comes
//! from `i`, `turns`, and `N` alone, exactly as the encoder computed it, so
//! the radial/tangential projection recovers mid and side without leakage.
//! Missing descriptor fields fall back to estimates and never fail decoding.

use log::{debug, warn};
use serde::Serialize;

use crate::codec::config::DecodeDefaults;
use crate::descriptor::{Emphasis, GrooveDescriptor};
use crate::document::GrooveDocument;
use crate::dsp::analysis::{apply_fade, limit_peak, normalize_peak, remove_dc};
use crate::dsp::companding::{de_emphasis, mu_law_expand};
use crate::dsp::filter::high_shelf_f64;
use crate::dsp::resample::lanczos3_resample;
use crate::error::{FormatError, Result};
use crate::geometry::{DiscGeometry, SpiralGeometry, arc_position, estimate_turns};

/// Effective rate assumed when a (legacy) descriptor has no `sr`.
pub const LEGACY_SAMPLE_RATE: u32 = 22050;
/// Upper bound on the number of leading points used to estimate k.
pub const K_ESTIMATE_WINDOW: usize = 2000;
/// Median deviation is taken as this fraction of k.
pub const K_ESTIMATE_DIVISOR: f64 = 0.25;
/// Smallest k the estimator will return.
pub const MIN_ESTIMATED_K: f64 = 0.5;

/// Reconstructed audio.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodedAudio {
    pub left: Vec<f32>,
    /// Present for stereo grooves.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub right: Option<Vec<f32>>,
    pub sample_rate: u32,
    pub geometry: SpiralGeometry,
    pub k: f64,
    /// Number of groove points decoded.
    pub vertices: usize,
}

impl DecodedAudio {
    pub fn is_stereo(&self) -> bool {
        self.right.is_some()
    }

    pub fn len(&self) -> usize {
        self.left.len()
    }

    pub fn is_empty(&self) -> bool {
        self.left.is_empty()
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            0.0
        } else {
            self.left.len() as f64 / self.sample_rate as f64
        }
    }
}

/// Estimate k from the median radial residual over the leading points.
///
/// A perfectly unmodulated lead-in gives a zero median, which is treated
/// as 1.0 before scaling.
pub fn estimate_k(points: &[(f64, f64)], geometry: &SpiralGeometry) -> f64 {
    let n = points.len();
    let window = (n / 10).min(K_ESTIMATE_WINDOW).max(1).min(n);
    let disc = &geometry.disc;
    let mut residuals: Vec<f64> = points[..window]
        .iter()
        .enumerate()
        .map(|(i, &(x, y))| {
            let r = (x - disc.cx).hypot(y - disc.cy);
            (r - geometry.base_radius(arc_position(i, n))).abs()
        })
        .collect();
    if residuals.is_empty() {
        return (1.0 / K_ESTIMATE_DIVISOR).max(MIN_ESTIMATED_K);
    }
    residuals.sort_by(f64::total_cmp);
    let mid = residuals.len() / 2;
    let median = if residuals.len() % 2 == 0 {
        (residuals[mid - 1] + residuals[mid]) * 0.5
    } else {
        residuals[mid]
    };
    let mad = if median > 0.0 { median } else { 1.0 };
    (mad / K_ESTIMATE_DIVISOR).max(MIN_ESTIMATED_K)
}

/// Decode raw document-unit points with an optional descriptor.
pub fn decode(
    descriptor: Option<&GrooveDescriptor>,
    points: &[(f64, f64)],
    defaults: &DecodeDefaults,
) -> Result<DecodedAudio> {
    if points.is_empty() {
        return Err(FormatError::MissingGroove.into());
    }
    let desc = descriptor.cloned().unwrap_or_else(|| GrooveDescriptor {
        version: 1,
        ..GrooveDescriptor::default()
    });

    // Normalize coordinates by the recorded scale
    let scale = desc.scale_or_unit();
    let s = scale as f64;
    let points: Vec<(f64, f64)> = points.iter().map(|&(x, y)| (x / s, y / s)).collect();
    let n = points.len();

    let disc = DiscGeometry {
        cx: desc.cx.unwrap_or(defaults.disc.cx),
        cy: desc.cy.unwrap_or(defaults.disc.cy),
        r_out: desc.r_out.unwrap_or(defaults.disc.r_out),
        r_in: desc.r_in.unwrap_or(defaults.disc.r_in),
    };
    disc.validate()?;

    let turns = match desc.turns.filter(|t| t.is_finite() && *t > 0.0) {
        Some(turns) => turns,
        None => {
            let estimated = estimate_turns(&points, disc.cx, disc.cy);
            if estimated > 0.0 {
                warn!("descriptor has no turn count, estimated {estimated:.3} from the groove");
                estimated
            } else {
                warn!(
                    "turn count could not be estimated, using default {}",
                    defaults.turns
                );
                defaults.turns
            }
        }
    };
    let geometry = SpiralGeometry::new(disc, turns, scale)?;

    let k = match desc.k.filter(|k| k.is_finite() && *k > 0.0) {
        Some(k) => k,
        None => {
            let k = estimate_k(&points, &geometry);
            warn!("descriptor has no companding gain, estimated k={k:.4}");
            k
        }
    };

    // Project every point onto its radial (and tangential) axis
    let stereo = desc.stereo;
    let mut mid = Vec::with_capacity(n);
    let mut side = if stereo { Vec::with_capacity(n) } else { Vec::new() };
    let expand = |v: f64| {
        let v = (v / k).clamp(-1.0, 1.0);
        if desc.companding { mu_law_expand(v) } else { v }
    };
    for (i, &(x, y)) in points.iter().enumerate() {
        let t = arc_position(i, n);
        let r_base = geometry.base_radius(t);
        let (dx, dy) = (x - disc.cx, y - disc.cy);
        if stereo {
            let (sin, cos) = geometry.theta(t).sin_cos();
            mid.push(expand(dx * cos + dy * sin - r_base));
            side.push(expand(-dx * sin + dy * cos));
        } else {
            mid.push(expand(dx.hypot(dy) - r_base));
        }
    }

    let groove_rate = desc.sample_rate.filter(|&sr| sr > 0).unwrap_or(LEGACY_SAMPLE_RATE);
    let mut channels = if stereo { vec![mid, side] } else { vec![mid] };
    for channel in channels.iter_mut() {
        match desc.emphasis {
            Emphasis::None => {}
            Emphasis::Legacy => *channel = de_emphasis(channel.as_slice()),
            Emphasis::Shelf { corner_hz, gain_db } => {
                if corner_hz * 2.0 < groove_rate as f64 {
                    high_shelf_f64(channel, groove_rate, -gain_db, corner_hz);
                } else {
                    warn!("shelf corner {corner_hz} Hz is above Nyquist at {groove_rate} Hz, skipping de-emphasis");
                }
            }
        }
    }

    let original_count = desc.original_length.filter(|&len| len > 0).unwrap_or(n);
    if original_count != n {
        for channel in channels.iter_mut() {
            *channel = lanczos3_resample(channel.as_slice(), original_count);
        }
    }
    let sample_rate = match desc.source_rate.filter(|&sr| sr > 0) {
        Some(sr) => sr,
        None => ((groove_rate as f64 * original_count as f64 / n as f64).round() as u32).max(1),
    };

    let (left, right) = if stereo {
        let (m, s) = (&channels[0], &channels[1]);
        let mut left: Vec<f64> = m.iter().zip(s).map(|(m, s)| m + s).collect();
        let mut right: Vec<f64> = m.iter().zip(s).map(|(m, s)| m - s).collect();
        remove_dc(&mut left);
        remove_dc(&mut right);
        finish(&mut [&mut left[..], &mut right[..]]);
        (left, Some(right))
    } else {
        let mut mono = channels.swap_remove(0);
        remove_dc(&mut mono);
        finish(&mut [&mut mono[..]]);
        (mono, None)
    };

    debug!(
        "Decoded {n} vertices -> {} samples at {sample_rate} Hz ({} turns, k={k:.4}, stereo={stereo})",
        left.len(),
        geometry.turns
    );

    Ok(DecodedAudio {
        left: left.into_iter().map(|s| s as f32).collect(),
        right: right.map(|r| r.into_iter().map(|s| s as f32).collect()),
        sample_rate,
        geometry,
        k,
        vertices: n,
    })
}

/// Joint peak handling and boundary fades.
fn finish(channels: &mut [&mut [f64]]) {
    // Recombined or resampled audio can overshoot unit peak
    limit_peak(channels);
    normalize_peak(channels);
    for channel in channels.iter_mut() {
        apply_fade(channel);
    }
}

/// Decode a scanned document. Geometry the descriptor lacks is recovered
/// from the drawn circles before falling back to `defaults`.
pub fn decode_groove(doc: &GrooveDocument, defaults: &DecodeDefaults) -> Result<DecodedAudio> {
    let scale = doc
        .descriptor
        .as_ref()
        .map_or(1, GrooveDescriptor::scale_or_unit) as f64;
    let mut resolved = defaults.clone();
    if let Some(outer) = doc.outer_circle() {
        resolved.disc.cx = outer.cx.map_or(defaults.disc.cx, |cx| cx / scale);
        resolved.disc.cy = outer.cy.map_or(defaults.disc.cy, |cy| cy / scale);
    }
    if let (Some(outer), Some(inner)) = (doc.outer_circle(), doc.inner_circle()) {
        let from_circles = DiscGeometry::from_circles(
            resolved.disc.cx,
            resolved.disc.cy,
            outer.r.map_or(defaults.disc.outer_circle_radius(), |r| r / scale),
            inner.r.map_or(defaults.disc.inner_circle_radius(), |r| r / scale),
        );
        resolved.disc.r_out = from_circles.r_out;
        resolved.disc.r_in = from_circles.r_in;
    }
    decode(doc.descriptor.as_ref(), &doc.points, &resolved)
}

/// Scan and decode a groove document.
pub fn decode_document(src: &str, defaults: &DecodeDefaults) -> Result<DecodedAudio> {
    let doc = GrooveDocument::parse(src)?;
    decode_groove(&doc, defaults)
}
