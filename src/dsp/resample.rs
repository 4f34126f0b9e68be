//! Resampling kernels: Lanczos-3 for restoring the original sample count
//! after decoding, Catmull-Rom cubic for general-purpose rate changes.

use std::f64::consts::PI;

use super::fir::anti_alias_filter;

/// Lanczos kernel lobes (support is ±3 source samples).
pub const LANCZOS_LOBES: i64 = 3;

#[inline]
fn sinc(x: f64) -> f64 {
    if x.abs() < 1e-12 {
        1.0
    } else {
        let px = PI * x;
        px.sin() / px
    }
}

/// Lanczos-3 window-sinc weight for a distance `x` in source samples.
#[inline]
pub fn lanczos3(x: f64) -> f64 {
    let lobes = LANCZOS_LOBES as f64;
    if x.abs() >= lobes {
        0.0
    } else {
        sinc(x) * sinc(x / lobes)
    }
}

/// Resample `samples` to exactly `new_len` samples with a Lanczos-3 kernel.
///
/// Output index `j` maps to source position `j * len / new_len`, which is
/// where nearest-sample decimation took source index `j` from. When the
/// result is longer than the input, the anti-alias filter runs over it as an
/// anti-imaging filter.
pub fn lanczos3_resample(samples: &[f64], new_len: usize) -> Vec<f64> {
    if samples.is_empty() || new_len == 0 {
        return Vec::new();
    }
    let len = samples.len();
    if len == new_len {
        return samples.to_vec();
    }
    let step = len as f64 / new_len as f64;
    let last = len as i64 - 1;

    let mut out = Vec::with_capacity(new_len);
    for j in 0..new_len {
        let pos = j as f64 * step;
        let base = pos.floor() as i64;
        let mut acc = 0.0;
        let mut weight_sum = 0.0;
        for m in (base - LANCZOS_LOBES + 1)..=(base + LANCZOS_LOBES) {
            let w = lanczos3(pos - m as f64);
            if w == 0.0 {
                continue;
            }
            // Edges clamp to the first/last sample
            let idx = m.clamp(0, last) as usize;
            acc += samples[idx] * w;
            weight_sum += w;
        }
        out.push(if weight_sum.abs() > 1e-12 { acc / weight_sum } else { 0.0 });
    }

    if new_len > len {
        anti_alias_filter(&out, new_len as f64 / len as f64)
    } else {
        out
    }
}

/// Catmull-Rom cubic interpolation between `y1` and `y2` at fraction `t`.
#[inline]
pub fn cubic_interpolate(y0: f64, y1: f64, y2: f64, y3: f64, t: f64) -> f64 {
    let a = -0.5 * y0 + 1.5 * y1 - 1.5 * y2 + 0.5 * y3;
    let b = y0 - 2.5 * y1 + 2.0 * y2 - 0.5 * y3;
    let c = -0.5 * y0 + 0.5 * y2;
    let d = y1;
    a * t * t * t + b * t * t + c * t + d
}

/// Change the sample rate of `samples` from `from_rate` to `to_rate` with
/// cubic interpolation.
pub fn resample_cubic(samples: &[f32], from_rate: u32, to_rate: u32) -> Vec<f32> {
    if from_rate == to_rate || samples.is_empty() || from_rate == 0 || to_rate == 0 {
        return samples.to_vec();
    }
    let ratio = from_rate as f64 / to_rate as f64;
    let new_len = (samples.len() as f64 / ratio).round() as usize;
    let len = samples.len();
    let at = |i: usize| samples[i.min(len - 1)] as f64;

    (0..new_len)
        .map(|i| {
            let src = i as f64 * ratio;
            let idx = src.floor() as usize;
            let frac = src - idx as f64;
            let y0 = at(idx.saturating_sub(1));
            cubic_interpolate(y0, at(idx), at(idx + 1), at(idx + 2), frac) as f32
        })
        .collect()
}
