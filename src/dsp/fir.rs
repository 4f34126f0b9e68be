//! Windowed-sinc FIR low-pass, used as the anti-alias filter before
//! decimation and as the anti-imaging filter after upsampling.

use std::f64::consts::PI;

/// Longest kernel half-width, in taps.
pub const MAX_KERNEL_RADIUS: usize = 64;

/// Build a Blackman-windowed sinc kernel normalized to unit DC gain.
///
/// `factor` is the rate-change ratio; the cutoff sits at `0.5 / factor`
/// cycles per sample (the Nyquist frequency of the lower rate).
pub fn lowpass_kernel(factor: f64) -> Vec<f64> {
    let radius = ((factor * 2.0).ceil() as usize).clamp(1, MAX_KERNEL_RADIUS);
    let size = radius * 2 + 1;
    let cutoff = 0.5 / factor;

    let mut kernel = Vec::with_capacity(size);
    let mut sum = 0.0;
    for i in 0..size {
        let n = i as f64 - radius as f64;
        let sinc = if n == 0.0 {
            2.0 * cutoff
        } else {
            (2.0 * PI * cutoff * n).sin() / (PI * n)
        };
        let phase = 2.0 * PI * i as f64 / (size - 1) as f64;
        let window = 0.42 - 0.5 * phase.cos() + 0.08 * (2.0 * phase).cos();
        let tap = sinc * window;
        sum += tap;
        kernel.push(tap);
    }
    if sum != 0.0 {
        for tap in kernel.iter_mut() {
            *tap /= sum;
        }
    }
    kernel
}

/// Low-pass `samples` for a rate change of `factor`. Output has the same
/// length as the input; factors at or below 1 return the input unchanged.
pub fn anti_alias_filter(samples: &[f64], factor: f64) -> Vec<f64> {
    if factor <= 1.0 || samples.is_empty() {
        return samples.to_vec();
    }
    let kernel = lowpass_kernel(factor);
    let radius = kernel.len() / 2;
    let len = samples.len();

    let mut out = vec![0.0; len];
    for (i, slot) in out.iter_mut().enumerate() {
        let mut acc = 0.0;
        for (j, &tap) in kernel.iter().enumerate() {
            // Taps outside the buffer read as zero
            let idx = i + j;
            if idx < radius || idx - radius >= len {
                continue;
            }
            acc += samples[idx - radius] * tap;
        }
        *slot = acc;
    }
    out
}

/// Pick `count` samples by nearest-sample selection at spacing
/// `len / count` (the signal must already be band-limited).
pub fn decimate(samples: &[f64], count: usize) -> Vec<f64> {
    if samples.is_empty() || count == 0 {
        return Vec::new();
    }
    let factor = samples.len() as f64 / count as f64;
    (0..count)
        .map(|i| {
            let idx = ((i as f64 * factor).floor() as usize).min(samples.len() - 1);
            samples[idx]
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: f64, len: usize) -> Vec<f64> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate).sin())
            .collect()
    }

    fn peak_after(samples: &[f64], skip: usize) -> f64 {
        samples[skip..samples.len() - skip]
            .iter()
            .fold(0.0_f64, |m, v| m.max(v.abs()))
    }

    #[test]
    fn kernel_has_unit_dc_gain() {
        for &factor in &[1.5, 2.0, 2.75, 10.0, 100.0] {
            let sum: f64 = lowpass_kernel(factor).iter().sum();
            assert!((sum - 1.0).abs() < 1e-12, "factor {factor}: sum {sum}");
        }
    }

    #[test]
    fn kernel_radius_is_capped() {
        assert_eq!(lowpass_kernel(3.0).len(), 13);
        assert_eq!(lowpass_kernel(500.0).len(), MAX_KERNEL_RADIUS * 2 + 1);
    }

    #[test]
    fn passband_survives() {
        let input = sine(440.0, 44100.0, 4000);
        let out = anti_alias_filter(&input, 2.75);
        assert_eq!(out.len(), input.len());
        let peak = peak_after(&out, 100);
        assert!(peak > 0.95, "440 Hz should pass a 2.75x anti-alias filter, got {peak}");
    }

    #[test]
    fn stopband_is_attenuated() {
        // 15 kHz is well above the 8 kHz Nyquist of a 4x decimation from 44.1 kHz
        let input = sine(15000.0, 44100.0, 4000);
        let out = anti_alias_filter(&input, 4.0);
        let peak = peak_after(&out, 100);
        assert!(peak < 0.05, "15 kHz should be removed, got {peak}");
    }

    #[test]
    fn unity_factor_is_identity() {
        let input = vec![0.1, -0.2, 0.3];
        assert_eq!(anti_alias_filter(&input, 1.0), input);
    }

    #[test]
    fn decimate_picks_nearest_sample() {
        let input: Vec<f64> = (0..10).map(|i| i as f64).collect();
        assert_eq!(decimate(&input, 4), vec![0.0, 2.0, 5.0, 7.0]);
        assert_eq!(decimate(&input, 10), input);
        assert!(decimate(&[], 3).is_empty());
    }
}
