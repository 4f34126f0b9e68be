//! Buffer analysis and finishing passes: peak/RMS measurement, DC removal,
//! peak normalization, boundary fades, and FFT-based dominant frequency.

use std::f64::consts::PI;

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

/// Fraction of the buffer length used for each boundary fade.
pub const FADE_LEN_FRACTION: f64 = 0.005;
/// Longest boundary fade in samples.
pub const MAX_FADE_LEN: usize = 256;

/// Largest absolute sample value.
pub fn peak(samples: &[f64]) -> f64 {
    samples.iter().fold(0.0_f64, |m, s| m.max(s.abs()))
}

/// Root-mean-square level.
pub fn rms(samples: &[f32]) -> f64 {
    if samples.is_empty() {
        return 0.0;
    }
    let sum: f64 = samples.iter().map(|&s| s as f64 * s as f64).sum();
    (sum / samples.len() as f64).sqrt()
}

/// Subtract the mean from every sample.
pub fn remove_dc(samples: &mut [f64]) {
    if samples.is_empty() {
        return;
    }
    let mean = samples.iter().sum::<f64>() / samples.len() as f64;
    for s in samples.iter_mut() {
        *s -= mean;
    }
}

/// Scale so the joint peak across `channels` becomes 1.0, but only when the
/// peak lies in (0.001, 0.99): silent buffers and buffers that are already
/// close to unit peak are left alone. Returns the applied gain.
pub fn normalize_peak(channels: &mut [&mut [f64]]) -> f64 {
    let joint = channels.iter().map(|c| peak(c)).fold(0.0_f64, f64::max);
    if joint > 0.001 && joint < 0.99 {
        let gain = 1.0 / joint;
        for channel in channels.iter_mut() {
            for s in channel.iter_mut() {
                *s *= gain;
            }
        }
        gain
    } else {
        1.0
    }
}

/// Scale so the joint peak across `channels` is at most 1.0.
pub fn limit_peak(channels: &mut [&mut [f64]]) -> f64 {
    let joint = channels.iter().map(|c| peak(c)).fold(0.0_f64, f64::max);
    if joint > 1.0 {
        let gain = 1.0 / joint;
        for channel in channels.iter_mut() {
            for s in channel.iter_mut() {
                *s *= gain;
            }
        }
        gain
    } else {
        1.0
    }
}

/// Linear fade-in and fade-out over 0.5% of the length (at most 256 samples).
pub fn apply_fade(samples: &mut [f64]) {
    let len = samples.len();
    let fade_len = ((len as f64 * FADE_LEN_FRACTION).floor() as usize).min(MAX_FADE_LEN);
    for i in 0..fade_len {
        let g = i as f64 / fade_len as f64;
        samples[i] *= g;
        samples[len - 1 - i] *= g;
    }
}

/// Estimate the strongest frequency component of a buffer in Hz.
///
/// Hann-windowed FFT over the whole buffer with parabolic interpolation
/// around the peak bin. Returns `None` for empty or silent input.
pub fn dominant_frequency(samples: &[f32], sample_rate: u32) -> Option<f64> {
    let n = samples.len();
    if n < 4 || sample_rate == 0 {
        return None;
    }

    let mut buffer: Vec<Complex<f64>> = samples
        .iter()
        .enumerate()
        .map(|(i, &s)| {
            let w = 0.5 - 0.5 * (2.0 * PI * i as f64 / (n - 1) as f64).cos();
            Complex::new(s as f64 * w, 0.0)
        })
        .collect();

    let mut planner = FftPlanner::<f64>::new();
    let fft = planner.plan_fft_forward(n);
    fft.process(&mut buffer);

    let half = n / 2;
    let magnitudes: Vec<f64> = buffer[..=half].iter().map(|c| c.norm()).collect();

    // Skip the DC bin
    let (best, best_mag) = magnitudes
        .iter()
        .enumerate()
        .skip(1)
        .fold((0usize, 0.0_f64), |acc, (i, &m)| if m > acc.1 { (i, m) } else { acc });
    if best == 0 || best_mag <= 1e-12 {
        return None;
    }

    let mut bin = best as f64;
    if best + 1 < magnitudes.len() {
        let (a, b, c) = (magnitudes[best - 1], magnitudes[best], magnitudes[best + 1]);
        let denom = a - 2.0 * b + c;
        if denom.abs() > 1e-12 {
            bin += 0.5 * (a - c) / denom;
        }
    }
    Some(bin * sample_rate as f64 / n as f64)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sine(freq: f64, sample_rate: u32, len: usize) -> Vec<f32> {
        (0..len)
            .map(|i| (2.0 * PI * freq * i as f64 / sample_rate as f64).sin() as f32)
            .collect()
    }

    #[test]
    fn detects_a440() {
        let samples = sine(440.0, 44100, 44100);
        let freq = dominant_frequency(&samples, 44100).unwrap();
        assert!((freq - 440.0).abs() < 1.0, "Expected ~440 Hz, got {freq}");
    }

    #[test]
    fn detects_low_rate_tone() {
        let samples = sine(1234.0, 8000, 8000);
        let freq = dominant_frequency(&samples, 8000).unwrap();
        assert!((freq - 1234.0).abs() < 2.0, "Expected ~1234 Hz, got {freq}");
    }

    #[test]
    fn silence_has_no_dominant_frequency() {
        assert_eq!(dominant_frequency(&vec![0.0; 1024], 44100), None);
        assert_eq!(dominant_frequency(&[], 44100), None);
    }

    #[test]
    fn rms_of_full_scale_sine() {
        let samples = sine(100.0, 8000, 8000);
        assert!((rms(&samples) - std::f64::consts::FRAC_1_SQRT_2).abs() < 1e-3);
        assert_eq!(rms(&[]), 0.0);
    }

    #[test]
    fn dc_removal_zeroes_mean() {
        let mut samples = vec![1.0, 2.0, 3.0];
        remove_dc(&mut samples);
        assert_eq!(samples, vec![-1.0, 0.0, 1.0]);
    }

    #[test]
    fn normalization_window() {
        let mut quiet = vec![0.5, -0.25];
        let gain = normalize_peak(&mut [&mut quiet[..]]);
        assert_eq!(gain, 2.0);
        assert_eq!(quiet, vec![1.0, -0.5]);

        let mut silent = vec![0.0005, -0.0001];
        normalize_peak(&mut [&mut silent[..]]);
        assert_eq!(silent, vec![0.0005, -0.0001], "Near-silent buffers stay as they are");

        let mut loud = vec![0.995];
        normalize_peak(&mut [&mut loud[..]]);
        assert_eq!(loud, vec![0.995]);
    }

    #[test]
    fn joint_normalization_keeps_balance() {
        let mut left = vec![0.4, 0.0];
        let mut right = vec![0.2, 0.0];
        normalize_peak(&mut [&mut left[..], &mut right[..]]);
        assert!((left[0] - 1.0).abs() < 1e-12);
        assert!((right[0] - 0.5).abs() < 1e-12);
    }

    #[test]
    fn fade_is_capped_and_symmetric() {
        let mut samples = vec![1.0; 100_000];
        apply_fade(&mut samples);
        assert_eq!(samples[0], 0.0);
        assert_eq!(samples[samples.len() - 1], 0.0);
        assert!((samples[128] - 0.5).abs() < 1e-12);
        assert_eq!(samples[256], 1.0, "Fade must stop after 256 samples");

        let mut short = vec![1.0; 100];
        apply_fade(&mut short);
        assert_eq!(short, vec![1.0; 100], "0.5% of 100 rounds down to no fade");
    }
}
