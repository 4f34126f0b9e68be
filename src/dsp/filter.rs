//! Biquad shelving filter: the groove's pre-/de-emphasis pair.
//!
//! Coefficient formulas from the Audio EQ Cookbook (Robert Bristow-Johnson).
//! A high shelf at `+g` dB and one at `-g` dB (same corner, same rate) are
//! exact reciprocals, so running one after the other restores the input.

use std::f64::consts::PI;

/// A second-order high-shelf IIR filter.
///
/// Implements Direct Form I: two input and two output history taps.
#[derive(Debug, Clone)]
pub struct BiquadFilter {
    pub gain_db: f64,
    pub corner_hz: f64,
    /// Shelf slope (1.0 = steepest monotonic slope).
    pub slope: f64,

    // Coefficients (normalized by a0)
    b0: f64,
    b1: f64,
    b2: f64,
    a1: f64,
    a2: f64,

    // State (Direct Form I)
    x1: f64,
    x2: f64,
    y1: f64,
    y2: f64,

    sample_rate: f64,
}

impl BiquadFilter {
    pub fn high_shelf(sample_rate: f64, gain_db: f64, corner_hz: f64) -> Self {
        let mut f = BiquadFilter {
            gain_db,
            corner_hz,
            slope: 1.0,
            b0: 1.0,
            b1: 0.0,
            b2: 0.0,
            a1: 0.0,
            a2: 0.0,
            x1: 0.0,
            x2: 0.0,
            y1: 0.0,
            y2: 0.0,
            sample_rate,
        };
        f.update_coefficients();
        f
    }

    /// Recompute filter coefficients from current parameters.
    pub fn update_coefficients(&mut self) {
        let a = 10.0_f64.powf(self.gain_db / 40.0);
        let w0 = 2.0 * PI * self.corner_hz / self.sample_rate;
        let cos_w0 = w0.cos();
        let sin_w0 = w0.sin();
        let alpha = sin_w0 / 2.0 * ((a + 1.0 / a) * (1.0 / self.slope - 1.0) + 2.0).sqrt();
        let two_sqrt_a_alpha = 2.0 * a.sqrt() * alpha;

        let b0 = a * ((a + 1.0) + (a - 1.0) * cos_w0 + two_sqrt_a_alpha);
        let b1 = -2.0 * a * ((a - 1.0) + (a + 1.0) * cos_w0);
        let b2 = a * ((a + 1.0) + (a - 1.0) * cos_w0 - two_sqrt_a_alpha);
        let a0 = (a + 1.0) - (a - 1.0) * cos_w0 + two_sqrt_a_alpha;
        let a1 = 2.0 * ((a - 1.0) - (a + 1.0) * cos_w0);
        let a2 = (a + 1.0) - (a - 1.0) * cos_w0 - two_sqrt_a_alpha;

        // Normalize by a0
        self.b0 = b0 / a0;
        self.b1 = b1 / a0;
        self.b2 = b2 / a0;
        self.a1 = a1 / a0;
        self.a2 = a2 / a0;
    }

    /// Process a single sample through the filter.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let output = self.b0 * input + self.b1 * self.x1 + self.b2 * self.x2
            - self.a1 * self.y1
            - self.a2 * self.y2;
        self.x2 = self.x1;
        self.x1 = input;
        self.y2 = self.y1;
        self.y1 = output;
        output
    }

    /// Reset filter state.
    pub fn reset(&mut self) {
        self.x1 = 0.0;
        self.x2 = 0.0;
        self.y1 = 0.0;
        self.y2 = 0.0;
    }
}

/// Run `samples` through a fresh high-shelf filter in one causal pass.
pub fn high_shelf(samples: &[f32], sample_rate: u32, gain_db: f64, corner_hz: f64) -> Vec<f32> {
    let mut filter = BiquadFilter::high_shelf(sample_rate as f64, gain_db, corner_hz);
    samples
        .iter()
        .map(|&s| filter.process(s as f64) as f32)
        .collect()
}

/// In-place variant over f64 samples, used inside the codec where the
/// intermediate buffers stay in double precision.
pub fn high_shelf_f64(samples: &mut [f64], sample_rate: u32, gain_db: f64, corner_hz: f64) {
    let mut filter = BiquadFilter::high_shelf(sample_rate as f64, gain_db, corner_hz);
    for s in samples.iter_mut() {
        *s = filter.process(*s);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signal(len: usize, sample_rate: f64) -> Vec<f64> {
        (0..len)
            .map(|i| {
                let t = i as f64 / sample_rate;
                0.5 * (2.0 * PI * 220.0 * t).sin()
                    + 0.3 * (2.0 * PI * 3100.0 * t).sin()
                    + if i % 97 == 0 { 0.2 } else { 0.0 }
            })
            .collect()
    }

    #[test]
    fn shelf_boost_then_cut_restores_input() {
        for &sr in &[8000_u32, 16000, 44100] {
            let input = test_signal(4000, sr as f64);
            let mut x = input.clone();
            high_shelf_f64(&mut x, sr, 20.0, 1000.0);
            high_shelf_f64(&mut x, sr, -20.0, 1000.0);
            let peak = input.iter().fold(0.0_f64, |m, v| m.max(v.abs()));
            for (i, (a, b)) in input.iter().zip(&x).enumerate() {
                assert!(
                    (a - b).abs() <= 1e-5 * peak,
                    "Round trip diverged at {i} (sr={sr}): {a} vs {b}"
                );
            }
        }
    }

    #[test]
    fn high_shelf_passes_dc() {
        let mut f = BiquadFilter::high_shelf(44100.0, 20.0, 1000.0);
        let mut output = 0.0;
        for _ in 0..5000 {
            output = f.process(1.0);
        }
        assert!((output - 1.0).abs() < 1e-3, "Shelf should pass DC unchanged, got {output}");
    }

    #[test]
    fn high_shelf_boosts_near_nyquist() {
        let mut f = BiquadFilter::high_shelf(16000.0, 20.0, 1000.0);
        // Alternating signal sits exactly at Nyquist
        let mut max_out = 0.0_f64;
        for i in 0..2000 {
            let input = if i % 2 == 0 { 0.1 } else { -0.1 };
            let out = f.process(input);
            if i > 500 {
                max_out = max_out.max(out.abs());
            }
        }
        // +20 dB = x10
        assert!(
            (max_out - 1.0).abs() < 0.05,
            "Shelf should boost Nyquist by 20 dB, got amplitude {max_out}"
        );
    }

    #[test]
    fn reset_clears_history() {
        let mut f = BiquadFilter::high_shelf(44100.0, 6.0, 2000.0);
        f.process(1.0);
        f.process(-0.5);
        f.reset();
        let fresh = BiquadFilter::high_shelf(44100.0, 6.0, 2000.0).process(0.25);
        assert!((f.process(0.25) - fresh).abs() < 1e-12);
    }

    #[test]
    fn f32_wrapper_matches_length() {
        let out = high_shelf(&[0.1, 0.2, 0.3], 8000, 20.0, 1000.0);
        assert_eq!(out.len(), 3);
        assert!(out.iter().all(|s| s.is_finite()));
    }
}
