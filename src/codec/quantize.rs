//! Error-diffusion quantization of groove coordinates onto the integer grid.
//!
//! Each coordinate stream keeps its own carry: the rounding residual of one
//! coordinate is added to the next before it is rounded. The carry never
//! exceeds half a grid step, so the running quantization error stays bounded
//! no matter how long the groove is, and its spectrum is pushed toward high
//! spatial frequencies where de-emphasis attenuates it.

use serde::{Deserialize, Serialize};

/// One quantized groove point in scaled integer coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GroovePoint {
    pub x: i32,
    pub y: i32,
}

impl GroovePoint {
    /// Back to disc units.
    pub fn unscaled(self, scale: u32) -> (f64, f64) {
        let s = scale.max(1) as f64;
        (self.x as f64 / s, self.y as f64 / s)
    }
}

/// Single-stream error-diffusion quantizer.
#[derive(Debug, Clone)]
pub struct ErrorDiffusion {
    scale: f64,
    carry: f64,
}

impl ErrorDiffusion {
    pub fn new(scale: u32) -> Self {
        Self {
            scale: scale as f64,
            carry: 0.0,
        }
    }

    /// Quantize `value` (in disc units) to the scaled integer grid.
    #[inline]
    pub fn quantize(&mut self, value: f64) -> i32 {
        let target = value * self.scale + self.carry;
        let q = target.round();
        self.carry = target - q;
        q as i32
    }

    /// Residual waiting to be added to the next coordinate. Always within ±0.5.
    pub fn carry(&self) -> f64 {
        self.carry
    }
}

/// Quantize a coordinate sequence with independent carries for x and y.
pub fn quantize_points(coords: &[(f64, f64)], scale: u32) -> Vec<GroovePoint> {
    let mut qx = ErrorDiffusion::new(scale);
    let mut qy = ErrorDiffusion::new(scale);
    coords
        .iter()
        .map(|&(x, y)| GroovePoint {
            x: qx.quantize(x),
            y: qy.quantize(y),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn carry_stays_within_half_step() {
        let mut q = ErrorDiffusion::new(100);
        // An irrational-ish stride never lands on the grid
        for i in 0..100_000 {
            q.quantize(260.0 + (i as f64 * 0.123_456_7).sin() * 13.0 + 0.001_37);
            assert!(q.carry().abs() <= 0.5 + 1e-9, "Carry escaped at {i}: {}", q.carry());
        }
    }

    #[test]
    fn running_error_equals_negative_carry() {
        let mut q = ErrorDiffusion::new(100);
        let mut running = 0.0;
        for i in 0..50_000 {
            let v = 100.0 + (i as f64 * 0.731).cos() * 7.777;
            let out = q.quantize(v);
            running += out as f64 - v * 100.0;
        }
        assert!(
            (running + q.carry()).abs() < 1e-6,
            "Running error {running} should mirror carry {}",
            q.carry()
        );
    }

    #[test]
    fn constant_fraction_dithers_on_average() {
        // 0.3 of a grid step: individual points round to 0 or 1, the mean is 0.3
        let coords = vec![(0.003, 0.0); 1000];
        let points = quantize_points(&coords, 100);
        let mean = points.iter().map(|p| p.x as f64).sum::<f64>() / points.len() as f64;
        assert!((mean - 0.3).abs() < 0.002, "Mean {mean} should approach 0.3");
        assert!(points.iter().all(|p| p.y == 0));
    }

    #[test]
    fn unscaled_divides_by_scale() {
        let p = GroovePoint { x: 26050, y: -125 };
        assert_eq!(p.unscaled(100), (260.5, -1.25));
        assert_eq!(p.unscaled(0), (26050.0, -125.0));
    }
}
