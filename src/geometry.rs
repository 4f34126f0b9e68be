//! Spiral geometry: the disc, the groove's arc parameterization, and the
//! angle-unwrapping turn estimator.
//!
//! Point `i` of an `N`-point groove sits at arc position `t = i / (N - 1)`,
//! angle `θ = t · turns · 2π`, nominal radius `lerp(Rout, Rin, t)`. Encoder
//! and decoder both derive θ from the index alone, never from a measured point.

use std::f64::consts::{PI, TAU};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub const DEFAULT_ROUT: f64 = 220.0;
pub const DEFAULT_RIN: f64 = 40.0;
pub const DEFAULT_CX: f64 = 260.0;
pub const DEFAULT_CY: f64 = 260.0;
pub const DEFAULT_TURNS: f64 = 6.0;
/// Integer coordinate scale (two decimal places of sub-unit precision).
pub const DEFAULT_SCALE: u32 = 100;

/// Largest radial deviation as a fraction of the spacing between turns.
/// Keeps a fully modulated groove from crossing into its neighbour.
pub const MAX_DEVIATION_FRACTION: f64 = 0.45;

/// Padding between the groove edges and the drawn bounding circles.
pub const CIRCLE_PADDING: f64 = 8.0;
/// Smallest inner bounding circle radius.
pub const MIN_INNER_CIRCLE: f64 = 12.0;
/// Smallest outer groove radius recovered from a bounding circle.
pub const MIN_OUTER_RADIUS: f64 = 30.0;

/// Disc placement: center and the outer/inner groove radii.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DiscGeometry {
    pub cx: f64,
    pub cy: f64,
    pub r_out: f64,
    pub r_in: f64,
}

impl Default for DiscGeometry {
    fn default() -> Self {
        Self {
            cx: DEFAULT_CX,
            cy: DEFAULT_CY,
            r_out: DEFAULT_ROUT,
            r_in: DEFAULT_RIN,
        }
    }
}

impl DiscGeometry {
    /// Reject geometry that would divide by zero or fold the spiral.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let finite = [self.cx, self.cy, self.r_out, self.r_in]
            .iter()
            .all(|v| v.is_finite());
        if !finite || self.r_in <= 0.0 || self.r_out <= self.r_in {
            return Err(ConfigError::DegenerateGeometry {
                r_out: self.r_out,
                r_in: self.r_in,
            });
        }
        Ok(())
    }

    /// Radius of the drawn outer bounding circle.
    pub fn outer_circle_radius(&self) -> f64 {
        self.r_out + CIRCLE_PADDING
    }

    /// Radius of the drawn inner bounding circle.
    pub fn inner_circle_radius(&self) -> f64 {
        (self.r_in - CIRCLE_PADDING).max(MIN_INNER_CIRCLE)
    }

    /// Recover groove radii from the two drawn bounding circles.
    pub fn from_circles(cx: f64, cy: f64, outer_circle: f64, inner_circle: f64) -> Self {
        Self {
            cx,
            cy,
            r_out: (outer_circle - CIRCLE_PADDING).max(MIN_OUTER_RADIUS),
            r_in: (inner_circle + CIRCLE_PADDING).max(MIN_INNER_CIRCLE),
        }
    }
}

/// A fully specified spiral: disc, turn count, and integer coordinate scale.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpiralGeometry {
    pub disc: DiscGeometry,
    pub turns: f64,
    pub scale: u32,
}

impl SpiralGeometry {
    pub fn new(disc: DiscGeometry, turns: f64, scale: u32) -> Result<Self, ConfigError> {
        disc.validate()?;
        if !(turns.is_finite() && turns > 0.0) {
            return Err(ConfigError::NonPositiveTurns(turns));
        }
        if scale == 0 {
            return Err(ConfigError::InvalidScale(scale));
        }
        Ok(Self { disc, turns, scale })
    }

    /// Angle at arc position `t`.
    #[inline]
    pub fn theta(&self, t: f64) -> f64 {
        t * self.turns * TAU
    }

    /// Nominal (unmodulated) radius at arc position `t`.
    #[inline]
    pub fn base_radius(&self, t: f64) -> f64 {
        self.disc.r_out + (self.disc.r_in - self.disc.r_out) * t
    }

    /// Radial spacing between adjacent turns.
    pub fn turn_spacing(&self) -> f64 {
        (self.disc.r_out - self.disc.r_in) / self.turns
    }

    /// Largest deviation that cannot reach the neighbouring turn.
    pub fn max_deviation(&self) -> f64 {
        MAX_DEVIATION_FRACTION * self.turn_spacing()
    }
}

/// Normalized arc position of point `i` in an `n`-point groove.
/// A single-point groove sits at `t = 0`.
#[inline]
pub fn arc_position(i: usize, n: usize) -> f64 {
    if n <= 1 {
        0.0
    } else {
        i as f64 / (n - 1) as f64
    }
}

/// Estimate how many revolutions a point sequence makes around `(cx, cy)`
/// by summing the wrapped angle between consecutive points.
///
/// Returns 0.0 for fewer than two points.
pub fn estimate_turns(points: &[(f64, f64)], cx: f64, cy: f64) -> f64 {
    let Some(&(x0, y0)) = points.first() else {
        return 0.0;
    };
    let mut prev = (y0 - cy).atan2(x0 - cx);
    let mut total = 0.0;
    for &(x, y) in &points[1..] {
        let angle = (y - cy).atan2(x - cx);
        let mut delta = angle - prev;
        while delta > PI {
            delta -= TAU;
        }
        while delta < -PI {
            delta += TAU;
        }
        total += delta;
        prev = angle;
    }
    total.abs() / TAU
}
