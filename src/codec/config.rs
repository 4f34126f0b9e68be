//! Encoder and decoder configuration.
//!
//! Mirrors how presets are described elsewhere in the crate: plain serde
//! structs with camelCase keys and a `Default` for every field, so a partial
//! JSON object (or JS object via `serde-wasm-bindgen`) is a valid config.

use serde::{Deserialize, Serialize};

use crate::descriptor::{DEFAULT_RIAA_CORNER_HZ, DEFAULT_RIAA_GAIN_DB};
use crate::dsp::limiter::DEFAULT_THRESHOLD;
use crate::error::{ConfigError, GrooveError};
use crate::geometry::{DEFAULT_SCALE, DEFAULT_TURNS, DiscGeometry, SpiralGeometry};

/// Default maximum radial deviation in disc units.
pub const DEFAULT_SENSITIVITY: f64 = 5.0;
pub const DEFAULT_QUALITY: u8 = 3;

/// Target effective sample rate per quality level (1..=5).
const QUALITY_TARGET_RATES: [u32; 5] = [8000, 11025, 16000, 22050, 32000];
/// Hard vertex cap per quality level (1..=5).
const QUALITY_MAX_POINTS: [usize; 5] = [200_000, 500_000, 1_000_000, 1_500_000, 2_000_000];

/// A validated quality level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Quality(u8);

impl Quality {
    pub fn new(level: u8) -> Result<Self, ConfigError> {
        if (1..=5).contains(&level) {
            Ok(Self(level))
        } else {
            Err(ConfigError::InvalidQuality(level))
        }
    }

    pub fn level(self) -> u8 {
        self.0
    }

    /// Effective sample rate the groove aims for.
    pub fn target_rate(self) -> u32 {
        QUALITY_TARGET_RATES[(self.0 - 1) as usize]
    }

    /// Upper bound on the number of groove points.
    pub fn vertex_cap(self) -> usize {
        QUALITY_MAX_POINTS[(self.0 - 1) as usize]
    }

    /// Number of groove points for `original_count` samples at `source_rate`.
    ///
    /// `min(target_rate × duration, vertex_cap, original_count)`, so the
    /// perceptual bandwidth stays constant across song lengths.
    pub fn vertex_count(self, original_count: usize, source_rate: u32) -> usize {
        if source_rate == 0 {
            return 0;
        }
        let duration = original_count as f64 / source_rate as f64;
        let by_rate = (self.target_rate() as f64 * duration).round() as usize;
        by_rate.min(self.vertex_cap()).min(original_count)
    }
}

/// Encoder settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EncoderConfig {
    /// Quality level 1..=5.
    pub quality: u8,
    /// Revolutions from the outer to the inner groove edge.
    pub turns: f64,
    /// Requested maximum radial deviation; capped by the turn spacing.
    pub sensitivity: f64,
    pub disc: DiscGeometry,
    /// Integer coordinate scale.
    pub scale: u32,
    pub riaa_corner_hz: f64,
    pub riaa_gain_db: f64,
    pub limiter_threshold: f64,
}

impl Default for EncoderConfig {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            turns: DEFAULT_TURNS,
            sensitivity: DEFAULT_SENSITIVITY,
            disc: DiscGeometry::default(),
            scale: DEFAULT_SCALE,
            riaa_corner_hz: DEFAULT_RIAA_CORNER_HZ,
            riaa_gain_db: DEFAULT_RIAA_GAIN_DB,
            limiter_threshold: DEFAULT_THRESHOLD,
        }
    }
}

impl EncoderConfig {
    /// Parse a (possibly partial) JSON config and validate it.
    pub fn from_json(json: &str) -> Result<Self, GrooveError> {
        let config: EncoderConfig =
            serde_json::from_str(json).map_err(crate::error::FormatError::from)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject anything that would make the encoder divide by zero or fold
    /// the spiral. Runs before any sample is touched.
    pub fn validate(&self) -> Result<(), ConfigError> {
        Quality::new(self.quality)?;
        self.spiral()?;
        if !(self.sensitivity.is_finite() && self.sensitivity > 0.0) {
            return Err(ConfigError::InvalidSensitivity(self.sensitivity));
        }
        if !(self.limiter_threshold > 0.0 && self.limiter_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.limiter_threshold));
        }
        Ok(())
    }

    pub fn quality(&self) -> Result<Quality, ConfigError> {
        Quality::new(self.quality)
    }

    pub fn spiral(&self) -> Result<SpiralGeometry, ConfigError> {
        SpiralGeometry::new(self.disc, self.turns, self.scale)
    }
}

/// Fallbacks used when a document omits geometry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DecodeDefaults {
    pub disc: DiscGeometry,
    /// Used only when the document has no turn count and estimation fails.
    pub turns: f64,
}

impl Default for DecodeDefaults {
    fn default() -> Self {
        Self {
            disc: DiscGeometry::default(),
            turns: DEFAULT_TURNS,
        }
    }
}
