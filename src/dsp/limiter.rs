//! Soft limiter: keeps single transients from dominating the peak
//! normalization that follows it in the encoder.
//!
//! One-way by construction: the decoder does not undo it.

/// Default limiting threshold (linear amplitude).
pub const DEFAULT_THRESHOLD: f64 = 0.9;
/// Envelope attack time constant in seconds.
pub const ATTACK_SECS: f64 = 0.010;
/// Envelope release time constant in seconds.
pub const RELEASE_SECS: f64 = 0.500;

/// Peak envelope follower with fast attack and slow release.
#[derive(Debug, Clone)]
pub struct SoftLimiter {
    /// Threshold as linear amplitude.
    pub threshold: f64,
    attack_coef: f64,
    release_coef: f64,

    // Internal state
    envelope: f64,
}

impl SoftLimiter {
    pub fn new(sample_rate: f64, threshold: f64) -> Self {
        Self {
            threshold,
            attack_coef: (-1.0 / (ATTACK_SECS * sample_rate)).exp(),
            release_coef: (-1.0 / (RELEASE_SECS * sample_rate)).exp(),
            envelope: 0.0,
        }
    }

    /// Current envelope level (linear).
    pub fn envelope(&self) -> f64 {
        self.envelope
    }

    /// Process a single sample.
    #[inline]
    pub fn process(&mut self, input: f64) -> f64 {
        let level = input.abs();
        let coef = if level > self.envelope {
            self.attack_coef
        } else {
            self.release_coef
        };
        self.envelope = coef * self.envelope + (1.0 - coef) * level;

        let gain = if self.envelope > self.threshold {
            self.threshold / self.envelope
        } else {
            1.0
        };
        input * gain
    }
}

/// Limit a whole buffer in place with a fresh envelope.
pub fn soft_limit(samples: &mut [f64], sample_rate: u32, threshold: f64) {
    let mut limiter = SoftLimiter::new(sample_rate as f64, threshold);
    for s in samples.iter_mut() {
        *s = limiter.process(*s);
    }
}
