//! Vinyl physics on the control side: motor spin-up/spin-down and the
//! drag-gesture → advance-rate mapping.
//!
//! The engine has no notion of angles; this controller turns gestures and
//! motor state into a rate and feeds it through `set_advance`.

use std::f64::consts::TAU;

use super::session::{AudioBackend, PlaybackSession, SessionState};
use crate::error::PlaybackError;

/// Motor spin-up time constant in seconds.
pub const SPIN_UP_SECS: f64 = 0.25;
/// Motor spin-down time constant in seconds.
pub const SPIN_DOWN_SECS: f64 = 0.6;
/// Rate changes smaller than this are not sent to the engine.
const RATE_EPSILON: f64 = 1e-4;

/// Advance-rate multiplier for a drag gesture.
///
/// The disc's nominal angular velocity is `turns · 2π / duration`; the
/// gesture's angular velocity divided by it is the rate. Degenerate
/// inputs (non-positive `dt`, `turns`, or `duration`) give 0.
pub fn scratch_rate(angle_delta: f64, dt: f64, turns: f64, duration: f64) -> f64 {
    if !(dt > 0.0 && turns > 0.0 && duration > 0.0) || !angle_delta.is_finite() {
        return 0.0;
    }
    let nominal = turns * TAU / duration;
    (angle_delta / dt) / nominal
}

#[derive(Debug, Clone)]
pub struct VinylController {
    /// Rate the motor drives toward when on.
    speed: f64,
    motor_on: bool,
    rate: f64,
    /// Rate imposed by a hand on the disc.
    drag: Option<f64>,
    /// Last rate sent to the engine.
    sent: Option<f64>,
}

impl VinylController {
    pub fn new(speed: f64) -> Self {
        VinylController {
            speed,
            motor_on: false,
            rate: 0.0,
            drag: None,
            sent: None,
        }
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn is_dragging(&self) -> bool {
        self.drag.is_some()
    }

    pub fn set_speed(&mut self, speed: f64) {
        self.speed = speed;
    }

    pub fn start_motor(&mut self) {
        self.motor_on = true;
    }

    pub fn stop_motor(&mut self) {
        self.motor_on = false;
    }

    /// Hand on the disc: the rate follows the hand, starting from rest.
    pub fn begin_drag(&mut self) {
        self.drag = Some(0.0);
    }

    /// Hand moved by `angle_delta` radians over `dt` seconds.
    pub fn drag(&mut self, angle_delta: f64, dt: f64, turns: f64, duration: f64) -> f64 {
        let rate = scratch_rate(angle_delta, dt, turns, duration);
        self.drag = Some(rate);
        self.rate = rate;
        rate
    }

    /// Hand lifted: the motor takes over from the current rate.
    pub fn release(&mut self) {
        self.drag = None;
    }

    /// Advance the physics by `dt` seconds and return the new rate.
    pub fn tick(&mut self, dt: f64) -> f64 {
        if let Some(rate) = self.drag {
            self.rate = rate;
            return rate;
        }
        if dt <= 0.0 {
            return self.rate;
        }
        let target = if self.motor_on { self.speed } else { 0.0 };
        let tau = if target.abs() > self.rate.abs() {
            SPIN_UP_SECS
        } else {
            SPIN_DOWN_SECS
        };
        self.rate += (target - self.rate) * (1.0 - (-dt / tau).exp());
        self.rate
    }

    /// Tick and forward the rate to a playing session when it changed.
    pub fn drive<B: AudioBackend>(
        &mut self,
        session: &mut PlaybackSession<B>,
        dt: f64,
    ) -> Result<f64, PlaybackError> {
        let rate = self.tick(dt);
        let changed = self.sent.is_none_or(|sent| (sent - rate).abs() > RATE_EPSILON);
        let active = matches!(
            session.state(),
            SessionState::Loaded | SessionState::Playing | SessionState::RateAdjusting
        );
        if changed && active {
            session.set_advance(rate)?;
            self.sent = Some(rate);
        }
        Ok(rate)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::session::OfflineBackend;

    #[test]
    fn nominal_drag_is_unit_rate() {
        // One full disc sweep over the full duration plays at 1x
        let rate = scratch_rate(6.0 * TAU, 10.0, 6.0, 10.0);
        assert!((rate - 1.0).abs() < 1e-12);
        assert!((scratch_rate(-0.5, 0.1, 6.0, 10.0) + 0.5 * 10.0 / (0.1 * 6.0 * TAU)).abs() < 1e-12);
    }

    #[test]
    fn degenerate_drag_inputs_give_zero() {
        assert_eq!(scratch_rate(1.0, 0.0, 6.0, 10.0), 0.0);
        assert_eq!(scratch_rate(1.0, 0.1, 6.0, 0.0), 0.0);
        assert_eq!(scratch_rate(1.0, -0.1, 6.0, 10.0), 0.0);
        assert_eq!(scratch_rate(f64::NAN, 0.1, 6.0, 10.0), 0.0);
    }

    #[test]
    fn motor_spins_up_and_down() {
        let mut vinyl = VinylController::new(1.0);
        vinyl.start_motor();
        let first = vinyl.tick(0.05);
        assert!(first > 0.0 && first < 1.0);
        for _ in 0..100 {
            vinyl.tick(0.05);
        }
        assert!((vinyl.rate() - 1.0).abs() < 1e-3, "Motor should reach speed");

        vinyl.stop_motor();
        let slowing = vinyl.tick(0.05);
        assert!(slowing < 1.0 && slowing > first, "Spin-down is slower than spin-up");
    }

    #[test]
    fn drag_overrides_motor_until_release() {
        let mut vinyl = VinylController::new(1.0);
        vinyl.start_motor();
        vinyl.begin_drag();
        assert_eq!(vinyl.tick(0.05), 0.0, "A hand on the disc holds it");
        vinyl.drag(-0.3, 0.01, 6.0, 30.0);
        assert!(vinyl.tick(0.05) < 0.0);
        let held = vinyl.rate();
        vinyl.release();
        assert!(!vinyl.is_dragging());
        assert!(vinyl.tick(0.05) > held, "Motor pulls the rate back up after release");
    }

    #[test]
    fn drive_forwards_rate_to_session() {
        let mut session = PlaybackSession::new(OfflineBackend::new(8000, 64));
        session.load(vec![0.1; 8000], None, 8000, 0.0, 1.0).unwrap();
        session.play().unwrap();

        let mut vinyl = VinylController::new(1.0);
        vinyl.start_motor();
        let rate = vinyl.drive(&mut session, 0.1).unwrap();
        assert!(rate > 0.0);
        assert_eq!(session.state(), SessionState::RateAdjusting);
    }
}
