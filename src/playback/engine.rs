//! Real-time playback engine: reads the decoded buffer at a variable
//! advance rate, one block at a time.
//!
//! `process_block` is the audio callback body: it never blocks, allocates,
//! or logs. Control messages are drained at the top of each block, so a
//! block always runs with one buffer and one advance rate.

use std::sync::Arc;

use super::control::{ControlMessage, ControlReceiver, PlaybackBuffers, ReportSlot, RetiredSender};
use crate::dsp::analysis::rms;

/// A report is published every this many blocks (≈12 ms at 128 frames, 44.1 kHz).
pub const REPORT_INTERVAL_BLOCKS: u32 = 4;

/// Variable-rate buffer reader driven from the audio thread.
pub struct GrooveEngine {
    output_rate: f64,
    buffers: PlaybackBuffers,
    /// Buffer samples per output sample at 1x.
    base_advance: f64,
    /// Rate multiplier from the control thread.
    advance: f64,
    /// Fractional read index into the buffer.
    position: f64,
    playing: bool,
    ended: bool,
    block_counter: u32,
    control: ControlReceiver,
    retired: RetiredSender,
    reports: Arc<ReportSlot>,
}

impl GrooveEngine {
    pub fn new(
        output_rate: u32,
        control: ControlReceiver,
        retired: RetiredSender,
        reports: Arc<ReportSlot>,
    ) -> Self {
        GrooveEngine {
            output_rate: output_rate.max(1) as f64,
            buffers: PlaybackBuffers::default(),
            base_advance: 1.0,
            advance: 0.0,
            position: 0.0,
            playing: false,
            ended: false,
            block_counter: 0,
            control,
            retired,
            reports,
        }
    }

    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn advance(&self) -> f64 {
        self.advance
    }

    pub fn is_playing(&self) -> bool {
        self.playing
    }

    pub fn is_ended(&self) -> bool {
        self.ended
    }

    fn apply(&mut self, message: ControlMessage) {
        match message {
            ControlMessage::Load {
                buffers,
                position,
                advance,
            } => {
                let old = std::mem::replace(&mut self.buffers, buffers);
                if !old.is_empty() {
                    self.retired.retire(old);
                }
                self.base_advance = self.buffers.sample_rate.max(1) as f64 / self.output_rate;
                self.position = position;
                self.advance = advance;
                self.playing = !self.buffers.is_empty();
                self.ended = false;
                self.block_counter = 0;
            }
            ControlMessage::SetAdvance(advance) => self.advance = advance,
            ControlMessage::Seek(position) => {
                let last = self.buffers.len().saturating_sub(1) as f64;
                self.position = position.clamp(0.0, last);
                if !self.buffers.is_empty() {
                    self.playing = true;
                    self.ended = false;
                }
            }
            ControlMessage::Stop => {
                let old = std::mem::take(&mut self.buffers);
                if !old.is_empty() {
                    self.retired.retire(old);
                }
                self.playing = false;
                self.ended = false;
                self.position = 0.0;
            }
        }
    }

    #[inline]
    fn read(channel: &[f32], index: usize, frac: f64) -> f32 {
        let a = channel[index] as f64;
        let b = channel[index + 1] as f64;
        (a + frac * (b - a)) as f32
    }

    /// Fill one block of output. `out_r` may be empty for mono output;
    /// mono buffers are duplicated to both channels otherwise.
    pub fn process_block(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        while let Some(message) = self.control.try_recv() {
            self.apply(message);
        }

        if !self.playing {
            out_l.fill(0.0);
            out_r.fill(0.0);
            return;
        }

        let len = self.buffers.len();
        let last = len.saturating_sub(1) as f64;
        let step = self.advance * self.base_advance;
        // `len` is the shorter channel, so both reads stay in bounds
        let left: &[f32] = &self.buffers.left;
        let right = self.buffers.right.as_deref().unwrap_or(left);
        let stereo_out = !out_r.is_empty();
        let mut finished_now = false;

        for i in 0..out_l.len() {
            let p = self.position;
            let (l, r) = if p < 0.0 {
                // Scratched past the start: hold at 0, silent for this sample
                self.position = 0.0;
                (0.0, 0.0)
            } else if p >= last {
                if step >= 0.0 {
                    finished_now = true;
                    out_l[i..].fill(0.0);
                    if stereo_out {
                        out_r[i..].fill(0.0);
                    }
                    break;
                }
                self.position += step;
                (0.0, 0.0)
            } else {
                let index = p as usize;
                let frac = p - index as f64;
                self.position += step;
                (
                    Self::read(left, index, frac),
                    Self::read(right, index, frac),
                )
            };
            out_l[i] = l;
            if stereo_out {
                out_r[i] = r;
            }
        }

        let amplitude = rms(out_l);
        if finished_now {
            self.playing = false;
            self.ended = true;
            self.reports.publish(1.0, amplitude, true);
            return;
        }

        self.block_counter = self.block_counter.wrapping_add(1);
        // Parked on the last sample: the next block ends and reports 1.0
        let at_end = step >= 0.0 && self.position >= last;
        if self.block_counter % REPORT_INTERVAL_BLOCKS == 0 && !at_end {
            let normalized = if last > 0.0 {
                (self.position / last).clamp(0.0, 1.0)
            } else {
                0.0
            };
            self.reports.publish(normalized, amplitude, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::control::{ControlSender, RetiredReceiver, control_channel, retired_channel};

    struct Rig {
        engine: GrooveEngine,
        tx: ControlSender,
        retired: RetiredReceiver,
        reports: Arc<ReportSlot>,
    }

    fn rig(output_rate: u32) -> Rig {
        let (tx, rx) = control_channel(16);
        let (retired_tx, retired) = retired_channel();
        let reports = Arc::new(ReportSlot::new());
        Rig {
            engine: GrooveEngine::new(output_rate, rx, retired_tx, Arc::clone(&reports)),
            tx,
            retired,
            reports,
        }
    }

    fn ramp(len: usize) -> Vec<f32> {
        (0..len).map(|i| i as f32 / len as f32).collect()
    }

    fn load(rig: &mut Rig, left: Vec<f32>, rate: u32, advance: f64) {
        load_stereo(rig, left, None, rate, advance);
    }

    fn load_stereo(
        rig: &mut Rig,
        left: Vec<f32>,
        right: Option<Vec<f32>>,
        rate: u32,
        advance: f64,
    ) {
        rig.tx
            .send(ControlMessage::Load {
                buffers: PlaybackBuffers {
                    left,
                    right,
                    sample_rate: rate,
                },
                position: 0.0,
                advance,
            })
            .unwrap();
    }

    #[test]
    fn idle_engine_outputs_silence() {
        let mut rig = rig(8000);
        let mut l = [1.0_f32; 32];
        let mut r = [1.0_f32; 32];
        rig.engine.process_block(&mut l, &mut r);
        assert!(l.iter().chain(r.iter()).all(|&s| s == 0.0));
        assert_eq!(rig.reports.latest(), None);
    }

    #[test]
    fn linear_interpolation_at_half_speed() {
        let mut rig = rig(8000);
        load(&mut rig, vec![0.0, 1.0, 0.0, -1.0, 0.0], 8000, 0.5);
        let mut l = [0.0_f32; 4];
        let mut r = [0.0_f32; 4];
        rig.engine.process_block(&mut l, &mut r);
        assert_eq!(l, [0.0, 0.5, 1.0, 0.5]);
        assert_eq!(r, l, "Mono buffers are duplicated to the right channel");
    }

    #[test]
    fn stereo_channels_are_read_separately() {
        let mut rig = rig(8000);
        load_stereo(
            &mut rig,
            vec![0.0, 1.0, 0.0, -1.0, 0.0],
            Some(vec![0.0, -0.5, -1.0, -0.5, 0.0]),
            8000,
            0.5,
        );
        let mut l = [0.0_f32; 4];
        let mut r = [0.0_f32; 4];
        rig.engine.process_block(&mut l, &mut r);
        assert_eq!(l, [0.0, 0.5, 1.0, 0.5]);
        assert_eq!(r, [0.0, -0.25, -0.5, -0.75]);
    }

    #[test]
    fn short_right_channel_plays_to_its_end() {
        let mut rig = rig(8000);
        load_stereo(&mut rig, vec![0.1; 1000], Some(vec![0.2; 10]), 8000, 1.0);
        let mut l = [0.0_f32; 128];
        let mut r = [0.0_f32; 128];
        for _ in 0..4 {
            rig.engine.process_block(&mut l, &mut r);
        }
        assert!(rig.engine.is_ended(), "Playback stops at the shorter channel");
        let report = rig.reports.latest().unwrap();
        assert!(report.ended);
        assert_eq!(report.position, 1.0);
    }

    #[test]
    fn end_on_report_block_reports_full_position_once() {
        let block = 128;
        let mut rig = rig(8000);
        load(&mut rig, ramp(REPORT_INTERVAL_BLOCKS as usize * block + 1), 8000, 1.0);
        let mut l = vec![0.0_f32; block];
        let mut at_full = 0;
        let mut last_sequence = 0;
        for _ in 0..12 {
            rig.engine.process_block(&mut l, &mut []);
            if let Some(report) = rig.reports.latest() {
                if report.sequence != last_sequence {
                    last_sequence = report.sequence;
                    if report.position == 1.0 {
                        at_full += 1;
                        assert!(report.ended, "Position 1.0 is only reported with the end");
                    }
                }
            }
        }
        assert!(rig.engine.is_ended());
        assert_eq!(at_full, 1);
    }

    #[test]
    fn advance_takes_effect_at_next_block() {
        let mut rig = rig(8000);
        load(&mut rig, ramp(1000), 8000, 1.0);
        let mut l = [0.0_f32; 16];
        let mut r = [0.0_f32; 16];
        rig.engine.process_block(&mut l, &mut r);
        assert_eq!(rig.engine.position(), 16.0);
        rig.tx.send(ControlMessage::SetAdvance(2.0)).unwrap();
        assert_eq!(rig.engine.advance(), 1.0, "Not applied until the next block");
        rig.engine.process_block(&mut l, &mut r);
        assert_eq!(rig.engine.position(), 48.0);
    }

    #[test]
    fn base_advance_follows_buffer_rate() {
        let mut rig = rig(16000);
        load(&mut rig, ramp(1000), 8000, 1.0);
        let mut l = [0.0_f32; 10];
        rig.engine.process_block(&mut l, &mut []);
        assert_eq!(rig.engine.position(), 5.0);
    }

    #[test]
    fn reverse_past_start_clamps_with_silence() {
        let mut rig = rig(8000);
        load(&mut rig, vec![0.5; 100], 8000, 1.0);
        rig.tx.send(ControlMessage::Seek(2.0)).unwrap();
        rig.tx.send(ControlMessage::SetAdvance(-1.0)).unwrap();
        let mut l = [9.0_f32; 6];
        rig.engine.process_block(&mut l, &mut []);
        // Each step below zero is clamped back to index 0 and emits silence
        assert_eq!(l, [0.5, 0.5, 0.5, 0.0, 0.5, 0.0]);
        assert_eq!(rig.engine.position(), 0.0);
        assert!(!rig.engine.is_ended(), "Running off the start never ends playback");
    }

    #[test]
    fn forward_exhaustion_ends_once() {
        let mut rig = rig(8000);
        load(&mut rig, ramp(100), 8000, 1.0);
        let mut l = [0.0_f32; 64];
        rig.engine.process_block(&mut l, &mut []);
        assert!(!rig.engine.is_ended());
        rig.engine.process_block(&mut l, &mut []);
        assert!(rig.engine.is_ended());
        assert!(l[40..].iter().all(|&s| s == 0.0));
        let report = rig.reports.latest().unwrap();
        assert!(report.ended);
        assert_eq!(report.position, 1.0);
        let seq = report.sequence;

        for _ in 0..8 {
            rig.engine.process_block(&mut l, &mut []);
        }
        assert_eq!(rig.reports.latest().unwrap().sequence, seq, "No reports after ending");
    }

    #[test]
    fn reports_every_fourth_block() {
        let mut rig = rig(8000);
        load(&mut rig, ramp(10_000), 8000, 1.0);
        let mut l = [0.0_f32; 128];
        for _ in 0..3 {
            rig.engine.process_block(&mut l, &mut []);
        }
        assert_eq!(rig.reports.latest(), None);
        rig.engine.process_block(&mut l, &mut []);
        let report = rig.reports.latest().unwrap();
        assert!((report.position - 512.0 / 9999.0).abs() < 1e-12);
        assert!(report.amplitude > 0.0);
    }

    #[test]
    fn stop_and_reload_retire_buffers() {
        let mut rig = rig(8000);
        load(&mut rig, ramp(100), 8000, 1.0);
        load(&mut rig, ramp(200), 8000, 1.0);
        rig.tx.send(ControlMessage::Stop).unwrap();
        let mut l = [0.0_f32; 8];
        rig.engine.process_block(&mut l, &mut []);
        assert!(!rig.engine.is_playing());
        assert_eq!(rig.retired.drain(), 2);
    }
}
