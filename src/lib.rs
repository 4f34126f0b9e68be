pub mod codec;
pub mod descriptor;
pub mod document;
pub mod dsp;
pub mod error;
pub mod geometry;
pub mod playback;
pub mod wav;

use std::sync::Arc;

use crate::codec::{DecodeDefaults, EncoderConfig};
use crate::error::GrooveError;
use crate::playback::control::{
    ControlSender, DEFAULT_CONTROL_CAPACITY, RetiredReceiver, control_channel, retired_channel,
};
use crate::playback::{ControlMessage, GrooveEngine, PlaybackBuffers, ReportSlot};
use wasm_bindgen::prelude::*;

/// The crate version, read from Cargo.toml at compile time.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// WASM-exposed: return the groove_core version string.
#[wasm_bindgen]
pub fn core_version() -> String {
    VERSION.to_string()
}

/// Render a library error for JS. Document errors point at the offending
/// bytes of `source`.
fn to_js_error(err: GrooveError, source: Option<&str>) -> JsValue {
    match (&err, source) {
        (GrooveError::Format(format), Some(src)) => JsValue::from_str(&format.diagnostic(src)),
        _ => JsValue::from_str(&format!("{err}")),
    }
}

/// WASM-exposed: encode mono (or stereo, when `right` is given) samples into
/// a groove document. `config` is a partial `EncoderConfig` object; missing
/// fields take their defaults.
#[wasm_bindgen]
pub fn encode_groove(
    samples: &[f32],
    right: Option<Vec<f32>>,
    sample_rate: u32,
    config: JsValue,
) -> Result<String, JsValue> {
    let config: EncoderConfig = if config.is_undefined() || config.is_null() {
        EncoderConfig::default()
    } else {
        serde_wasm_bindgen::from_value(config).map_err(|e| JsValue::from_str(&format!("{e}")))?
    };
    codec::encode_document(samples, right.as_deref(), sample_rate, &config)
        .map_err(|e| to_js_error(e, None))
}

/// WASM-exposed: decode a groove document into `{ left, right?, sampleRate, ... }`.
#[wasm_bindgen]
pub fn decode_groove(source: &str) -> Result<JsValue, JsValue> {
    let audio = codec::decode_document(source, &DecodeDefaults::default())
        .map_err(|e| to_js_error(e, Some(source)))?;
    serde_wasm_bindgen::to_value(&audio).map_err(|e| JsValue::from_str(&format!("{e}")))
}

/// WASM-exposed: decode a groove document straight to WAV bytes.
#[wasm_bindgen]
pub fn decode_groove_wav(source: &str) -> Result<Vec<u8>, JsValue> {
    let audio = codec::decode_document(source, &DecodeDefaults::default())
        .map_err(|e| to_js_error(e, Some(source)))?;
    Ok(wav::decoded_to_wav(&audio))
}

/// WASM-exposed: advance rate for a drag of `angle_delta` radians over `dt`
/// seconds on a disc of `turns` turns holding `duration` seconds of audio.
#[wasm_bindgen]
pub fn scratch_rate(angle_delta: f64, dt: f64, turns: f64, duration: f64) -> f64 {
    playback::scratch_rate(angle_delta, dt, turns, duration)
}

/// WASM-exposed playback processor for an AudioWorklet.
///
/// Owns both ends of the control channel: the worklet's message handler
/// calls `load`/`set_advance`/`seek`/`stop`, and its `process` callback
/// calls `process`, which applies queued commands before rendering.
#[wasm_bindgen]
pub struct WasmGrooveProcessor {
    engine: GrooveEngine,
    control: ControlSender,
    retired: RetiredReceiver,
    reports: Arc<ReportSlot>,
    /// Length of the most recently loaded buffer.
    length: usize,
}

#[wasm_bindgen]
impl WasmGrooveProcessor {
    #[wasm_bindgen(constructor)]
    pub fn new(output_rate: u32) -> WasmGrooveProcessor {
        let (control, receiver) = control_channel(DEFAULT_CONTROL_CAPACITY);
        let (retired_tx, retired) = retired_channel();
        let reports = Arc::new(ReportSlot::new());
        WasmGrooveProcessor {
            engine: GrooveEngine::new(output_rate, receiver, retired_tx, Arc::clone(&reports)),
            control,
            retired,
            reports,
            length: 0,
        }
    }

    /// Replace the buffers. `start_progress` is in [0, 1].
    pub fn load(
        &mut self,
        left: Vec<f32>,
        right: Option<Vec<f32>>,
        sample_rate: u32,
        start_progress: f64,
        advance: f64,
    ) -> Result<(), JsValue> {
        let buffers = PlaybackBuffers {
            left,
            right,
            sample_rate,
        };
        buffers
            .check_channels()
            .map_err(|e| JsValue::from_str(&format!("{e}")))?;
        let buffers = playback::enforce_rate_floor(buffers);
        let last = buffers.len().saturating_sub(1) as f64;
        let position = (start_progress.clamp(0.0, 1.0) * last).round();
        self.length = buffers.len();
        self.send(ControlMessage::Load {
            buffers,
            position,
            advance,
        })
    }

    pub fn set_advance(&mut self, advance: f64) -> Result<(), JsValue> {
        self.send(ControlMessage::SetAdvance(advance))
    }

    /// Jump to `progress` in [0, 1] of the loaded buffer.
    pub fn seek(&mut self, progress: f64) -> Result<(), JsValue> {
        let last = self.length.saturating_sub(1) as f64;
        self.send(ControlMessage::Seek(progress.clamp(0.0, 1.0) * last))
    }

    pub fn stop(&mut self) -> Result<(), JsValue> {
        self.length = 0;
        self.send(ControlMessage::Stop)
    }

    /// Render one block. Pass an empty `out_r` for mono output.
    pub fn process(&mut self, out_l: &mut [f32], out_r: &mut [f32]) {
        self.engine.process_block(out_l, out_r);
    }

    /// Latest `{ position, amplitude, ended, sequence }` report, or `null`.
    pub fn report(&mut self) -> Result<JsValue, JsValue> {
        self.retired.drain();
        match self.reports.latest() {
            Some(report) => serde_wasm_bindgen::to_value(&report)
                .map_err(|e| JsValue::from_str(&format!("{e}"))),
            None => Ok(JsValue::NULL),
        }
    }
}

impl WasmGrooveProcessor {
    fn send(&mut self, message: ControlMessage) -> Result<(), JsValue> {
        self.control
            .send(message)
            .map_err(|e| JsValue::from_str(&format!("{e}")))
    }
}
