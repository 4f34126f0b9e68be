//! Geometry descriptor: the key/value record that travels with a groove
//! and carries every encode-time parameter exact decoding needs.
//!
//! Two forms are supported:
//! - the embedded text form (`key=value;` pairs inside the document's
//!   `<desc>` element), read tolerantly: any order, unknown keys ignored,
//!   optional keys may be missing;
//! - a JSON form via serde for callers that persist it separately.

use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Version written by this crate. Documents without a `v` key are version 1.
pub const DESCRIPTOR_VERSION: u32 = 2;
pub const DEFAULT_RIAA_CORNER_HZ: f64 = 1000.0;
pub const DEFAULT_RIAA_GAIN_DB: f64 = 20.0;

/// Leading prose of the text form.
const TEXT_PREAMBLE: &str = "Geometry-only spiral audio.";

/// Emphasis applied before companding. The two filter families are
/// mutually exclusive.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase", rename_all_fields = "camelCase")]
pub enum Emphasis {
    #[default]
    None,
    /// First-order `1 - 0.97 z^-1` emphasis of older grooves.
    Legacy,
    /// Biquad high shelf (boost on encode, matching cut on decode).
    Shelf { corner_hz: f64, gain_db: f64 },
}

/// Encode-time parameters recorded alongside the groove points.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GrooveDescriptor {
    pub version: u32,
    /// Effective (post-decimation) sample rate of the groove points.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sample_rate: Option<u32>,
    /// Sample rate of the audio before decimation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_rate: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_out: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub r_in: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cx: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cy: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub turns: Option<f64>,
    /// Companding gain: groove units per unit of compressed amplitude.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub k: Option<f64>,
    /// Sample count before decimation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub original_length: Option<usize>,
    #[serde(default)]
    pub companding: bool,
    #[serde(default)]
    pub emphasis: Emphasis,
    #[serde(default)]
    pub stereo: bool,
    /// Integer coordinate scale; absent means plain (unscaled) coordinates.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<u32>,
}

impl Default for GrooveDescriptor {
    fn default() -> Self {
        Self {
            version: DESCRIPTOR_VERSION,
            sample_rate: None,
            source_rate: None,
            r_out: None,
            r_in: None,
            cx: None,
            cy: None,
            turns: None,
            k: None,
            original_length: None,
            companding: false,
            emphasis: Emphasis::None,
            stereo: false,
            scale: None,
        }
    }
}

/// One `key=value` pair with the byte span of its value.
struct Pair<'a> {
    key: &'a str,
    value: &'a str,
    span: Range<usize>,
}

/// Read `text[from..to]` as a `key=value` token.
fn pair_at(text: &str, from: usize, to: usize) -> Option<Pair<'_>> {
    let token = &text[from..to];
    let eq = token.find('=')?;
    // A trailing '.' or ',' ends a sentence, it is not part of the value
    let value = token[eq + 1..].trim_end_matches(['.', ',']);
    let value_start = from + eq + 1;
    Some(Pair {
        key: &token[..eq],
        value,
        span: value_start..value_start + value.len(),
    })
}

/// Split text on `;` and whitespace, keeping tokens that contain `=`.
fn pairs(text: &str) -> Vec<Pair<'_>> {
    let mut out = Vec::new();
    let mut start = None;
    for (i, ch) in text.char_indices() {
        if ch == ';' || ch.is_whitespace() {
            if let Some(s) = start.take() {
                out.extend(pair_at(text, s, i));
            }
        } else if start.is_none() {
            start = Some(i);
        }
    }
    if let Some(s) = start {
        out.extend(pair_at(text, s, text.len()));
    }
    out
}

fn invalid(pair: &Pair<'_>) -> FormatError {
    FormatError::InvalidDescriptor {
        key: pair.key.to_string(),
        value: pair.value.to_string(),
        span: pair.span.clone(),
    }
}

fn parse_f64(pair: &Pair<'_>) -> Result<f64, FormatError> {
    pair.value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite())
        .ok_or_else(|| invalid(pair))
}

fn parse_count(pair: &Pair<'_>) -> Result<u64, FormatError> {
    let v = parse_f64(pair)?;
    if v < 0.0 {
        return Err(invalid(pair));
    }
    Ok(v.round() as u64)
}

fn parse_u32(pair: &Pair<'_>) -> Result<u32, FormatError> {
    u32::try_from(parse_count(pair)?).map_err(|_| invalid(pair))
}

fn parse_usize(pair: &Pair<'_>) -> Result<usize, FormatError> {
    usize::try_from(parse_count(pair)?).map_err(|_| invalid(pair))
}

fn parse_flag(pair: &Pair<'_>) -> Result<bool, FormatError> {
    match pair.value {
        "1" | "true" => Ok(true),
        "0" | "false" => Ok(false),
        _ => Err(invalid(pair)),
    }
}

impl GrooveDescriptor {
    /// Parse the embedded text form. Spans in errors are relative to `text`.
    pub fn from_text(text: &str) -> Result<Self, FormatError> {
        let mut desc = GrooveDescriptor {
            version: 1,
            ..GrooveDescriptor::default()
        };
        let mut version = None;
        let (mut riaa, mut preemph) = (false, false);
        let (mut riaa_hz, mut riaa_db) = (None, None);

        for pair in pairs(text) {
            match pair.key {
                "v" => version = Some(parse_u32(&pair)?),
                "sr" => desc.sample_rate = Some(parse_u32(&pair)?),
                "srcSr" => desc.source_rate = Some(parse_u32(&pair)?),
                "Rout" => desc.r_out = Some(parse_f64(&pair)?),
                "Rin" => desc.r_in = Some(parse_f64(&pair)?),
                "cx" => desc.cx = Some(parse_f64(&pair)?),
                "cy" => desc.cy = Some(parse_f64(&pair)?),
                "turns" => desc.turns = Some(parse_f64(&pair)?),
                "k" => desc.k = Some(parse_f64(&pair)?),
                "originalLength" => desc.original_length = Some(parse_usize(&pair)?),
                "mulaw" => desc.companding = parse_flag(&pair)?,
                "preemph" => preemph = parse_flag(&pair)?,
                "riaa" => riaa = parse_flag(&pair)?,
                "riaaHz" => riaa_hz = Some(parse_f64(&pair)?),
                "riaaDb" => riaa_db = Some(parse_f64(&pair)?),
                "scale" => desc.scale = Some(parse_u32(&pair)?),
                "stereo" => desc.stereo = parse_flag(&pair)?,
                _ => {}
            }
        }

        desc.version = version.unwrap_or(1);
        desc.emphasis = if riaa {
            Emphasis::Shelf {
                corner_hz: riaa_hz.unwrap_or(DEFAULT_RIAA_CORNER_HZ),
                gain_db: riaa_db.unwrap_or(DEFAULT_RIAA_GAIN_DB),
            }
        } else if preemph {
            Emphasis::Legacy
        } else {
            Emphasis::None
        };
        Ok(desc)
    }

    /// Render the embedded text form.
    pub fn to_text(&self) -> String {
        let mut fields = vec![format!("v={}", self.version)];
        if let Some(sr) = self.sample_rate {
            fields.push(format!("sr={sr}"));
        }
        if let Some(src) = self.source_rate {
            fields.push(format!("srcSr={src}"));
        }
        if let Some(r) = self.r_out {
            fields.push(format!("Rout={r}"));
        }
        if let Some(r) = self.r_in {
            fields.push(format!("Rin={r}"));
        }
        if let Some(cx) = self.cx {
            fields.push(format!("cx={cx}"));
        }
        if let Some(cy) = self.cy {
            fields.push(format!("cy={cy}"));
        }
        if let Some(turns) = self.turns {
            fields.push(format!("turns={turns}"));
        }
        if let Some(k) = self.k {
            fields.push(format!("k={k:.6}"));
        }
        if let Some(len) = self.original_length {
            fields.push(format!("originalLength={len}"));
        }
        fields.push(format!("mulaw={}", self.companding as u8));
        match self.emphasis {
            Emphasis::None => {}
            Emphasis::Legacy => fields.push("preemph=1".to_string()),
            Emphasis::Shelf { corner_hz, gain_db } => {
                fields.push("riaa=1".to_string());
                fields.push(format!("riaaHz={corner_hz}"));
                fields.push(format!("riaaDb={gain_db}"));
            }
        }
        if let Some(scale) = self.scale {
            fields.push(format!("scale={scale}"));
        }
        fields.push(format!("stereo={}", self.stereo as u8));
        format!("{TEXT_PREAMBLE} {}.", fields.join("; "))
    }

    /// Parse the JSON form.
    pub fn from_json(json: &str) -> Result<Self, FormatError> {
        Ok(serde_json::from_str(json)?)
    }

    /// Render the JSON form.
    pub fn to_json(&self) -> Result<String, FormatError> {
        Ok(serde_json::to_string(self)?)
    }

    /// Coordinate scale, 1 when absent (older float-coordinate grooves).
    pub fn scale_or_unit(&self) -> u32 {
        self.scale.filter(|&s| s > 0).unwrap_or(1)
    }
}
