use std::ops::Range;

use ariadne::{Config, Label, Report, ReportKind, Source};
use thiserror::Error;

/// Top-level error for the codec (encode/decode).
#[derive(Debug, Error)]
pub enum GrooveError {
    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
    #[error("Format error: {0}")]
    Format(#[from] FormatError),
}

/// Convenience Result type for codec operations.
pub type Result<T> = std::result::Result<T, GrooveError>;

/// Parameters rejected before any computation runs.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("degenerate disc geometry: Rout={r_out} must exceed Rin={r_in} and both must be positive")]
    DegenerateGeometry { r_out: f64, r_in: f64 },
    #[error("turn count must be positive, got {0}")]
    NonPositiveTurns(f64),
    #[error("quality must be in 1..=5, got {0}")]
    InvalidQuality(u8),
    #[error("sample rate must be positive, got {0}")]
    InvalidSampleRate(u32),
    #[error("coordinate scale must be positive, got {0}")]
    InvalidScale(u32),
    #[error("sensitivity must be positive and finite, got {0}")]
    InvalidSensitivity(f64),
    #[error("limiter threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("shelf corner {corner_hz} Hz must be below half the sample rate ({sample_rate} Hz)")]
    CornerAboveNyquist { corner_hz: f64, sample_rate: u32 },
}

/// Malformed or incomplete groove data.
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("missing groove data: no groove polyline found")]
    MissingGroove,
    #[error("missing groove data: the point list is empty")]
    EmptyPoints { span: Range<usize> },
    #[error("invalid groove point #{index}: '{text}'")]
    InvalidPoint {
        index: usize,
        text: String,
        span: Range<usize>,
    },
    #[error("invalid descriptor value for '{key}': '{value}'")]
    InvalidDescriptor {
        key: String,
        value: String,
        span: Range<usize>,
    },
    #[error("invalid descriptor JSON: {0}")]
    Json(#[from] serde_json::Error),
}

impl FormatError {
    /// Byte range in the document this error points at, if any.
    pub fn span(&self) -> Option<Range<usize>> {
        match self {
            FormatError::EmptyPoints { span }
            | FormatError::InvalidPoint { span, .. }
            | FormatError::InvalidDescriptor { span, .. } => Some(span.clone()),
            FormatError::MissingGroove | FormatError::Json(_) => None,
        }
    }

    /// Shift the span by `offset` bytes (used when a fragment was parsed
    /// out of a larger document).
    pub(crate) fn offset_by(self, offset: usize) -> Self {
        let shift = |span: Range<usize>| (span.start + offset)..(span.end + offset);
        match self {
            FormatError::EmptyPoints { span } => FormatError::EmptyPoints { span: shift(span) },
            FormatError::InvalidPoint { index, text, span } => FormatError::InvalidPoint {
                index,
                text,
                span: shift(span),
            },
            FormatError::InvalidDescriptor { key, value, span } => {
                FormatError::InvalidDescriptor {
                    key,
                    value,
                    span: shift(span),
                }
            }
            other => other,
        }
    }

    /// Render a plain-text diagnostic pointing into `source`.
    pub fn diagnostic(&self, source: &str) -> String {
        let span = self
            .span()
            .map(|s| s.start.min(source.len())..s.end.min(source.len()));
        let mut report = Report::build(ReportKind::Error, ("groove", span.clone().unwrap_or(0..0)))
            .with_config(Config::default().with_color(false))
            .with_message(self.to_string());
        if let Some(span) = span {
            report = report.with_label(Label::new(("groove", span)).with_message("here"));
        }
        let mut out = Vec::new();
        let written = report
            .finish()
            .write(("groove", Source::from(source)), &mut out);
        match written {
            Ok(()) => String::from_utf8_lossy(&out).into_owned(),
            Err(_) => self.to_string(),
        }
    }
}

/// Errors raised by a playback session.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PlaybackError {
    #[error("audio backend unavailable: {0}")]
    BackendUnavailable(String),
    #[error("control channel full, message dropped")]
    ChannelFull,
    #[error("no audio loaded")]
    NotLoaded,
    #[error("right channel has {right} samples but left has {left}")]
    ChannelLengthMismatch { left: usize, right: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_converts_into_groove_error() {
        let err: GrooveError = ConfigError::NonPositiveTurns(0.0).into();
        assert!(matches!(err, GrooveError::Config(ConfigError::NonPositiveTurns(_))));
        assert!(err.to_string().contains("turn count"));
    }

    #[test]
    fn offset_shifts_spans() {
        let err = FormatError::InvalidPoint {
            index: 3,
            text: "1,x".into(),
            span: 2..5,
        }
        .offset_by(10);
        assert_eq!(err.span(), Some(12..15));
    }

    #[test]
    fn diagnostic_mentions_message() {
        let source = "points=\"1,2 3,oops\"";
        let err = FormatError::InvalidPoint {
            index: 1,
            text: "3,oops".into(),
            span: 12..18,
        };
        let report = err.diagnostic(source);
        assert!(report.contains("invalid groove point #1"), "report was: {report}");
    }

    #[test]
    fn diagnostic_without_span_does_not_panic() {
        let report = FormatError::MissingGroove.diagnostic("<svg></svg>");
        assert!(report.contains("missing groove data"));
    }
}
