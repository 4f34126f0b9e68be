use std::f64::consts::TAU;

use groove_core::codec::{DecodeDefaults, EncoderConfig, decode_document, encode, encode_document};
use groove_core::document::GrooveDocument;
use groove_core::dsp::dominant_frequency;
use groove_core::geometry::arc_position;
use groove_core::playback::{OfflineBackend, PlaybackSession, SessionState};

fn sine(freq: f64, sample_rate: u32, len: usize, amp: f64) -> Vec<f32> {
    (0..len)
        .map(|i| (amp * (TAU * freq * i as f64 / sample_rate as f64).sin()) as f32)
        .collect()
}

fn sine_config() -> EncoderConfig {
    EncoderConfig {
        quality: 3,
        turns: 6.0,
        ..EncoderConfig::default()
    }
}

#[test]
fn sine_survives_document_round_trip() {
    let samples = sine(440.0, 44100, 88200, 0.8);
    let doc = encode_document(&samples, None, 44100, &sine_config()).expect("encode failed");
    let audio = decode_document(&doc, &DecodeDefaults::default()).expect("decode failed");

    assert_eq!(audio.sample_rate, 44100);
    assert_eq!(audio.len(), 88200);
    assert!(!audio.is_stereo());

    let freq = dominant_frequency(&audio.left, audio.sample_rate).expect("silent output");
    assert!(
        (freq - 440.0).abs() <= 440.0 * 0.02,
        "Dominant frequency {freq} Hz is not within 2% of 440 Hz"
    );
}

#[test]
fn playback_reaches_the_end_exactly_once() {
    let samples = sine(440.0, 44100, 88200, 0.8);
    let doc = encode_document(&samples, None, 44100, &sine_config()).expect("encode failed");
    let audio = decode_document(&doc, &DecodeDefaults::default()).expect("decode failed");

    let mut session = PlaybackSession::new(OfflineBackend::new(44100, 128));
    session
        .load(audio.left, None, audio.sample_rate, 0.0, 1.0)
        .expect("load failed");
    session.play().expect("play failed");

    let mut ended_events = 0;
    let mut last_position = 0.0;
    // 88200 samples / 128 frames ≈ 690 blocks
    for _ in 0..1000 {
        session.backend_mut().render(1);
        if let Some(event) = session.poll() {
            assert!(event.position >= last_position, "Position went backward at 1x");
            last_position = event.position;
            if event.ended {
                ended_events += 1;
                assert_eq!(event.position, 1.0);
            }
        }
    }
    assert_eq!(ended_events, 1);
    assert_eq!(session.state(), SessionState::Ended);
    assert_eq!(session.position(), 1.0);
}

fn burst(len: usize) -> Vec<f32> {
    (0..len)
        .map(|i| {
            if (6000..10000).contains(&i) {
                (0.7 * (TAU * 500.0 * i as f64 / 16000.0).sin()) as f32
            } else {
                0.0
            }
        })
        .collect()
}

fn burst_energy(ch: &[f32]) -> f64 {
    ch[6000..10000].iter().map(|&s| (s as f64).powi(2)).sum()
}

#[test]
fn stereo_channels_stay_separate_through_document() {
    let config = EncoderConfig {
        quality: 3,
        ..EncoderConfig::default()
    };
    let silent = vec![0.0_f32; 16000];

    // Left-only
    let doc = encode_document(&burst(16000), Some(&silent), 16000, &config).expect("encode failed");
    let audio = decode_document(&doc, &DecodeDefaults::default()).expect("decode failed");
    let right = audio.right.as_ref().expect("stereo document decodes to stereo");
    let leakage = burst_energy(right) / burst_energy(&audio.left);
    assert!(leakage < 0.01, "Left-only signal leaked into right: {leakage}");

    // Right-only
    let doc = encode_document(&silent, Some(&burst(16000)), 16000, &config).expect("encode failed");
    let audio = decode_document(&doc, &DecodeDefaults::default()).expect("decode failed");
    let right = audio.right.as_ref().expect("stereo document decodes to stereo");
    let leakage = burst_energy(&audio.left) / burst_energy(right);
    assert!(leakage < 0.01, "Right-only signal leaked into left: {leakage}");
}

#[test]
fn quantized_points_stay_in_their_lane() {
    let samples = sine(1000.0, 22050, 22050, 1.0);
    let encoded = encode(&samples, 22050, &sine_config()).expect("encode failed");
    let doc = GrooveDocument::parse(&encoded.to_document()).expect("parse failed");

    let geometry = encoded.geometry;
    let scale = geometry.scale as f64;
    let n = doc.points.len();
    assert_eq!(n, encoded.points.len());

    // k plus at most one grid step of diffused rounding per coordinate
    let k = encoded.descriptor.k.expect("encoder records k");
    assert!(k <= geometry.max_deviation());
    let bound = k + 1.5 / scale;
    for (i, &(x, y)) in doc.points.iter().enumerate() {
        let (dx, dy) = (x / scale - geometry.disc.cx, y / scale - geometry.disc.cy);
        let deviation = (dx.hypot(dy) - geometry.base_radius(arc_position(i, n))).abs();
        assert!(deviation <= bound, "Point {i} deviates {deviation} > {bound}");
    }
}
