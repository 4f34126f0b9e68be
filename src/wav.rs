//! WAV export of decoded audio (16-bit PCM).

use crate::codec::DecodedAudio;
use crate::playback::{PlaybackBuffers, enforce_rate_floor};

/// Render decoded audio to WAV bytes. Mono grooves give a one-channel file,
/// stereo grooves an interleaved two-channel file. Audio recorded below the
/// playback floor is upsampled first so every player accepts the file.
pub fn decoded_to_wav(audio: &DecodedAudio) -> Vec<u8> {
    let buffers = enforce_rate_floor(PlaybackBuffers {
        left: audio.left.clone(),
        right: audio.right.clone(),
        sample_rate: audio.sample_rate,
    });
    let pcm = interleave_pcm(&buffers.left, buffers.right.as_deref());
    let channels = if buffers.right.is_some() { 2 } else { 1 };
    encode_wav(&pcm, buffers.sample_rate, channels)
}

/// Convert float channels to interleaved i16 PCM. A shorter right channel
/// is padded with silence.
pub fn interleave_pcm(left: &[f32], right: Option<&[f32]>) -> Vec<i16> {
    let to_i16 = |s: f32| (s as f64 * 32767.0).round().clamp(-32768.0, 32767.0) as i16;
    match right {
        None => left.iter().map(|&s| to_i16(s)).collect(),
        Some(right) => {
            let mut pcm = Vec::with_capacity(left.len() * 2);
            for (i, &l) in left.iter().enumerate() {
                pcm.push(to_i16(l));
                pcm.push(to_i16(right.get(i).copied().unwrap_or(0.0)));
            }
            pcm
        }
    }
}

/// Encode interleaved i16 PCM samples to a WAV byte buffer.
pub fn encode_wav(samples: &[i16], sample_rate: u32, channels: u16) -> Vec<u8> {
    let bits_per_sample: u16 = 16;
    let byte_rate = sample_rate * channels as u32 * (bits_per_sample as u32 / 8);
    let block_align = channels * (bits_per_sample / 8);
    let data_size = (samples.len() * 2) as u32;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(44 + data_size as usize);

    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");

    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&channels.to_le_bytes());
    buf.extend_from_slice(&sample_rate.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&bits_per_sample.to_le_bytes());

    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for &sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }

    buf
}
