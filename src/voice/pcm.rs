//! PCM16 conversion for the live audio stream

use base64::{engine::general_purpose::STANDARD, Engine as _};

use crate::error::{Result, StudymateError};

/// Converts float samples to 16-bit little-endian PCM
///
/// Samples are clamped to `[-1.0, 1.0]` first.
pub fn f32_to_pcm16(samples: &[f32]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        let clamped = sample.clamp(-1.0, 1.0);
        let value = if clamped < 0.0 {
            (clamped * 32768.0) as i16
        } else {
            (clamped * 32767.0) as i16
        };
        bytes.extend_from_slice(&value.to_le_bytes());
    }
    bytes
}

/// Converts 16-bit little-endian PCM to float samples
///
/// A trailing odd byte is ignored.
pub fn pcm16_to_f32(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]) as f32 / 32768.0)
        .collect()
}

/// Encodes one captured frame for the wire
pub fn encode_frame(samples: &[f32]) -> String {
    STANDARD.encode(f32_to_pcm16(samples))
}

/// Decodes a base64 PCM16 payload
pub fn decode_payload(data: &str) -> Result<Vec<f32>> {
    let bytes = STANDARD
        .decode(data.trim())
        .map_err(|e| StudymateError::Voice(format!("invalid audio payload: {}", e)))?;
    Ok(pcm16_to_f32(&bytes))
}

/// MIME type for PCM16 at `sample_rate`
pub fn pcm_mime_type(sample_rate: u32) -> String {
    format!("audio/pcm;rate={}", sample_rate)
}

/// Sample rate declared in a MIME type such as `audio/pcm;rate=24000`
pub fn rate_from_mime(mime_type: &str) -> Option<u32> {
    mime_type
        .split(';')
        .filter_map(|part| part.trim().strip_prefix("rate="))
        .find_map(|rate| rate.trim().parse().ok())
}
