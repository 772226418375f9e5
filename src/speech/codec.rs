//! Audio codec helpers
//!
//! Wraps float PCM from the local model into a 16-bit mono WAV container and
//! unpacks `data:` URLs returned by hosted backends.

use crate::{Result, VoxError};
use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use std::io::Cursor;

/// Size of a canonical PCM WAV header
pub const WAV_HEADER_LEN: usize = 44;

/// Encode float samples (-1.0..=1.0) as a mono 16-bit PCM WAV file.
///
/// Out-of-range samples are clipped. The result is always
/// `44 + 2 * samples.len()` bytes long.
pub fn float_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    if sample_rate == 0 {
        return Err(VoxError::Codec("Sample rate must be positive".to_string()));
    }

    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut wav = Vec::with_capacity(WAV_HEADER_LEN + samples.len() * 2);
    {
        let mut writer = hound::WavWriter::new(Cursor::new(&mut wav), spec)?;
        for &sample in samples {
            writer.write_sample(float_to_i16(sample))?;
        }
        writer.finalize()?;
    }

    Ok(wav)
}

/// Scale a float sample to i16, asymmetric so -1.0 maps to i16::MIN
fn float_to_i16(sample: f32) -> i16 {
    let s = sample.clamp(-1.0, 1.0);
    if s < 0.0 {
        (s * 32768.0) as i16
    } else {
        (s * 32767.0) as i16
    }
}

/// Decode the base64 body of a `data:` URL into raw bytes
pub fn decode_data_url(url: &str) -> Result<Vec<u8>> {
    if !url.starts_with("data:") {
        return Err(VoxError::Codec("Not a data URL".to_string()));
    }

    let (_, encoded) = url
        .split_once(',')
        .ok_or_else(|| VoxError::Codec("Data URL has no payload".to_string()))?;

    STANDARD
        .decode(encoded.trim())
        .map_err(|e| VoxError::Codec(format!("Invalid base64 payload: {}", e)))
}

/// Build a base64 `data:` URL for the given bytes
pub fn encode_data_url(bytes: &[u8], mime: &str) -> String {
    format!("data:{};base64,{}", mime, STANDARD.encode(bytes))
}
