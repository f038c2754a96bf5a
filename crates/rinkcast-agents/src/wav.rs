//! PCM WAV encoding and header inspection.
//!
//! The broadcast audio format is fixed for v1: 24 kHz, 16-bit PCM, mono.
//! This module writes conforming headers around raw samples and inspects
//! collaborator output for conformance.

use thiserror::Error;

/// Broadcast sample rate.
pub const SAMPLE_RATE: u32 = 24_000;
/// Broadcast sample width.
pub const BITS_PER_SAMPLE: u16 = 16;
/// Broadcast channel count.
pub const CHANNELS: u16 = 1;

/// WAV header parse errors.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WavError {
    /// Too short or missing RIFF/WAVE magic.
    #[error("not a RIFF/WAVE file")]
    NotWav,
    /// The fmt chunk is missing or malformed.
    #[error("missing or malformed fmt chunk")]
    BadFormat,
    /// The data chunk is missing.
    #[error("missing data chunk")]
    NoData,
}

/// Decoded WAV format description.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct WavInfo {
    /// Samples per second.
    pub sample_rate: u32,
    /// Channel count.
    pub channels: u16,
    /// Bits per sample.
    pub bits_per_sample: u16,
    /// Payload byte length.
    pub data_len: u32,
}

impl WavInfo {
    /// Playback duration in seconds.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration_seconds(&self) -> f32 {
        let bytes_per_second =
            self.sample_rate * u32::from(self.channels) * u32::from(self.bits_per_sample) / 8;
        if bytes_per_second == 0 {
            return 0.0;
        }
        self.data_len as f32 / bytes_per_second as f32
    }

    /// Whether this matches the fixed broadcast format.
    #[must_use]
    pub fn is_broadcast_format(&self) -> bool {
        self.sample_rate == SAMPLE_RATE
            && self.channels == CHANNELS
            && self.bits_per_sample == BITS_PER_SAMPLE
    }
}

/// Wrap raw 16-bit mono samples in a 24 kHz WAV container.
#[must_use]
pub fn encode_pcm16(samples: &[i16]) -> Vec<u8> {
    let data_size = u32::try_from(samples.len() * 2).unwrap_or(u32::MAX);
    let byte_rate = SAMPLE_RATE * u32::from(CHANNELS) * u32::from(BITS_PER_SAMPLE) / 8;
    let block_align = CHANNELS * BITS_PER_SAMPLE / 8;
    let file_size = 36 + data_size;

    let mut buf = Vec::with_capacity(file_size as usize + 8);
    buf.extend_from_slice(b"RIFF");
    buf.extend_from_slice(&file_size.to_le_bytes());
    buf.extend_from_slice(b"WAVE");
    buf.extend_from_slice(b"fmt ");
    buf.extend_from_slice(&16u32.to_le_bytes());
    buf.extend_from_slice(&1u16.to_le_bytes()); // PCM
    buf.extend_from_slice(&CHANNELS.to_le_bytes());
    buf.extend_from_slice(&SAMPLE_RATE.to_le_bytes());
    buf.extend_from_slice(&byte_rate.to_le_bytes());
    buf.extend_from_slice(&block_align.to_le_bytes());
    buf.extend_from_slice(&BITS_PER_SAMPLE.to_le_bytes());
    buf.extend_from_slice(b"data");
    buf.extend_from_slice(&data_size.to_le_bytes());
    for sample in samples {
        buf.extend_from_slice(&sample.to_le_bytes());
    }
    buf
}

/// A silent broadcast-format WAV of the given duration.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
pub fn silence(duration_seconds: f32) -> Vec<u8> {
    let count = (duration_seconds.max(0.0) * SAMPLE_RATE as f32) as usize;
    encode_pcm16(&vec![0i16; count])
}

/// A quiet sine tone of the given duration, used by the stub synthesizer so
/// rendered segments are audibly distinct from silence.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
pub fn tone(duration_seconds: f32, frequency_hz: f32) -> Vec<u8> {
    let count = (duration_seconds.max(0.0) * SAMPLE_RATE as f32) as usize;
    let samples: Vec<i16> = (0..count)
        .map(|i| {
            let t = i as f32 / SAMPLE_RATE as f32;
            let value = (t * frequency_hz * std::f32::consts::TAU).sin();
            (value * 6000.0) as i16
        })
        .collect();
    encode_pcm16(&samples)
}

/// Inspect a WAV byte buffer: verify magic, walk chunks, return the format.
pub fn inspect(bytes: &[u8]) -> Result<WavInfo, WavError> {
    if bytes.len() < 12 || &bytes[0..4] != b"RIFF" || &bytes[8..12] != b"WAVE" {
        return Err(WavError::NotWav);
    }

    let mut sample_rate = None;
    let mut channels = None;
    let mut bits = None;
    let mut data_len = None;

    let mut pos = 12usize;
    while pos + 8 <= bytes.len() {
        let chunk_id = &bytes[pos..pos + 4];
        let chunk_size = u32::from_le_bytes([
            bytes[pos + 4],
            bytes[pos + 5],
            bytes[pos + 6],
            bytes[pos + 7],
        ]) as usize;
        let body = pos + 8;

        match chunk_id {
            b"fmt " => {
                if chunk_size < 16 || body + 16 > bytes.len() {
                    return Err(WavError::BadFormat);
                }
                channels = Some(u16::from_le_bytes([bytes[body + 2], bytes[body + 3]]));
                sample_rate = Some(u32::from_le_bytes([
                    bytes[body + 4],
                    bytes[body + 5],
                    bytes[body + 6],
                    bytes[body + 7],
                ]));
                bits = Some(u16::from_le_bytes([bytes[body + 14], bytes[body + 15]]));
            }
            b"data" => {
                data_len = Some(u32::try_from(chunk_size).unwrap_or(u32::MAX));
            }
            _ => {}
        }

        // Chunks are word-aligned.
        pos = body + chunk_size + (chunk_size % 2);
    }

    let (Some(sample_rate), Some(channels), Some(bits)) = (sample_rate, channels, bits) else {
        return Err(WavError::BadFormat);
    };
    let Some(data_len) = data_len else {
        return Err(WavError::NoData);
    };

    Ok(WavInfo {
        sample_rate,
        channels,
        bits_per_sample: bits,
        data_len,
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
