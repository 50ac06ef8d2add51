//! Decoding of synthesis payloads into playable audio.
//!
//! The speech service returns raw little-endian 16-bit PCM wrapped in base64.
//! Decoding happens in two steps: base64 text into bytes, then bytes into
//! normalized, deinterleaved `f32` channels.

use base64::{
    alphabet,
    engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig},
    Engine as _,
};
use byteorder::{ByteOrder, LittleEndian};
use std::time::Duration;

/// Standard alphabet, accepting payloads with or without trailing padding.
const PAYLOAD_ENGINE: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

const BYTES_PER_SAMPLE: usize = 2;

#[derive(Clone, Debug, PartialEq, thiserror::Error)]
pub enum DecodeError {
    #[error("Invalid base64 audio payload: {0}")]
    InvalidBase64(String),

    #[error("Audio payload is empty")]
    EmptyBuffer,

    #[error("Audio must have at least one channel")]
    NoChannels,
}

/// Decoded audio ready to be handed to an output.
#[derive(Clone, Debug, PartialEq)]
pub struct AudioAsset {
    channels: Vec<Vec<f32>>,
    sample_rate: u32,
}

impl AudioAsset {
    pub fn new(channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        Self {
            channels,
            sample_rate,
        }
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    /// Samples of a single channel
    pub fn channel(&self, index: usize) -> Option<&[f32]> {
        self.channels.get(index).map(|c| c.as_slice())
    }

    /// Number of sample frames (samples per channel)
    pub fn frames(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or_default()
    }

    pub fn duration(&self) -> Duration {
        if self.sample_rate == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.frames() as f64 / self.sample_rate as f64)
    }

    /// Samples in frame order, channels interleaved
    pub fn interleaved(&self) -> Vec<f32> {
        let mut samples = Vec::with_capacity(self.frames() * self.channels.len());
        for frame in 0..self.frames() {
            for channel in &self.channels {
                samples.push(channel[frame]);
            }
        }
        samples
    }
}

pub fn decode(payload: &str) -> Result<Vec<u8>, DecodeError> {
    PAYLOAD_ENGINE
        .decode(payload.trim())
        .map_err(|e| DecodeError::InvalidBase64(e.to_string()))
}

/// Converts raw 16-bit PCM into an [`AudioAsset`].
///
/// Trailing bytes that do not make up a whole frame are dropped.
pub fn to_playable_asset(
    bytes: &[u8],
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioAsset, DecodeError> {
    if bytes.is_empty() {
        return Err(DecodeError::EmptyBuffer);
    }
    if channel_count == 0 {
        return Err(DecodeError::NoChannels);
    }

    let channel_count = channel_count as usize;
    let total_samples = bytes.len() / BYTES_PER_SAMPLE;
    let frames = total_samples / channel_count;

    let mut channels = vec![Vec::with_capacity(frames); channel_count];
    for frame in 0..frames {
        for (channel_index, channel) in channels.iter_mut().enumerate() {
            let offset = (frame * channel_count + channel_index) * BYTES_PER_SAMPLE;
            let sample = LittleEndian::read_i16(&bytes[offset..offset + BYTES_PER_SAMPLE]);
            channel.push(sample as f32 / 32768.0);
        }
    }

    Ok(AudioAsset::new(channels, sample_rate))
}

/// Decodes a base64 synthesis payload straight into an [`AudioAsset`].
pub fn decode_payload(
    payload: &str,
    sample_rate: u32,
    channel_count: u16,
) -> Result<AudioAsset, DecodeError> {
    let bytes = decode(payload)?;
    to_playable_asset(&bytes, sample_rate, channel_count)
}
