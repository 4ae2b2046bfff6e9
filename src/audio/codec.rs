//! Linear PCM wire codec
//!
//! Outbound audio is 16-bit little-endian PCM at 16 kHz, base64 encoded.
//! Inbound audio is the same sample format at 24 kHz.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;

use crate::{Error, Result};

/// Sample rate of microphone audio sent to the service
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of audio received from the service
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Samples per captured frame
pub const FRAME_SIZE: usize = 4096;

/// MIME descriptor attached to every outbound blob
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";

/// Scale between normalized floats and 16-bit PCM
const PCM_SCALE: f32 = 32768.0;

/// Base64 PCM payload ready for the transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncodedAudioBlob {
    /// Base64 of little-endian i16 samples
    pub data: String,

    /// Always [`INPUT_MIME_TYPE`]
    pub mime_type: String,
}

/// Received audio converted to normalized floats
#[derive(Debug, Clone, PartialEq)]
pub struct DecodedAudioBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl DecodedAudioBuffer {
    /// Wrap normalized samples recorded at `sample_rate`
    #[must_use]
    pub const fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self {
            samples,
            sample_rate,
        }
    }

    /// Normalized samples in [-1, 1]
    #[must_use]
    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    /// Number of samples
    #[must_use]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    /// Whether the buffer holds no audio
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Sample rate of the buffer
    #[must_use]
    pub const fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Playback length in seconds
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn duration(&self) -> f64 {
        self.samples.len() as f64 / f64::from(self.sample_rate)
    }
}

/// Convert one normalized sample to 16-bit PCM
///
/// Out-of-range input saturates at the i16 bounds; there is no explicit clamp.
#[must_use]
#[allow(clippy::cast_possible_truncation)]
pub fn sample_to_pcm(sample: f32) -> i16 {
    (sample * PCM_SCALE).round() as i16
}

/// Encode a frame of normalized samples into an outbound blob
#[must_use]
pub fn encode_frame(samples: &[f32]) -> EncodedAudioBlob {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        bytes.extend_from_slice(&sample_to_pcm(sample).to_le_bytes());
    }

    EncodedAudioBlob {
        data: STANDARD.encode(bytes),
        mime_type: INPUT_MIME_TYPE.to_string(),
    }
}

/// Decode base64 little-endian PCM into raw i16 samples
///
/// # Errors
///
/// Returns error if the payload is not valid base64 or has an odd byte count
pub fn decode_pcm(payload: &str) -> Result<Vec<i16>> {
    let bytes = STANDARD.decode(payload.trim())?;
    if bytes.len() % 2 != 0 {
        return Err(Error::Codec(format!(
            "pcm payload has odd length {}",
            bytes.len()
        )));
    }

    Ok(bytes
        .chunks_exact(2)
        .map(|pair| i16::from_le_bytes([pair[0], pair[1]]))
        .collect())
}

/// Decode an inbound base64 payload into a playable buffer
///
/// # Errors
///
/// Returns error if the payload cannot be decoded
pub fn decode_payload(payload: &str, sample_rate: u32) -> Result<DecodedAudioBuffer> {
    let samples = decode_pcm(payload)?
        .into_iter()
        .map(|s| f32::from(s) / PCM_SCALE)
        .collect();

    Ok(DecodedAudioBuffer::new(samples, sample_rate))
}
