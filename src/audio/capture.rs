//! Microphone capture and outbound encoding

use std::sync::Arc;

use super::codec::{self, FRAME_SIZE, INPUT_SAMPLE_RATE};
use crate::Result;
use crate::transport::TransportHandle;

/// Callback invoked from the audio thread with captured mono samples
pub type CaptureCallback = Box<dyn FnMut(&[f32]) + Send + 'static>;

/// Requested capture format
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSpec {
    /// Sample rate delivered to the callback
    pub sample_rate: u32,

    /// Samples per frame sent to the service
    pub frame_size: usize,
}

impl Default for CaptureSpec {
    fn default() -> Self {
        Self {
            sample_rate: INPUT_SAMPLE_RATE,
            frame_size: FRAME_SIZE,
        }
    }
}

/// An acquired microphone
///
/// Holding the value keeps the device claimed. `connect` attaches the capture
/// node that feeds samples to the callback.
pub trait Microphone {
    /// Start delivering samples to `on_samples`
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be built or started
    fn connect(&mut self, on_samples: CaptureCallback) -> Result<()>;

    /// Detach the capture node; the microphone stays acquired
    fn disconnect(&mut self);

    /// Release the device
    fn stop(&mut self);
}

/// Re-chunks arbitrary blocks into fixed-size frames
#[derive(Debug)]
pub struct FrameAssembler {
    frame_size: usize,
    pending: Vec<f32>,
}

impl FrameAssembler {
    /// Create an assembler producing frames of `frame_size` samples
    #[must_use]
    pub fn new(frame_size: usize) -> Self {
        let frame_size = frame_size.max(1);
        Self {
            frame_size,
            pending: Vec::with_capacity(frame_size),
        }
    }

    /// Append samples and call `on_frame` for every completed frame
    pub fn push(&mut self, mut samples: &[f32], mut on_frame: impl FnMut(&[f32])) {
        while !samples.is_empty() {
            let missing = self.frame_size - self.pending.len();
            let take = missing.min(samples.len());
            self.pending.extend_from_slice(&samples[..take]);
            samples = &samples[take..];

            if self.pending.len() == self.frame_size {
                on_frame(&self.pending);
                self.pending.clear();
            }
        }
    }

    /// Samples waiting for the next frame
    #[must_use]
    pub fn pending(&self) -> usize {
        self.pending.len()
    }
}

/// Encodes captured frames and dispatches them to the transport
///
/// Runs inside the capture callback, so it never blocks and never stops on a
/// failed send.
pub struct CaptureEncoder {
    assembler: FrameAssembler,
    transport: Arc<dyn TransportHandle>,
    frames_sent: u64,
    send_failures: u64,
}

impl CaptureEncoder {
    /// Create an encoder sending to `transport`
    #[must_use]
    pub fn new(spec: CaptureSpec, transport: Arc<dyn TransportHandle>) -> Self {
        Self {
            assembler: FrameAssembler::new(spec.frame_size),
            transport,
            frames_sent: 0,
            send_failures: 0,
        }
    }

    /// Feed captured samples
    pub fn process(&mut self, samples: &[f32]) {
        let transport = &self.transport;
        let frames_sent = &mut self.frames_sent;
        let send_failures = &mut self.send_failures;

        self.assembler.push(samples, |frame| {
            let blob = codec::encode_frame(frame);
            match transport.send_realtime_input(blob) {
                Ok(()) => {
                    *frames_sent += 1;
                    tracing::trace!(frame = *frames_sent, "audio frame sent");
                }
                Err(e) => {
                    *send_failures += 1;
                    // Only the first failure and every 100th after it are logged
                    if *send_failures % 100 == 1 {
                        tracing::warn!(
                            error = %e,
                            failures = *send_failures,
                            "failed to send audio frame"
                        );
                    }
                }
            }
        });
    }

    /// Frames accepted by the transport
    #[must_use]
    pub const fn frames_sent(&self) -> u64 {
        self.frames_sent
    }

    /// Frames the transport rejected
    #[must_use]
    pub const fn send_failures(&self) -> u64 {
        self.send_failures
    }

    /// Turn the encoder into a capture callback
    #[must_use]
    pub fn into_callback(mut self) -> CaptureCallback {
        Box::new(move |samples| self.process(samples))
    }
}

/// Convert f32 samples to WAV bytes
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let map_err = |e: hound::Error| crate::Error::Audio(e.to_string());
    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec).map_err(map_err)?;
        for &sample in samples {
            writer.write_sample(codec::sample_to_pcm(sample)).map_err(map_err)?;
        }
        writer.finalize().map_err(map_err)?;
    }

    Ok(cursor.into_inner())
}
