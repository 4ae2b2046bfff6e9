//! Streaming sample-rate conversion for capture devices without native 16 kHz

use rubato::{FftFixedIn, Resampler};

use crate::{Error, Result};

/// Input chunk fed to the FFT resampler
const CHUNK_SIZE: usize = 1024;

/// Mono resampler accepting arbitrary block sizes
pub struct StreamResampler {
    inner: FftFixedIn<f32>,
    pending: Vec<f32>,
}

impl StreamResampler {
    /// Create a resampler from `from_rate` to `to_rate`
    ///
    /// # Errors
    ///
    /// Returns error if the rates are not supported
    pub fn new(from_rate: u32, to_rate: u32) -> Result<Self> {
        let inner = FftFixedIn::<f32>::new(from_rate as usize, to_rate as usize, CHUNK_SIZE, 2, 1)
            .map_err(|e| Error::Audio(format!("resampler setup failed: {e}")))?;

        Ok(Self {
            inner,
            pending: Vec::with_capacity(CHUNK_SIZE * 2),
        })
    }

    /// Push input samples, appending any converted output to `out`
    pub fn push(&mut self, samples: &[f32], out: &mut Vec<f32>) {
        self.pending.extend_from_slice(samples);

        loop {
            let needed = self.inner.input_frames_next();
            if self.pending.len() < needed {
                break;
            }

            let chunk: Vec<f32> = self.pending.drain(..needed).collect();
            match self.inner.process(&[chunk], None) {
                Ok(mut channels) => {
                    if let Some(mono) = channels.pop() {
                        out.extend(mono);
                    }
                }
                Err(e) => {
                    tracing::warn!(error = %e, "resampling failed, dropping chunk");
                }
            }
        }
    }
}

/// Average interleaved frames down to mono
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn downmix(data: &[f32], channels: usize) -> Vec<f32> {
    if channels <= 1 {
        return data.to_vec();
    }

    data.chunks(channels)
        .map(|frame| frame.iter().sum::<f32>() / frame.len() as f32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downmix_averages_channels() {
        assert_eq!(downmix(&[1.0, 0.0, 0.5, 0.5], 2), vec![0.5, 0.5]);
        assert_eq!(downmix(&[0.1, 0.2], 1), vec![0.1, 0.2]);
    }

    #[test]
    fn resampler_reduces_rate() {
        let mut resampler = StreamResampler::new(48_000, 16_000).unwrap();
        let mut out = Vec::new();

        for _ in 0..48 {
            resampler.push(&[0.0; 1000], &mut out);
        }

        // One second in, roughly a third of the samples out, minus buffered tail
        assert!(out.len() > 14_000 && out.len() <= 16_000, "got {}", out.len());
    }
}
