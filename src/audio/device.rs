//! cpal-backed microphone and speaker

use std::sync::{Arc, Mutex};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleRate, Stream, StreamConfig};

use super::capture::{CaptureCallback, CaptureSpec, Microphone};
use super::codec::DecodedAudioBuffer;
use super::playback::{AudioOutput, EntryId, PlaybackNotifier};
use super::resample::{StreamResampler, downmix};
use super::AudioBackend;
use crate::{Error, Result};

/// Audio backend using the default cpal host
#[derive(Debug, Default, Clone, Copy)]
pub struct CpalBackend;

impl AudioBackend for CpalBackend {
    fn open_microphone(&self, spec: &CaptureSpec) -> Result<Box<dyn Microphone>> {
        Ok(Box::new(CpalMicrophone::open(spec.sample_rate)?))
    }

    fn open_output(
        &self,
        sample_rate: u32,
        on_finished: PlaybackNotifier,
    ) -> Result<Box<dyn AudioOutput>> {
        Ok(Box::new(CpalOutput::open(sample_rate, on_finished)?))
    }
}

/// Default input device, optionally resampled to the requested rate
pub struct CpalMicrophone {
    device: Option<Device>,
    config: StreamConfig,
    target_rate: u32,
    stream: Option<Stream>,
}

impl CpalMicrophone {
    /// Acquire the default input device
    ///
    /// # Errors
    ///
    /// Returns error if no usable input device is available
    pub fn open(target_rate: u32) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Microphone("no input device available".to_string()))?;

        let native = device
            .supported_input_configs()
            .map_err(|e| Error::Microphone(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.sample_format() == cpal::SampleFormat::F32
                    && c.min_sample_rate() <= SampleRate(target_rate)
                    && c.max_sample_rate() >= SampleRate(target_rate)
            });

        let config = match native {
            Some(supported) => supported.with_sample_rate(SampleRate(target_rate)).config(),
            None => {
                let fallback = device
                    .default_input_config()
                    .map_err(|e| Error::Microphone(e.to_string()))?;
                if fallback.sample_format() != cpal::SampleFormat::F32 {
                    return Err(Error::Microphone(format!(
                        "unsupported input sample format {:?}",
                        fallback.sample_format()
                    )));
                }
                fallback.config()
            }
        };

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            device_rate = config.sample_rate.0,
            target_rate,
            channels = config.channels,
            "microphone acquired"
        );

        Ok(Self {
            device: Some(device),
            config,
            target_rate,
            stream: None,
        })
    }
}

impl Microphone for CpalMicrophone {
    fn connect(&mut self, mut on_samples: CaptureCallback) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let device = self
            .device
            .as_ref()
            .ok_or_else(|| Error::Microphone("microphone already released".to_string()))?;

        let channels = usize::from(self.config.channels);
        let mut resampler = if self.config.sample_rate.0 == self.target_rate {
            None
        } else {
            Some(StreamResampler::new(self.config.sample_rate.0, self.target_rate)?)
        };
        let mut converted = Vec::new();

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    let mono = downmix(data, channels);
                    match resampler.as_mut() {
                        Some(resampler) => {
                            converted.clear();
                            resampler.push(&mono, &mut converted);
                            if !converted.is_empty() {
                                on_samples(&converted);
                            }
                        }
                        None => on_samples(&mono),
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Microphone(e.to_string()))?;

        stream.play().map_err(|e| Error::Microphone(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("capture node connected");
        Ok(())
    }

    fn disconnect(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("capture node disconnected");
        }
    }

    fn stop(&mut self) {
        self.disconnect();
        if self.device.take().is_some() {
            tracing::debug!("microphone released");
        }
    }
}

impl Drop for CpalMicrophone {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Buffer placed on the output timeline
struct Voice {
    id: EntryId,
    start_frame: u64,
    samples: Arc<[f32]>,
}

impl Voice {
    fn end_frame(&self) -> u64 {
        self.start_frame + self.samples.len() as u64
    }

    fn sample_at(&self, frame: u64) -> Option<f32> {
        let offset = frame.checked_sub(self.start_frame)?;
        usize::try_from(offset)
            .ok()
            .and_then(|i| self.samples.get(i).copied())
    }
}

/// Frame-accurate mixing timeline shared with the output callback
pub(crate) struct Timeline {
    sample_rate: u32,
    position: u64,
    voices: Vec<Voice>,
}

impl Timeline {
    pub(crate) const fn new(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            position: 0,
            voices: Vec::new(),
        }
    }

    #[allow(clippy::cast_precision_loss)]
    pub(crate) fn current_time(&self) -> f64 {
        self.position as f64 / f64::from(self.sample_rate)
    }

    /// Place a voice at `start_time` on the shared clock
    ///
    /// A start already behind the playhead keeps its frame; the samples that
    /// fell behind are skipped so the voice still ends where the caller
    /// expects.
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    pub(crate) fn insert(&mut self, id: EntryId, start_time: f64, samples: &[f32]) {
        let start_frame = (start_time.max(0.0) * f64::from(self.sample_rate)).round() as u64;
        if start_frame < self.position {
            tracing::trace!(
                id,
                late_frames = self.position - start_frame,
                "voice inserted behind playhead"
            );
        }
        self.voices.push(Voice {
            id,
            start_frame,
            samples: samples.into(),
        });
    }

    pub(crate) fn remove(&mut self, id: EntryId) {
        self.voices.retain(|v| v.id != id);
    }

    pub(crate) fn clear(&mut self) {
        self.voices.clear();
    }

    /// Fill interleaved `data`, returning entries whose last frame was rendered
    pub(crate) fn render(&mut self, data: &mut [f32], channels: usize) -> Vec<EntryId> {
        for frame in data.chunks_mut(channels.max(1)) {
            let position = self.position;
            let sample: f32 = self
                .voices
                .iter()
                .filter_map(|v| v.sample_at(position))
                .sum();
            frame.fill(sample.clamp(-1.0, 1.0));
            self.position += 1;
        }

        let position = self.position;
        let mut finished = Vec::new();
        self.voices.retain(|v| {
            if v.end_frame() <= position {
                finished.push(v.id);
                false
            } else {
                true
            }
        });
        finished
    }
}

/// Default output device rendering a shared timeline
pub struct CpalOutput {
    timeline: Arc<Mutex<Timeline>>,
    stream: Option<Stream>,
}

impl CpalOutput {
    /// Open the default output device at `sample_rate`
    ///
    /// # Errors
    ///
    /// Returns error if no output device supports the rate
    pub fn open(sample_rate: u32, on_finished: PlaybackNotifier) -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Audio("no output device available".to_string()))?;

        let supports = |c: &cpal::SupportedStreamConfigRange, channels: u16| {
            c.channels() == channels
                && c.sample_format() == cpal::SampleFormat::F32
                && c.min_sample_rate() <= SampleRate(sample_rate)
                && c.max_sample_rate() >= SampleRate(sample_rate)
        };

        let supported_config = device
            .supported_output_configs()
            .map_err(|e| Error::Audio(e.to_string()))?
            .find(|c| supports(c, 1))
            .or_else(|| {
                // Fallback: try stereo
                device
                    .supported_output_configs()
                    .ok()?
                    .find(|c| supports(c, 2))
            })
            .ok_or_else(|| Error::Audio("no suitable output config found".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(sample_rate))
            .config();
        let channels = usize::from(config.channels);

        let timeline = Arc::new(Mutex::new(Timeline::new(sample_rate)));
        let render_timeline = Arc::clone(&timeline);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let finished = match render_timeline.lock() {
                        Ok(mut timeline) => timeline.render(data, channels),
                        Err(_) => {
                            data.fill(0.0);
                            return;
                        }
                    };
                    for id in finished {
                        on_finished(id);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate,
            channels,
            "audio output opened"
        );

        Ok(Self {
            timeline,
            stream: Some(stream),
        })
    }
}

impl AudioOutput for CpalOutput {
    fn current_time(&self) -> f64 {
        self.timeline
            .lock()
            .map(|t| t.current_time())
            .unwrap_or_default()
    }

    fn schedule(&mut self, id: EntryId, start_time: f64, buffer: &DecodedAudioBuffer) -> Result<()> {
        if self.stream.is_none() {
            return Err(Error::Audio("audio output closed".to_string()));
        }

        self.timeline
            .lock()
            .map_err(|_| Error::Audio("playback timeline poisoned".to_string()))?
            .insert(id, start_time, buffer.samples());
        Ok(())
    }

    fn cancel(&mut self, id: EntryId) {
        if let Ok(mut timeline) = self.timeline.lock() {
            timeline.remove(id);
        }
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            if let Ok(mut timeline) = self.timeline.lock() {
                timeline.clear();
            }
            tracing::debug!("audio output closed");
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.close();
    }
}
