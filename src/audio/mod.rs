//! Audio processing module
//!
//! Handles microphone capture and encoding, the PCM wire codec, and
//! scheduled playback of streamed responses.

mod capture;
mod codec;
mod device;
mod playback;
mod resample;

pub use capture::{
    CaptureCallback, CaptureEncoder, CaptureSpec, FrameAssembler, Microphone, samples_to_wav,
};
pub use codec::{
    DecodedAudioBuffer, EncodedAudioBlob, FRAME_SIZE, INPUT_MIME_TYPE, INPUT_SAMPLE_RATE,
    OUTPUT_SAMPLE_RATE, decode_payload, decode_pcm, encode_frame, sample_to_pcm,
};
pub use device::{CpalBackend, CpalMicrophone, CpalOutput};
pub use playback::{AudioOutput, EntryId, PlaybackEntry, PlaybackNotifier, PlaybackScheduler};
pub use resample::{StreamResampler, downmix};

use crate::Result;

/// Source of microphone and speaker contexts for a session
pub trait AudioBackend {
    /// Acquire the microphone
    ///
    /// # Errors
    ///
    /// Returns error if the microphone is missing or access is refused
    fn open_microphone(&self, spec: &CaptureSpec) -> Result<Box<dyn Microphone>>;

    /// Open an output context at `sample_rate`
    ///
    /// `on_finished` is called from the audio thread whenever a scheduled
    /// entry has played to its end.
    ///
    /// # Errors
    ///
    /// Returns error if no output device can be opened
    fn open_output(
        &self,
        sample_rate: u32,
        on_finished: PlaybackNotifier,
    ) -> Result<Box<dyn AudioOutput>>;
}
