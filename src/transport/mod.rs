//! Streaming session transport
//!
//! The controller talks to the remote service only through [`SessionTransport`]
//! and the [`TransportHandle`] it returns. Callbacks from the service arrive as
//! [`TransportEvent`]s on a channel handed to `connect`.

mod websocket;
pub mod wire;

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;

pub use websocket::{DEFAULT_ENDPOINT, GeminiLiveTransport};

use crate::Result;
use crate::audio::EncodedAudioBlob;

/// Response modality requested from the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Modality {
    /// Streamed speech
    Audio,
}

impl Modality {
    /// Wire name of the modality
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Audio => "AUDIO",
        }
    }
}

/// Parameters for opening a live session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LiveConnectConfig {
    /// Model identifier (without the `models/` prefix)
    pub model: String,

    /// Requested response modality
    pub response_modality: Modality,

    /// Ask the service to transcribe user speech
    pub input_transcription: bool,

    /// Ask the service to transcribe model speech
    pub output_transcription: bool,

    /// System instruction text
    pub system_instruction: String,

    /// Prebuilt voice name, service default when `None`
    pub voice: Option<String>,
}

impl LiveConnectConfig {
    /// Audio session with both transcription directions enabled
    #[must_use]
    pub fn voice(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            model: model.into(),
            response_modality: Modality::Audio,
            input_transcription: true,
            output_transcription: true,
            system_instruction: system_instruction.into(),
            voice: None,
        }
    }
}

/// Content pushed by the service during a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ServerEvent {
    /// Latest transcription snapshot of user speech
    InputTranscript(String),
    /// Latest transcription snapshot of model speech
    OutputTranscript(String),
    /// The model finished its turn
    TurnComplete,
    /// The model turn was cut off (barge-in)
    Interrupted,
    /// Base64 PCM audio at 24 kHz
    AudioChunk(String),
}

/// Lifecycle and content events delivered by a transport
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    /// Session is open and ready for realtime input
    Open,
    /// Server content
    Server(ServerEvent),
    /// Transport failed mid-session
    Error(String),
    /// Transport closed
    Closed {
        /// Close reason reported by the remote end, if any
        reason: Option<String>,
    },
}

/// An open session with the remote service
pub trait TransportHandle: Send + Sync {
    /// Queue audio for the service without waiting for delivery
    ///
    /// # Errors
    ///
    /// Returns error if the session is no longer accepting input
    fn send_realtime_input(&self, blob: EncodedAudioBlob) -> Result<()>;

    /// Terminate the session; calling more than once is a no-op
    fn close(&self);
}

/// Factory for live sessions
#[async_trait]
pub trait SessionTransport: Send + Sync {
    /// Open a session, delivering its events on `events`
    ///
    /// # Errors
    ///
    /// Returns error if the session cannot be established
    async fn connect(
        &self,
        config: &LiveConnectConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>>;
}
