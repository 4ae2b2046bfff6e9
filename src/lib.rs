//! Beacon Live - full-duplex voice sessions with a live model
//!
//! This library provides the live voice session core:
//! - Microphone capture and PCM encoding
//! - Gap-free scheduled playback of streamed audio
//! - Transcript assembly into finalized conversation turns
//! - A session controller with deterministic teardown
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                  Audio devices                       │
//! │        Microphone (16 kHz)  │  Speaker (24 kHz)      │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              LiveSessionController                   │
//! │   Capture  │  Playback  │  Transcripts  │  History   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │              Session transport                       │
//! │        Gemini Live over WebSocket                    │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod history;
pub mod session;
pub mod setup;
pub mod transcript;
pub mod transport;

pub use config::Config;
pub use error::{Error, Result};
pub use history::{ConversationEntry, ConversationHistory, HistorySink, Role};
pub use session::{Command, LiveSessionController, SessionConfig, SessionFailure, SessionState};
pub use transcript::{Direction, TranscriptAssembler};
pub use transport::{
    GeminiLiveTransport, LiveConnectConfig, ServerEvent, SessionTransport, TransportEvent,
    TransportHandle,
};
