//! Configuration management for Beacon Live

pub mod file;

use std::path::Path;
use std::time::Duration;

use secrecy::SecretString;

use crate::audio::{CaptureSpec, FRAME_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::session::SessionConfig;
use crate::transport::{DEFAULT_ENDPOINT, LiveConnectConfig};
use crate::{Error, Result};

use self::file::LiveConfigFile;

/// Default live model
pub const DEFAULT_MODEL: &str = "gemini-2.5-flash-native-audio-preview-09-2025";

/// Default system instruction
pub const DEFAULT_SYSTEM_INSTRUCTION: &str =
    "You are a friendly voice assistant. Keep answers short and conversational.";

/// Default time allowed for a session to open
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);

/// Beacon Live configuration
#[derive(Debug)]
pub struct Config {
    /// Gemini API key
    pub api_key: Option<SecretString>,

    /// WebSocket endpoint of the live API
    pub endpoint: String,

    /// Model identifier
    pub model: String,

    /// System instruction sent with every session
    pub system_instruction: String,

    /// Prebuilt voice name
    pub voice: Option<String>,

    /// Audio configuration
    pub audio: AudioConfig,

    /// Time allowed for a session to open
    pub connect_timeout: Duration,
}

/// Audio format configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioConfig {
    /// Microphone rate sent to the service
    pub input_sample_rate: u32,

    /// Rate of audio received from the service
    pub output_sample_rate: u32,

    /// Samples per captured frame
    pub frame_size: usize,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: INPUT_SAMPLE_RATE,
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            frame_size: FRAME_SIZE,
        }
    }
}

impl Config {
    /// Load configuration (env > toml > default)
    #[must_use]
    pub fn load() -> Self {
        let fc = file::load_config_file();
        Self::resolve(fc, |key| std::env::var(key).ok())
    }

    /// Load configuration from an explicit file, still honoring env overrides
    ///
    /// # Errors
    ///
    /// Returns error if the file cannot be read or parsed
    pub fn from_file(path: &Path) -> Result<Self> {
        let fc = file::read_config_file(path)?;
        Ok(Self::resolve(fc, |key| std::env::var(key).ok()))
    }

    /// Merge a config file with values from `env`
    #[must_use]
    pub fn resolve(fc: LiveConfigFile, env: impl Fn(&str) -> Option<String>) -> Self {
        let api_key = env("GEMINI_API_KEY")
            .or_else(|| env("GOOGLE_API_KEY"))
            .or(fc.api_key)
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::from);

        let endpoint = env("BEACON_LIVE_ENDPOINT")
            .or(fc.session.endpoint)
            .unwrap_or_else(|| DEFAULT_ENDPOINT.to_string());

        let model = env("BEACON_LIVE_MODEL")
            .or(fc.session.model)
            .unwrap_or_else(|| DEFAULT_MODEL.to_string());

        let system_instruction = env("BEACON_LIVE_SYSTEM_INSTRUCTION")
            .or(fc.session.system_instruction)
            .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string());

        let voice = env("BEACON_LIVE_VOICE")
            .or(fc.session.voice)
            .filter(|v| !v.is_empty());

        let connect_timeout = env("BEACON_LIVE_CONNECT_TIMEOUT")
            .and_then(|s| s.parse().ok())
            .or(fc.session.connect_timeout_secs)
            .map_or(DEFAULT_CONNECT_TIMEOUT, Duration::from_secs);

        let audio = AudioConfig {
            frame_size: fc
                .audio
                .frame_size
                .filter(|&n| n > 0)
                .unwrap_or(FRAME_SIZE),
            ..AudioConfig::default()
        };

        Self {
            api_key,
            endpoint,
            model,
            system_instruction,
            voice,
            audio,
            connect_timeout,
        }
    }

    /// API key, required to open a session
    ///
    /// # Errors
    ///
    /// Returns error if no key is configured
    pub fn require_api_key(&self) -> Result<&SecretString> {
        self.api_key.as_ref().ok_or_else(|| {
            Error::Config(
                "no API key configured; set GEMINI_API_KEY or run `beacon-live setup`".to_string(),
            )
        })
    }

    /// Connect parameters for the live transport
    #[must_use]
    pub fn connect_config(&self) -> LiveConnectConfig {
        LiveConnectConfig {
            voice: self.voice.clone(),
            ..LiveConnectConfig::voice(&self.model, &self.system_instruction)
        }
    }

    /// Session controller configuration
    #[must_use]
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            connect: self.connect_config(),
            capture: CaptureSpec {
                sample_rate: self.audio.input_sample_rate,
                frame_size: self.audio.frame_size,
            },
            output_sample_rate: self.audio.output_sample_rate,
            connect_timeout: self.connect_timeout,
        }
    }
}
