//! JSON messages of the Gemini Live `BidiGenerateContent` protocol

use serde::{Deserialize, Serialize};

use super::{LiveConnectConfig, ServerEvent};
use crate::audio::EncodedAudioBlob;

/// First message on a new connection
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupMessage {
    pub setup: Setup,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Setup {
    pub model: String,
    pub generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_audio_transcription: Option<Empty>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_audio_transcription: Option<Empty>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub response_modalities: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speech_config: Option<SpeechConfig>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

#[derive(Debug, Serialize)]
pub struct Content {
    pub parts: Vec<TextPart>,
}

#[derive(Debug, Serialize)]
pub struct TextPart {
    pub text: String,
}

/// Serializes as `{}`
#[derive(Debug, Default, Serialize)]
pub struct Empty {}

impl SetupMessage {
    /// Build the setup message for `config`
    #[must_use]
    pub fn new(config: &LiveConnectConfig) -> Self {
        let model = if config.model.starts_with("models/") {
            config.model.clone()
        } else {
            format!("models/{}", config.model)
        };

        let system_instruction = (!config.system_instruction.is_empty()).then(|| Content {
            parts: vec![TextPart {
                text: config.system_instruction.clone(),
            }],
        });

        let speech_config = config.voice.as_ref().map(|name| SpeechConfig {
            voice_config: VoiceConfig {
                prebuilt_voice_config: PrebuiltVoiceConfig {
                    voice_name: name.clone(),
                },
            },
        });

        Self {
            setup: Setup {
                model,
                generation_config: GenerationConfig {
                    response_modalities: vec![config.response_modality.as_str().to_string()],
                    speech_config,
                },
                system_instruction,
                input_audio_transcription: config.input_transcription.then(Empty::default),
                output_audio_transcription: config.output_transcription.then(Empty::default),
            },
        }
    }
}

/// Streamed microphone audio
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
pub struct RealtimeInput {
    pub audio: Blob,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Blob {
    pub data: String,
    pub mime_type: String,
}

impl From<EncodedAudioBlob> for RealtimeInputMessage {
    fn from(blob: EncodedAudioBlob) -> Self {
        Self {
            realtime_input: RealtimeInput {
                audio: Blob {
                    data: blob.data,
                    mime_type: blob.mime_type,
                },
            },
        }
    }
}

/// Any message the service may send
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerMessage {
    #[serde(default)]
    pub setup_complete: Option<serde_json::Value>,
    #[serde(default)]
    pub server_content: Option<ServerContent>,
    #[serde(default)]
    pub go_away: Option<GoAway>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerContent {
    #[serde(default)]
    pub model_turn: Option<ModelTurn>,
    #[serde(default)]
    pub turn_complete: bool,
    #[serde(default)]
    pub interrupted: bool,
    #[serde(default)]
    pub input_transcription: Option<Transcription>,
    #[serde(default)]
    pub output_transcription: Option<Transcription>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ModelTurn {
    #[serde(default)]
    pub parts: Vec<Part>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(default)]
    pub inline_data: Option<Blob>,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct Transcription {
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GoAway {
    #[serde(default)]
    pub time_left: Option<String>,
}

impl ServerContent {
    /// Expand into events, transcripts first and turn completion last
    #[must_use]
    pub fn into_events(self) -> Vec<ServerEvent> {
        let mut events = Vec::new();

        if let Some(text) = self.input_transcription.and_then(|t| t.text) {
            events.push(ServerEvent::InputTranscript(text));
        }
        if let Some(text) = self.output_transcription.and_then(|t| t.text) {
            events.push(ServerEvent::OutputTranscript(text));
        }
        if let Some(turn) = self.model_turn {
            events.extend(
                turn.parts
                    .into_iter()
                    .filter_map(|p| p.inline_data)
                    .filter(|blob| blob.mime_type.starts_with("audio/pcm"))
                    .map(|blob| ServerEvent::AudioChunk(blob.data)),
            );
        }
        if self.interrupted {
            events.push(ServerEvent::Interrupted);
        }
        if self.turn_complete {
            events.push(ServerEvent::TurnComplete);
        }

        events
    }
}
