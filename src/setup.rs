//! Interactive first-run setup wizard (`beacon-live setup`)

use std::path::PathBuf;

use dialoguer::{Input, Password, Select};

use crate::config::file::{
    self, AudioFileConfig, LiveConfigFile, SessionFileConfig, config_file_path,
    load_config_file,
};
use crate::config::{DEFAULT_MODEL, DEFAULT_SYSTEM_INSTRUCTION};

/// Prebuilt voices offered by the wizard
const VOICES: [&str; 8] = [
    "(service default)",
    "Puck",
    "Charon",
    "Kore",
    "Fenrir",
    "Aoede",
    "Leda",
    "Zephyr",
];

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("Beacon Live Setup\n");

    // Load existing config if present
    let existing = load_config_file();
    let config_path = config_file_path()
        .unwrap_or_else(|| PathBuf::from("~/.config/omni/beacon-live/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. API key
    let existing_key = existing.api_key.as_deref();
    let prompt = existing_key.map_or_else(
        || "Gemini API key (GEMINI_API_KEY)".to_string(),
        |k| format!("Gemini API key (current: {}, leave blank to keep)", mask_key(k)),
    );

    let api_key_input = Password::new()
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;

    let api_key = if api_key_input.is_empty() {
        existing_key.map(str::to_string)
    } else {
        Some(api_key_input)
    };

    if api_key.is_none() {
        println!("No key stored; set GEMINI_API_KEY before starting a session.");
    }

    // 2. Model
    let model: String = Input::new()
        .with_prompt("Live model")
        .default(
            existing
                .session
                .model
                .clone()
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
        )
        .interact_text()?;

    // 3. Voice
    let default_voice = existing
        .session
        .voice
        .as_deref()
        .and_then(|v| VOICES.iter().position(|&l| l.eq_ignore_ascii_case(v)))
        .unwrap_or(0);

    let voice_idx = Select::new()
        .with_prompt("Select a voice")
        .items(&VOICES)
        .default(default_voice)
        .interact()?;
    let voice = (voice_idx > 0).then(|| VOICES[voice_idx].to_string());

    // 4. System instruction
    let system_instruction: String = Input::new()
        .with_prompt("System instruction")
        .default(
            existing
                .session
                .system_instruction
                .clone()
                .unwrap_or_else(|| DEFAULT_SYSTEM_INSTRUCTION.to_string()),
        )
        .interact_text()?;

    // 5. Build and write config
    let config_file = LiveConfigFile {
        api_key,
        session: SessionFileConfig {
            model: Some(model),
            endpoint: existing.session.endpoint,
            system_instruction: Some(system_instruction),
            voice,
            connect_timeout_secs: existing.session.connect_timeout_secs,
        },
        audio: AudioFileConfig {
            frame_size: existing.audio.frame_size,
        },
    };

    file::write_config_file(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());

    println!("\nSetup complete! Run `beacon-live test-mic` to check audio, then `beacon-live` to talk.");

    Ok(())
}

/// Show only the ends of a key
fn mask_key(key: &str) -> String {
    let chars: Vec<char> = key.chars().collect();
    if chars.len() > 8 {
        let head: String = chars[..4].iter().collect();
        let tail: String = chars[chars.len() - 4..].iter().collect();
        format!("{head}...{tail}")
    } else {
        "****".to_string()
    }
}
