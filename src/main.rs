use std::io::BufRead;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use clap::{Parser, Subcommand};
use secrecy::{ExposeSecret, SecretString};
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

use beacon_live::audio::{
    AudioBackend, CaptureSpec, CpalBackend, DecodedAudioBuffer, OUTPUT_SAMPLE_RATE,
    PlaybackNotifier, PlaybackScheduler, samples_to_wav,
};
use beacon_live::history::{ConversationEntry, Role};
use beacon_live::session::{Command as SessionCommand, LiveSessionController, SessionState};
use beacon_live::{Config, GeminiLiveTransport};

/// Beacon Live - full-duplex voice conversations with a live model
#[derive(Parser)]
#[command(name = "beacon-live", version, about)]
struct Cli {
    /// Config file to use instead of the default location
    #[arg(short, long, env = "BEACON_LIVE_CONFIG")]
    config: Option<PathBuf>,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
        /// Write the captured audio to a WAV file
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Test speaker output through the playback scheduler
    TestSpeaker,
    /// Interactive first-run setup
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "warn,beacon_live=info",
        1 => "info,beacon_live=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration, output } => test_mic(duration, output.as_deref()).await,
            Command::TestSpeaker => test_speaker().await,
            Command::Setup => beacon_live::setup::run_setup(),
        };
    }

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::load(),
    };
    tracing::debug!(?config, "loaded configuration");

    live(&config).await
}

/// Run an interactive live session
#[allow(clippy::future_not_send)]
async fn live(config: &Config) -> anyhow::Result<()> {
    let api_key = SecretString::from(config.require_api_key()?.expose_secret().to_string());
    let transport = Arc::new(GeminiLiveTransport::new(&config.endpoint, api_key));

    let (history_tx, mut history_rx) = mpsc::unbounded_channel::<ConversationEntry>();
    let mut controller = LiveSessionController::new(
        transport,
        Box::new(CpalBackend),
        Box::new(history_tx),
        config.session_config(),
    );

    tokio::spawn(async move {
        while let Some(entry) = history_rx.recv().await {
            let speaker = match entry.role {
                Role::User => "you",
                Role::Model => "model",
            };
            println!("{speaker}: {}", entry.content);
        }
    });

    let mut states = controller.subscribe_state();
    tokio::spawn(async move {
        while states.changed().await.is_ok() {
            let state = *states.borrow_and_update();
            match state {
                SessionState::Connecting => println!("[connecting...]"),
                SessionState::Active => println!("[listening, press Enter to stop]"),
                SessionState::Idle => println!("[idle, press Enter to talk, q to quit]"),
                SessionState::Error => {}
            }
        }
    });

    let (command_tx, command_rx) = mpsc::unbounded_channel();

    let ctrl_c = command_tx.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            let _ = ctrl_c.send(SessionCommand::Shutdown);
        }
    });

    // Blocking stdin reads stay off the runtime
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let command = match line.as_deref().map(str::trim) {
                Ok("q" | "quit" | "exit") | Err(_) => SessionCommand::Shutdown,
                Ok(_) => SessionCommand::Toggle,
            };
            if command_tx.send(command).is_err() || command == SessionCommand::Shutdown {
                return;
            }
        }
        let _ = command_tx.send(SessionCommand::Shutdown);
    });

    println!("beacon live ({})", config.model);
    println!("[idle, press Enter to talk, q to quit]");

    controller.run(command_rx).await;
    Ok(())
}

/// Meter the microphone through the capture pipeline
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64, output: Option<&std::path::Path>) -> anyhow::Result<()> {
    let spec = CaptureSpec::default();
    let mut microphone = CpalBackend.open_microphone(&spec)?;

    let window = Arc::new(Mutex::new(Vec::<f32>::new()));
    let recording = Arc::new(Mutex::new(Vec::<f32>::new()));
    let (window_in, recording_in) = (Arc::clone(&window), Arc::clone(&recording));
    let keep_recording = output.is_some();

    microphone.connect(Box::new(move |samples: &[f32]| {
        if let Ok(mut w) = window_in.lock() {
            w.extend_from_slice(samples);
        }
        if keep_recording && let Ok(mut r) = recording_in.lock() {
            r.extend_from_slice(samples);
        }
    }))?;

    println!(
        "Listening for {duration}s at {} Hz, say something...\n",
        spec.sample_rate
    );

    let mut ticker = tokio::time::interval(Duration::from_secs(1));
    ticker.tick().await;
    for second in 1..=duration {
        ticker.tick().await;

        let block = window
            .lock()
            .map(|mut w| std::mem::take(&mut *w))
            .unwrap_or_default();
        let level = Level::measure(&block);
        println!("{second:>3}s  {}  rms {:.3}  peak {:.3}", level.bar(40), level.rms, level.peak);
    }

    microphone.disconnect();
    microphone.stop();

    if let Some(path) = output {
        let samples = recording.lock().map(|r| r.clone()).unwrap_or_default();
        std::fs::write(path, samples_to_wav(&samples, spec.sample_rate)?)?;
        println!("\nSaved {} samples to {}", samples.len(), path.display());
    }

    println!("\nA flat meter usually means the wrong default input device is selected.");

    Ok(())
}

/// Loudness of one block of samples
struct Level {
    rms: f32,
    peak: f32,
}

impl Level {
    #[allow(clippy::cast_precision_loss)]
    fn measure(samples: &[f32]) -> Self {
        if samples.is_empty() {
            return Self { rms: 0.0, peak: 0.0 };
        }
        let energy = samples.iter().map(|s| s * s).sum::<f32>() / samples.len() as f32;
        let peak = samples.iter().fold(0.0f32, |acc, s| acc.max(s.abs()));
        Self {
            rms: energy.sqrt(),
            peak,
        }
    }

    /// Fixed-width bar scaled so normal speech fills about half of it
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    fn bar(&self, width: usize) -> String {
        let filled = ((self.rms * 4.0).min(1.0) * width as f32) as usize;
        format!("[{}{}]", "=".repeat(filled), " ".repeat(width - filled))
    }
}

/// Play a tone as back-to-back chunks through the playback scheduler
#[allow(clippy::future_not_send)]
async fn test_speaker() -> anyhow::Result<()> {
    const CHUNKS: usize = 4;
    // A quarter second at the output rate
    const CHUNK_LEN: usize = 6_000;
    const TONE_HZ: f32 = 440.0;

    let (finished_tx, mut finished_rx) = mpsc::unbounded_channel();
    let notifier: PlaybackNotifier = Arc::new(move |id| {
        let _ = finished_tx.send(id);
    });
    let mut output = CpalBackend.open_output(OUTPUT_SAMPLE_RATE, notifier)?;
    let mut scheduler = PlaybackScheduler::new(OUTPUT_SAMPLE_RATE);

    #[allow(clippy::cast_precision_loss)]
    let tone: Vec<f32> = (0..CHUNK_LEN * CHUNKS)
        .map(|n| {
            let phase = std::f32::consts::TAU * TONE_HZ * n as f32 / OUTPUT_SAMPLE_RATE as f32;
            0.25 * phase.sin()
        })
        .collect();

    println!("Playing a {TONE_HZ} Hz tone in {CHUNKS} chunks...\n");
    for chunk in tone.chunks(CHUNK_LEN) {
        let buffer = DecodedAudioBuffer::new(chunk.to_vec(), OUTPUT_SAMPLE_RATE);
        let entry = scheduler.schedule(output.as_mut(), &buffer)?;
        println!(
            "  chunk {} at {:.3}s for {:.3}s",
            entry.id, entry.start_time, entry.duration
        );
    }

    let drained = tokio::time::timeout(Duration::from_secs(5), async {
        while scheduler.active_count() > 0 {
            let Some(id) = finished_rx.recv().await else {
                break;
            };
            scheduler.complete(id);
        }
    })
    .await;
    output.close();

    if drained.is_err() {
        anyhow::bail!("playback did not finish; the output device may be stalled");
    }

    println!("\nThe tone should have been continuous, with no clicks between chunks.");

    Ok(())
}
