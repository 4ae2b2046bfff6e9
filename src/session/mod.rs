//! Live session controller
//!
//! Owns the capture pipeline, the playback pipeline and the transport handle
//! of at most one session, and drives them from a single serialized event
//! loop. Every way a session can end funnels into [`LiveSessionController::teardown`].
//!
//! ```text
//!  commands ──┐
//!             ▼
//!   ┌───────────────────┐  send_realtime_input   ┌───────────┐
//!   │ LiveSession       │ ◄── capture callback ── │ Microphone│
//!   │ Controller        │                         └───────────┘
//!   │  (select! loop)   │ ──► PlaybackScheduler ──► AudioOutput
//!   │                   │ ──► TranscriptAssembler ──► HistorySink
//!   └─────────▲─────────┘
//!             │ signals (generation tagged)
//!      transport events, connect result, playback completion
//! ```

mod failure;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use uuid::Uuid;

pub use failure::SessionFailure;

use crate::Error;
use crate::audio::{
    AudioBackend, AudioOutput, CaptureEncoder, CaptureSpec, EntryId, Microphone,
    OUTPUT_SAMPLE_RATE, PlaybackNotifier, PlaybackScheduler,
};
use crate::config::DEFAULT_CONNECT_TIMEOUT;
use crate::history::HistorySink;
use crate::transcript::{Direction, TranscriptAssembler};
use crate::transport::{
    LiveConnectConfig, ServerEvent, SessionTransport, TransportEvent, TransportHandle,
};

/// Lifecycle state of the live session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SessionState {
    /// No session
    #[default]
    Idle,
    /// Devices acquired, waiting for the transport to open
    Connecting,
    /// Streaming in both directions
    Active,
    /// Failure being handled; always followed by teardown to `Idle`
    Error,
}

impl SessionState {
    /// Display name of the state
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Connecting => "connecting",
            Self::Active => "active",
            Self::Error => "error",
        }
    }
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// User actions accepted by [`LiveSessionController::run`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// Open a fresh session, replacing any existing one
    Start,
    /// End the current session
    Stop,
    /// Start when idle, stop otherwise
    Toggle,
    /// End the session and leave the event loop
    Shutdown,
}

/// Controller configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Parameters sent when opening the transport
    pub connect: LiveConnectConfig,

    /// Microphone format and frame size
    pub capture: CaptureSpec,

    /// Sample rate of received audio
    pub output_sample_rate: u32,

    /// Time allowed for the transport to open
    pub connect_timeout: Duration,
}

impl SessionConfig {
    /// Voice session config for `model` with default audio formats
    #[must_use]
    pub fn new(model: impl Into<String>, system_instruction: impl Into<String>) -> Self {
        Self {
            connect: LiveConnectConfig::voice(model, system_instruction),
            capture: CaptureSpec::default(),
            output_sample_rate: OUTPUT_SAMPLE_RATE,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
        }
    }
}

/// Input to the controller from background tasks and device threads
enum Signal {
    Connected {
        generation: u64,
        result: crate::Result<Arc<dyn TransportHandle>>,
    },
    Transport {
        generation: u64,
        event: TransportEvent,
    },
    PlaybackFinished {
        generation: u64,
        id: EntryId,
    },
}

/// Resources held by one session
struct Session {
    id: Uuid,
    generation: u64,
    microphone: Option<Box<dyn Microphone>>,
    output: Option<Box<dyn AudioOutput>>,
    transport: Option<Arc<dyn TransportHandle>>,
    forwarder: Option<JoinHandle<()>>,
    opened: bool,
    received_content: bool,
}

impl Session {
    fn new(generation: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            generation,
            microphone: None,
            output: None,
            transport: None,
            forwarder: None,
            opened: false,
            received_content: false,
        }
    }
}

/// State machine for a full-duplex voice session
///
/// All handlers run on the task that owns the controller. Audio device
/// handles are not `Send`, so the controller is driven in place rather than
/// spawned.
pub struct LiveSessionController {
    transport: Arc<dyn SessionTransport>,
    audio: Box<dyn AudioBackend>,
    history: Box<dyn HistorySink>,
    config: SessionConfig,
    state: watch::Sender<SessionState>,
    playback: PlaybackScheduler,
    transcripts: TranscriptAssembler,
    signal_tx: mpsc::UnboundedSender<Signal>,
    signal_rx: mpsc::UnboundedReceiver<Signal>,
    generation: u64,
    session: Option<Session>,
}

impl LiveSessionController {
    /// Create an idle controller
    #[must_use]
    pub fn new(
        transport: Arc<dyn SessionTransport>,
        audio: Box<dyn AudioBackend>,
        history: Box<dyn HistorySink>,
        config: SessionConfig,
    ) -> Self {
        let (signal_tx, signal_rx) = mpsc::unbounded_channel();
        let playback = PlaybackScheduler::new(config.output_sample_rate);

        Self {
            transport,
            audio,
            history,
            config,
            state: watch::Sender::new(SessionState::Idle),
            playback,
            transcripts: TranscriptAssembler::new(),
            signal_tx,
            signal_rx,
            generation: 0,
            session: None,
        }
    }

    /// Current state
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.borrow()
    }

    /// Watch state changes
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Identifier of the current session, if any
    #[must_use]
    pub fn session_id(&self) -> Option<Uuid> {
        self.session.as_ref().map(|s| s.id)
    }

    /// Playback timeline tail on the output clock
    #[must_use]
    pub const fn next_playback_time(&self) -> f64 {
        self.playback.next_playback_time()
    }

    /// Number of scheduled or playing audio chunks
    #[must_use]
    pub fn active_playback_count(&self) -> usize {
        self.playback.active_count()
    }

    /// Partial transcript of `direction` for the turn in progress
    #[must_use]
    pub fn partial_transcript(&self, direction: Direction) -> &str {
        self.transcripts.current(direction)
    }

    /// Apply a user command
    ///
    /// Returns false for [`Command::Shutdown`].
    pub fn apply(&mut self, command: Command) -> bool {
        tracing::debug!(?command, state = %self.state(), "session command");
        match command {
            Command::Start => self.start(),
            Command::Stop => self.stop(),
            Command::Toggle => self.toggle(),
            Command::Shutdown => {
                self.teardown();
                return false;
            }
        }
        true
    }

    /// Start a session when idle, otherwise end the current one
    ///
    /// Must be called within a Tokio runtime.
    pub fn toggle(&mut self) {
        if self.state() == SessionState::Idle {
            self.start();
        } else {
            self.stop();
        }
    }

    /// Open a new session, tearing down any existing one first
    ///
    /// Acquires the microphone and the output context, then opens the
    /// transport in the background. Device failures end the session right
    /// away with a failure entry.
    ///
    /// Must be called within a Tokio runtime.
    pub fn start(&mut self) {
        if self.session.is_some() || self.state() != SessionState::Idle {
            self.teardown();
        }

        self.generation += 1;
        let generation = self.generation;
        let mut session = Session::new(generation);
        let session_id = session.id;

        self.playback.reset();
        self.transcripts.clear();
        self.set_state(SessionState::Connecting);
        tracing::info!(session = %session_id, model = %self.config.connect.model, "starting live session");

        let microphone = self.audio.open_microphone(&self.config.capture);
        let microphone = match microphone {
            Ok(microphone) => microphone,
            Err(e) => {
                self.session = Some(session);
                self.fail(SessionFailure::PermissionDenied(e.to_string()));
                return;
            }
        };
        session.microphone = Some(microphone);

        let signals = self.signal_tx.clone();
        let on_finished: PlaybackNotifier = Arc::new(move |id| {
            let _ = signals.send(Signal::PlaybackFinished { generation, id });
        });
        let output = self
            .audio
            .open_output(self.config.output_sample_rate, on_finished);
        match output {
            Ok(output) => session.output = Some(output),
            Err(e) => {
                self.session = Some(session);
                self.fail(SessionFailure::AudioUnavailable(e.to_string()));
                return;
            }
        }

        let (event_tx, event_rx) = mpsc::unbounded_channel();
        session.forwarder = Some(tokio::spawn(forward_events(
            generation,
            event_rx,
            self.signal_tx.clone(),
        )));

        let transport = Arc::clone(&self.transport);
        let connect = self.config.connect.clone();
        let timeout = self.config.connect_timeout;
        let signals = self.signal_tx.clone();
        tokio::spawn(async move {
            let result = tokio::time::timeout(timeout, transport.connect(&connect, event_tx))
                .await
                .unwrap_or_else(|_| Err(Error::ConnectTimeout(timeout)));
            let _ = signals.send(Signal::Connected { generation, result });
        });

        self.session = Some(session);
    }

    /// End the current session without a history entry
    pub fn stop(&mut self) {
        if let Some(id) = self.session_id() {
            tracing::info!(session = %id, "stopping live session");
        }
        self.teardown();
    }

    /// Release every session resource and return to `Idle`
    ///
    /// Safe to call in any state, repeatedly, and with partially acquired
    /// resources. Does nothing when no session exists.
    pub fn teardown(&mut self) {
        let Some(mut session) = self.session.take() else {
            if self.state() != SessionState::Idle {
                self.set_state(SessionState::Idle);
            }
            return;
        };

        if let Some(transport) = session.transport.take() {
            transport.close();
        }

        if let Some(mut microphone) = session.microphone.take() {
            microphone.disconnect();
            microphone.stop();
        }

        if let Some(mut output) = session.output.take() {
            self.playback.interrupt(output.as_mut());
            output.close();
        }

        if let Some(forwarder) = session.forwarder.take() {
            forwarder.abort();
        }

        self.playback.reset();
        self.transcripts.clear();
        self.set_state(SessionState::Idle);

        tracing::info!(session = %session.id, "live session ended");
    }

    /// Drive the controller until [`Command::Shutdown`] or the command
    /// channel closes, then tear down
    #[allow(clippy::future_not_send)]
    pub async fn run(&mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        loop {
            tokio::select! {
                command = commands.recv() => {
                    let Some(command) = command else { break };
                    if !self.apply(command) {
                        break;
                    }
                }
                Some(signal) = self.signal_rx.recv() => self.handle_signal(signal),
            }
        }

        self.teardown();
        tracing::debug!("session loop stopped");
    }

    /// Wait for one internal signal and handle it
    ///
    /// For callers that drive the controller without [`Self::run`].
    #[allow(clippy::future_not_send)]
    pub async fn process_next(&mut self) {
        if let Some(signal) = self.signal_rx.recv().await {
            self.handle_signal(signal);
        }
    }

    /// Handle every signal that is already queued
    ///
    /// Returns the number handled.
    pub fn process_pending(&mut self) -> usize {
        let mut handled = 0;
        while let Ok(signal) = self.signal_rx.try_recv() {
            self.handle_signal(signal);
            handled += 1;
        }
        handled
    }

    fn set_state(&self, state: SessionState) {
        let previous = self.state.send_replace(state);
        if previous != state {
            tracing::debug!(from = %previous, to = %state, "session state changed");
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.generation == generation)
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Connected { generation, result } => self.on_connected(generation, result),
            Signal::Transport { generation, event } if self.is_current(generation) => {
                self.on_transport_event(event);
            }
            Signal::PlaybackFinished { generation, id } if self.is_current(generation) => {
                self.playback.complete(id);
            }
            Signal::Transport { generation, .. } | Signal::PlaybackFinished { generation, .. } => {
                tracing::trace!(generation, "ignoring signal from an ended session");
            }
        }
    }

    fn on_connected(&mut self, generation: u64, result: crate::Result<Arc<dyn TransportHandle>>) {
        if !self.is_current(generation) {
            if let Ok(handle) = result {
                tracing::debug!(generation, "closing transport opened for an ended session");
                handle.close();
            }
            return;
        }

        match result {
            Ok(handle) => {
                if let Some(session) = self.session.as_mut() {
                    session.transport = Some(handle);
                }
                self.try_activate();
            }
            Err(e) => self.fail(SessionFailure::ConnectFailure(e.to_string())),
        }
    }

    fn on_transport_event(&mut self, event: TransportEvent) {
        match event {
            TransportEvent::Open => {
                if let Some(session) = self.session.as_mut() {
                    session.opened = true;
                }
                self.try_activate();
            }
            TransportEvent::Server(event) => {
                if let Some(session) = self.session.as_mut() {
                    session.received_content = true;
                }
                self.on_server_event(event);
            }
            TransportEvent::Error(message) => {
                let failure = if self.state() == SessionState::Active {
                    SessionFailure::RuntimeFailure(message)
                } else {
                    SessionFailure::ConnectFailure(message)
                };
                self.fail(failure);
            }
            TransportEvent::Closed { reason } => {
                let received_content = self.session.as_ref().is_some_and(|s| s.received_content);
                if reason.is_none() && !received_content {
                    tracing::info!("live session closed by remote before any content");
                    self.teardown();
                } else {
                    self.fail(SessionFailure::RemoteClose(reason));
                }
            }
        }
    }

    fn on_server_event(&mut self, event: ServerEvent) {
        match event {
            ServerEvent::InputTranscript(text) => self.transcripts.update(Direction::Input, &text),
            ServerEvent::OutputTranscript(text) => {
                self.transcripts.update(Direction::Output, &text);
            }
            ServerEvent::TurnComplete => {
                for entry in self.transcripts.complete_turn() {
                    self.history.append(entry);
                }
            }
            ServerEvent::Interrupted => {
                match self.session.as_mut().and_then(|s| s.output.as_mut()) {
                    Some(output) => {
                        self.playback.interrupt(output.as_mut());
                    }
                    None => self.playback.reset(),
                }
                self.transcripts.interrupt();
            }
            ServerEvent::AudioChunk(payload) => {
                let Some(output) = self.session.as_mut().and_then(|s| s.output.as_mut()) else {
                    return;
                };
                if let Err(e) = self.playback.enqueue(output.as_mut(), &payload) {
                    tracing::warn!(error = %e, "dropping undecodable audio chunk");
                }
            }
        }
    }

    /// Wire capture to the transport once it is both returned and open
    fn try_activate(&mut self) {
        if self.state() != SessionState::Connecting {
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };
        if !session.opened {
            return;
        }
        let (Some(transport), Some(microphone)) =
            (session.transport.clone(), session.microphone.as_mut())
        else {
            return;
        };

        let session_id = session.id;
        let encoder = CaptureEncoder::new(self.config.capture, transport);
        let connected = microphone.connect(encoder.into_callback());

        match connected {
            Ok(()) => {
                self.set_state(SessionState::Active);
                tracing::info!(session = %session_id, "live session active");
            }
            Err(e) => self.fail(SessionFailure::PermissionDenied(e.to_string())),
        }
    }

    fn fail(&mut self, failure: SessionFailure) {
        self.set_state(SessionState::Error);
        tracing::warn!(
            session = ?self.session_id(),
            kind = failure.kind(),
            error = %failure,
            "live session failed"
        );
        self.teardown();
        self.history.append(failure.to_entry());
    }
}

impl Drop for LiveSessionController {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl std::fmt::Debug for LiveSessionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LiveSessionController")
            .field("state", &self.state())
            .field("session", &self.session_id())
            .field("generation", &self.generation)
            .finish_non_exhaustive()
    }
}

/// Tag transport events with their session generation
async fn forward_events(
    generation: u64,
    mut events: mpsc::UnboundedReceiver<TransportEvent>,
    signals: mpsc::UnboundedSender<Signal>,
) {
    while let Some(event) = events.recv().await {
        if signals.send(Signal::Transport { generation, event }).is_err() {
            break;
        }
    }
}
