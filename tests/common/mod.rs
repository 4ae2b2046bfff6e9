//! Shared test utilities
//!
//! Fakes for the transport and the audio devices so sessions can be driven
//! without a network or audio hardware.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use beacon_live::audio::{
    AudioBackend, AudioOutput, CaptureCallback, CaptureSpec, DecodedAudioBuffer,
    EncodedAudioBlob, EntryId, Microphone, PlaybackNotifier,
};
use beacon_live::{
    ConversationHistory, Error, LiveConnectConfig, LiveSessionController, SessionConfig,
    SessionTransport, TransportEvent, TransportHandle,
};
use tokio::sync::{Semaphore, mpsc};

// Transport

struct TransportState {
    connects: AtomicUsize,
    open_handles: AtomicUsize,
    max_open_handles: AtomicUsize,
    fail_with: Mutex<Option<String>>,
    held: AtomicBool,
    gate: Semaphore,
    sent: Mutex<Vec<EncodedAudioBlob>>,
    senders: Mutex<Vec<mpsc::UnboundedSender<TransportEvent>>>,
    configs: Mutex<Vec<LiveConnectConfig>>,
}

impl Default for TransportState {
    fn default() -> Self {
        Self {
            connects: AtomicUsize::default(),
            open_handles: AtomicUsize::default(),
            max_open_handles: AtomicUsize::default(),
            fail_with: Mutex::default(),
            held: AtomicBool::default(),
            gate: Semaphore::new(0),
            sent: Mutex::default(),
            senders: Mutex::default(),
            configs: Mutex::default(),
        }
    }
}

/// Transport whose connect outcome is chosen by the test
#[derive(Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<TransportState>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connect fail with `message`
    pub fn fail_connect(&self, message: &str) {
        *self.state.fail_with.lock().unwrap() = Some(message.to_string());
    }

    /// Hold connects until [`Self::release`] is called
    pub fn hold_connect(&self) {
        self.state.held.store(true, Ordering::SeqCst);
    }

    /// Let one held connect finish
    pub fn release(&self) {
        self.state.gate.add_permits(1);
    }

    /// Deliver an event on the most recent session
    pub fn emit(&self, event: TransportEvent) {
        let senders = self.state.senders.lock().unwrap();
        let sender = senders.last().expect("no session connected");
        let _ = sender.send(event);
    }

    /// Event sender handed to the connect with index `n`
    pub fn sender(&self, n: usize) -> mpsc::UnboundedSender<TransportEvent> {
        self.state.senders.lock().unwrap()[n].clone()
    }

    pub fn connects(&self) -> usize {
        self.state.connects.load(Ordering::SeqCst)
    }

    pub fn open_handles(&self) -> usize {
        self.state.open_handles.load(Ordering::SeqCst)
    }

    pub fn max_open_handles(&self) -> usize {
        self.state.max_open_handles.load(Ordering::SeqCst)
    }

    pub fn sent(&self) -> Vec<EncodedAudioBlob> {
        self.state.sent.lock().unwrap().clone()
    }

    pub fn last_config(&self) -> Option<LiveConnectConfig> {
        self.state.configs.lock().unwrap().last().cloned()
    }
}

#[async_trait]
impl SessionTransport for ScriptedTransport {
    async fn connect(
        &self,
        config: &LiveConnectConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> beacon_live::Result<Arc<dyn TransportHandle>> {
        self.state.connects.fetch_add(1, Ordering::SeqCst);
        self.state.configs.lock().unwrap().push(config.clone());
        self.state.senders.lock().unwrap().push(events.clone());

        if self.state.held.load(Ordering::SeqCst) {
            self.state.gate.acquire().await.unwrap().forget();
        }

        if let Some(message) = self.state.fail_with.lock().unwrap().clone() {
            return Err(Error::Transport(message));
        }

        let open = self.state.open_handles.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_open_handles.fetch_max(open, Ordering::SeqCst);
        let _ = events.send(TransportEvent::Open);

        Ok(Arc::new(ScriptedHandle {
            state: Arc::clone(&self.state),
            closed: AtomicBool::new(false),
        }))
    }
}

struct ScriptedHandle {
    state: Arc<TransportState>,
    closed: AtomicBool,
}

impl TransportHandle for ScriptedHandle {
    fn send_realtime_input(&self, blob: EncodedAudioBlob) -> beacon_live::Result<()> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(Error::Transport("closed".to_string()));
        }
        self.state.sent.lock().unwrap().push(blob);
        Ok(())
    }

    fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.state.open_handles.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

// Audio

#[derive(Default)]
struct AudioState {
    deny_microphone: AtomicBool,
    fail_output: AtomicBool,
    microphones_opened: AtomicUsize,
    microphones_stopped: AtomicUsize,
    outputs_opened: AtomicUsize,
    outputs_closed: AtomicUsize,
    callback: Mutex<Option<CaptureCallback>>,
    notifier: Mutex<Option<PlaybackNotifier>>,
    clock: Mutex<f64>,
    scheduled: Mutex<Vec<(EntryId, f64, f64)>>,
    cancelled: Mutex<Vec<EntryId>>,
}

/// Audio backend with a manual clock and a microphone fed by the test
#[derive(Clone, Default)]
pub struct FakeAudio {
    state: Arc<AudioState>,
}

impl FakeAudio {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn deny_microphone(&self) {
        self.state.deny_microphone.store(true, Ordering::SeqCst);
    }

    pub fn fail_output(&self) {
        self.state.fail_output.store(true, Ordering::SeqCst);
    }

    /// Push samples through the connected capture callback
    pub fn feed(&self, samples: &[f32]) {
        if let Some(callback) = self.state.callback.lock().unwrap().as_mut() {
            callback(samples);
        }
    }

    pub fn capture_connected(&self) -> bool {
        self.state.callback.lock().unwrap().is_some()
    }

    pub fn set_time(&self, seconds: f64) {
        *self.state.clock.lock().unwrap() = seconds;
    }

    /// Report that entry `id` played to its end
    pub fn finish(&self, id: EntryId) {
        let notifier = self.state.notifier.lock().unwrap().clone();
        if let Some(notify) = notifier {
            notify(id);
        }
    }

    /// `(id, start, duration)` of every scheduled entry
    pub fn scheduled(&self) -> Vec<(EntryId, f64, f64)> {
        self.state.scheduled.lock().unwrap().clone()
    }

    pub fn cancelled(&self) -> Vec<EntryId> {
        self.state.cancelled.lock().unwrap().clone()
    }

    pub fn microphones_opened(&self) -> usize {
        self.state.microphones_opened.load(Ordering::SeqCst)
    }

    pub fn microphones_stopped(&self) -> usize {
        self.state.microphones_stopped.load(Ordering::SeqCst)
    }

    pub fn outputs_opened(&self) -> usize {
        self.state.outputs_opened.load(Ordering::SeqCst)
    }

    pub fn outputs_closed(&self) -> usize {
        self.state.outputs_closed.load(Ordering::SeqCst)
    }
}

impl AudioBackend for FakeAudio {
    fn open_microphone(&self, _: &CaptureSpec) -> beacon_live::Result<Box<dyn Microphone>> {
        if self.state.deny_microphone.load(Ordering::SeqCst) {
            return Err(Error::Microphone("permission denied".to_string()));
        }
        self.state.microphones_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeMicrophone {
            state: Arc::clone(&self.state),
            stopped: false,
        }))
    }

    fn open_output(
        &self,
        _: u32,
        on_finished: PlaybackNotifier,
    ) -> beacon_live::Result<Box<dyn AudioOutput>> {
        if self.state.fail_output.load(Ordering::SeqCst) {
            return Err(Error::Audio("no output device".to_string()));
        }
        self.state.outputs_opened.fetch_add(1, Ordering::SeqCst);
        *self.state.notifier.lock().unwrap() = Some(on_finished);
        Ok(Box::new(FakeOutput {
            state: Arc::clone(&self.state),
            closed: false,
        }))
    }
}

struct FakeMicrophone {
    state: Arc<AudioState>,
    stopped: bool,
}

impl Microphone for FakeMicrophone {
    fn connect(&mut self, on_samples: CaptureCallback) -> beacon_live::Result<()> {
        *self.state.callback.lock().unwrap() = Some(on_samples);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.state.callback.lock().unwrap().take();
    }

    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.state.microphones_stopped.fetch_add(1, Ordering::SeqCst);
        }
    }
}

struct FakeOutput {
    state: Arc<AudioState>,
    closed: bool,
}

impl AudioOutput for FakeOutput {
    fn current_time(&self) -> f64 {
        *self.state.clock.lock().unwrap()
    }

    fn schedule(
        &mut self,
        id: EntryId,
        start_time: f64,
        buffer: &DecodedAudioBuffer,
    ) -> beacon_live::Result<()> {
        self.state
            .scheduled
            .lock()
            .unwrap()
            .push((id, start_time, buffer.duration()));
        Ok(())
    }

    fn cancel(&mut self, id: EntryId) {
        self.state.cancelled.lock().unwrap().push(id);
    }

    fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.state.outputs_closed.fetch_add(1, Ordering::SeqCst);
        }
    }
}

// Controller helpers

/// Controller wired to the fakes
pub fn controller(
    transport: &ScriptedTransport,
    audio: &FakeAudio,
    history: &ConversationHistory,
) -> LiveSessionController {
    controller_with(transport, audio, history, test_config())
}

pub fn controller_with(
    transport: &ScriptedTransport,
    audio: &FakeAudio,
    history: &ConversationHistory,
    config: SessionConfig,
) -> LiveSessionController {
    LiveSessionController::new(
        Arc::new(transport.clone()),
        Box::new(audio.clone()),
        Box::new(history.clone()),
        config,
    )
}

pub fn test_config() -> SessionConfig {
    let mut config = SessionConfig::new("test-model", "Be brief.");
    config.connect_timeout = Duration::from_secs(5);
    config
}

/// Let background tasks run and handle whatever they produced
pub async fn settle(controller: &mut LiveSessionController) {
    for _ in 0..20 {
        tokio::task::yield_now().await;
        controller.process_pending();
    }
}
