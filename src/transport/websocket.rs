//! Gemini Live transport over WebSocket

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use futures::stream::{SplitSink, SplitStream};
use futures::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};

use super::wire::{RealtimeInputMessage, ServerMessage, SetupMessage};
use super::{LiveConnectConfig, SessionTransport, TransportEvent, TransportHandle};
use crate::audio::EncodedAudioBlob;
use crate::{Error, Result};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Default Gemini Live endpoint
pub const DEFAULT_ENDPOINT: &str = "wss://generativelanguage.googleapis.com/ws/google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent";

/// Opens Gemini Live sessions
pub struct GeminiLiveTransport {
    endpoint: String,
    api_key: SecretString,
}

impl GeminiLiveTransport {
    /// Create a transport for `endpoint` authenticated with `api_key`
    #[must_use]
    pub fn new(endpoint: impl Into<String>, api_key: SecretString) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key,
        }
    }

    fn session_url(&self) -> Result<url::Url> {
        Ok(url::Url::parse_with_params(
            &self.endpoint,
            &[("key", self.api_key.expose_secret())],
        )?)
    }
}

impl std::fmt::Debug for GeminiLiveTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiLiveTransport")
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl SessionTransport for GeminiLiveTransport {
    async fn connect(
        &self,
        config: &LiveConnectConfig,
        events: mpsc::UnboundedSender<TransportEvent>,
    ) -> Result<Arc<dyn TransportHandle>> {
        let url = self.session_url()?;
        tracing::debug!(endpoint = %self.endpoint, model = %config.model, "connecting to live endpoint");

        let (socket, _) = connect_async(url.as_str()).await?;
        let (mut writer, mut reader) = socket.split();

        let setup = serde_json::to_string(&SetupMessage::new(config))?;
        writer.send(Message::text(setup)).await?;
        await_setup_complete(&mut reader).await?;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        tokio::spawn(write_loop(writer, outbound_rx));
        let reader = tokio::spawn(read_loop(reader, events.clone()));

        tracing::info!(model = %config.model, "live session open");
        // The receiver may already be gone if the session was stopped meanwhile
        let _ = events.send(TransportEvent::Open);

        Ok(Arc::new(GeminiLiveHandle {
            outbound: outbound_tx,
            closed: AtomicBool::new(false),
            reader,
        }))
    }
}

/// Frames queued for the writer task
enum Outbound {
    Text(String),
    Close,
}

/// Handle to an open Gemini Live session
struct GeminiLiveHandle {
    outbound: mpsc::UnboundedSender<Outbound>,
    closed: AtomicBool,
    reader: JoinHandle<()>,
}

impl TransportHandle for GeminiLiveHandle {
    fn send_realtime_input(&self, blob: EncodedAudioBlob) -> Result<()> {
        if self.closed.load(Ordering::Acquire) {
            return Err(Error::Transport("session closed".to_string()));
        }

        let text = serde_json::to_string(&RealtimeInputMessage::from(blob))?;
        self.outbound
            .send(Outbound::Text(text))
            .map_err(|_| Error::Transport("writer stopped".to_string()))
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        let _ = self.outbound.send(Outbound::Close);
        tracing::debug!("live session close requested");
    }
}

impl Drop for GeminiLiveHandle {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

/// Read until the service acknowledges the setup message
async fn await_setup_complete(reader: &mut SplitStream<Socket>) -> Result<()> {
    while let Some(frame) = reader.next().await {
        let message = match frame? {
            Message::Text(text) => parse_server_message(text.as_bytes()),
            Message::Binary(bytes) => parse_server_message(&bytes),
            Message::Close(frame) => {
                let reason = frame.map(|f| f.reason.to_string()).unwrap_or_default();
                return Err(Error::Transport(format!(
                    "session closed during setup: {reason}"
                )));
            }
            _ => continue,
        };

        if message.is_some_and(|m| m.setup_complete.is_some()) {
            return Ok(());
        }
    }

    Err(Error::Transport(
        "connection ended before setup completed".to_string(),
    ))
}

fn parse_server_message(bytes: &[u8]) -> Option<ServerMessage> {
    match serde_json::from_slice(bytes) {
        Ok(message) => Some(message),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable server message");
            None
        }
    }
}

async fn read_loop(mut reader: SplitStream<Socket>, events: mpsc::UnboundedSender<TransportEvent>) {
    while let Some(frame) = reader.next().await {
        let message = match frame {
            Ok(Message::Text(text)) => parse_server_message(text.as_bytes()),
            Ok(Message::Binary(bytes)) => parse_server_message(&bytes),
            Ok(Message::Close(frame)) => {
                let reason = frame
                    .map(|f| f.reason.to_string())
                    .filter(|r| !r.is_empty());
                tracing::debug!(?reason, "live session closed by server");
                let _ = events.send(TransportEvent::Closed { reason });
                return;
            }
            Ok(_) => continue,
            Err(e) => {
                tracing::warn!(error = %e, "live session socket error");
                let _ = events.send(TransportEvent::Error(e.to_string()));
                return;
            }
        };

        let Some(message) = message else { continue };

        if let Some(go_away) = message.go_away {
            tracing::warn!(time_left = ?go_away.time_left, "server will close the session soon");
        }

        if let Some(content) = message.server_content {
            for event in content.into_events() {
                if events.send(TransportEvent::Server(event)).is_err() {
                    return;
                }
            }
        }
    }

    let _ = events.send(TransportEvent::Closed { reason: None });
}

async fn write_loop(
    mut writer: SplitSink<Socket, Message>,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
) {
    while let Some(frame) = outbound.recv().await {
        match frame {
            Outbound::Text(text) => {
                if let Err(e) = writer.send(Message::text(text)).await {
                    tracing::warn!(error = %e, "failed to write to live session");
                    break;
                }
            }
            Outbound::Close => {
                let _ = writer.send(Message::Close(None)).await;
                break;
            }
        }
    }

    let _ = writer.close().await;
}
