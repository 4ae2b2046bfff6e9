//! Conversation history sink

use std::fmt;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::mpsc;

/// Author of a conversation entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    /// The person at the microphone
    User,
    /// The remote model
    Model,
}

impl Role {
    /// Wire/display name of the role
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A finalized turn or a session notice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConversationEntry {
    /// Author
    pub role: Role,

    /// Text content
    pub content: String,

    /// When the entry was produced
    pub timestamp: DateTime<Utc>,
}

impl ConversationEntry {
    /// Entry authored by the user
    #[must_use]
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    /// Entry authored by the model
    #[must_use]
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(Role::Model, content)
    }

    /// Entry with an explicit role
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Receives conversation entries in arrival order
pub trait HistorySink {
    /// Append an entry
    fn append(&mut self, entry: ConversationEntry);
}

impl HistorySink for mpsc::UnboundedSender<ConversationEntry> {
    fn append(&mut self, entry: ConversationEntry) {
        if self.send(entry).is_err() {
            tracing::debug!("history receiver dropped, entry discarded");
        }
    }
}

/// Shared in-memory conversation log
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    entries: Arc<Mutex<Vec<ConversationEntry>>>,
}

impl ConversationHistory {
    /// Create an empty history
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of every entry
    #[must_use]
    pub fn entries(&self) -> Vec<ConversationEntry> {
        self.entries
            .lock()
            .map(|entries| entries.clone())
            .unwrap_or_default()
    }

    /// Number of entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or_default()
    }

    /// Whether the history is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl HistorySink for ConversationHistory {
    fn append(&mut self, entry: ConversationEntry) {
        if let Ok(mut entries) = self.entries.lock() {
            entries.push(entry);
        }
    }
}
