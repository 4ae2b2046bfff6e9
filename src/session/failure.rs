//! Ways a live session can fail

use thiserror::Error;

use crate::history::ConversationEntry;

/// Reason a session ended without the user asking
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionFailure {
    /// Microphone missing, refused or unusable
    #[error("microphone unavailable: {0}")]
    PermissionDenied(String),

    /// Output device could not be opened
    #[error("audio output unavailable: {0}")]
    AudioUnavailable(String),

    /// Transport rejected the session or never opened
    #[error("connect failed: {0}")]
    ConnectFailure(String),

    /// Transport reported an error mid-session
    #[error("session error: {0}")]
    RuntimeFailure(String),

    /// Transport closed without an error
    #[error("closed by remote{}", .0.as_ref().map(|r| format!(": {r}")).unwrap_or_default())]
    RemoteClose(Option<String>),
}

impl SessionFailure {
    /// Short machine-readable name, used as a log field
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => "permission_denied",
            Self::AudioUnavailable(_) => "audio_unavailable",
            Self::ConnectFailure(_) => "connect_failure",
            Self::RuntimeFailure(_) => "runtime_failure",
            Self::RemoteClose(_) => "remote_close",
        }
    }

    /// Explanation shown to the user in the conversation
    #[must_use]
    pub const fn user_message(&self) -> &'static str {
        match self {
            Self::PermissionDenied(_) => {
                "I couldn't use your microphone. Check that one is connected and that access is allowed, then try again."
            }
            Self::AudioUnavailable(_) => {
                "I couldn't open your speakers. Check the audio output device and try again."
            }
            Self::ConnectFailure(_) => {
                "I couldn't connect to the voice service. Please try again in a moment."
            }
            Self::RuntimeFailure(_) => {
                "Something went wrong during the voice session, so it was stopped. Please start again."
            }
            Self::RemoteClose(_) => "The voice session was closed by the service.",
        }
    }

    /// History entry announcing the failure
    #[must_use]
    pub fn to_entry(&self) -> ConversationEntry {
        ConversationEntry::model(self.user_message())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::history::Role;

    #[test]
    fn remote_close_display_includes_reason() {
        assert_eq!(
            SessionFailure::RemoteClose(Some("quota".to_string())).to_string(),
            "closed by remote: quota"
        );
        assert_eq!(SessionFailure::RemoteClose(None).to_string(), "closed by remote");
    }

    #[test]
    fn entries_are_authored_by_model() {
        let entry = SessionFailure::ConnectFailure("refused".to_string()).to_entry();

        assert_eq!(entry.role, Role::Model);
        assert!(!entry.content.contains("refused"));
    }
}
