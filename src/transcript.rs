//! Transcript assembly
//!
//! The service streams transcription snapshots for both directions while a
//! turn is in progress. Each snapshot supersedes the previous one, so buffers
//! are overwritten rather than appended to.

use crate::history::{ConversationEntry, Role};

/// Direction of a transcript
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// User speech
    Input,
    /// Model speech
    Output,
}

impl Direction {
    /// Conversation role that authored this direction
    #[must_use]
    pub const fn role(self) -> Role {
        match self {
            Self::Input => Role::User,
            Self::Output => Role::Model,
        }
    }
}

/// Holds the in-progress transcript of each direction
#[derive(Debug, Default)]
pub struct TranscriptAssembler {
    input: String,
    output: String,
}

impl TranscriptAssembler {
    /// Create an empty assembler
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the buffer of `direction` with the latest snapshot
    pub fn update(&mut self, direction: Direction, text: &str) {
        let buffer = self.buffer_mut(direction);
        buffer.clear();
        buffer.push_str(text);
    }

    /// Current snapshot of `direction`
    #[must_use]
    pub fn current(&self, direction: Direction) -> &str {
        match direction {
            Direction::Input => &self.input,
            Direction::Output => &self.output,
        }
    }

    /// Finalize the turn
    ///
    /// Emits one entry per non-empty direction (user first) and clears both
    /// buffers.
    pub fn complete_turn(&mut self) -> Vec<ConversationEntry> {
        let entries = [Direction::Input, Direction::Output]
            .into_iter()
            .filter_map(|direction| {
                let text = std::mem::take(self.buffer_mut(direction));
                (!text.trim().is_empty()).then(|| ConversationEntry::new(direction.role(), text))
            })
            .collect::<Vec<_>>();

        tracing::debug!(entries = entries.len(), "turn complete");
        entries
    }

    /// Discard the interrupted turn without emitting anything
    pub fn interrupt(&mut self) {
        self.clear();
    }

    /// Empty both buffers
    pub fn clear(&mut self) {
        self.input.clear();
        self.output.clear();
    }

    /// Whether both buffers are empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.input.is_empty() && self.output.is_empty()
    }

    fn buffer_mut(&mut self, direction: Direction) -> &mut String {
        match direction {
            Direction::Input => &mut self.input,
            Direction::Output => &mut self.output,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn later_snapshot_replaces_earlier() {
        let mut assembler = TranscriptAssembler::new();
        assembler.update(Direction::Input, "Ol");
        assembler.update(Direction::Input, "Olá, bom dia");

        let entries = assembler.complete_turn();

        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[0].content, "Olá, bom dia");
    }

    #[test]
    fn both_directions_finalize_user_first() {
        let mut assembler = TranscriptAssembler::new();
        assembler.update(Direction::Output, "Good morning!");
        assembler.update(Direction::Input, "Morning");

        let entries = assembler.complete_turn();

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].role, Role::User);
        assert_eq!(entries[1].role, Role::Model);
        assert!(assembler.is_empty());
    }

    #[test]
    fn empty_turn_is_silent() {
        let mut assembler = TranscriptAssembler::new();
        assert!(assembler.complete_turn().is_empty());

        assembler.update(Direction::Output, "   ");
        assert!(assembler.complete_turn().is_empty());
    }

    #[test]
    fn finalized_text_is_kept_verbatim() {
        let mut assembler = TranscriptAssembler::new();
        assembler.update(Direction::Output, " Bom dia! ");

        let entries = assembler.complete_turn();

        assert_eq!(entries[0].content, " Bom dia! ");
    }

    #[test]
    fn interruption_discards_turn() {
        let mut assembler = TranscriptAssembler::new();
        assembler.update(Direction::Input, "wait");
        assembler.update(Direction::Output, "Let me expl");

        assembler.interrupt();

        assert!(assembler.is_empty());
        assert!(assembler.complete_turn().is_empty());
    }
}
