//! Conversation transcript owned by a call session

use crate::voice::ChatMessage;

/// Ordered conversation history, system prompt first.
/// Lives and dies with its session; nothing is shared across calls.
#[derive(Debug, Clone)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
}

impl Transcript {
    /// Create a transcript seeded with the system prompt
    #[must_use]
    pub fn new(system_prompt: &str) -> Self {
        Self {
            messages: vec![ChatMessage::system(system_prompt)],
        }
    }

    /// Append a finalized user turn
    pub fn push_user(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::user(text));
    }

    /// Append an assistant reply
    pub fn push_assistant(&mut self, text: impl Into<String>) {
        self.messages.push(ChatMessage::assistant(text));
    }

    /// Full history in completion-request order
    #[must_use]
    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    /// Number of user/assistant messages (excludes the system prompt)
    #[must_use]
    pub fn turn_count(&self) -> usize {
        self.messages.len().saturating_sub(1)
    }
}
