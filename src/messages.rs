use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: Uuid,
    pub sender: Sender,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

impl ChatMessage {
    pub fn new(sender: Sender, text: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            sender,
            text: text.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self::new(Sender::User, text)
    }

    pub fn bot(text: impl Into<String>) -> Self {
        Self::new(Sender::Bot, text)
    }

    /// The greeting shown when a chat becomes active.
    pub fn greeting(title: &str) -> Self {
        Self::bot(format!(
            "Hello! I am your Cairo Pilot. How can I help you with '{}' today?",
            title
        ))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TypingState {
    #[default]
    Idle,
    Typing,
}

/// Marks the log generation a pending reply belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Epoch(u64);

/// Messages of the active chat only. Resetting the log discards the transcript.
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    messages: Vec<ChatMessage>,
    typing: TypingState,
    epoch: u64,
}

impl MessageLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn typing(&self) -> TypingState {
        self.typing
    }

    pub fn is_bot_typing(&self) -> bool {
        self.typing == TypingState::Typing
    }

    pub fn epoch(&self) -> Epoch {
        Epoch(self.epoch)
    }

    /// Appends to the end, clamping the timestamp so the log never goes back in time.
    pub fn append(&mut self, mut message: ChatMessage) {
        if let Some(last) = self.messages.last() {
            if message.timestamp < last.timestamp {
                message.timestamp = last.timestamp;
            }
        }
        self.messages.push(message);
    }

    pub fn clear(&mut self) {
        self.messages.clear();
        self.typing = TypingState::Idle;
        self.epoch += 1;
    }

    /// Replaces the log with the greeting for a newly active chat.
    pub fn greet(&mut self, title: &str) {
        self.clear();
        self.messages.push(ChatMessage::greeting(title));
    }

    /// Starts a reply; returns the epoch it must be completed in.
    pub fn start_typing(&mut self) -> Epoch {
        self.typing = TypingState::Typing;
        self.epoch()
    }

    /// Appends the reply and goes idle, unless the log was reset since `epoch`.
    /// Returns whether the reply was kept.
    pub fn finish_typing(&mut self, epoch: Epoch, reply: ChatMessage) -> bool {
        if epoch != self.epoch() {
            return false;
        }
        self.append(reply);
        self.typing = TypingState::Idle;
        true
    }
}
