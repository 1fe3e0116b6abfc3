//! Conversation data model
//!
//! `ConversationState` is owned by the conversation machine and only
//! mutated from its transition handlers. The UI sees it through
//! `Snapshot`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the conversation is in its listen/capture/answer/speak cycle
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mode {
    /// Listening for the wake phrase
    #[default]
    Passive,
    /// Capturing one spoken command
    Capturing,
    /// Waiting on an answer service
    Processing,
    /// Speaking the reply, including the cool-down after it
    Speaking,
}

impl std::fmt::Display for Mode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Mode::Passive => write!(f, "Passive"),
            Mode::Capturing => write!(f, "Capturing"),
            Mode::Processing => write!(f, "Processing"),
            Mode::Speaking => write!(f, "Speaking"),
        }
    }
}

/// Who said it
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    User,
    System,
}

/// One entry of the message log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Creation time in milliseconds plus a log sequence number
    pub id: String,
    pub text: String,
    pub origin: Origin,
    pub created_at: DateTime<Utc>,
}

/// Append-only, chronologically ordered message log
#[derive(Debug, Default)]
pub struct MessageLog {
    messages: Vec<Message>,
    next_seq: u64,
}

impl MessageLog {
    /// Append a message and return it
    pub fn append(&mut self, origin: Origin, text: impl Into<String>) -> &Message {
        let created_at = Utc::now();
        let seq = self.next_seq;
        self.next_seq += 1;

        self.messages.push(Message {
            id: format!("{}-{}", created_at.timestamp_millis(), seq),
            text: text.into(),
            origin,
            created_at,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[Message] {
        &self.messages
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.messages.len()
    }
}

/// Process-wide conversation state
#[derive(Debug)]
pub struct ConversationState {
    mode: Mode,
    last_utterance: Option<String>,
    log: MessageLog,
    listening_available: bool,
}

impl Default for ConversationState {
    fn default() -> Self {
        Self {
            mode: Mode::Passive,
            last_utterance: None,
            log: MessageLog::default(),
            listening_available: true,
        }
    }
}

impl ConversationState {
    pub fn mode(&self) -> Mode {
        self.mode
    }

    pub fn last_utterance(&self) -> Option<&str> {
        self.last_utterance.as_deref()
    }

    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn listening_available(&self) -> bool {
        self.listening_available
    }

    pub(super) fn set_mode(&mut self, mode: Mode) {
        self.mode = mode;
    }

    /// Record a captured command and log it as a user message
    pub(super) fn capture(&mut self, utterance: &str) -> &Message {
        self.last_utterance = Some(utterance.to_string());
        self.log.append(Origin::User, utterance)
    }

    pub(super) fn reply(&mut self, text: &str) -> &Message {
        self.log.append(Origin::System, text)
    }

    pub(super) fn clear_utterance(&mut self) {
        self.last_utterance = None;
    }

    pub(super) fn set_listening_available(&mut self, available: bool) {
        self.listening_available = available;
    }

    /// Read-only copy for the UI
    pub fn snapshot(&self, speaking: bool) -> Snapshot {
        Snapshot {
            mode: self.mode,
            last_utterance: self.last_utterance.clone(),
            messages: self.log.messages().to_vec(),
            speaking,
            listening_available: self.listening_available,
        }
    }
}

/// Read-only view of the conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Snapshot {
    pub mode: Mode,
    pub last_utterance: Option<String>,
    pub messages: Vec<Message>,
    /// Synthesis call in flight
    pub speaking: bool,
    /// False once the recognition engine has been found unsupported
    pub listening_available: bool,
}

impl Default for Snapshot {
    fn default() -> Self {
        ConversationState::default().snapshot(false)
    }
}
