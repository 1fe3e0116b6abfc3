//! IPC message protocol definitions
//!
//! All messages are JSON-encoded, prefixed with a 4-byte little-endian length.

use serde::{Deserialize, Serialize};

use crate::conversation::{Message, Mode, Snapshot};
use crate::events::ConversationEvent;

/// Largest accepted frame body
pub const MAX_FRAME_LEN: usize = 1024 * 1024;

/// Requests from UI to daemon
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Request current daemon status
    GetStatus,

    /// Request the full message log
    GetMessages,

    /// Start command capture without the wake phrase
    Activate,

    /// Ping to check connectivity
    Ping,

    /// Subscribe to conversation event notifications
    Subscribe,
}

/// Responses from daemon to UI
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Response {
    /// Current daemon status
    Status(DaemonStatus),

    /// Message log, oldest first
    Messages { messages: Vec<Message> },

    /// Manual activation queued (or refused)
    Activation { accepted: bool },

    /// Pong response to ping
    Pong,

    /// Subscription confirmed
    Subscribed,

    /// Error response
    Error { code: String, message: String },
}

/// Push notification from daemon to UI (for subscribed clients)
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Notification {
    /// Conversation event occurred
    Event { event: ConversationEvent },
}

/// Full daemon status snapshot
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DaemonStatus {
    /// Daemon version
    pub version: String,

    /// Current conversation mode
    pub mode: Mode,

    /// Whether speech recognition is usable
    pub listening_available: bool,

    /// Whether a reply is being spoken right now
    pub speaking: bool,

    /// Command being handled, if any
    pub last_utterance: Option<String>,

    /// Number of logged messages
    pub message_count: usize,

    /// Uptime in seconds
    pub uptime_secs: u64,
}

impl DaemonStatus {
    pub fn from_snapshot(snapshot: &Snapshot, uptime_secs: u64) -> Self {
        Self {
            version: env!("CARGO_PKG_VERSION").to_string(),
            mode: snapshot.mode,
            listening_available: snapshot.listening_available,
            speaking: snapshot.speaking,
            last_utterance: snapshot.last_utterance.clone(),
            message_count: snapshot.messages.len(),
            uptime_secs,
        }
    }
}
