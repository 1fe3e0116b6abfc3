//! Events module for conversation transitions
//!
//! Broadcast by the conversation machine and pushed to subscribed IPC
//! clients.

use serde::{Deserialize, Serialize};

use crate::conversation::Mode;
use crate::respond::Intent;

/// How capture was triggered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WakeSource {
    /// Wake phrase heard by the passive session
    Spoken,
    /// Requested by the UI
    Manual,
}

/// Events emitted by the conversation machine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConversationEvent {
    /// Mode changed
    ModeChanged {
        from: Mode,
        to: Mode,
        /// Time spent in `from`
        duration_ms: u64,
    },

    /// Capture is starting
    WakeDetected { source: WakeSource },

    /// A command was captured
    UtteranceCaptured { text: String },

    /// Capture ended without a command
    CaptureFailed,

    /// A reply was produced
    ReplyReady {
        intent: Intent,
        /// The reply is the apology
        fallback: bool,
    },

    /// Synthesis returned, cool-down starts
    SpeechFinished,

    /// Recognition engine unsupported, listening disabled
    ListeningUnavailable,

    /// An internal failure was recovered by returning to passive listening
    Recovered { reason: String },
}

impl std::fmt::Display for ConversationEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConversationEvent::ModeChanged {
                from,
                to,
                duration_ms,
            } => write!(f, "MODE_CHANGED {} -> {} ({}ms)", from, to, duration_ms),
            ConversationEvent::WakeDetected { source } => {
                write!(f, "WAKE_DETECTED ({:?})", source)
            }
            ConversationEvent::UtteranceCaptured { text } => {
                write!(f, "UTTERANCE_CAPTURED ({} chars)", text.len())
            }
            ConversationEvent::CaptureFailed => write!(f, "CAPTURE_FAILED"),
            ConversationEvent::ReplyReady { intent, fallback } => {
                write!(f, "REPLY_READY ({}, fallback={})", intent, fallback)
            }
            ConversationEvent::SpeechFinished => write!(f, "SPEECH_FINISHED"),
            ConversationEvent::ListeningUnavailable => write!(f, "LISTENING_UNAVAILABLE"),
            ConversationEvent::Recovered { reason } => write!(f, "RECOVERED ({})", reason),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_serialization() {
        let event = ConversationEvent::ModeChanged {
            from: Mode::Speaking,
            to: Mode::Passive,
            duration_ms: 2100,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("mode_changed"));
        assert!(json.contains(r#""to":"passive""#));
        assert!(json.contains("2100"));
    }

    #[test]
    fn test_event_deserialization() {
        let json = r#"{"type":"wake_detected","source":"manual"}"#;
        let event: ConversationEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ConversationEvent::WakeDetected {
                source: WakeSource::Manual
            }
        );
    }

    #[test]
    fn test_event_display() {
        let event = ConversationEvent::ReplyReady {
            intent: Intent::Lookup,
            fallback: true,
        };
        assert_eq!(event.to_string(), "REPLY_READY (lookup, fallback=true)");
    }
}
