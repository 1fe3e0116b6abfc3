//! Speech recognition engine contract
//!
//! Engines deliver their callbacks as typed `SessionEvent`s through an
//! `EventSink`; nothing engine-specific leaks past this module.

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

/// Which of the two recognition sessions an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionKind {
    /// Continuous wake phrase scanning
    Passive,
    /// Single-shot command capture
    Active,
}

impl std::fmt::Display for SessionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionKind::Passive => write!(f, "passive"),
            SessionKind::Active => write!(f, "active"),
        }
    }
}

/// Identifies one `start()` of a session
pub type RunId = u64;

/// Engine session configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionOptions {
    pub continuous: bool,
    pub interim_results: bool,
    pub lang: String,
}

impl SessionOptions {
    /// Options for a session of the given kind
    pub fn for_kind(kind: SessionKind, lang: &str) -> Self {
        let scanning = kind == SessionKind::Passive;
        Self {
            continuous: scanning,
            interim_results: scanning,
            lang: lang.to_string(),
        }
    }
}

/// Engine-reported error codes
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    NoSpeech,
    Aborted,
    AudioCapture,
    Network,
    NotAllowed,
    ServiceNotAllowed,
    Other(String),
}

impl ErrorCode {
    /// Map an engine error string onto a known code
    pub fn from_code(code: &str) -> Self {
        match code.trim().to_lowercase().as_str() {
            "no-speech" => ErrorCode::NoSpeech,
            "aborted" => ErrorCode::Aborted,
            "audio-capture" => ErrorCode::AudioCapture,
            "network" => ErrorCode::Network,
            "not-allowed" => ErrorCode::NotAllowed,
            "service-not-allowed" => ErrorCode::ServiceNotAllowed,
            _ => ErrorCode::Other(code.to_string()),
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorCode::NoSpeech => write!(f, "no-speech"),
            ErrorCode::Aborted => write!(f, "aborted"),
            ErrorCode::AudioCapture => write!(f, "audio-capture"),
            ErrorCode::Network => write!(f, "network"),
            ErrorCode::NotAllowed => write!(f, "not-allowed"),
            ErrorCode::ServiceNotAllowed => write!(f, "service-not-allowed"),
            ErrorCode::Other(code) => write!(f, "{}", code),
        }
    }
}

/// What happened in a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineSignal {
    Started,
    /// Cumulative transcript (interim or final)
    Transcript { text: String, is_final: bool },
    Error(ErrorCode),
    Ended,
}

/// One engine callback, tagged with its session and run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionEvent {
    pub kind: SessionKind,
    pub run: RunId,
    pub signal: EngineSignal,
}

/// Everything the session manager reacts to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManagerEvent {
    Engine(SessionEvent),
    /// Passive restart backoff has elapsed
    RetryDue,
}

/// Where engines deliver their callbacks
#[derive(Debug, Clone)]
pub struct EventSink {
    tx: mpsc::UnboundedSender<ManagerEvent>,
}

impl EventSink {
    pub fn new(tx: mpsc::UnboundedSender<ManagerEvent>) -> Self {
        Self { tx }
    }

    /// Deliver an engine callback; returns false once the receiver is gone
    pub fn emit(&self, kind: SessionKind, run: RunId, signal: EngineSignal) -> bool {
        self.tx
            .send(ManagerEvent::Engine(SessionEvent { kind, run, signal }))
            .is_ok()
    }

    pub(crate) fn retry_due(&self) -> bool {
        self.tx.send(ManagerEvent::RetryDue).is_ok()
    }
}

/// Errors from opening or starting a session
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RecognitionError {
    #[error("speech recognition is not supported by this engine")]
    Unsupported,

    #[error("session is already running")]
    AlreadyRunning,

    #[error("failed to start recognition: {0}")]
    Start(String),
}

/// One recognition session owned by the session manager
pub trait Recognizer: Send {
    /// Begin listening; events for this run must carry `run`
    fn start(&mut self, run: RunId) -> Result<(), RecognitionError>;

    /// Stop listening; must be safe to call when not running
    fn stop(&mut self);
}

/// A speech recognition engine
pub trait RecognitionEngine {
    /// Open a session that reports through `sink`
    fn open(
        &self,
        kind: SessionKind,
        options: SessionOptions,
        sink: EventSink,
    ) -> Result<Box<dyn Recognizer>, RecognitionError>;
}
