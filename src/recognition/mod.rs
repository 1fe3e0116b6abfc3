//! Recognition module for wake phrase and command listening
//!
//! Two sessions run against one engine:
//! - Passive: continuous, interim results, scanning for the wake phrase
//! - Active: single-shot, final result only, capturing one command
//!
//! Engine callbacks arrive as typed events on a channel and are applied
//! by the `SessionManager`.

mod console;
mod engine;
mod manager;
mod matcher;

pub use console::ConsoleEngine;
pub use engine::{
    EngineSignal, ErrorCode, EventSink, ManagerEvent, RecognitionEngine, RecognitionError,
    Recognizer, RunId, SessionEvent, SessionKind, SessionOptions,
};
pub use manager::{RecognitionOutcome, SessionManager, SessionStatus};
pub use matcher::WakePhraseMatcher;
