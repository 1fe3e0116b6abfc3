//! Speech module: speaking replies aloud

mod console;
mod controller;

pub use console::ConsoleVoice;
pub use controller::{SpeechController, SpeechSynthesizer, SynthesisError};
