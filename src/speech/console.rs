//! Stdout "voice" for running the daemon without a synthesis backend

use async_trait::async_trait;
use tokio::io::{AsyncWriteExt, Stdout};
use tokio::sync::Mutex;

use super::controller::{SpeechSynthesizer, SynthesisError};

/// Writes each reply to stdout as a single line
pub struct ConsoleVoice {
    out: Mutex<Stdout>,
}

impl ConsoleVoice {
    pub fn new() -> Self {
        Self {
            out: Mutex::new(tokio::io::stdout()),
        }
    }
}

impl Default for ConsoleVoice {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SpeechSynthesizer for ConsoleVoice {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        let mut out = self.out.lock().await;
        out.write_all(format!("alina> {text}\n").as_bytes()).await?;
        out.flush().await?;
        Ok(())
    }
}
