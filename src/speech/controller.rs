//! Scoped "speaking" state around speech synthesis

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

/// Errors a synthesis backend can report
#[derive(Debug, thiserror::Error)]
pub enum SynthesisError {
    #[error("playback failed: {0}")]
    Playback(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("playback did not finish within {0:?}")]
    Timeout(Duration),
}

/// Speech synthesis service
#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    /// Speak the text, resolving once playback has finished
    async fn speak(&self, text: &str) -> Result<(), SynthesisError>;
}

/// Owns the speaking flag and drives the synthesizer
pub struct SpeechController {
    synthesizer: Arc<dyn SpeechSynthesizer>,
    speaking: Arc<AtomicBool>,
    timeout: Duration,
}

/// Clears the speaking flag when dropped
struct SpeakingGuard<'a>(&'a AtomicBool);

impl<'a> SpeakingGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Self {
        flag.store(true, Ordering::SeqCst);
        Self(flag)
    }
}

impl Drop for SpeakingGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

impl SpeechController {
    /// `timeout` bounds a single synthesis call
    pub fn new(synthesizer: Arc<dyn SpeechSynthesizer>, timeout: Duration) -> Self {
        Self {
            synthesizer,
            speaking: Arc::new(AtomicBool::new(false)),
            timeout,
        }
    }

    /// Whether a synthesis call is currently in flight
    pub fn is_speaking(&self) -> bool {
        self.speaking.load(Ordering::SeqCst)
    }

    /// Speak the text; synthesis errors are logged and swallowed
    ///
    /// The speaking flag is set for the duration of the call and cleared on
    /// every exit path, including the future being dropped mid-call. A
    /// call still running after the timeout is abandoned.
    pub async fn speak(&self, text: &str) {
        let _guard = SpeakingGuard::acquire(&self.speaking);
        debug!(chars = text.len(), "speaking reply");

        let result = tokio::time::timeout(self.timeout, self.synthesizer.speak(text))
            .await
            .unwrap_or(Err(SynthesisError::Timeout(self.timeout)));
        if let Err(e) = result {
            warn!(error = %e, "speech synthesis failed");
        }
    }
}
