//! Signal handling for graceful shutdown

use std::io;

use tokio::signal::unix::{signal, SignalKind};
use tracing::debug;

/// Handles shutdown signals (SIGTERM, SIGINT)
#[derive(Debug, Default, Clone, Copy)]
pub struct ShutdownSignal;

impl ShutdownSignal {
    /// Create a new shutdown signal handler
    pub fn new() -> Self {
        Self
    }

    /// Wait for a shutdown signal
    ///
    /// Fails only if the signal handlers cannot be registered.
    pub async fn wait(&self) -> io::Result<SignalKind> {
        let mut sigterm = signal(SignalKind::terminate())?;
        let mut sigint = signal(SignalKind::interrupt())?;

        let kind = tokio::select! {
            _ = sigterm.recv() => SignalKind::terminate(),
            _ = sigint.recv() => SignalKind::interrupt(),
        };
        debug!(signal = ?kind, "received shutdown signal");
        Ok(kind)
    }
}
