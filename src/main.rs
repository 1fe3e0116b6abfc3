//! alina-daemon: Background daemon for a wake-word voice assistant
//!
//! This daemon provides:
//! - Passive wake phrase listening and single-shot command capture
//! - An explicit conversation state machine (Passive, Capturing,
//!   Processing, Speaking) that always returns to passive listening
//! - IPC server exposing conversation status and manual activation
//!
//! Recognition reads transcripts from stdin and replies are written to
//! stdout. Answer services are placeholders until real ones are wired in.

mod config;
mod conversation;
mod events;
mod ipc;
mod lifecycle;
mod recognition;
mod respond;
mod speech;

#[cfg(test)]
mod testing;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::conversation::Conversation;
use crate::ipc::Server;
use crate::lifecycle::ShutdownSignal;
use crate::recognition::{ConsoleEngine, EventSink, SessionManager};
use crate::respond::{OfflineServices, ResponseOrchestrator};
use crate::speech::{ConsoleVoice, SpeechController};

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    // Initialize logging; stdout carries spoken replies
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        "alina-daemon starting"
    );

    // Load configuration
    let config = Config::load()?;
    config.ensure_dirs()?;
    info!(
        ?config.socket_path,
        lang = %config.lang,
        wake_phrases = ?config.wake_phrases,
        "configuration loaded"
    );

    // Create shutdown signal handler
    let shutdown = ShutdownSignal::new();

    // Recognition engine -> session manager -> conversation
    let (recognition_tx, recognition_rx) = mpsc::unbounded_channel();
    let engine = ConsoleEngine::new();
    let sessions = SessionManager::new(
        &engine,
        EventSink::new(recognition_tx),
        config.matcher(),
        &config.lang,
        config.passive_restart_delay,
    );

    let services = Arc::new(OfflineServices);
    let orchestrator =
        ResponseOrchestrator::new(services.clone(), services, config.answer_timeout);
    let speech = SpeechController::new(Arc::new(ConsoleVoice::new()), config.speech_timeout);

    let mut conversation = Conversation::new(
        sessions,
        recognition_rx,
        orchestrator,
        speech,
        config.cool_down,
    );
    let handle = conversation.handle();

    // Create IPC server
    let server = Server::new(&config.socket_path, handle.clone())?;

    let mut event_rx = handle.subscribe();
    let input_task = engine.spawn_stdin();

    info!("daemon initialized, entering main loop");

    // Main event loop
    tokio::select! {
        // Run the conversation (processes recognition events and requests)
        _ = conversation.run() => {
            info!("conversation exited");
        }

        // Run the IPC server (accepts client connections)
        result = server.run() => {
            if let Err(e) = result {
                error!(?e, "IPC server error");
            }
        }

        // Log conversation events
        _ = async {
            loop {
                match event_rx.recv().await {
                    Ok(event) => info!(%event, "conversation event"),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "conversation event receiver lagged");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        } => {
            info!("conversation event logger exited");
        }

        // Wait for shutdown signal
        result = shutdown.wait() => {
            match result {
                Ok(signal) => info!(?signal, "shutdown signal received"),
                Err(e) => error!(?e, "failed to install signal handlers"),
            }
        }
    }

    // Cleanup
    info!("shutting down...");

    input_task.abort();
    conversation.shutdown();
    server.shutdown().await;

    info!("alina-daemon stopped");

    Ok(())
}
