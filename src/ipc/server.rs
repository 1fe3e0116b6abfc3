//! Unix domain socket server for IPC
//!
//! Provides request-response communication and push notifications of
//! conversation events to subscribed clients.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::unix::OwnedWriteHalf;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::conversation::{ConversationHandle, Mode};
use crate::events::ConversationEvent;

use super::protocol::{DaemonStatus, Notification, Request, Response, MAX_FRAME_LEN};

/// IPC Server handling client connections
pub struct Server {
    socket_path: PathBuf,
    listener: UnixListener,
    state: Arc<ServerState>,
    shutdown_tx: broadcast::Sender<()>,
}

/// Shared server state
struct ServerState {
    conversation: ConversationHandle,
    start_time: Instant,
}

impl Server {
    /// Create a new IPC server
    pub fn new(socket_path: &Path, conversation: ConversationHandle) -> Result<Self> {
        // Ensure parent directory exists
        if let Some(parent) = socket_path.parent() {
            std::fs::create_dir_all(parent).context("failed to create socket directory")?;
        }

        // Remove stale socket if it exists
        if socket_path.exists() {
            std::fs::remove_file(socket_path).context("failed to remove stale socket")?;
        }

        let listener = UnixListener::bind(socket_path).context("failed to bind Unix socket")?;

        // Set socket permissions to owner-only (0600)
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
        }

        let (shutdown_tx, _) = broadcast::channel(1);

        info!(?socket_path, "IPC server listening");

        Ok(Self {
            socket_path: socket_path.to_owned(),
            listener,
            state: Arc::new(ServerState {
                conversation,
                start_time: Instant::now(),
            }),
            shutdown_tx,
        })
    }

    /// Run the server, accepting connections
    pub async fn run(&self) -> Result<()> {
        loop {
            match self.listener.accept().await {
                Ok((stream, _addr)) => {
                    debug!("client connected");
                    let state = Arc::clone(&self.state);
                    let mut shutdown_rx = self.shutdown_tx.subscribe();

                    tokio::spawn(async move {
                        tokio::select! {
                            result = Self::handle_client(stream, state) => {
                                if let Err(e) = result {
                                    warn!(?e, "client handler error");
                                }
                            }
                            _ = shutdown_rx.recv() => {
                                debug!("client handler shutting down");
                            }
                        }
                    });
                }
                Err(e) => {
                    error!(?e, "accept error");
                }
            }
        }
    }

    /// Handle a single client connection
    async fn handle_client(stream: UnixStream, state: Arc<ServerState>) -> Result<()> {
        let (mut reader, writer) = stream.into_split();
        let (out_tx, out_rx) = mpsc::channel::<Vec<u8>>(32);
        let writer_task = tokio::spawn(Self::write_frames(writer, out_rx));
        let mut forwarder: Option<JoinHandle<()>> = None;

        let result = async {
            while let Some(body) = read_frame(&mut reader).await? {
                let (response, subscribe) = match serde_json::from_slice::<Request>(&body) {
                    Ok(request) => {
                        debug!(?request, "received request");
                        Self::process_request(request, &state)
                    }
                    Err(e) => {
                        warn!(?e, "failed to parse request");
                        let response = Response::Error {
                            code: "bad_request".to_string(),
                            message: e.to_string(),
                        };
                        (response, false)
                    }
                };
                if subscribe && forwarder.is_none() {
                    debug!("client subscribed to notifications");
                    forwarder = Some(Self::forward_events(
                        state.conversation.subscribe(),
                        out_tx.clone(),
                    ));
                }

                if out_tx.send(encode_frame(&response)?).await.is_err() {
                    break;
                }
            }
            debug!("client disconnected");
            Ok::<(), anyhow::Error>(())
        }
        .await;

        if let Some(forwarder) = forwarder {
            forwarder.abort();
        }
        drop(out_tx);
        let _ = writer_task.await;

        result
    }

    /// Push conversation events to one subscribed client
    fn forward_events(
        mut events: broadcast::Receiver<ConversationEvent>,
        out_tx: mpsc::Sender<Vec<u8>>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let event = match events.recv().await {
                    Ok(event) => event,
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!(skipped = n, "subscriber lagged");
                        continue;
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                };

                let frame = match encode_frame(&Notification::Event { event }) {
                    Ok(frame) => frame,
                    Err(e) => {
                        warn!(?e, "failed to encode notification");
                        continue;
                    }
                };
                if out_tx.send(frame).await.is_err() {
                    break;
                }
            }
        })
    }

    /// Write queued frames until every sender is gone
    async fn write_frames(mut writer: OwnedWriteHalf, mut frames: mpsc::Receiver<Vec<u8>>) {
        while let Some(frame) = frames.recv().await {
            if let Err(e) = writer.write_all(&frame).await {
                debug!(?e, "client write failed");
                break;
            }
        }
    }

    /// Process a request and return a response
    /// Returns (Response, should_subscribe)
    fn process_request(request: Request, state: &ServerState) -> (Response, bool) {
        match request {
            Request::Ping => (Response::Pong, false),

            Request::GetStatus => {
                let snapshot = state.conversation.snapshot();
                let uptime = state.start_time.elapsed().as_secs();
                (
                    Response::Status(DaemonStatus::from_snapshot(&snapshot, uptime)),
                    false,
                )
            }

            Request::GetMessages => {
                let messages = state.conversation.snapshot().messages;
                (Response::Messages { messages }, false)
            }

            Request::Activate => {
                let snapshot = state.conversation.snapshot();
                let accepted = snapshot.mode == Mode::Passive
                    && snapshot.listening_available
                    && state.conversation.request_manual_activation();
                info!(accepted, mode = %snapshot.mode, "manual activation requested via IPC");
                (Response::Activation { accepted }, false)
            }

            Request::Subscribe => (Response::Subscribed, true),
        }
    }

    /// Gracefully shutdown the server
    pub async fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());

        // Remove socket file
        if self.socket_path.exists() {
            if let Err(e) = std::fs::remove_file(&self.socket_path) {
                warn!(?e, "failed to remove socket file");
            }
        }

        info!("IPC server shutdown complete");
    }
}

/// Read one length-prefixed frame; `None` on clean disconnect
async fn read_frame<R>(reader: &mut R) -> Result<Option<Vec<u8>>>
where
    R: AsyncRead + Unpin,
{
    let mut len_buf = [0u8; 4];
    match reader.read_exact(&mut len_buf).await {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => return Ok(None),
        Err(e) => return Err(e.into()),
    }

    let len = u32::from_le_bytes(len_buf) as usize;
    if len > MAX_FRAME_LEN {
        anyhow::bail!("message too large: {len} bytes");
    }

    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;
    Ok(Some(body))
}

/// Encode a length-prefixed JSON frame
fn encode_frame<T: serde::Serialize>(msg: &T) -> Result<Vec<u8>> {
    let body = serde_json::to_vec(msg)?;
    let mut frame = Vec::with_capacity(4 + body.len());
    frame.extend_from_slice(&(body.len() as u32).to_le_bytes());
    frame.extend_from_slice(&body);
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use crate::conversation::Conversation;
    use crate::recognition::{EventSink, SessionManager, WakePhraseMatcher};
    use crate::respond::ResponseOrchestrator;
    use crate::speech::SpeechController;
    use crate::testing::{FakeEngine, FakeLookup, FakeQuestions, FakeSynth};
    use serde_json::Value;

    fn conversation() -> Conversation {
        let engine = FakeEngine::default();
        let (tx, rx) = mpsc::unbounded_channel();
        let sessions = SessionManager::new(
            &engine,
            EventSink::new(tx),
            WakePhraseMatcher::default(),
            "en-US",
            Duration::from_millis(1000),
        );
        Conversation::new(
            sessions,
            rx,
            ResponseOrchestrator::new(
                Arc::new(FakeQuestions::answering("noon")),
                Arc::new(FakeLookup::answering("cats")),
                Duration::from_secs(15),
            ),
            SpeechController::new(Arc::new(FakeSynth::default()), Duration::from_secs(60)),
            Duration::from_millis(2000),
        )
    }

    fn socket_path(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!("alina-{}-{}.sock", name, std::process::id()))
    }

    /// Send a request and return its response, skipping pushed events
    async fn request(stream: &mut UnixStream, request: &Request) -> Value {
        stream.write_all(&encode_frame(request).unwrap()).await.unwrap();
        loop {
            let frame = next_frame(stream).await;
            if frame["type"] != "event" {
                return frame;
            }
        }
    }

    async fn next_frame(stream: &mut UnixStream) -> Value {
        let body = read_frame(stream).await.unwrap().expect("server closed");
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn test_frame_round_trip_and_limit() {
        let frame = encode_frame(&Request::Ping).unwrap();
        let mut reader = &frame[..];
        let body = read_frame(&mut reader).await.unwrap().unwrap();
        assert_eq!(body, br#"{"type":"ping"}"#);
        assert!(read_frame(&mut reader).await.unwrap().is_none());

        let oversized = ((MAX_FRAME_LEN + 1) as u32).to_le_bytes();
        let mut reader = &oversized[..];
        assert!(read_frame(&mut reader).await.is_err());
    }

    #[tokio::test]
    async fn test_status_and_manual_activation() {
        let mut conversation = conversation();
        conversation.start();

        let path = socket_path("activate");
        let server = Server::new(&path, conversation.handle()).unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let mut client = UnixStream::connect(&path).await.unwrap();

        let pong = request(&mut client, &Request::Ping).await;
        assert_eq!(pong["type"], "pong");

        let status = request(&mut client, &Request::GetStatus).await;
        assert_eq!(status["type"], "status");
        assert_eq!(status["mode"], "passive");
        assert_eq!(status["listening_available"], true);

        let subscribed = request(&mut client, &Request::Subscribe).await;
        assert_eq!(subscribed["type"], "subscribed");

        let activation = request(&mut client, &Request::Activate).await;
        assert_eq!(activation["accepted"], true);

        conversation.step().await;
        let pushed = next_frame(&mut client).await;
        assert_eq!(pushed["type"], "event");
        assert_eq!(pushed["event"]["type"], "wake_detected");
        assert_eq!(pushed["event"]["source"], "manual");

        let status = request(&mut client, &Request::GetStatus).await;
        assert_eq!(status["mode"], "capturing");

        let refused = request(&mut client, &Request::Activate).await;
        assert_eq!(refused["accepted"], false);

        server_task.abort();
        let _ = std::fs::remove_file(&path);
    }

    #[tokio::test]
    async fn test_messages_request() {
        let conversation = conversation();
        let path = socket_path("messages");
        let server = Server::new(&path, conversation.handle()).unwrap();
        let server_task = tokio::spawn(async move { server.run().await });

        let mut client = UnixStream::connect(&path).await.unwrap();
        let messages = request(&mut client, &Request::GetMessages).await;
        assert_eq!(messages["type"], "messages");
        assert_eq!(messages["messages"], Value::Array(Vec::new()));

        let garbage = br#"{"type":"sing"}"#;
        let mut frame = (garbage.len() as u32).to_le_bytes().to_vec();
        frame.extend_from_slice(garbage);
        client.write_all(&frame).await.unwrap();
        let error = next_frame(&mut client).await;
        assert_eq!(error["type"], "error");
        assert_eq!(error["code"], "bad_request");

        let pong = request(&mut client, &Request::Ping).await;
        assert_eq!(pong["type"], "pong");

        server_task.abort();
        let _ = std::fs::remove_file(&path);
    }
}
