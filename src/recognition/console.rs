//! Line-based recognition engine reading from stdin
//!
//! Each input line stands in for one spoken phrase. A running passive
//! session receives it word by word as cumulative interim transcripts; a
//! running active session receives it as one final transcript and then
//! ends. A line of the form `!error <code>` raises an engine error on
//! whichever session is running.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::engine::{
    EngineSignal, ErrorCode, EventSink, RecognitionEngine, RecognitionError, Recognizer, RunId,
    SessionKind, SessionOptions,
};

const NOT_RUNNING: RunId = 0;

#[derive(Default)]
struct ConsoleShared {
    passive_run: AtomicU64,
    active_run: AtomicU64,
    sink: Mutex<Option<EventSink>>,
}

impl ConsoleShared {
    fn run_slot(&self, kind: SessionKind) -> &AtomicU64 {
        match kind {
            SessionKind::Passive => &self.passive_run,
            SessionKind::Active => &self.active_run,
        }
    }

    fn emit(&self, kind: SessionKind, run: RunId, signal: EngineSignal) {
        let sink = match self.sink.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        };
        if let Some(sink) = sink {
            if !sink.emit(kind, run, signal) {
                debug!("recognition event dropped, receiver closed");
            }
        }
    }

    /// The session currently receiving input, active first
    fn listener(&self) -> Option<(SessionKind, RunId)> {
        [SessionKind::Active, SessionKind::Passive]
            .into_iter()
            .find_map(|kind| {
                let run = self.run_slot(kind).load(Ordering::SeqCst);
                (run != NOT_RUNNING).then_some((kind, run))
            })
    }

    /// End a session from the engine side; false if it was not on `run`
    fn finish(&self, kind: SessionKind, run: RunId) -> bool {
        self.run_slot(kind)
            .compare_exchange(run, NOT_RUNNING, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
    }

    fn deliver(&self, line: &str) {
        let Some((kind, run)) = self.listener() else {
            debug!(line, "no session listening, input dropped");
            return;
        };

        if let Some(code) = line.strip_prefix("!error") {
            let code = ErrorCode::from_code(code);
            if self.finish(kind, run) {
                self.emit(kind, run, EngineSignal::Error(code));
                self.emit(kind, run, EngineSignal::Ended);
            }
            return;
        }

        match kind {
            SessionKind::Passive => {
                let mut heard = String::new();
                for word in line.split_whitespace() {
                    if !heard.is_empty() {
                        heard.push(' ');
                    }
                    heard.push_str(word);
                    self.emit(
                        kind,
                        run,
                        EngineSignal::Transcript {
                            text: heard.clone(),
                            is_final: false,
                        },
                    );
                }
                if !heard.is_empty() {
                    self.emit(
                        kind,
                        run,
                        EngineSignal::Transcript {
                            text: heard,
                            is_final: true,
                        },
                    );
                }
            }
            SessionKind::Active => {
                if self.finish(kind, run) {
                    self.emit(
                        kind,
                        run,
                        EngineSignal::Transcript {
                            text: line.to_string(),
                            is_final: true,
                        },
                    );
                    self.emit(kind, run, EngineSignal::Ended);
                }
            }
        }
    }
}

/// Recognition engine backed by lines of text
#[derive(Clone, Default)]
pub struct ConsoleEngine {
    shared: Arc<ConsoleShared>,
}

impl ConsoleEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start feeding stdin lines into the running session
    pub fn spawn_stdin(&self) -> JoinHandle<()> {
        let reader = BufReader::new(tokio::io::stdin());
        self.spawn_reader(reader)
    }

    fn spawn_reader<R>(&self, reader: R) -> JoinHandle<()>
    where
        R: AsyncBufRead + Unpin + Send + 'static,
    {
        let shared = Arc::clone(&self.shared);
        tokio::spawn(async move {
            let mut lines = reader.lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let line = line.trim();
                        if !line.is_empty() {
                            shared.deliver(line);
                        }
                    }
                    Ok(None) => {
                        info!("console input closed");
                        break;
                    }
                    Err(e) => {
                        warn!(?e, "console input error");
                        break;
                    }
                }
            }
        })
    }
}

impl RecognitionEngine for ConsoleEngine {
    fn open(
        &self,
        kind: SessionKind,
        options: SessionOptions,
        sink: EventSink,
    ) -> Result<Box<dyn Recognizer>, RecognitionError> {
        debug!(session = %kind, ?options, "opening console session");
        match self.shared.sink.lock() {
            Ok(mut slot) => *slot = Some(sink),
            Err(poisoned) => *poisoned.into_inner() = Some(sink),
        }
        Ok(Box::new(ConsoleSession {
            kind,
            shared: Arc::clone(&self.shared),
        }))
    }
}

struct ConsoleSession {
    kind: SessionKind,
    shared: Arc<ConsoleShared>,
}

impl Recognizer for ConsoleSession {
    fn start(&mut self, run: RunId) -> Result<(), RecognitionError> {
        self.shared
            .run_slot(self.kind)
            .compare_exchange(NOT_RUNNING, run, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| RecognitionError::AlreadyRunning)?;
        self.shared.emit(self.kind, run, EngineSignal::Started);
        Ok(())
    }

    fn stop(&mut self) {
        let run = self.shared.run_slot(self.kind).swap(NOT_RUNNING, Ordering::SeqCst);
        if run != NOT_RUNNING {
            self.shared.emit(self.kind, run, EngineSignal::Ended);
        }
    }
}
