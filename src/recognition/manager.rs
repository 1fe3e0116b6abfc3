//! Recognition session manager
//!
//! Owns the passive (wake phrase) and active (command) sessions. At most
//! one of them is running at any time: starting either one stops the other
//! first. Engine events for a session that is not running, or for an older
//! run of it, are dropped.

use std::time::Duration;

use tracing::{debug, info, trace, warn};

use super::engine::{
    EngineSignal, EventSink, ManagerEvent, RecognitionEngine, RecognitionError, Recognizer,
    RunId, SessionEvent, SessionKind, SessionOptions,
};
use super::matcher::WakePhraseMatcher;

/// Lifecycle of one session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionStatus {
    Stopped,
    Running,
}

/// What the manager reports to the conversation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecognitionOutcome {
    /// Wake phrase heard; the passive session has been stopped
    WakeDetected,
    /// Active session produced a command
    Captured(String),
    /// Active session ended without a usable command
    CaptureFailed,
}

struct Session {
    kind: SessionKind,
    recognizer: Option<Box<dyn Recognizer>>,
    status: SessionStatus,
    run: RunId,
}

impl Session {
    fn open(
        engine: &dyn RecognitionEngine,
        kind: SessionKind,
        lang: &str,
        sink: &EventSink,
    ) -> Result<Self, RecognitionError> {
        let options = SessionOptions::for_kind(kind, lang);
        let recognizer = engine.open(kind, options, sink.clone())?;
        Ok(Self {
            kind,
            recognizer: Some(recognizer),
            status: SessionStatus::Stopped,
            run: 0,
        })
    }

    fn unavailable(kind: SessionKind) -> Self {
        Self {
            kind,
            recognizer: None,
            status: SessionStatus::Stopped,
            run: 0,
        }
    }

    fn start(&mut self, run: RunId) -> Result<(), RecognitionError> {
        let recognizer = self
            .recognizer
            .as_mut()
            .ok_or(RecognitionError::Unsupported)?;
        recognizer.start(run)?;
        self.run = run;
        self.status = SessionStatus::Running;
        debug!(session = %self.kind, run, "session started");
        Ok(())
    }

    fn stop(&mut self) {
        if self.status == SessionStatus::Stopped {
            return;
        }
        if let Some(recognizer) = self.recognizer.as_mut() {
            recognizer.stop();
        }
        self.status = SessionStatus::Stopped;
        debug!(session = %self.kind, run = self.run, "session stopped");
    }

    /// The engine stopped the session on its own
    fn mark_stopped(&mut self) {
        self.status = SessionStatus::Stopped;
    }

    fn owns(&self, event: &SessionEvent) -> bool {
        self.status == SessionStatus::Running && self.run == event.run
    }
}

/// Coordinates the two recognition sessions
pub struct SessionManager {
    passive: Session,
    active: Session,
    matcher: WakePhraseMatcher,
    sink: EventSink,
    restart_delay: Duration,
    next_run: RunId,
    /// Passive listening is the mode the conversation currently wants
    passive_desired: bool,
    retry_pending: bool,
    unsupported: bool,
}

impl SessionManager {
    /// Open both sessions on the engine
    ///
    /// An engine that cannot open a session leaves the manager inert: every
    /// later start reports `Unsupported`.
    pub fn new(
        engine: &dyn RecognitionEngine,
        sink: EventSink,
        matcher: WakePhraseMatcher,
        lang: &str,
        restart_delay: Duration,
    ) -> Self {
        let opened = Session::open(engine, SessionKind::Passive, lang, &sink).and_then(|passive| {
            Session::open(engine, SessionKind::Active, lang, &sink).map(|active| (passive, active))
        });

        let (passive, active, unsupported) = match opened {
            Ok((passive, active)) => (passive, active, false),
            Err(e) => {
                debug!(error = %e, "recognition sessions could not be opened");
                (
                    Session::unavailable(SessionKind::Passive),
                    Session::unavailable(SessionKind::Active),
                    true,
                )
            }
        };

        Self {
            passive,
            active,
            matcher,
            sink,
            restart_delay,
            next_run: 0,
            passive_desired: false,
            retry_pending: false,
            unsupported,
        }
    }

    /// Status of one session
    pub fn status(&self, kind: SessionKind) -> SessionStatus {
        match kind {
            SessionKind::Passive => self.passive.status,
            SessionKind::Active => self.active.status,
        }
    }

    /// Whether the engine has been found unsupported
    #[cfg(test)]
    pub fn is_unsupported(&self) -> bool {
        self.unsupported
    }

    /// Begin continuous wake phrase listening
    ///
    /// A transient start failure is retried after the restart delay.
    pub fn start_passive(&mut self) -> Result<(), RecognitionError> {
        if self.unsupported {
            return Err(RecognitionError::Unsupported);
        }

        self.passive_desired = true;
        self.stop_active();
        self.launch_passive()
    }

    /// Begin single-shot command capture, stopping passive listening
    pub fn start_active(&mut self) -> Result<(), RecognitionError> {
        if self.unsupported {
            return Err(RecognitionError::Unsupported);
        }

        self.passive_desired = false;
        self.stop_passive();

        if self.active.status == SessionStatus::Running {
            return Ok(());
        }

        let run = self.allocate_run();
        self.active.start(run).map_err(|e| self.note_start_error(e))?;
        info!(run, "command capture started");
        Ok(())
    }

    /// Stop the passive session; no-op when already stopped
    pub fn stop_passive(&mut self) {
        self.passive.stop();
    }

    /// Stop the active session; no-op when already stopped
    pub fn stop_active(&mut self) {
        self.active.stop();
    }

    /// Stop everything and give up passive listening
    pub fn shutdown(&mut self) {
        self.passive_desired = false;
        self.stop_passive();
        self.stop_active();
    }

    /// React to an engine callback or an elapsed retry
    pub fn handle(&mut self, event: ManagerEvent) -> Option<RecognitionOutcome> {
        match event {
            ManagerEvent::RetryDue => {
                self.retry_pending = false;
                self.retry_passive();
                None
            }
            ManagerEvent::Engine(event) => self.handle_engine(event),
        }
    }

    fn handle_engine(&mut self, event: SessionEvent) -> Option<RecognitionOutcome> {
        let session = match event.kind {
            SessionKind::Passive => &self.passive,
            SessionKind::Active => &self.active,
        };

        if !session.owns(&event) {
            debug!(
                session = %event.kind,
                run = event.run,
                current_run = session.run,
                signal = ?event.signal,
                "ignoring stale recognition event"
            );
            return None;
        }

        match event.kind {
            SessionKind::Passive => self.handle_passive(event.signal),
            SessionKind::Active => self.handle_active(event.signal),
        }
    }

    fn handle_passive(&mut self, signal: EngineSignal) -> Option<RecognitionOutcome> {
        match signal {
            EngineSignal::Started => {
                debug!("passive listening started");
                None
            }
            EngineSignal::Transcript { text, .. } => {
                trace!(transcript = %text, "passive transcript");
                if !self.matcher.matches(&text) {
                    return None;
                }
                info!(transcript = %text, "wake phrase detected");
                self.passive_desired = false;
                self.stop_passive();
                Some(RecognitionOutcome::WakeDetected)
            }
            EngineSignal::Error(code) => {
                warn!(%code, "passive recognition error, scheduling restart");
                self.passive.mark_stopped();
                self.schedule_retry();
                None
            }
            EngineSignal::Ended => {
                self.passive.mark_stopped();
                if self.passive_desired {
                    debug!("passive session ended on its own, scheduling restart");
                    self.schedule_retry();
                }
                None
            }
        }
    }

    fn handle_active(&mut self, signal: EngineSignal) -> Option<RecognitionOutcome> {
        match signal {
            EngineSignal::Started => {
                debug!("command capture listening");
                None
            }
            EngineSignal::Transcript {
                is_final: false, ..
            } => None,
            EngineSignal::Transcript {
                text,
                is_final: true,
            } => {
                self.stop_active();
                let text = text.trim();
                if text.is_empty() {
                    debug!("command capture returned an empty transcript");
                    Some(RecognitionOutcome::CaptureFailed)
                } else {
                    info!(utterance = %text, "command captured");
                    Some(RecognitionOutcome::Captured(text.to_string()))
                }
            }
            EngineSignal::Error(code) => {
                warn!(%code, "command capture failed");
                self.active.mark_stopped();
                Some(RecognitionOutcome::CaptureFailed)
            }
            EngineSignal::Ended => {
                debug!("command capture ended without a result");
                self.active.mark_stopped();
                Some(RecognitionOutcome::CaptureFailed)
            }
        }
    }

    fn launch_passive(&mut self) -> Result<(), RecognitionError> {
        if self.passive.status == SessionStatus::Running {
            return Ok(());
        }

        let run = self.allocate_run();
        match self.passive.start(run) {
            Ok(()) => {
                info!(run, "passive listening started");
                Ok(())
            }
            Err(e) => {
                let e = self.note_start_error(e);
                if !self.unsupported {
                    warn!(error = %e, "failed to start passive listening, will retry");
                    self.schedule_retry();
                }
                Err(e)
            }
        }
    }

    fn retry_passive(&mut self) {
        if !self.passive_desired || self.unsupported {
            debug!("passive restart no longer wanted");
            return;
        }
        if let Err(e) = self.launch_passive() {
            debug!(error = %e, "passive restart failed");
        }
    }

    fn schedule_retry(&mut self) {
        if self.retry_pending || self.unsupported {
            return;
        }
        self.retry_pending = true;

        let sink = self.sink.clone();
        let delay = self.restart_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            if !sink.retry_due() {
                trace!("retry dropped, manager gone");
            }
        });
    }

    fn note_start_error(&mut self, e: RecognitionError) -> RecognitionError {
        if e == RecognitionError::Unsupported && !self.unsupported {
            debug!("engine reported unsupported, refusing further starts");
            self.unsupported = true;
            self.passive_desired = false;
        }
        e
    }

    fn allocate_run(&mut self) -> RunId {
        self.next_run += 1;
        self.next_run
    }
}
