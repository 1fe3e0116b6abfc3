//! Conversation state machine
//!
//! Cycles Passive -> Capturing -> Processing -> Speaking -> Passive.
//! Recognition callbacks, UI requests and the results of spawned work all
//! arrive as messages and are applied one at a time. Any error raised by a
//! transition is caught in `dispatch` and resolved by returning to passive
//! listening.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, error, info, warn};

use super::state::{ConversationState, Mode, Snapshot};
use crate::events::{ConversationEvent, WakeSource};
use crate::recognition::{ManagerEvent, RecognitionError, RecognitionOutcome, SessionManager};
use crate::respond::{Reply, ResponseOrchestrator};
use crate::speech::SpeechController;

/// Messages applied by the conversation machine
#[derive(Debug)]
pub enum Input {
    /// Start capture without a spoken wake phrase
    Activate,
    ReplyReady { cycle: u64, reply: Reply },
    SpeechFinished { cycle: u64 },
    CoolDownElapsed { cycle: u64 },
    /// A spawned step died without reporting back
    StepFailed {
        cycle: u64,
        step: &'static str,
        reason: String,
    },
}

/// Failures inside a transition; all of them resolve to Passive
#[derive(Debug, thiserror::Error)]
pub enum ConversationError {
    #[error("could not start command capture: {0}")]
    CaptureStart(#[source] RecognitionError),

    #[error("{step} step failed: {reason}")]
    Step { step: &'static str, reason: String },
}

/// Cloneable access for the UI side
#[derive(Clone)]
pub struct ConversationHandle {
    inputs: mpsc::UnboundedSender<Input>,
    snapshots: watch::Receiver<Snapshot>,
    events: broadcast::Sender<ConversationEvent>,
    speech: Arc<SpeechController>,
}

impl ConversationHandle {
    /// Ask for capture to start as if the wake phrase had been heard
    ///
    /// Returns false when the machine is gone. The request is ignored
    /// unless the conversation is passive when it is applied.
    pub fn request_manual_activation(&self) -> bool {
        self.inputs.send(Input::Activate).is_ok()
    }

    /// Current state as last published
    pub fn snapshot(&self) -> Snapshot {
        let mut snapshot = self.snapshots.borrow().clone();
        snapshot.speaking = self.speech.is_speaking();
        snapshot
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ConversationEvent> {
        self.events.subscribe()
    }
}

/// The conversation machine
pub struct Conversation {
    state: ConversationState,
    sessions: SessionManager,
    orchestrator: Arc<ResponseOrchestrator>,
    speech: Arc<SpeechController>,
    cool_down: Duration,
    /// Identifies the in-flight exchange; results from older ones are stale
    cycle: u64,
    mode_entered_at: Instant,
    inputs_tx: mpsc::UnboundedSender<Input>,
    inputs_rx: mpsc::UnboundedReceiver<Input>,
    recognition_rx: mpsc::UnboundedReceiver<ManagerEvent>,
    event_tx: broadcast::Sender<ConversationEvent>,
    snapshot_tx: watch::Sender<Snapshot>,
}

impl Conversation {
    /// Create the machine around its collaborators
    ///
    /// `recognition_rx` must be the receiving end of the sink the session
    /// manager was built with.
    pub fn new(
        sessions: SessionManager,
        recognition_rx: mpsc::UnboundedReceiver<ManagerEvent>,
        orchestrator: ResponseOrchestrator,
        speech: SpeechController,
        cool_down: Duration,
    ) -> Self {
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let (event_tx, _) = broadcast::channel(64);
        let (snapshot_tx, _) = watch::channel(Snapshot::default());

        Self {
            state: ConversationState::default(),
            sessions,
            orchestrator: Arc::new(orchestrator),
            speech: Arc::new(speech),
            cool_down,
            cycle: 0,
            mode_entered_at: Instant::now(),
            inputs_tx,
            inputs_rx,
            recognition_rx,
            event_tx,
            snapshot_tx,
        }
    }

    pub fn handle(&self) -> ConversationHandle {
        ConversationHandle {
            inputs: self.inputs_tx.clone(),
            snapshots: self.snapshot_tx.subscribe(),
            events: self.event_tx.clone(),
            speech: Arc::clone(&self.speech),
        }
    }

    #[cfg(test)]
    fn state(&self) -> &ConversationState {
        &self.state
    }

    #[cfg(test)]
    fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    /// Arm passive listening
    pub fn start(&mut self) {
        info!("conversation started in Passive mode");
        self.listen_passively();
        self.publish();
    }

    /// Start, then apply messages until the channels close
    pub async fn run(&mut self) {
        self.start();
        while self.step().await {}
        info!("conversation stopped");
    }

    /// Stop both sessions
    pub fn shutdown(&mut self) {
        self.sessions.shutdown();
    }

    /// Apply the next message; false once nothing more can arrive
    pub async fn step(&mut self) -> bool {
        tokio::select! {
            Some(input) = self.inputs_rx.recv() => self.dispatch(input),
            Some(event) = self.recognition_rx.recv() => self.on_recognition(event),
            else => return false,
        }
        true
    }

    fn on_recognition(&mut self, event: ManagerEvent) {
        let Some(outcome) = self.sessions.handle(event) else {
            return;
        };

        let result = match outcome {
            RecognitionOutcome::WakeDetected => self.activate(WakeSource::Spoken),
            RecognitionOutcome::Captured(text) => {
                self.on_captured(text);
                Ok(())
            }
            RecognitionOutcome::CaptureFailed => {
                self.on_capture_failed();
                Ok(())
            }
        };

        if let Err(e) = result {
            self.recover(e);
        }
        self.publish();
    }

    fn dispatch(&mut self, input: Input) {
        if let Err(e) = self.apply(input) {
            self.recover(e);
        }
        self.publish();
    }

    fn apply(&mut self, input: Input) -> Result<(), ConversationError> {
        match input {
            Input::Activate => self.activate(WakeSource::Manual),
            Input::ReplyReady { cycle, reply } => {
                if self.is_current(cycle, Mode::Processing) {
                    self.on_reply(reply);
                }
                Ok(())
            }
            Input::SpeechFinished { cycle } => {
                if self.is_current(cycle, Mode::Speaking) {
                    self.emit(ConversationEvent::SpeechFinished);
                    let cool_down = self.cool_down;
                    self.spawn_step("cool-down", async move {
                        tokio::time::sleep(cool_down).await;
                        Input::CoolDownElapsed { cycle }
                    });
                }
                Ok(())
            }
            Input::CoolDownElapsed { cycle } => {
                if self.is_current(cycle, Mode::Speaking) {
                    self.reset_to_passive();
                }
                Ok(())
            }
            Input::StepFailed {
                cycle,
                step,
                reason,
            } => {
                if cycle != self.cycle {
                    debug!(cycle, step, "ignoring failure of a finished step");
                    return Ok(());
                }
                Err(ConversationError::Step { step, reason })
            }
        }
    }

    /// Passive -> Capturing
    fn activate(&mut self, source: WakeSource) -> Result<(), ConversationError> {
        if self.state.mode() != Mode::Passive || !self.state.listening_available() {
            debug!(
                ?source,
                mode = %self.state.mode(),
                "activation ignored"
            );
            return Ok(());
        }

        self.emit(ConversationEvent::WakeDetected { source });
        self.sessions
            .start_active()
            .map_err(ConversationError::CaptureStart)?;
        self.transition_to(Mode::Capturing);
        Ok(())
    }

    /// Capturing -> Processing
    fn on_captured(&mut self, text: String) {
        if self.state.mode() != Mode::Capturing {
            debug!(mode = %self.state.mode(), "late capture ignored");
            return;
        }

        let message_id = self.state.capture(&text).id.clone();
        debug!(%message_id, "user message logged");
        self.emit(ConversationEvent::UtteranceCaptured { text: text.clone() });
        self.transition_to(Mode::Processing);

        self.cycle += 1;
        let cycle = self.cycle;
        let orchestrator = Arc::clone(&self.orchestrator);
        self.spawn_step("answer", async move {
            let reply = orchestrator.respond(&text).await;
            Input::ReplyReady { cycle, reply }
        });
    }

    /// Capturing -> Passive, nothing logged
    fn on_capture_failed(&mut self) {
        if self.state.mode() != Mode::Capturing {
            return;
        }
        self.emit(ConversationEvent::CaptureFailed);
        self.reset_to_passive();
    }

    /// Processing -> Speaking
    fn on_reply(&mut self, reply: Reply) {
        let message_id = self.state.reply(&reply.text).id.clone();
        debug!(%message_id, fallback = reply.fallback, "system message logged");
        self.emit(ConversationEvent::ReplyReady {
            intent: reply.intent,
            fallback: reply.fallback,
        });
        self.transition_to(Mode::Speaking);

        let cycle = self.cycle;
        let speech = Arc::clone(&self.speech);
        self.spawn_step("speech", async move {
            speech.speak(&reply.text).await;
            Input::SpeechFinished { cycle }
        });
    }

    fn recover(&mut self, e: ConversationError) {
        warn!(error = %e, mode = %self.state.mode(), "recovering to passive listening");
        self.emit(ConversationEvent::Recovered {
            reason: e.to_string(),
        });
        self.reset_to_passive();
    }

    /// Universal way back to Passive; never fails
    fn reset_to_passive(&mut self) {
        self.state.clear_utterance();
        self.cycle += 1;
        if self.state.mode() != Mode::Passive {
            self.transition_to(Mode::Passive);
        }
        self.listen_passively();
    }

    fn listen_passively(&mut self) {
        match self.sessions.start_passive() {
            Ok(()) => {}
            Err(RecognitionError::Unsupported) => self.mark_unavailable(),
            Err(e) => warn!(error = %e, "failed to restart passive listening"),
        }
    }

    fn mark_unavailable(&mut self) {
        if !self.state.listening_available() {
            return;
        }
        error!("speech recognition unsupported, conversation is inert");
        self.state.set_listening_available(false);
        self.emit(ConversationEvent::ListeningUnavailable);
    }

    fn is_current(&self, cycle: u64, mode: Mode) -> bool {
        let current = cycle == self.cycle && self.state.mode() == mode;
        if !current {
            debug!(
                cycle,
                current_cycle = self.cycle,
                mode = %self.state.mode(),
                "ignoring stale step result"
            );
        }
        current
    }

    /// Run a step off the machine and feed its result back as an input
    fn spawn_step<F>(&self, step: &'static str, work: F)
    where
        F: Future<Output = Input> + Send + 'static,
    {
        let cycle = self.cycle;
        let inputs = self.inputs_tx.clone();
        let work = tokio::spawn(work);
        tokio::spawn(async move {
            let input = match work.await {
                Ok(input) => input,
                Err(e) => Input::StepFailed {
                    cycle,
                    step,
                    reason: e.to_string(),
                },
            };
            let _ = inputs.send(input);
        });
    }

    fn transition_to(&mut self, new_mode: Mode) {
        let old_mode = self.state.mode();
        let duration_ms = self.mode_entered_at.elapsed().as_millis() as u64;

        info!(
            from = %old_mode,
            to = %new_mode,
            duration_ms = duration_ms,
            "state transition"
        );

        self.state.set_mode(new_mode);
        self.mode_entered_at = Instant::now();
        self.emit(ConversationEvent::ModeChanged {
            from: old_mode,
            to: new_mode,
            duration_ms,
        });
    }

    fn emit(&self, event: ConversationEvent) {
        debug!(%event, "emitting event");
        let _ = self.event_tx.send(event);
    }

    fn publish(&self) {
        self.snapshot_tx
            .send_replace(self.state.snapshot(self.speech.is_speaking()));
    }
}
