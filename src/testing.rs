//! Test doubles for the recognition engine and the external services

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::oneshot;

use crate::recognition::{
    EventSink, RecognitionEngine, RecognitionError, Recognizer, RunId, SessionKind,
    SessionOptions,
};
use crate::respond::{LookupService, QuestionAnswerer, ServiceError};
use crate::speech::{SpeechSynthesizer, SynthesisError};

/// Calls made by the manager on fake sessions
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Start(SessionKind, RunId),
    Stop(SessionKind),
}

#[derive(Default)]
struct FakeEngineState {
    opened: Vec<(SessionKind, SessionOptions)>,
    calls: Vec<EngineCall>,
    start_failures: HashMap<SessionKind, u32>,
    unsupported_on_open: bool,
    unsupported_on_start: bool,
}

/// Engine whose sessions only record what they are asked to do
#[derive(Clone, Default)]
pub struct FakeEngine {
    state: Arc<Mutex<FakeEngineState>>,
}

impl FakeEngine {
    /// Engine that cannot open sessions at all
    pub fn unsupported() -> Self {
        let engine = Self::default();
        engine.state.lock().unwrap().unsupported_on_open = true;
        engine
    }

    /// Sessions open, but every start reports `Unsupported`
    pub fn report_unsupported_on_start(&self) {
        self.state.lock().unwrap().unsupported_on_start = true;
    }

    /// Fail the next `n` starts of a session with a transient error
    pub fn fail_starts(&self, kind: SessionKind, n: u32) {
        self.state.lock().unwrap().start_failures.insert(kind, n);
    }

    pub fn opened(&self) -> Vec<(SessionKind, SessionOptions)> {
        self.state.lock().unwrap().opened.clone()
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.state.lock().unwrap().calls.clone()
    }

    pub fn starts(&self, kind: SessionKind) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, EngineCall::Start(k, _) if *k == kind))
            .count()
    }

    /// Run id of the latest successful start of a session
    pub fn last_run(&self, kind: SessionKind) -> Option<RunId> {
        self.calls().iter().rev().find_map(|c| match c {
            EngineCall::Start(k, run) if *k == kind => Some(*run),
            _ => None,
        })
    }
}

impl RecognitionEngine for FakeEngine {
    fn open(
        &self,
        kind: SessionKind,
        options: SessionOptions,
        _sink: EventSink,
    ) -> Result<Box<dyn Recognizer>, RecognitionError> {
        let mut state = self.state.lock().unwrap();
        if state.unsupported_on_open {
            return Err(RecognitionError::Unsupported);
        }
        state.opened.push((kind, options));
        Ok(Box::new(FakeSession {
            kind,
            engine: self.clone(),
        }))
    }
}

struct FakeSession {
    kind: SessionKind,
    engine: FakeEngine,
}

impl Recognizer for FakeSession {
    fn start(&mut self, run: RunId) -> Result<(), RecognitionError> {
        let mut state = self.engine.state.lock().unwrap();
        if state.unsupported_on_start {
            return Err(RecognitionError::Unsupported);
        }
        if let Some(remaining) = state.start_failures.get_mut(&self.kind) {
            if *remaining > 0 {
                *remaining -= 1;
                return Err(RecognitionError::Start("engine busy".to_string()));
            }
        }
        state.calls.push(EngineCall::Start(self.kind, run));
        Ok(())
    }

    fn stop(&mut self) {
        self.engine
            .state
            .lock()
            .unwrap()
            .calls
            .push(EngineCall::Stop(self.kind));
    }
}

enum Behavior {
    Answer(String),
    Fail,
    Panic,
    Hang,
}

/// Question service returning a canned answer
pub struct FakeQuestions {
    behavior: Behavior,
    calls: Mutex<Vec<String>>,
}

impl FakeQuestions {
    pub fn answering(answer: &str) -> Self {
        Self::with(Behavior::Answer(answer.to_string()))
    }

    pub fn failing() -> Self {
        Self::with(Behavior::Fail)
    }

    pub fn panicking() -> Self {
        Self::with(Behavior::Panic)
    }

    /// Never answers
    pub fn hanging() -> Self {
        Self::with(Behavior::Hang)
    }

    fn with(behavior: Behavior) -> Self {
        Self {
            behavior,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl QuestionAnswerer for FakeQuestions {
    async fn ask(&self, text: &str) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(text.to_string());
        match &self.behavior {
            Behavior::Answer(answer) => Ok(answer.clone()),
            Behavior::Fail => Err(ServiceError::Status(503)),
            Behavior::Panic => panic!("question service exploded"),
            Behavior::Hang => std::future::pending().await,
        }
    }
}

/// Lookup service returning a canned answer
pub struct FakeLookup {
    answer: Option<String>,
    calls: Mutex<Vec<String>>,
}

impl FakeLookup {
    pub fn answering(answer: &str) -> Self {
        Self {
            answer: Some(answer.to_string()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn failing() -> Self {
        Self {
            answer: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl LookupService for FakeLookup {
    async fn search(&self, text: &str) -> Result<String, ServiceError> {
        self.calls.lock().unwrap().push(text.to_string());
        self.answer
            .clone()
            .ok_or_else(|| ServiceError::Malformed("missing answer field".to_string()))
    }
}

/// Synthesizer that records what it was asked to say
#[derive(Default)]
pub struct FakeSynth {
    fail: bool,
    release: Mutex<Option<oneshot::Receiver<()>>>,
    spoken: Mutex<Vec<String>>,
}

impl FakeSynth {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Speaking blocks until `release` fires
    pub fn blocking(release: oneshot::Receiver<()>) -> Self {
        Self {
            release: Mutex::new(Some(release)),
            ..Self::default()
        }
    }

    pub fn spoken(&self) -> Vec<String> {
        self.spoken.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechSynthesizer for FakeSynth {
    async fn speak(&self, text: &str) -> Result<(), SynthesisError> {
        self.spoken.lock().unwrap().push(text.to_string());

        let release = self.release.lock().unwrap().take();
        if let Some(release) = release {
            let _ = release.await;
        }

        if self.fail {
            return Err(SynthesisError::Playback("device lost".to_string()));
        }
        Ok(())
    }
}
