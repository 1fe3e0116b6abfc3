//! Response orchestration
//!
//! Routes a captured utterance to the question or lookup service and turns
//! every service failure into a fixed apology, so the conversation always
//! has something to say.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, warn};

use super::classify::{classify, Intent};

/// Reply used whenever an answer service fails
pub const APOLOGY: &str = "I'm sorry, I encountered an error processing your request.";

/// Errors an answer service can report
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("request timed out")]
    Timeout,

    #[error("service returned status {0}")]
    Status(u16),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("no {0} service configured")]
    NotConfigured(&'static str),
}

/// Conversational answer service
#[async_trait]
pub trait QuestionAnswerer: Send + Sync {
    async fn ask(&self, text: &str) -> Result<String, ServiceError>;
}

/// Factual lookup service
#[async_trait]
pub trait LookupService: Send + Sync {
    async fn search(&self, text: &str) -> Result<String, ServiceError>;
}

/// A reply together with how it was produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reply {
    pub text: String,
    pub intent: Intent,
    /// True when `text` is the apology rather than a service answer
    pub fallback: bool,
}

/// Fail-soft front for the two answer services
pub struct ResponseOrchestrator {
    questions: Arc<dyn QuestionAnswerer>,
    lookups: Arc<dyn LookupService>,
    timeout: Duration,
}

impl ResponseOrchestrator {
    /// `timeout` bounds each service call
    pub fn new(
        questions: Arc<dyn QuestionAnswerer>,
        lookups: Arc<dyn LookupService>,
        timeout: Duration,
    ) -> Self {
        Self {
            questions,
            lookups,
            timeout,
        }
    }

    /// Produce a reply for the utterance; never fails
    pub async fn respond(&self, utterance: &str) -> Reply {
        let intent = classify(utterance);
        debug!(%intent, utterance, "routing utterance");

        let call = async {
            match intent {
                Intent::Question => self.questions.ask(utterance).await,
                Intent::Lookup => self.lookups.search(utterance).await,
            }
        };
        let result = tokio::time::timeout(self.timeout, call)
            .await
            .unwrap_or(Err(ServiceError::Timeout));

        match result {
            Ok(text) => Reply {
                text,
                intent,
                fallback: false,
            },
            Err(e) => {
                warn!(%intent, error = %e, "answer service failed, replying with apology");
                Reply {
                    text: APOLOGY.to_string(),
                    intent,
                    fallback: true,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeLookup, FakeQuestions};

    const TIMEOUT: Duration = Duration::from_secs(15);

    fn orchestrator(
        questions: &Arc<FakeQuestions>,
        lookups: &Arc<FakeLookup>,
    ) -> ResponseOrchestrator {
        ResponseOrchestrator::new(questions.clone(), lookups.clone(), TIMEOUT)
    }

    #[tokio::test]
    async fn test_question_routes_to_answerer() {
        let questions = Arc::new(FakeQuestions::answering("it is noon"));
        let lookups = Arc::new(FakeLookup::answering("unused"));

        let reply = orchestrator(&questions, &lookups)
            .respond("what time is it")
            .await;

        assert_eq!(reply.text, "it is noon");
        assert_eq!(reply.intent, Intent::Question);
        assert!(!reply.fallback);
        assert_eq!(questions.calls(), vec!["what time is it".to_string()]);
        assert!(lookups.calls().is_empty());
    }

    #[tokio::test]
    async fn test_search_routes_to_lookup() {
        let questions = Arc::new(FakeQuestions::answering("unused"));
        let lookups = Arc::new(FakeLookup::answering("cats are mammals"));

        let reply = orchestrator(&questions, &lookups)
            .respond("search for cats")
            .await;

        assert_eq!(reply.text, "cats are mammals");
        assert_eq!(reply.intent, Intent::Lookup);
        assert!(questions.calls().is_empty());
        assert_eq!(lookups.calls().len(), 1);
    }

    #[tokio::test]
    async fn test_question_failure_becomes_apology() {
        let questions = Arc::new(FakeQuestions::failing());
        let lookups = Arc::new(FakeLookup::answering("unused"));

        let reply = orchestrator(&questions, &lookups)
            .respond("why is the sky blue")
            .await;

        assert_eq!(reply.text, APOLOGY);
        assert!(reply.fallback);
    }

    #[tokio::test]
    async fn test_lookup_failure_becomes_apology() {
        let questions = Arc::new(FakeQuestions::answering("unused"));
        let lookups = Arc::new(FakeLookup::failing());

        let reply = orchestrator(&questions, &lookups)
            .respond("tell me a joke")
            .await;

        assert_eq!(reply.text, APOLOGY);
        assert_eq!(reply.intent, Intent::Lookup);
        assert!(reply.fallback);
    }

    #[tokio::test(start_paused = true)]
    async fn test_hung_service_times_out_into_apology() {
        let questions = Arc::new(FakeQuestions::hanging());
        let lookups = Arc::new(FakeLookup::answering("unused"));

        let started = tokio::time::Instant::now();
        let reply = orchestrator(&questions, &lookups)
            .respond("what time is it")
            .await;

        assert!(started.elapsed() >= TIMEOUT);
        assert_eq!(reply.text, APOLOGY);
        assert_eq!(reply.intent, Intent::Question);
        assert!(reply.fallback);
        assert_eq!(questions.calls().len(), 1);
    }
}
