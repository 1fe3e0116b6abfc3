//! Routing heuristic for captured utterances

use serde::{Deserialize, Serialize};

/// Words that mark an utterance as a question
const INTERROGATIVES: &[&str] = &["what", "how", "why", "when", "where", "?"];

/// Word that forces a lookup even when phrased as a question
const LOOKUP_OVERRIDE: &str = "search";

/// Which answer service an utterance is routed to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Intent {
    /// Conversational answer
    Question,
    /// Factual lookup (the default)
    Lookup,
}

impl std::fmt::Display for Intent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Intent::Question => write!(f, "question"),
            Intent::Lookup => write!(f, "lookup"),
        }
    }
}

/// Classify an utterance by substring markers
///
/// No semantic parsing: "search" anywhere wins, then any interrogative
/// marker makes it a question, otherwise it is a lookup.
pub fn classify(utterance: &str) -> Intent {
    let lowered = utterance.to_lowercase();

    if lowered.contains(LOOKUP_OVERRIDE) {
        return Intent::Lookup;
    }

    if INTERROGATIVES.iter().any(|m| lowered.contains(m)) {
        Intent::Question
    } else {
        Intent::Lookup
    }
}
