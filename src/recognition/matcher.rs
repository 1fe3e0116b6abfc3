//! Wake phrase matching over passive transcripts
//!
//! The passive session hands over every interim transcript update, so a
//! match fires on the first cumulative transcript that contains any
//! accepted spelling of the wake word.

/// Spellings accepted when no override is configured.
///
/// "aleena" is the most common mis-hearing of the wake word.
pub const DEFAULT_WAKE_PHRASES: &[&str] = &["alina", "aleena"];

/// Case-insensitive containment test against the accepted wake phrases
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WakePhraseMatcher {
    phrases: Vec<String>,
}

impl WakePhraseMatcher {
    /// Create a matcher from a set of accepted spellings
    ///
    /// Phrases are lower-cased and trimmed; blank entries are dropped.
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let phrases = phrases
            .into_iter()
            .map(|p| p.as_ref().trim().to_lowercase())
            .filter(|p| !p.is_empty())
            .collect();

        Self { phrases }
    }

    /// Accepted spellings, normalized
    pub fn phrases(&self) -> &[String] {
        &self.phrases
    }

    /// Does the transcript contain any accepted spelling?
    pub fn matches(&self, transcript: &str) -> bool {
        let transcript = transcript.to_lowercase();
        self.phrases.iter().any(|p| transcript.contains(p.as_str()))
    }
}

impl Default for WakePhraseMatcher {
    fn default() -> Self {
        Self::new(DEFAULT_WAKE_PHRASES)
    }
}
