//! Configuration loading and management

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context, Result};

use crate::recognition::WakePhraseMatcher;

const DEFAULT_LANG: &str = "en-US";
const DEFAULT_PASSIVE_RESTART_MS: u64 = 1000;
const DEFAULT_COOL_DOWN_MS: u64 = 2000;
const DEFAULT_ANSWER_TIMEOUT_MS: u64 = 15_000;
const DEFAULT_SPEECH_TIMEOUT_MS: u64 = 60_000;

/// Daemon configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the Unix domain socket for IPC
    pub socket_path: PathBuf,

    /// Directory for runtime data
    pub data_dir: PathBuf,

    /// Recognition locale
    pub lang: String,

    /// Accepted spellings of the wake word
    pub wake_phrases: Vec<String>,

    /// Backoff before restarting a failed passive session
    pub passive_restart_delay: Duration,

    /// Pause after speaking before listening for the wake phrase again
    pub cool_down: Duration,

    /// Longest wait for a question or lookup answer
    pub answer_timeout: Duration,

    /// Longest wait for one reply to finish playing
    pub speech_timeout: Duration,
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration from an arbitrary variable source
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let home = lookup("HOME").context("HOME is not set")?;
        let data_dir = PathBuf::from(&home)
            .join(".local")
            .join("share")
            .join("alina");

        let socket_path = lookup("ALINA_SOCKET_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("daemon.sock"));

        let lang = lookup("ALINA_LANG").unwrap_or_else(|| DEFAULT_LANG.to_string());

        let wake_phrases = match lookup("ALINA_WAKE_PHRASES") {
            Some(raw) => {
                let phrases: Vec<String> = raw
                    .split(',')
                    .map(|p| p.trim().to_lowercase())
                    .filter(|p| !p.is_empty())
                    .collect();
                if phrases.is_empty() {
                    bail!("ALINA_WAKE_PHRASES contains no phrases");
                }
                phrases
            }
            None => WakePhraseMatcher::default().phrases().to_vec(),
        };

        let passive_restart_delay =
            millis(&lookup, "ALINA_PASSIVE_RESTART_MS", DEFAULT_PASSIVE_RESTART_MS)?;
        let cool_down = millis(&lookup, "ALINA_COOL_DOWN_MS", DEFAULT_COOL_DOWN_MS)?;
        let answer_timeout =
            millis(&lookup, "ALINA_ANSWER_TIMEOUT_MS", DEFAULT_ANSWER_TIMEOUT_MS)?;
        let speech_timeout =
            millis(&lookup, "ALINA_SPEECH_TIMEOUT_MS", DEFAULT_SPEECH_TIMEOUT_MS)?;

        Ok(Self {
            socket_path,
            data_dir,
            lang,
            wake_phrases,
            passive_restart_delay,
            cool_down,
            answer_timeout,
            speech_timeout,
        })
    }

    /// Matcher for the configured wake phrases
    pub fn matcher(&self) -> WakePhraseMatcher {
        WakePhraseMatcher::new(&self.wake_phrases)
    }

    /// Ensure data directory exists
    pub fn ensure_dirs(&self) -> Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        Ok(())
    }
}

fn millis<F>(lookup: &F, key: &str, default: u64) -> Result<Duration>
where
    F: Fn(&str) -> Option<String>,
{
    let ms = match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse::<u64>()
            .with_context(|| format!("{key} must be a whole number of milliseconds"))?,
        None => default,
    };
    Ok(Duration::from_millis(ms))
}
