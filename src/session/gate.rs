//! Assessment gating: elapsed-time threshold and trigger phrases.

use chrono::{DateTime, Utc};

/// Minimum session length before an assessment may be generated
pub const DEFAULT_ASSESSMENT_THRESHOLD_MS: u64 = 180_000;

/// Phrases that ask for an assessment when found anywhere in user text
pub const DEFAULT_TRIGGER_PHRASES: &[&str] = &[
    "report",
    "assessment",
    "evaluate me",
    "how did i do",
    "end the session",
];

/// Elapsed-time gate; recomputed on every query, never cached
#[derive(Debug, Clone, Copy)]
pub struct TimerGate {
    threshold_ms: u64,
}

impl TimerGate {
    pub fn new(threshold_ms: u64) -> Self {
        Self { threshold_ms }
    }

    pub fn threshold_ms(&self) -> u64 {
        self.threshold_ms
    }

    /// Milliseconds since `start`, zero when no session has started
    pub fn elapsed_ms(start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        start
            .map(|s| now.signed_duration_since(s).num_milliseconds().max(0) as u64)
            .unwrap_or(0)
    }

    pub fn is_open(&self, start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> bool {
        start.is_some() && Self::elapsed_ms(start, now) >= self.threshold_ms
    }

    pub fn remaining_ms(&self, start: Option<DateTime<Utc>>, now: DateTime<Utc>) -> u64 {
        self.threshold_ms.saturating_sub(Self::elapsed_ms(start, now))
    }
}

impl Default for TimerGate {
    fn default() -> Self {
        Self::new(DEFAULT_ASSESSMENT_THRESHOLD_MS)
    }
}

/// Case-insensitive substring matcher over a fixed phrase set
#[derive(Debug, Clone)]
pub struct TriggerPhrases {
    phrases: Vec<String>,
}

impl TriggerPhrases {
    pub fn new<I, S>(phrases: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            phrases: phrases
                .into_iter()
                .map(|p| p.as_ref().trim().to_lowercase())
                .filter(|p| !p.is_empty())
                .collect(),
        }
    }

    pub fn matches(&self, text: &str) -> bool {
        let lowered = text.to_lowercase();
        self.phrases.iter().any(|p| lowered.contains(p.as_str()))
    }
}

impl Default for TriggerPhrases {
    fn default() -> Self {
        Self::new(DEFAULT_TRIGGER_PHRASES)
    }
}
