//! Error types for the coaching coordinator.

use thiserror::Error;

/// Errors surfaced by the coordinator and its remote/audio collaborators.
///
/// Speech synthesis has no variant here: a missing readout is reported as
/// `None` by the client and never reaches the caller as an error.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoachError {
    /// Transport, HTTP status or quota failure on a single remote call
    #[error("Remote service error: {0}")]
    RemoteService(String),

    /// The assessment response could not be parsed into a report
    #[error("Assessment synthesis failed: {0}")]
    AssessmentSynthesis(String),

    /// A platform capability (speech recognition, microphone) is missing
    #[error("Unsupported capability: {0}")]
    UnsupportedCapability(String),

    /// The timer gate is still closed
    #[error("Assessment is locked for another {remaining_ms} ms")]
    AssessmentLocked { remaining_ms: u64 },

    /// The requested transition is not legal from the current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Audio encode/decode or WAV I/O failure
    #[error("Audio error: {0}")]
    Audio(String),

    /// Missing or malformed configuration
    #[error("Configuration error: {0}")]
    Config(String),
}

impl CoachError {
    pub fn remote(message: impl Into<String>) -> Self {
        Self::RemoteService(message.into())
    }

    pub fn audio(message: impl Into<String>) -> Self {
        Self::Audio(message.into())
    }

    pub fn invalid_state(message: impl Into<String>) -> Self {
        Self::InvalidState(message.into())
    }

    /// Whether the failure left the conversation intact for a manual retry
    pub fn is_retryable_by_user(&self) -> bool {
        matches!(
            self,
            Self::RemoteService(_) | Self::AssessmentSynthesis(_) | Self::AssessmentLocked { .. }
        )
    }
}

impl From<reqwest::Error> for CoachError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::RemoteService(format!("request timed out: {err}"))
        } else {
            Self::RemoteService(err.to_string())
        }
    }
}

impl From<hound::Error> for CoachError {
    fn from(err: hound::Error) -> Self {
        Self::Audio(err.to_string())
    }
}

pub type CoachResult<T> = Result<T, CoachError>;
