use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

impl Role {
    /// Speaker label used in transcripts
    pub fn label(self) -> &'static str {
        match self {
            Role::User => "User",
            Role::Model => "Coach",
        }
    }
}

/// One turn in the conversation timeline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl Message {
    pub fn user(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
            timestamp,
        }
    }

    pub fn model(content: impl Into<String>, timestamp: DateTime<Utc>) -> Self {
        Self {
            role: Role::Model,
            content: content.into(),
            timestamp,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionMode {
    #[default]
    None,
    Text,
    Live,
}

/// Coordinator lifecycle
///
/// `Idle -> TextChatting | LiveVoice -> Assessing -> ReportReady`; `reset`
/// returns to `Idle` from anywhere.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoachState {
    #[default]
    Idle,
    TextChatting,
    LiveVoice,
    Assessing,
    ReportReady,
}

/// Session timing; created on the first chat or voice action
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Session {
    pub id: Option<uuid::Uuid>,
    pub start_time: Option<DateTime<Utc>>,
    pub active: bool,
    pub mode: SessionMode,
}

impl Session {
    /// Start the clock if it is not already running
    pub fn begin(&mut self, mode: SessionMode, now: DateTime<Utc>) {
        if self.start_time.is_none() {
            self.id = Some(uuid::Uuid::new_v4());
            self.start_time = Some(now);
        }
        self.active = true;
        self.mode = mode;
    }

    /// Leave the current mode, keeping the clock
    pub fn pause(&mut self) {
        self.active = false;
        self.mode = SessionMode::None;
    }
}

/// Who the learner is practising with and what about
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoachingProfile {
    pub language: String,
    pub scenario: String,
    pub topic: String,
}

impl From<&crate::config::CoachingConfig> for CoachingProfile {
    fn from(cfg: &crate::config::CoachingConfig) -> Self {
        Self {
            language: cfg.language.clone(),
            scenario: cfg.scenario.clone(),
            topic: cfg.topic.clone(),
        }
    }
}

/// Render messages as `Speaker: text` lines
pub fn format_transcript(messages: &[Message]) -> String {
    messages
        .iter()
        .map(|m| format!("{}: {}", m.role.label(), m.content))
        .collect::<Vec<_>>()
        .join("\n")
}
