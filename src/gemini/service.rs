use async_trait::async_trait;
use tokio::sync::mpsc;
use tracing::debug;

use super::messages::Content;
use crate::audio::WireBlob;
use crate::error::CoachResult;
use crate::session::{AssessmentReport, CoachingProfile, LiveEvent};

/// Stateful text conversation context
///
/// Holds the system instruction and the turns the remote side has accepted.
#[derive(Debug, Clone)]
pub struct ChatSession {
    pub id: uuid::Uuid,
    pub profile: CoachingProfile,
    pub system_instruction: String,
    pub history: Vec<Content>,
}

impl ChatSession {
    pub fn new(profile: CoachingProfile, system_instruction: String) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            profile,
            system_instruction,
            history: Vec::new(),
        }
    }
}

/// Options for opening a live audio session
#[derive(Debug, Clone)]
pub struct LiveSessionConfig {
    pub profile: CoachingProfile,
    pub system_instruction: String,
}

/// Remote coaching operations
///
/// No call is retried; a failed send leaves the chat history unchanged.
#[async_trait]
pub trait CoachingService: Send + Sync {
    /// Build a chat context; never contacts the remote side
    fn open_chat_session(&self, profile: &CoachingProfile) -> ChatSession;

    /// Send one user turn and return the full reply
    async fn send_message(&self, session: &mut ChatSession, text: &str) -> CoachResult<String>;

    /// Open a bidirectional audio session
    async fn open_live_session(
        &self,
        config: LiveSessionConfig,
    ) -> CoachResult<Box<dyn LiveChannel>>;

    /// Turn a transcript into a structured report, failing closed
    async fn synthesize_assessment(&self, transcript: &str) -> CoachResult<AssessmentReport>;

    /// Best effort: `None` on any failure
    async fn synthesize_speech(&self, text: &str) -> Option<Vec<u8>>;
}

/// Fire-and-forget sender for microphone frames
#[derive(Debug, Clone)]
pub struct AudioUplink {
    tx: mpsc::UnboundedSender<WireBlob>,
}

impl AudioUplink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<WireBlob>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }

    /// Queue a frame; returns false once the session has gone away
    pub fn send(&self, blob: WireBlob) -> bool {
        match self.tx.send(blob) {
            Ok(()) => true,
            Err(_) => {
                debug!("Dropped audio frame: live session closed");
                false
            }
        }
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }
}

/// One open live session
#[async_trait]
pub trait LiveChannel: Send {
    /// Handle for pushing audio from another task
    fn uplink(&self) -> AudioUplink;

    /// Next server event; `None` once the session is closed
    async fn next_event(&mut self) -> Option<LiveEvent>;

    /// Close the session; in-flight frames may be lost
    async fn close(&mut self) -> CoachResult<()>;
}
