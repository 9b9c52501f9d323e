use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::error::{CoachError, CoachResult};

/// Speech-recognition capability used for dictating into the text input
#[async_trait]
pub trait SpeechCapture: Send {
    /// Begin recognition; recognized phrases arrive until the channel closes
    async fn start(&mut self, language: &str) -> CoachResult<mpsc::Receiver<String>>;

    async fn stop(&mut self) -> CoachResult<()>;
}

/// Hosts without speech recognition; every start fails with no fallback
#[derive(Debug, Default)]
pub struct UnsupportedSpeechCapture;

#[async_trait]
impl SpeechCapture for UnsupportedSpeechCapture {
    async fn start(&mut self, _language: &str) -> CoachResult<mpsc::Receiver<String>> {
        Err(CoachError::UnsupportedCapability(
            "speech recognition is not supported on this platform".to_string(),
        ))
    }

    async fn stop(&mut self) -> CoachResult<()> {
        Ok(())
    }
}
