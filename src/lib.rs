pub mod audio;
pub mod config;
pub mod error;
pub mod gemini;
pub mod http;
pub mod session;

pub use audio::{
    AudioFrame, AudioInput, AudioInputConfig, AudioOutputScheduler, PlayableBuffer, PlaybackQueue,
    SpeechCapture, WavFileInput, WavTimelineOutput, WireBlob,
};
pub use config::Config;
pub use error::{CoachError, CoachResult};
pub use gemini::{CoachingService, GeminiClient, LiveChannel};
pub use http::{create_router, AppState};
pub use session::{AssessmentReport, CoachState, Message, Role, SessionCoordinator};
