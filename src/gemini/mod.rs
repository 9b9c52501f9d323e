//! Remote coaching client
//!
//! Thin wrappers around the hosted generative language service:
//! - text chat turns (`generateContent` with a running history)
//! - structured assessment reports (JSON schema output)
//! - speech synthesis for the report readout
//! - live audio sessions over WebSocket

pub mod client;
pub mod live;
pub mod messages;
pub mod prompts;
pub mod service;

pub use client::GeminiClient;
pub use live::GeminiLiveChannel;
pub use service::{AudioUplink, ChatSession, CoachingService, LiveChannel, LiveSessionConfig};
