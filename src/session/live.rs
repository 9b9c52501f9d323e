//! Live-voice turn state machine.
//!
//! Events pulled from a [`LiveChannel`](crate::gemini::LiveChannel) are folded
//! into the [`Timeline`] by [`apply`]. Side effects on audio devices are
//! returned as a [`LiveAction`] for the coordinator to carry out.

use chrono::{DateTime, Utc};

use super::timeline::Timeline;

/// Server-to-client events on a live session
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Raw 16-bit PCM of synthesized speech
    AudioChunk(Vec<u8>),
    /// Delta of the user's speech transcription
    InputTranscription(String),
    /// Delta of the model's speech transcription
    OutputTranscription(String),
    /// The model finished its turn
    TurnComplete,
    /// The user spoke over the model; pending playback must stop
    Interrupted,
    /// The remote side reported an error
    Error(String),
}

/// What the coordinator must do after an event has been applied
#[derive(Debug, Clone, PartialEq)]
pub enum LiveAction {
    None,
    /// Decode and schedule this audio
    Play(Vec<u8>),
    /// Cancel every scheduled source and rewind the cursor
    StopPlayback,
    /// A turn was committed; carries the user's finished utterance
    TurnCommitted { user_text: String },
    /// Tear the session down
    Fail(String),
}

/// Fold one event into the timeline
pub fn apply(timeline: &mut Timeline, event: LiveEvent, now: DateTime<Utc>) -> LiveAction {
    match event {
        LiveEvent::AudioChunk(bytes) => {
            if bytes.is_empty() {
                LiveAction::None
            } else {
                LiveAction::Play(bytes)
            }
        }
        LiveEvent::InputTranscription(text) => {
            timeline.append_user_partial(&text, now);
            LiveAction::None
        }
        LiveEvent::OutputTranscription(text) => {
            timeline.append_model_partial(&text, now);
            LiveAction::None
        }
        LiveEvent::TurnComplete => LiveAction::TurnCommitted {
            user_text: timeline.commit_turn(now),
        },
        LiveEvent::Interrupted => LiveAction::StopPlayback,
        LiveEvent::Error(message) => LiveAction::Fail(message),
    }
}
