//! Session coordination
//!
//! This module provides the `SessionCoordinator`, which owns:
//! - Session lifecycle and timing (`Idle -> TextChatting | LiveVoice -> Assessing -> ReportReady`)
//! - The conversation timeline, with a pending slot for the live turn
//! - Playback scheduling of synthesized live audio
//! - The timed assessment gate and trigger phrases
//! - The assessment report and its plain-text export

mod clock;
mod coordinator;
mod gate;
mod live;
mod model;
mod report;
mod timeline;

pub use clock::{Clock, ManualClock, SystemClock};
pub use coordinator::{
    CoordinatorSettings, CoordinatorSnapshot, LiveFlow, ReportExport, SessionCoordinator,
};
pub use gate::{
    TimerGate, TriggerPhrases, DEFAULT_ASSESSMENT_THRESHOLD_MS, DEFAULT_TRIGGER_PHRASES,
};
pub use live::{apply as apply_live_event, LiveAction, LiveEvent};
pub use model::{
    format_transcript, CoachState, CoachingProfile, Message, Role, Session, SessionMode,
};
pub use report::{
    export_file_name, AssessmentReport, CanDoExample, ExportedReport, GrowthExample,
    PrecisionAnalysis,
};
pub use timeline::{Timeline, TranscriptionBuffer};
