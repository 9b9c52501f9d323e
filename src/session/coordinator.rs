use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::clock::Clock;
use super::gate::{
    TimerGate, TriggerPhrases, DEFAULT_ASSESSMENT_THRESHOLD_MS, DEFAULT_TRIGGER_PHRASES,
};
use super::live::{self, LiveAction, LiveEvent};
use super::model::{format_transcript, CoachState, CoachingProfile, Message, Session, SessionMode};
use super::report::{export_file_name, AssessmentReport};
use super::timeline::Timeline;
use crate::audio::{
    decode_to_buffer, encode_frame, AudioFrame, AudioInput, AudioOutputScheduler, PlaybackQueue,
    SpeechCapture,
};
use crate::config::Config;
use crate::error::{CoachError, CoachResult};
use crate::gemini::{
    prompts, AudioUplink, ChatSession, CoachingService, LiveChannel, LiveSessionConfig,
};

/// Tunables for a coordinator
#[derive(Debug, Clone)]
pub struct CoordinatorSettings {
    pub profile: CoachingProfile,
    pub assessment_threshold_ms: u64,
    pub trigger_phrases: Vec<String>,
    /// Sample rate of live audio chunks from the model
    pub output_sample_rate: u32,
    pub output_channels: u16,
    /// Sample rate of the synthesized report readout
    pub speech_sample_rate: u32,
    pub product_name: String,
}

impl CoordinatorSettings {
    pub fn from_config(cfg: &Config) -> Self {
        Self {
            profile: CoachingProfile::from(&cfg.coaching),
            assessment_threshold_ms: cfg.coaching.assessment_threshold_ms,
            trigger_phrases: cfg.coaching.trigger_phrases.clone(),
            output_sample_rate: cfg.audio.output_sample_rate,
            output_channels: cfg.audio.channels,
            speech_sample_rate: cfg.audio.speech_sample_rate,
            product_name: cfg.service.product_name.clone(),
        }
    }
}

impl Default for CoordinatorSettings {
    fn default() -> Self {
        Self {
            profile: CoachingProfile {
                language: "Spanish".to_string(),
                scenario: "Ordering at a cafe".to_string(),
                topic: "Everyday small talk".to_string(),
            },
            assessment_threshold_ms: DEFAULT_ASSESSMENT_THRESHOLD_MS,
            trigger_phrases: DEFAULT_TRIGGER_PHRASES.iter().map(|p| p.to_string()).collect(),
            output_sample_rate: 24000,
            output_channels: 1,
            speech_sample_rate: 24000,
            product_name: "Lingo Coach".to_string(),
        }
    }
}

/// Whether the live loop should keep pulling events
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LiveFlow {
    Continue,
    /// The session closed (user stop, remote close or remote error)
    Stopped,
    /// A trigger phrase ended the session and a report was produced
    Assessed,
}

/// Exported report ready to offer as a download
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportExport {
    pub file_name: String,
    pub contents: String,
}

/// Serializable view of the coordinator for presentation layers
#[derive(Debug, Clone, Serialize)]
pub struct CoordinatorSnapshot {
    pub state: CoachState,
    pub mode: SessionMode,
    pub session_id: Option<uuid::Uuid>,
    pub elapsed_ms: u64,
    pub can_request_assessment: bool,
    pub assessment_unlocks_in_ms: u64,
    pub loading: bool,
    pub draft: String,
    pub messages: Vec<Message>,
    pub pending_user_transcript: String,
    pub has_report: bool,
    pub notices: Vec<String>,
}

/// Resources held while a live session is open
///
/// Dropping releases whatever `SessionCoordinator::stop_live` did not.
struct LiveResources {
    channel: Box<dyn LiveChannel>,
    input: Box<dyn AudioInput>,
    output: Box<dyn AudioOutputScheduler>,
    pump: Option<JoinHandle<()>>,
}

impl Drop for LiveResources {
    fn drop(&mut self) {
        if let Some(pump) = self.pump.take() {
            pump.abort();
        }
        if let Err(e) = self.output.release() {
            warn!("Failed to release {} output: {}", self.output.name(), e);
        }
    }
}

/// Dictation in progress; phrases are folded into the draft on poll or stop
struct Dictation {
    capture: Box<dyn SpeechCapture>,
    results: mpsc::Receiver<String>,
}

/// Holds the loading flag for one remote call
///
/// The flag clears on drop, so a cancelled call does not leave it set.
struct Busy<'a>(&'a mut bool);

impl<'a> Busy<'a> {
    fn new(loading: &'a mut bool) -> Self {
        *loading = true;
        Self(loading)
    }
}

impl Drop for Busy<'_> {
    fn drop(&mut self) {
        *self.0 = false;
    }
}

/// Puts an assessment back into text chat unless the caller moves on
///
/// Dropped after the remote call returns or when the enclosing future is
/// cancelled; the success path then sets `ReportReady` itself.
struct AssessmentRollback<'a> {
    state: &'a mut CoachState,
    session: &'a mut Session,
    loading: &'a mut bool,
    now: DateTime<Utc>,
}

impl<'a> AssessmentRollback<'a> {
    fn begin(
        state: &'a mut CoachState,
        session: &'a mut Session,
        loading: &'a mut bool,
        now: DateTime<Utc>,
    ) -> Self {
        *state = CoachState::Assessing;
        *loading = true;
        Self {
            state,
            session,
            loading,
            now,
        }
    }
}

impl Drop for AssessmentRollback<'_> {
    fn drop(&mut self) {
        *self.state = CoachState::TextChatting;
        *self.loading = false;
        self.session.begin(SessionMode::Text, self.now);
    }
}

/// Owns conversation state, session timing, live playback and the
/// assessment gate. Exactly one session exists at a time.
pub struct SessionCoordinator {
    service: Arc<dyn CoachingService>,
    clock: Arc<dyn Clock>,
    settings: CoordinatorSettings,
    gate: TimerGate,
    triggers: TriggerPhrases,

    state: CoachState,
    session: Session,
    timeline: Timeline,
    draft: String,
    loading: bool,
    notices: Vec<String>,

    chat: Option<ChatSession>,
    report: Option<AssessmentReport>,

    live: Option<LiveResources>,
    dictation: Option<Dictation>,
    playback: PlaybackQueue,
    /// Device for the report readout; absent means the readout is skipped
    readout_output: Option<Box<dyn AudioOutputScheduler>>,
}

impl SessionCoordinator {
    pub fn new(
        service: Arc<dyn CoachingService>,
        clock: Arc<dyn Clock>,
        settings: CoordinatorSettings,
    ) -> Self {
        Self {
            service,
            clock,
            gate: TimerGate::new(settings.assessment_threshold_ms),
            triggers: TriggerPhrases::new(&settings.trigger_phrases),
            settings,
            state: CoachState::Idle,
            session: Session::default(),
            timeline: Timeline::new(),
            draft: String::new(),
            loading: false,
            notices: Vec::new(),
            chat: None,
            report: None,
            live: None,
            dictation: None,
            playback: PlaybackQueue::new(),
            readout_output: None,
        }
    }

    pub fn with_readout_output(mut self, output: Box<dyn AudioOutputScheduler>) -> Self {
        self.readout_output = Some(output);
        self
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> CoachState {
        self.state
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn profile(&self) -> &CoachingProfile {
        &self.settings.profile
    }

    /// Visible timeline, including the model reply still being transcribed
    pub fn messages(&self) -> Vec<Message> {
        self.timeline.messages()
    }

    pub fn timeline(&self) -> &Timeline {
        &self.timeline
    }

    pub fn draft(&self) -> &str {
        &self.draft
    }

    pub fn set_draft(&mut self, text: impl Into<String>) {
        self.draft = text.into();
    }

    pub fn is_loading(&self) -> bool {
        self.loading
    }

    pub fn is_live(&self) -> bool {
        self.live.is_some()
    }

    pub fn is_dictating(&self) -> bool {
        self.dictation.is_some()
    }

    pub fn report(&self) -> Option<&AssessmentReport> {
        self.report.as_ref()
    }

    pub fn playback(&self) -> &PlaybackQueue {
        &self.playback
    }

    /// Drain user-visible failure notices
    pub fn take_notices(&mut self) -> Vec<String> {
        std::mem::take(&mut self.notices)
    }

    pub fn snapshot(&self) -> CoordinatorSnapshot {
        CoordinatorSnapshot {
            state: self.state,
            mode: self.session.mode,
            session_id: self.session.id,
            elapsed_ms: self.elapsed_ms(),
            can_request_assessment: self.can_request_assessment(),
            assessment_unlocks_in_ms: self
                .gate
                .remaining_ms(self.session.start_time, self.clock.now()),
            loading: self.loading,
            draft: self.draft.clone(),
            messages: self.timeline.messages(),
            pending_user_transcript: self.timeline.pending().user.clone(),
            has_report: self.report.is_some(),
            notices: self.notices.clone(),
        }
    }

    // ========================================================================
    // Timer gate
    // ========================================================================

    pub fn elapsed_ms(&self) -> u64 {
        TimerGate::elapsed_ms(self.session.start_time, self.clock.now())
    }

    /// Recomputed from the clock on every call
    pub fn can_request_assessment(&self) -> bool {
        self.gate.is_open(self.session.start_time, self.clock.now())
    }

    // ========================================================================
    // Text chat
    // ========================================================================

    /// Change language, scenario or topic; the next chat turn uses a fresh context
    pub fn configure(&mut self, profile: CoachingProfile) -> CoachResult<()> {
        if matches!(self.state, CoachState::LiveVoice | CoachState::Assessing) {
            return Err(CoachError::invalid_state(
                "cannot change the profile during a live session or assessment",
            ));
        }
        info!(
            "Profile set: {} / {} / {}",
            profile.language, profile.scenario, profile.topic
        );
        self.settings.profile = profile;
        self.chat = None;
        Ok(())
    }

    pub async fn start_text_chat(&mut self) -> CoachResult<()> {
        match self.state {
            CoachState::TextChatting => return Ok(()),
            CoachState::LiveVoice => {
                return Err(CoachError::invalid_state(
                    "stop the live session before starting text chat",
                ));
            }
            CoachState::Assessing => {
                return Err(CoachError::invalid_state("an assessment is in progress"));
            }
            CoachState::ReportReady => self.reset().await,
            CoachState::Idle => {}
        }

        self.session.begin(SessionMode::Text, self.clock.now());
        if self.chat.is_none() {
            self.chat = Some(self.service.open_chat_session(&self.settings.profile));
        }
        self.state = CoachState::TextChatting;
        info!("Text chat started");
        Ok(())
    }

    /// Leave text mode, keeping the conversation and session clock
    pub fn stop_text_chat(&mut self) {
        if self.state == CoachState::TextChatting {
            self.session.pause();
            self.state = CoachState::Idle;
            info!("Text chat stopped");
        }
    }

    /// Send whatever is in the draft
    pub async fn send_draft(&mut self) -> CoachResult<()> {
        let text = std::mem::take(&mut self.draft);
        self.send_text(&text).await
    }

    /// Send one user turn, or redirect it to the assessment when a trigger
    /// phrase is used after the gate has opened
    pub async fn send_text(&mut self, text: &str) -> CoachResult<()> {
        let text = text.trim();
        if text.is_empty() {
            return Ok(());
        }

        match self.state {
            CoachState::Idle => self.start_text_chat().await?,
            CoachState::TextChatting => {}
            other => {
                return Err(CoachError::invalid_state(format!(
                    "cannot send a text turn while {:?}",
                    other
                )));
            }
        }

        // Optimistic: the user turn is visible before the network call
        self.timeline.push(Message::user(text, self.clock.now()));
        self.draft.clear();

        if self.triggers.matches(text) && self.can_request_assessment() {
            info!("Trigger phrase received; generating assessment");
            return self.run_assessment().await;
        }

        if self.chat.is_none() {
            self.chat = Some(self.service.open_chat_session(&self.settings.profile));
        }
        let Some(chat) = self.chat.as_mut() else {
            return Err(CoachError::invalid_state("no chat session"));
        };

        let busy = Busy::new(&mut self.loading);
        let result = self.service.send_message(chat, text).await;
        drop(busy);

        match result {
            Ok(reply) => {
                self.timeline.push(Message::model(reply, self.clock.now()));
                Ok(())
            }
            Err(e) => {
                error!("Chat turn failed: {}", e);
                Err(e)
            }
        }
    }

    /// Start dictating into the draft with platform speech recognition
    pub async fn start_dictation(
        &mut self,
        mut capture: Box<dyn SpeechCapture>,
    ) -> CoachResult<()> {
        if self.dictation.is_some() {
            return Err(CoachError::invalid_state("dictation is already running"));
        }

        let results = match capture.start(&self.settings.profile.language).await {
            Ok(rx) => rx,
            Err(e) => {
                warn!("Dictation unavailable: {}", e);
                self.notices.push(e.to_string());
                return Err(e);
            }
        };

        self.dictation = Some(Dictation { capture, results });
        info!("Dictation started");
        Ok(())
    }

    /// Append phrases recognized so far to the draft; returns how many arrived
    pub fn poll_dictation(&mut self) -> usize {
        let Some(dictation) = self.dictation.as_mut() else {
            return 0;
        };
        let mut received = 0;
        while let Ok(phrase) = dictation.results.try_recv() {
            append_phrase(&mut self.draft, &phrase);
            received += 1;
        }
        received
    }

    /// Stop recognition and return the draft
    ///
    /// Phrases the capture delivered before it stopped are kept; nothing
    /// recognized afterwards reaches the draft.
    pub async fn stop_dictation(&mut self) -> String {
        let Some(mut dictation) = self.dictation.take() else {
            return self.draft.clone();
        };

        if let Err(e) = dictation.capture.stop().await {
            warn!("Failed to stop speech capture: {}", e);
        }
        dictation.results.close();
        while let Ok(phrase) = dictation.results.try_recv() {
            append_phrase(&mut self.draft, &phrase);
        }

        info!("Dictation stopped");
        self.draft.clone()
    }

    // ========================================================================
    // Live voice
    // ========================================================================

    /// Open a live session and start streaming the microphone
    pub async fn start_live(
        &mut self,
        mut input: Box<dyn AudioInput>,
        mut output: Box<dyn AudioOutputScheduler>,
    ) -> CoachResult<()> {
        match self.state {
            CoachState::Idle => {}
            CoachState::ReportReady => self.reset().await,
            CoachState::TextChatting => {
                return Err(CoachError::invalid_state("stop the text chat before starting voice"));
            }
            CoachState::LiveVoice => {
                return Err(CoachError::invalid_state("a live session is already running"));
            }
            CoachState::Assessing => {
                return Err(CoachError::invalid_state("an assessment is in progress"));
            }
        }

        let config = LiveSessionConfig {
            profile: self.settings.profile.clone(),
            system_instruction: prompts::live_system_instruction(&self.settings.profile),
        };

        let busy = Busy::new(&mut self.loading);
        let opened = self.service.open_live_session(config).await;
        drop(busy);

        let mut channel = match opened {
            Ok(channel) => channel,
            Err(e) => {
                error!("Failed to open live session: {}", e);
                self.abort_live_start(output.as_mut(), &e);
                return Err(e);
            }
        };

        let frames = match input.start().await {
            Ok(frames) => frames,
            Err(e) => {
                error!("Failed to start {} input: {}", input.name(), e);
                if let Err(close_err) = channel.close().await {
                    warn!("Failed to close live session: {}", close_err);
                }
                self.abort_live_start(output.as_mut(), &e);
                return Err(e);
            }
        };

        self.session.begin(SessionMode::Live, self.clock.now());
        let pump = tokio::spawn(pump_microphone(frames, channel.uplink()));

        self.playback.clear();
        self.timeline.discard_pending();
        self.live = Some(LiveResources {
            channel,
            input,
            output,
            pump: Some(pump),
        });
        self.state = CoachState::LiveVoice;

        info!("Live session started");
        Ok(())
    }

    fn abort_live_start(&mut self, output: &mut dyn AudioOutputScheduler, err: &CoachError) {
        if let Err(e) = output.release() {
            warn!("Failed to release {} output: {}", output.name(), e);
        }
        self.notices.push(err.to_string());
    }

    /// Pull events until the session stops or triggers an assessment
    pub async fn run_live(&mut self) -> CoachResult<LiveFlow> {
        loop {
            let event = match self.live.as_mut() {
                Some(live) => live.channel.next_event().await,
                None => return Ok(LiveFlow::Stopped),
            };

            let Some(event) = event else {
                info!("Live session ended by the remote side");
                self.stop_live().await;
                return Ok(LiveFlow::Stopped);
            };

            let flow = self.handle_live_event(event).await?;
            if flow != LiveFlow::Continue {
                return Ok(flow);
            }
        }
    }

    /// Apply one live event
    ///
    /// A trigger phrase stops the session inside this call, before any
    /// further event can be pulled.
    pub async fn handle_live_event(&mut self, event: LiveEvent) -> CoachResult<LiveFlow> {
        if self.state != CoachState::LiveVoice {
            debug!("Ignoring live event outside a live session: {:?}", event);
            return Ok(LiveFlow::Stopped);
        }

        match live::apply(&mut self.timeline, event, self.clock.now()) {
            LiveAction::None => Ok(LiveFlow::Continue),
            LiveAction::Play(bytes) => {
                self.schedule_live_audio(&bytes);
                Ok(LiveFlow::Continue)
            }
            LiveAction::StopPlayback => {
                if let Some(live) = self.live.as_mut() {
                    let stopped = self.playback.interrupt(live.output.as_mut());
                    debug!("Interrupted: stopped {} sources", stopped);
                } else {
                    self.playback.clear();
                }
                Ok(LiveFlow::Continue)
            }
            LiveAction::TurnCommitted { user_text } => {
                if !user_text.is_empty()
                    && self.triggers.matches(&user_text)
                    && self.can_request_assessment()
                {
                    info!("Trigger phrase spoken; ending live session for assessment");
                    self.stop_live().await;
                    self.run_assessment().await?;
                    return Ok(LiveFlow::Assessed);
                }
                Ok(LiveFlow::Continue)
            }
            LiveAction::Fail(message) => {
                error!("Live session error: {}", message);
                self.notices.push(format!("Voice session ended: {}", message));
                self.stop_live().await;
                Ok(LiveFlow::Stopped)
            }
        }
    }

    fn schedule_live_audio(&mut self, bytes: &[u8]) {
        let Some(live) = self.live.as_mut() else {
            return;
        };
        let rate = self.settings.output_sample_rate;
        let buffer = match decode_to_buffer(bytes, rate, self.settings.output_channels) {
            Ok(buffer) => buffer,
            Err(e) => {
                warn!("Dropping undecodable audio chunk: {}", e);
                return;
            }
        };
        if let Err(e) = self.playback.schedule(live.output.as_mut(), buffer) {
            warn!("Failed to schedule audio chunk: {}", e);
        }
    }

    /// Close the live session and release audio; safe to call at any time
    pub async fn stop_live(&mut self) {
        let Some(mut live) = self.live.take() else {
            if self.state == CoachState::LiveVoice {
                self.state = CoachState::Idle;
            }
            return;
        };

        info!("Stopping live session");

        if let Some(pump) = live.pump.take() {
            pump.abort();
        }
        if let Err(e) = live.channel.close().await {
            warn!("Failed to close live session: {}", e);
        }
        if let Err(e) = live.input.stop().await {
            warn!("Failed to stop {} input: {}", live.input.name(), e);
        }
        self.playback.interrupt(live.output.as_mut());
        drop(live);

        // Keep whatever was said before the stop
        self.timeline.commit_turn(self.clock.now());

        if self.state == CoachState::LiveVoice {
            self.state = CoachState::Idle;
            self.session.pause();
        }
        info!("Live session stopped");
    }

    // ========================================================================
    // Assessment
    // ========================================================================

    /// Explicit request (button or API); honours the timer gate
    pub async fn request_assessment(&mut self) -> CoachResult<()> {
        if !self.can_request_assessment() {
            let remaining_ms = self.gate.remaining_ms(self.session.start_time, self.clock.now());
            return Err(CoachError::AssessmentLocked { remaining_ms });
        }
        match self.state {
            CoachState::Assessing => {
                return Err(CoachError::invalid_state("an assessment is already in progress"));
            }
            CoachState::ReportReady => {
                return Err(CoachError::invalid_state("the report is already available"));
            }
            CoachState::LiveVoice => self.stop_live().await,
            CoachState::Idle | CoachState::TextChatting => {}
        }
        self.run_assessment().await
    }

    async fn run_assessment(&mut self) -> CoachResult<()> {
        self.report = None;
        let transcript = format_transcript(self.timeline.committed());

        let rollback = AssessmentRollback::begin(
            &mut self.state,
            &mut self.session,
            &mut self.loading,
            self.clock.now(),
        );
        let result = self.service.synthesize_assessment(&transcript).await;
        drop(rollback);

        match result {
            Ok(report) => {
                info!("Assessment ready: {}", report.score);
                let readout = report.readout();
                self.report = Some(report);
                self.state = CoachState::ReportReady;
                self.session.active = false;
                self.play_readout(&readout).await;
                Ok(())
            }
            Err(e) => {
                error!("Assessment failed: {}", e);
                self.notices.push(
                    "Sorry, the assessment could not be generated. Please try again.".to_string(),
                );
                Err(e)
            }
        }
    }

    /// Speak the readout if speech and an output device are available
    async fn play_readout(&mut self, text: &str) {
        let Some(bytes) = self.service.synthesize_speech(text).await else {
            debug!("No readout audio");
            return;
        };
        let Some(output) = self.readout_output.as_mut() else {
            debug!("No readout output configured");
            return;
        };

        match decode_to_buffer(&bytes, self.settings.speech_sample_rate, 1) {
            Ok(buffer) => {
                if let Err(e) = self.playback.schedule(output.as_mut(), buffer) {
                    warn!("Failed to play readout: {}", e);
                }
            }
            Err(e) => warn!("Readout audio unreadable: {}", e),
        }
    }

    pub fn export_report(&self) -> Option<ReportExport> {
        let report = self.report.as_ref()?;
        Some(ReportExport {
            file_name: export_file_name(&self.settings.product_name),
            contents: report.export_text(&self.settings.product_name),
        })
    }

    // ========================================================================
    // Reset
    // ========================================================================

    /// Return to `Idle`, clearing messages, timing and the report
    pub async fn reset(&mut self) {
        self.stop_live().await;
        self.stop_dictation().await;

        if let Some(output) = self.readout_output.as_mut() {
            self.playback.interrupt(output.as_mut());
        }
        self.playback.clear();

        self.state = CoachState::Idle;
        self.session = Session::default();
        self.timeline.clear();
        self.draft.clear();
        self.loading = false;
        self.notices.clear();
        self.chat = None;
        self.report = None;

        info!("Session reset");
    }
}

impl Drop for SessionCoordinator {
    fn drop(&mut self) {
        if let Some(output) = self.readout_output.as_mut() {
            if let Err(e) = output.release() {
                warn!("Failed to release {} output: {}", output.name(), e);
            }
        }
    }
}

fn append_phrase(draft: &mut String, phrase: &str) {
    let phrase = phrase.trim();
    if phrase.is_empty() {
        return;
    }
    if !draft.is_empty() {
        draft.push(' ');
    }
    draft.push_str(phrase);
}

/// Encode and forward microphone frames until either side closes
async fn pump_microphone(mut frames: mpsc::Receiver<AudioFrame>, uplink: AudioUplink) {
    let mut sent = 0usize;
    while let Some(frame) = frames.recv().await {
        let blob = encode_frame(&frame.samples, frame.sample_rate);
        if !uplink.send(blob) {
            break;
        }
        sent += 1;
    }
    debug!("Microphone pump finished after {} frames", sent);
}
