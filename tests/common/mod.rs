// Shared mock capabilities for integration tests
//
// Every collaborator of the coordinator is replaced by an in-memory fake
// whose calls can be inspected after the fact.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use lingo_coach::audio::{
    AudioFrame, AudioInput, AudioOutputScheduler, PlayableBuffer, SourceId, SpeechCapture, WireBlob,
};
use lingo_coach::gemini::{
    AudioUplink, ChatSession, CoachingService, LiveChannel, LiveSessionConfig,
};
use lingo_coach::session::{
    AssessmentReport, CanDoExample, CoachingProfile, CoordinatorSettings, GrowthExample, LiveEvent,
    ManualClock, PrecisionAnalysis, SessionCoordinator,
};
use lingo_coach::{CoachError, CoachResult};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;

pub const THRESHOLD_MS: i64 = 180_000;

// ============================================================================
// Remote service
// ============================================================================

#[derive(Default)]
pub struct MockService {
    pub replies: Mutex<VecDeque<CoachResult<String>>>,
    pub assessment: Mutex<Option<CoachResult<AssessmentReport>>>,
    pub speech: Mutex<Option<Vec<u8>>>,
    pub live: Mutex<Option<MockLiveChannel>>,
    pub live_error: Mutex<Option<CoachError>>,
    pub sent: Mutex<Vec<String>>,
    pub transcripts: Mutex<Vec<String>>,
    pub speech_requests: Mutex<Vec<String>>,
    pub live_opens: AtomicUsize,
    /// Chat replies and assessments never complete
    pub replies_hang: AtomicBool,
    pub assessment_hangs: AtomicBool,
}

impl MockService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn reply(self, text: &str) -> Self {
        self.replies.lock().unwrap().push_back(Ok(text.to_string()));
        self
    }

    pub fn reply_error(self, err: CoachError) -> Self {
        self.replies.lock().unwrap().push_back(Err(err));
        self
    }

    pub fn assessment(self, result: CoachResult<AssessmentReport>) -> Self {
        *self.assessment.lock().unwrap() = Some(result);
        self
    }

    pub fn speech(self, bytes: Vec<u8>) -> Self {
        *self.speech.lock().unwrap() = Some(bytes);
        self
    }

    pub fn live(self, channel: MockLiveChannel) -> Self {
        *self.live.lock().unwrap() = Some(channel);
        self
    }

    pub fn live_error(self, err: CoachError) -> Self {
        *self.live_error.lock().unwrap() = Some(err);
        self
    }

    pub fn hang_replies(self) -> Self {
        self.replies_hang.store(true, Ordering::SeqCst);
        self
    }

    pub fn hang_assessment(self) -> Self {
        self.assessment_hangs.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }

    pub fn transcripts(&self) -> Vec<String> {
        self.transcripts.lock().unwrap().clone()
    }
}

#[async_trait]
impl CoachingService for MockService {
    fn open_chat_session(&self, profile: &CoachingProfile) -> ChatSession {
        ChatSession::new(profile.clone(), format!("coach in {}", profile.language))
    }

    async fn send_message(&self, _session: &mut ChatSession, text: &str) -> CoachResult<String> {
        self.sent.lock().unwrap().push(text.to_string());
        if self.replies_hang.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.replies
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Ok("¿Y qué más?".to_string()))
    }

    async fn open_live_session(
        &self,
        _config: LiveSessionConfig,
    ) -> CoachResult<Box<dyn LiveChannel>> {
        self.live_opens.fetch_add(1, Ordering::SeqCst);
        if let Some(err) = self.live_error.lock().unwrap().take() {
            return Err(err);
        }
        match self.live.lock().unwrap().take() {
            Some(channel) => Ok(Box::new(channel)),
            None => Err(CoachError::remote("no live channel scripted")),
        }
    }

    async fn synthesize_assessment(&self, transcript: &str) -> CoachResult<AssessmentReport> {
        self.transcripts.lock().unwrap().push(transcript.to_string());
        if self.assessment_hangs.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        self.assessment
            .lock()
            .unwrap()
            .clone()
            .unwrap_or_else(|| Err(CoachError::AssessmentSynthesis("nothing scripted".into())))
    }

    async fn synthesize_speech(&self, text: &str) -> Option<Vec<u8>> {
        self.speech_requests.lock().unwrap().push(text.to_string());
        self.speech.lock().unwrap().clone()
    }
}

// ============================================================================
// Live channel
// ============================================================================

pub struct MockLiveChannel {
    uplink: AudioUplink,
    events: mpsc::UnboundedReceiver<LiveEvent>,
    closes: Arc<AtomicUsize>,
}

/// Test-side ends of a mock live channel
pub struct LiveHandle {
    pub events: mpsc::UnboundedSender<LiveEvent>,
    pub frames: mpsc::UnboundedReceiver<WireBlob>,
    pub closes: Arc<AtomicUsize>,
}

pub fn mock_live() -> (MockLiveChannel, LiveHandle) {
    let (uplink, frames) = AudioUplink::channel();
    let (events_tx, events) = mpsc::unbounded_channel();
    let closes = Arc::new(AtomicUsize::new(0));

    (
        MockLiveChannel {
            uplink,
            events,
            closes: Arc::clone(&closes),
        },
        LiveHandle {
            events: events_tx,
            frames,
            closes,
        },
    )
}

#[async_trait]
impl LiveChannel for MockLiveChannel {
    fn uplink(&self) -> AudioUplink {
        self.uplink.clone()
    }

    async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) -> CoachResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        self.events.close();
        Ok(())
    }
}

// ============================================================================
// Audio devices
// ============================================================================

#[derive(Debug, Default)]
pub struct OutputLog {
    pub now: f64,
    /// (id, start, duration)
    pub scheduled: Vec<(SourceId, f64, f64)>,
    pub stopped: Vec<SourceId>,
    pub releases: usize,
}

/// Output device with a manual clock that records every call
#[derive(Clone, Default)]
pub struct RecordingOutput {
    pub log: Arc<Mutex<OutputLog>>,
}

impl RecordingOutput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_now(&self, now: f64) {
        self.log.lock().unwrap().now = now;
    }

    pub fn scheduled(&self) -> Vec<(SourceId, f64, f64)> {
        self.log.lock().unwrap().scheduled.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.log.lock().unwrap().stopped.clone()
    }

    pub fn releases(&self) -> usize {
        self.log.lock().unwrap().releases
    }
}

impl AudioOutputScheduler for RecordingOutput {
    fn now(&self) -> f64 {
        self.log.lock().unwrap().now
    }

    fn schedule_buffer(&mut self, buffer: PlayableBuffer, start_at: f64) -> CoachResult<SourceId> {
        let mut log = self.log.lock().unwrap();
        let id = log.scheduled.len() as SourceId + 1;
        log.scheduled.push((id, start_at, buffer.duration_secs()));
        Ok(id)
    }

    fn stop(&mut self, id: SourceId) {
        self.log.lock().unwrap().stopped.push(id);
    }

    fn release(&mut self) -> CoachResult<()> {
        self.log.lock().unwrap().releases += 1;
        Ok(())
    }

    fn name(&self) -> &str {
        "recording"
    }
}

/// Microphone that emits a fixed list of frames, then goes quiet
#[derive(Default)]
pub struct ScriptedInput {
    pub frames: Vec<AudioFrame>,
    pub stops: Arc<AtomicUsize>,
    capturing: bool,
}

impl ScriptedInput {
    pub fn new(frames: Vec<AudioFrame>) -> Self {
        Self {
            frames,
            ..Default::default()
        }
    }

    pub fn silent() -> Self {
        Self::default()
    }
}

#[async_trait]
impl AudioInput for ScriptedInput {
    async fn start(&mut self) -> CoachResult<mpsc::Receiver<AudioFrame>> {
        let (tx, rx) = mpsc::channel(self.frames.len() + 1);
        for frame in self.frames.drain(..) {
            tx.try_send(frame).map_err(|e| CoachError::audio(e.to_string()))?;
        }
        self.capturing = true;
        Ok(rx)
    }

    async fn stop(&mut self) -> CoachResult<()> {
        self.capturing = false;
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn is_capturing(&self) -> bool {
        self.capturing
    }

    fn name(&self) -> &str {
        "scripted"
    }
}

/// Speech recognizer fed by the test through a sender
pub struct ScriptedCapture {
    results: Option<mpsc::Receiver<String>>,
    pub stops: Arc<AtomicUsize>,
}

pub fn scripted_capture() -> (ScriptedCapture, mpsc::Sender<String>) {
    let (tx, rx) = mpsc::channel(16);
    (
        ScriptedCapture {
            results: Some(rx),
            stops: Arc::new(AtomicUsize::new(0)),
        },
        tx,
    )
}

#[async_trait]
impl SpeechCapture for ScriptedCapture {
    async fn start(&mut self, _language: &str) -> CoachResult<mpsc::Receiver<String>> {
        self.results
            .take()
            .ok_or_else(|| CoachError::invalid_state("capture already started"))
    }

    async fn stop(&mut self) -> CoachResult<()> {
        self.stops.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

// ============================================================================
// Fixtures
// ============================================================================

pub fn clock() -> ManualClock {
    ManualClock::new(Utc.with_ymd_and_hms(2025, 3, 1, 10, 0, 0).unwrap())
}

pub fn coordinator(service: Arc<MockService>, clock: &ManualClock) -> SessionCoordinator {
    SessionCoordinator::new(
        service,
        Arc::new(clock.clone()),
        CoordinatorSettings::default(),
    )
}

/// PCM bytes lasting `ms` at 24 kHz mono
pub fn pcm_ms(ms: usize) -> Vec<u8> {
    vec![0u8; 24 * ms * 2]
}

pub fn sample_report() -> AssessmentReport {
    AssessmentReport {
        score: "Intermediate Low".to_string(),
        functional_ability: "Can order food and ask simple questions.".to_string(),
        precision_analysis: PrecisionAnalysis {
            vocabulary: "Basic food vocabulary.".to_string(),
            grammar: "Mostly present tense.".to_string(),
            fluency: "Short pauses between phrases.".to_string(),
        },
        content_depth: "Single sentences.".to_string(),
        can_do_examples: vec![CanDoExample {
            quote: "Un café con leche, por favor".to_string(),
            translation: "A coffee with milk, please".to_string(),
        }],
        growth_examples: vec![GrowthExample {
            quote: "Yo tengo veinte años viejo".to_string(),
            correction: "Tengo veinte años".to_string(),
        }],
        summary: "You handle a cafe order confidently.".to_string(),
        full_transcript: "User: Hola\nCoach: ¡Hola! ¿Qué le pongo?".to_string(),
    }
}
