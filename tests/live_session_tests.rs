// Integration tests for live voice sessions driven through mock devices

mod common;

use common::*;
use lingo_coach::audio::{decode_base64, AudioFrame};
use lingo_coach::session::{CoachState, LiveEvent, LiveFlow, Role, SessionCoordinator, SessionMode};
use lingo_coach::CoachError;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

struct LiveFixture {
    coordinator: SessionCoordinator,
    service: Arc<MockService>,
    clock: lingo_coach::session::ManualClock,
    handle: LiveHandle,
    output: RecordingOutput,
}

async fn start_live_with(input: ScriptedInput) -> (LiveFixture, Arc<AtomicUsize>) {
    let (channel, handle) = mock_live();
    let service = Arc::new(MockService::new().live(channel).assessment(Ok(sample_report())));
    let clock = clock();
    let output = RecordingOutput::new();
    let input_stops = Arc::clone(&input.stops);

    let mut coordinator = coordinator(Arc::clone(&service), &clock);
    coordinator
        .start_live(Box::new(input), Box::new(output.clone()))
        .await
        .unwrap();

    (
        LiveFixture {
            coordinator,
            service,
            clock,
            handle,
            output,
        },
        input_stops,
    )
}

async fn start_live() -> LiveFixture {
    start_live_with(ScriptedInput::silent()).await.0
}

async fn feed(coordinator: &mut SessionCoordinator, events: Vec<LiveEvent>) -> LiveFlow {
    let mut flow = LiveFlow::Continue;
    for event in events {
        flow = coordinator.handle_live_event(event).await.unwrap();
        if flow != LiveFlow::Continue {
            break;
        }
    }
    flow
}

#[tokio::test]
async fn test_start_live_enters_live_voice() {
    let fx = start_live().await;

    assert_eq!(fx.coordinator.state(), CoachState::LiveVoice);
    assert_eq!(fx.coordinator.session().mode, SessionMode::Live);
    assert!(fx.coordinator.session().active);
    assert!(fx.coordinator.is_live());
    assert!(!fx.coordinator.is_loading());
    assert_eq!(fx.service.live_opens.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_model_transcription_grows_single_trailing_message() {
    let mut fx = start_live().await;

    feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::OutputTranscription("Hi".into()),
            LiveEvent::OutputTranscription(" there".into()),
        ],
    )
    .await;

    let messages = fx.coordinator.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].role, Role::Model);
    assert_eq!(messages[0].content, "Hi there");
}

#[tokio::test]
async fn test_turn_complete_orders_user_before_model() {
    let mut fx = start_live().await;

    feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::OutputTranscription("Es un ".into()),
            LiveEvent::InputTranscription("what is this".into()),
            LiveEvent::OutputTranscription("libro.".into()),
            LiveEvent::TurnComplete,
        ],
    )
    .await;

    let messages = fx.coordinator.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(messages[0].role, Role::User);
    assert_eq!(messages[0].content, "what is this");
    assert_eq!(messages[1].role, Role::Model);
    assert_eq!(messages[1].content, "Es un libro.");

    // Both buffers start empty for the next turn
    assert!(fx.coordinator.timeline().pending().is_empty());
    feed(&mut fx.coordinator, vec![LiveEvent::OutputTranscription("Vale".into())]).await;
    let messages = fx.coordinator.messages();
    assert_eq!(messages.len(), 3);
    assert_eq!(messages[2].content, "Vale");
}

#[tokio::test]
async fn test_audio_chunks_play_back_to_back() {
    let mut fx = start_live().await;

    fx.output.set_now(0.0);
    feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(pcm_ms(500))]).await;
    fx.output.set_now(0.2);
    feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(pcm_ms(250))]).await;
    fx.output.set_now(0.3);
    feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(pcm_ms(100))]).await;

    let scheduled = fx.output.scheduled();
    let starts: Vec<f64> = scheduled.iter().map(|(_, start, _)| *start).collect();
    assert_eq!(starts.len(), 3);
    assert!((starts[0] - 0.0).abs() < 1e-9);
    assert!((starts[1] - 0.5).abs() < 1e-9);
    assert!((starts[2] - 0.75).abs() < 1e-9);
    assert!((fx.coordinator.playback().next_start_time() - 0.85).abs() < 1e-9);
}

#[tokio::test]
async fn test_late_chunk_starts_now_without_overlap() {
    let mut fx = start_live().await;

    for (now, ms) in [(0.0, 200), (0.1, 200), (1.5, 300), (1.6, 100), (4.0, 50)] {
        fx.output.set_now(now);
        feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(pcm_ms(ms))]).await;
        let scheduled = fx.output.scheduled();
        let (_, start, _) = scheduled[scheduled.len() - 1];
        assert!(start >= now, "chunk scheduled in the past");
    }

    let scheduled = fx.output.scheduled();
    for pair in scheduled.windows(2) {
        let (_, prev_start, prev_len) = pair[0];
        let (_, start, _) = pair[1];
        assert!(start >= prev_start);
        assert!(start + 1e-9 >= prev_start + prev_len, "chunks overlap");
    }
    assert!((scheduled[2].1 - 1.5).abs() < 1e-9);
    assert!((scheduled[4].1 - 4.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_empty_audio_chunk_is_ignored() {
    let mut fx = start_live().await;

    let flow = feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(Vec::new())]).await;
    assert_eq!(flow, LiveFlow::Continue);
    assert!(fx.output.scheduled().is_empty());
}

#[tokio::test]
async fn test_interrupt_stops_all_sources() {
    let mut fx = start_live().await;

    feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::AudioChunk(pcm_ms(400)),
            LiveEvent::AudioChunk(pcm_ms(400)),
            LiveEvent::AudioChunk(pcm_ms(400)),
        ],
    )
    .await;
    assert_eq!(fx.coordinator.playback().active_sources(), 3);

    let flow = feed(&mut fx.coordinator, vec![LiveEvent::Interrupted]).await;
    assert_eq!(flow, LiveFlow::Continue);

    let mut stopped = fx.output.stopped();
    stopped.sort_unstable();
    assert_eq!(stopped, vec![1, 2, 3]);
    assert_eq!(fx.coordinator.playback().active_sources(), 0);
    assert_eq!(fx.coordinator.playback().next_start_time(), 0.0);

    // Next chunk starts at the device clock again
    fx.output.set_now(0.1);
    feed(&mut fx.coordinator, vec![LiveEvent::AudioChunk(pcm_ms(100))]).await;
    let scheduled = fx.output.scheduled();
    assert!((scheduled[3].1 - 0.1).abs() < 1e-9);
}

#[tokio::test]
async fn test_spoken_trigger_after_gate_assesses_and_stops() {
    let mut fx = start_live().await;
    fx.clock.advance_ms(THRESHOLD_MS);

    for event in [
        LiveEvent::InputTranscription("How did I do?".into()),
        LiveEvent::OutputTranscription("Let me check.".into()),
        LiveEvent::TurnComplete,
        // Never pulled: the session stops on the trigger turn
        LiveEvent::AudioChunk(pcm_ms(300)),
    ] {
        fx.handle.events.send(event).unwrap();
    }

    let flow = fx.coordinator.run_live().await.unwrap();

    assert_eq!(flow, LiveFlow::Assessed);
    assert_eq!(fx.coordinator.state(), CoachState::ReportReady);
    assert_eq!(fx.handle.closes.load(Ordering::SeqCst), 1);
    assert!(!fx.coordinator.is_live());
    assert!(fx.output.scheduled().is_empty());
    assert_eq!(fx.output.releases(), 1);

    let transcripts = fx.service.transcripts();
    assert_eq!(transcripts, vec!["User: How did I do?\nCoach: Let me check.".to_string()]);
}

#[tokio::test]
async fn test_spoken_trigger_before_gate_keeps_talking() {
    let mut fx = start_live().await;
    fx.clock.advance_ms(THRESHOLD_MS - 1);

    let flow = feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::InputTranscription("give me my report".into()),
            LiveEvent::TurnComplete,
        ],
    )
    .await;

    assert_eq!(flow, LiveFlow::Continue);
    assert_eq!(fx.coordinator.state(), CoachState::LiveVoice);
    assert!(fx.service.transcripts().is_empty());
    assert_eq!(fx.handle.closes.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_stop_live_is_idempotent() {
    let (mut fx, input_stops) = start_live_with(ScriptedInput::silent()).await;

    feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::AudioChunk(pcm_ms(200)),
            LiveEvent::InputTranscription("hasta luego".into()),
        ],
    )
    .await;

    fx.coordinator.stop_live().await;
    fx.coordinator.stop_live().await;

    assert_eq!(fx.coordinator.state(), CoachState::Idle);
    assert!(!fx.coordinator.session().active);
    assert_eq!(fx.handle.closes.load(Ordering::SeqCst), 1);
    assert_eq!(input_stops.load(Ordering::SeqCst), 1);
    assert_eq!(fx.output.releases(), 1);
    assert_eq!(fx.output.stopped(), vec![1]);

    // The half-finished turn is kept
    let messages = fx.coordinator.messages();
    assert_eq!(messages.len(), 1);
    assert_eq!(messages[0].content, "hasta luego");

    // Events after the stop are ignored
    let flow = fx
        .coordinator
        .handle_live_event(LiveEvent::OutputTranscription("late".into()))
        .await
        .unwrap();
    assert_eq!(flow, LiveFlow::Stopped);
}

#[tokio::test]
async fn test_microphone_frames_are_forwarded() {
    let frames = (0..3)
        .map(|i| AudioFrame {
            samples: vec![0.25; 1600],
            sample_rate: 16000,
            channels: 1,
            timestamp_ms: i * 100,
        })
        .collect();
    let (mut fx, _) = start_live_with(ScriptedInput::new(frames)).await;

    for _ in 0..3 {
        let blob = fx.handle.frames.recv().await.unwrap();
        assert_eq!(blob.mime_type, "audio/pcm;rate=16000");
        let bytes = decode_base64(&blob.data).unwrap();
        assert_eq!(bytes.len(), 3200);
        assert_eq!(i16::from_le_bytes([bytes[0], bytes[1]]), 8192);
    }

    fx.coordinator.stop_live().await;
}

#[tokio::test]
async fn test_remote_error_ends_session() {
    let mut fx = start_live().await;

    let flow = feed(&mut fx.coordinator, vec![LiveEvent::Error("socket reset".into())]).await;

    assert_eq!(flow, LiveFlow::Stopped);
    assert_eq!(fx.coordinator.state(), CoachState::Idle);
    assert_eq!(fx.handle.closes.load(Ordering::SeqCst), 1);
    assert_eq!(fx.output.releases(), 1);

    let notices = fx.coordinator.take_notices();
    assert_eq!(notices.len(), 1);
    assert!(notices[0].contains("socket reset"));
}

#[tokio::test]
async fn test_remote_close_ends_run_loop() {
    let mut fx = start_live().await;

    fx.handle.events.send(LiveEvent::OutputTranscription("Adiós".into())).unwrap();
    fx.handle.events.send(LiveEvent::TurnComplete).unwrap();
    let LiveHandle { events, .. } = fx.handle;
    drop(events);

    let flow = fx.coordinator.run_live().await.unwrap();

    assert_eq!(flow, LiveFlow::Stopped);
    assert_eq!(fx.coordinator.state(), CoachState::Idle);
    assert_eq!(fx.coordinator.messages().len(), 1);
    assert_eq!(fx.output.releases(), 1);
}

#[tokio::test]
async fn test_open_failure_leaves_idle() {
    let service = Arc::new(MockService::new().live_error(CoachError::remote("permission denied")));
    let clock = clock();
    let output = RecordingOutput::new();
    let mut coordinator = coordinator(service, &clock);

    let err = coordinator
        .start_live(Box::new(ScriptedInput::silent()), Box::new(output.clone()))
        .await
        .unwrap_err();

    assert!(matches!(err, CoachError::RemoteService(_)));
    assert_eq!(coordinator.state(), CoachState::Idle);
    assert!(!coordinator.is_live());
    assert!(!coordinator.session().active);
    assert_eq!(output.releases(), 1);
    assert_eq!(coordinator.take_notices().len(), 1);
}

#[tokio::test]
async fn test_live_rejected_during_text_chat() {
    let service = Arc::new(MockService::new());
    let clock = clock();
    let mut coordinator = coordinator(Arc::clone(&service), &clock);
    coordinator.start_text_chat().await.unwrap();

    let err = coordinator
        .start_live(Box::new(ScriptedInput::silent()), Box::new(RecordingOutput::new()))
        .await
        .unwrap_err();

    assert!(matches!(err, CoachError::InvalidState(_)));
    assert_eq!(coordinator.state(), CoachState::TextChatting);
    assert_eq!(service.live_opens.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn test_explicit_request_during_live_stops_first() {
    let mut fx = start_live().await;
    feed(
        &mut fx.coordinator,
        vec![
            LiveEvent::InputTranscription("Quiero un té".into()),
            LiveEvent::OutputTranscription("Claro.".into()),
            LiveEvent::TurnComplete,
        ],
    )
    .await;
    fx.clock.advance_ms(THRESHOLD_MS);

    fx.coordinator.request_assessment().await.unwrap();

    assert_eq!(fx.coordinator.state(), CoachState::ReportReady);
    assert_eq!(fx.handle.closes.load(Ordering::SeqCst), 1);
    assert_eq!(
        fx.service.transcripts(),
        vec!["User: Quiero un té\nCoach: Claro.".to_string()]
    );
}
