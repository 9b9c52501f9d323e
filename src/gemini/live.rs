use async_trait::async_trait;
use futures::{SinkExt, StreamExt};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, error, info, warn};

use super::messages::{
    Content, EmptyObject, GenerationConfig, LiveServerMessage, LiveSetup, LiveSetupMessage,
    RealtimeInput, RealtimeInputMessage, SpeechConfig,
};
use super::service::{AudioUplink, LiveChannel, LiveSessionConfig};
use crate::audio::decode_base64;
use crate::config::GeminiConfig;
use crate::error::{CoachError, CoachResult};
use crate::session::LiveEvent;

/// Live session over the BidiGenerateContent WebSocket
pub struct GeminiLiveChannel {
    uplink: AudioUplink,
    events: mpsc::Receiver<LiveEvent>,
    shutdown: Option<oneshot::Sender<()>>,
    writer: Option<JoinHandle<()>>,
    reader: Option<JoinHandle<()>>,
}

impl GeminiLiveChannel {
    /// Connect, send the setup message and wait for `setupComplete`
    pub async fn connect(
        config: &GeminiConfig,
        api_key: &str,
        session: LiveSessionConfig,
    ) -> CoachResult<Self> {
        let url = format!("{}?key={}", config.live_url, api_key);
        let connect_timeout = Duration::from_secs(config.request_timeout_secs);

        info!("Opening live session with {}", config.live_model);

        let connecting = tokio_tungstenite::connect_async(url);
        let (mut ws, _) = tokio::time::timeout(connect_timeout, connecting)
            .await
            .map_err(|_| CoachError::remote("Timed out connecting to live session"))?
            .map_err(|e| CoachError::remote(format!("Failed to connect to live session: {}", e)))?;

        let setup = LiveSetupMessage {
            setup: LiveSetup {
                model: config.live_model.clone(),
                generation_config: GenerationConfig {
                    response_modalities: Some(vec!["AUDIO".to_string()]),
                    speech_config: Some(SpeechConfig::voice(&config.voice_name)),
                    ..Default::default()
                },
                system_instruction: Content::system(session.system_instruction),
                input_audio_transcription: EmptyObject {},
                output_audio_transcription: EmptyObject {},
            },
        };
        let payload = serde_json::to_string(&setup)
            .map_err(|e| CoachError::remote(format!("Failed to encode live setup: {}", e)))?;
        ws.send(Message::Text(payload))
            .await
            .map_err(|e| CoachError::remote(format!("Failed to send live setup: {}", e)))?;

        tokio::time::timeout(connect_timeout, wait_for_setup(&mut ws))
            .await
            .map_err(|_| CoachError::remote("Timed out waiting for live session setup"))??;

        info!("Live session ready");

        let (mut sink, mut stream) = ws.split();
        let (uplink, mut uplink_rx) = AudioUplink::channel();
        let (events_tx, events) = mpsc::channel(256);
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();

        let writer = tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => {
                        if let Err(e) = sink.send(Message::Close(None)).await {
                            debug!("Close frame not delivered: {}", e);
                        }
                        break;
                    }
                    blob = uplink_rx.recv() => {
                        let Some(audio) = blob else { break };
                        let message = RealtimeInputMessage {
                            realtime_input: RealtimeInput { audio },
                        };
                        let Ok(text) = serde_json::to_string(&message) else { continue };
                        // No backpressure: a failed frame is dropped
                        if let Err(e) = sink.send(Message::Text(text)).await {
                            debug!("Audio frame send failed: {}", e);
                        }
                    }
                }
            }
            debug!("Live writer task stopped");
        });

        let reader = tokio::spawn(async move {
            while let Some(message) = stream.next().await {
                let bytes = match message {
                    Ok(Message::Text(text)) => text.into_bytes(),
                    Ok(Message::Binary(bytes)) => bytes,
                    Ok(Message::Close(frame)) => {
                        info!("Live session closed by server: {:?}", frame);
                        break;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        error!("Live session read failed: {}", e);
                        let _ = events_tx.send(LiveEvent::Error(e.to_string())).await;
                        break;
                    }
                };

                let parsed = match serde_json::from_slice::<LiveServerMessage>(&bytes) {
                    Ok(parsed) => parsed,
                    Err(e) => {
                        warn!("Failed to parse live server message: {}", e);
                        continue;
                    }
                };

                for event in server_events(parsed) {
                    if events_tx.send(event).await.is_err() {
                        return;
                    }
                }
            }
            debug!("Live reader task stopped");
        });

        Ok(Self {
            uplink,
            events,
            shutdown: Some(shutdown_tx),
            writer: Some(writer),
            reader: Some(reader),
        })
    }
}

async fn wait_for_setup<S>(ws: &mut S) -> CoachResult<()>
where
    S: futures::Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    while let Some(message) = ws.next().await {
        let bytes = match message {
            Ok(Message::Text(text)) => text.into_bytes(),
            Ok(Message::Binary(bytes)) => bytes,
            Ok(Message::Close(frame)) => {
                return Err(CoachError::remote(format!("Live session rejected: {:?}", frame)));
            }
            Ok(_) => continue,
            Err(e) => return Err(CoachError::remote(e.to_string())),
        };
        if let Ok(parsed) = serde_json::from_slice::<LiveServerMessage>(&bytes) {
            if parsed.setup_complete.is_some() {
                return Ok(());
            }
        }
    }
    Err(CoachError::remote("Live session closed during setup"))
}

/// Flatten one server message into events, transcriptions before audio
/// and turn completion last
pub(crate) fn server_events(message: LiveServerMessage) -> Vec<LiveEvent> {
    let mut events = Vec::new();

    if message.go_away.is_some() {
        warn!("Live session will be closed by the server soon");
    }

    let Some(content) = message.server_content else {
        return events;
    };

    if let Some(t) = content.input_transcription.filter(|t| !t.text.is_empty()) {
        events.push(LiveEvent::InputTranscription(t.text));
    }
    if let Some(t) = content.output_transcription.filter(|t| !t.text.is_empty()) {
        events.push(LiveEvent::OutputTranscription(t.text));
    }

    if let Some(turn) = content.model_turn {
        for inline in turn.parts.into_iter().filter_map(|p| p.inline_data) {
            match decode_base64(&inline.data) {
                Ok(bytes) => events.push(LiveEvent::AudioChunk(bytes)),
                Err(e) => warn!("Skipping undecodable audio chunk: {}", e),
            }
        }
    }

    if content.interrupted {
        events.push(LiveEvent::Interrupted);
    }
    if content.turn_complete {
        events.push(LiveEvent::TurnComplete);
    }

    events
}

#[async_trait]
impl LiveChannel for GeminiLiveChannel {
    fn uplink(&self) -> AudioUplink {
        self.uplink.clone()
    }

    async fn next_event(&mut self) -> Option<LiveEvent> {
        self.events.recv().await
    }

    async fn close(&mut self) -> CoachResult<()> {
        let Some(shutdown) = self.shutdown.take() else {
            return Ok(());
        };

        info!("Closing live session");
        let _ = shutdown.send(());

        if let Some(writer) = self.writer.take() {
            if tokio::time::timeout(Duration::from_secs(2), writer).await.is_err() {
                warn!("Live writer did not stop in time");
            }
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
        self.events.close();
        Ok(())
    }
}

impl Drop for GeminiLiveChannel {
    fn drop(&mut self) {
        if let Some(writer) = self.writer.take() {
            writer.abort();
        }
        if let Some(reader) = self.reader.take() {
            reader.abort();
        }
    }
}
