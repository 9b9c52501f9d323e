use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use std::time::Duration;
use tracing::{debug, error, info, warn};

use super::live::GeminiLiveChannel;
use super::messages::{
    Content, ErrorWrapper, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    SpeechConfig,
};
use super::prompts;
use super::service::{ChatSession, CoachingService, LiveChannel, LiveSessionConfig};
use crate::audio::decode_base64;
use crate::config::GeminiConfig;
use crate::error::{CoachError, CoachResult};
use crate::session::{AssessmentReport, CoachingProfile};

/// REST and live client for the hosted generative language service
///
/// Built once at startup with a fixed API key and shared by reference.
#[derive(Clone)]
pub struct GeminiClient {
    client: Client,
    api_key: String,
    config: GeminiConfig,
}

impl GeminiClient {
    pub fn new(config: GeminiConfig, api_key: impl Into<String>) -> CoachResult<Self> {
        let api_key = api_key.into();
        if api_key.trim().is_empty() {
            return Err(CoachError::Config("API key is empty".to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .map_err(|e| CoachError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            api_key,
            config,
        })
    }

    pub fn config(&self) -> &GeminiConfig {
        &self.config
    }

    async fn generate(
        &self,
        model: &str,
        body: &GenerateContentRequest,
    ) -> CoachResult<GenerateContentResponse> {
        let url = format!("{}/{}:generateContent", self.config.base_url, model);
        debug!("POST {} ({} contents)", url, body.contents.len());

        let response = self
            .client
            .post(url)
            .header("x-goog-api-key", &self.api_key)
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error body".to_string());
            return Err(map_http_error(status, &body_text));
        }

        response
            .json()
            .await
            .map_err(|e| CoachError::remote(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl CoachingService for GeminiClient {
    fn open_chat_session(&self, profile: &CoachingProfile) -> ChatSession {
        let session = ChatSession::new(profile.clone(), prompts::system_instruction(profile));
        info!(
            "Opened chat session {} ({}, {})",
            session.id, profile.language, profile.scenario
        );
        session
    }

    async fn send_message(&self, session: &mut ChatSession, text: &str) -> CoachResult<String> {
        let mut contents = session.history.clone();
        contents.push(Content::user(text));

        let request = GenerateContentRequest {
            contents,
            system_instruction: Some(Content::system(&session.system_instruction)),
            generation_config: None,
        };

        let reply = self
            .generate(&self.config.chat_model, &request)
            .await?
            .text()
            .ok_or_else(|| CoachError::remote("Model returned no text"))?;

        session.history.push(Content::user(text));
        session.history.push(Content::model(&reply));
        Ok(reply)
    }

    async fn open_live_session(
        &self,
        config: LiveSessionConfig,
    ) -> CoachResult<Box<dyn LiveChannel>> {
        let channel = GeminiLiveChannel::connect(&self.config, &self.api_key, config).await?;
        Ok(Box::new(channel))
    }

    async fn synthesize_assessment(&self, transcript: &str) -> CoachResult<AssessmentReport> {
        info!("Requesting assessment ({} chars of transcript)", transcript.len());

        let request = GenerateContentRequest {
            contents: vec![Content::user(prompts::assessment_prompt(transcript))],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_mime_type: Some("application/json".to_string()),
                response_schema: Some(prompts::report_schema()),
                ..Default::default()
            }),
        };

        let response = self.generate(&self.config.assessment_model, &request).await?;
        let raw = response
            .text()
            .ok_or_else(|| CoachError::AssessmentSynthesis("empty response".to_string()))?;

        AssessmentReport::from_json(&raw).inspect_err(|e| error!("Assessment parse failed: {}", e))
    }

    async fn synthesize_speech(&self, text: &str) -> Option<Vec<u8>> {
        let request = GenerateContentRequest {
            contents: vec![Content::user(text)],
            system_instruction: None,
            generation_config: Some(GenerationConfig {
                response_modalities: Some(vec!["AUDIO".to_string()]),
                speech_config: Some(SpeechConfig::voice(&self.config.voice_name)),
                ..Default::default()
            }),
        };

        let response = match self.generate(&self.config.speech_model, &request).await {
            Ok(response) => response,
            Err(e) => {
                warn!("Speech synthesis unavailable: {}", e);
                return None;
            }
        };

        let Some(inline) = response.inline_data() else {
            warn!("Speech synthesis returned no audio");
            return None;
        };

        match decode_base64(&inline.data) {
            Ok(bytes) if !bytes.is_empty() => Some(bytes),
            Ok(_) => None,
            Err(e) => {
                warn!("Speech synthesis returned unreadable audio: {}", e);
                None
            }
        }
    }
}

fn map_http_error(status: StatusCode, body: &str) -> CoachError {
    let message = serde_json::from_str::<ErrorWrapper>(body)
        .map(|wrapper| {
            let status_text = wrapper.error.status.unwrap_or_default();
            let msg = wrapper.error.message.unwrap_or_else(|| body.to_string());
            if status_text.is_empty() {
                msg
            } else {
                format!("{status_text}: {msg}")
            }
        })
        .unwrap_or_else(|_| body.to_string());

    CoachError::RemoteService(format!("HTTP {}: {}", status.as_u16(), message))
}
