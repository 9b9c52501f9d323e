use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub service: ServiceConfig,
    pub gemini: GeminiConfig,
    pub audio: AudioConfig,
    pub coaching: CoachingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    pub name: String,
    /// Used for report titles and the export file name
    pub product_name: String,
    pub http: HttpConfig,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            name: "lingo-coach".to_string(),
            product_name: "Lingo Coach".to_string(),
            http: HttpConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub bind: String,
    pub port: u16,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".to_string(),
            port: 8787,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GeminiConfig {
    /// Falls back to the GEMINI_API_KEY environment variable
    pub api_key: Option<String>,
    pub base_url: String,
    pub live_url: String,
    pub chat_model: String,
    pub assessment_model: String,
    pub speech_model: String,
    pub live_model: String,
    pub voice_name: String,
    /// Upper bound for every REST call; live sessions use it for connect only
    pub request_timeout_secs: u64,
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: "https://generativelanguage.googleapis.com/v1beta/models".to_string(),
            live_url: concat!(
                "wss://generativelanguage.googleapis.com/ws/",
                "google.ai.generativelanguage.v1beta.GenerativeService.BidiGenerateContent"
            )
            .to_string(),
            chat_model: "gemini-2.5-flash".to_string(),
            assessment_model: "gemini-2.5-flash".to_string(),
            speech_model: "gemini-2.5-flash-preview-tts".to_string(),
            live_model: "models/gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
            voice_name: "Zephyr".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl GeminiConfig {
    /// Resolve the access token once at process start
    pub fn resolve_api_key(&self) -> Result<String> {
        if let Some(key) = self.api_key.as_ref().filter(|k| !k.trim().is_empty()) {
            return Ok(key.clone());
        }
        std::env::var("GEMINI_API_KEY")
            .context("GEMINI_API_KEY is not set and gemini.api_key is empty")
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AudioConfig {
    /// Microphone upload rate
    pub input_sample_rate: u32,
    /// Rate of live audio chunks returned by the model
    pub output_sample_rate: u32,
    /// Rate of synthesized speech readouts
    pub speech_sample_rate: u32,
    pub channels: u16,
    /// Size of each uploaded microphone frame
    pub frame_ms: u64,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            input_sample_rate: 16000,
            output_sample_rate: 24000,
            speech_sample_rate: 24000,
            channels: 1,
            frame_ms: 100,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CoachingConfig {
    pub language: String,
    pub scenario: String,
    pub topic: String,
    /// Minimum elapsed session time before an assessment may run
    pub assessment_threshold_ms: u64,
    pub trigger_phrases: Vec<String>,
}

impl Default for CoachingConfig {
    fn default() -> Self {
        Self {
            language: "Spanish".to_string(),
            scenario: "Ordering at a cafe".to_string(),
            topic: "Everyday small talk".to_string(),
            assessment_threshold_ms: 180_000,
            trigger_phrases: crate::session::DEFAULT_TRIGGER_PHRASES
                .iter()
                .map(|p| p.to_string())
                .collect(),
        }
    }
}

impl Config {
    /// Load from an optional file, then `LINGO_COACH__SECTION__KEY` overrides
    pub fn load(path: &str) -> Result<Self> {
        let _ = dotenvy::dotenv();

        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("LINGO_COACH").separator("__"))
            .build()
            .with_context(|| format!("Failed to read configuration from {}", path))?;

        settings
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}
