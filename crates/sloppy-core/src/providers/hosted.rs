//! HTTP clients for the hosted script agent, speech and video services.
//!
//! Endpoints and keys are read from the current [`Config`] snapshot on each
//! call, so rotating a key in the env file takes effect without a restart.
//! Credentials are checked before endpoints.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Value, json};
use tracing::debug;

use super::{
    AudioSynthesizer, GeneratedScript, ProviderError, RenderedVideo, ScriptGenerator,
    SynthesizedAudio, VideoRenderer,
};
use crate::config::{ApiKey, Config, ConfigProvider};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(600);

#[derive(Clone)]
pub struct HostedClient {
    http: Client,
    config: Arc<ConfigProvider>,
}

impl HostedClient {
    pub fn new(config: Arc<ConfigProvider>) -> Result<Self, ProviderError> {
        let http = Client::builder()
            .user_agent(concat!("sloppy/", env!("CARGO_PKG_VERSION")))
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self { http, config })
    }

    fn snapshot(&self) -> Arc<Config> {
        self.config.current()
    }

    async fn post<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        body: &Value,
    ) -> Result<T, ProviderError> {
        let response = request.json(body).send().await?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::Status {
                status: status.as_u16(),
                body,
            });
        }
        let text = response.text().await?;
        decode(&text)
    }
}

/// Responses must carry every field, `cost` included.
fn decode<T: DeserializeOwned>(text: &str) -> Result<T, ProviderError> {
    serde_json::from_str(text).map_err(|e| ProviderError::Malformed(e.to_string()))
}

fn require_key<'a>(key: &'a Option<ApiKey>, name: &'static str) -> Result<&'a str, ProviderError> {
    key.as_ref()
        .map(ApiKey::expose)
        .ok_or(ProviderError::MissingCredential(name))
}

fn require_url<'a>(url: &'a Option<String>, name: &'static str) -> Result<&'a str, ProviderError> {
    url.as_deref().ok_or(ProviderError::MissingCredential(name))
}

// ── Script agent ─────────────────────────────────────────────────────────────

/// Research/writing agent. Needs both the LLM and search keys.
pub struct ScriptAgent {
    client: HostedClient,
}

impl ScriptAgent {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct ScriptAgentResponse {
    script: String,
    cost: f64,
}

#[async_trait]
impl ScriptGenerator for ScriptAgent {
    async fn generate_script(&self, topic: &str) -> Result<GeneratedScript, ProviderError> {
        let config = self.client.snapshot();
        let llm_key = require_key(&config.openai_api_key, "OPENAI_API_KEY")?;
        let search_key = require_key(&config.tavily_api_key, "TAVILY_API_KEY")?;
        let url = require_url(&config.script_agent_url, "SLOPPY_SCRIPT_AGENT_URL")?;

        debug!(url, topic, "requesting script from agent");
        let request = self
            .client
            .http
            .post(url)
            .bearer_auth(llm_key)
            .header("x-search-key", search_key);
        let response: ScriptAgentResponse =
            self.client.post(request, &json!({ "topic": topic })).await?;
        Ok(GeneratedScript {
            text: response.script,
            cost: response.cost,
        })
    }
}

// ── Speech ───────────────────────────────────────────────────────────────────

pub struct SpeechService {
    client: HostedClient,
}

impl SpeechService {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct SpeechResponse {
    audio_url: String,
    cost: f64,
}

#[async_trait]
impl AudioSynthesizer for SpeechService {
    async fn synthesize_audio(&self, text: &str) -> Result<SynthesizedAudio, ProviderError> {
        let config = self.client.snapshot();
        let token = require_key(&config.hf_token, "HF_TOKEN")?;
        let url = require_url(&config.tts_url, "SLOPPY_TTS_URL")?;

        debug!(url, chars = text.len(), "requesting speech synthesis");
        let request = self.client.http.post(url).bearer_auth(token);
        let response: SpeechResponse = self.client.post(request, &json!({ "text": text })).await?;
        if response.audio_url.is_empty() {
            return Err(ProviderError::Malformed("empty audio_url".into()));
        }
        Ok(SynthesizedAudio {
            url: response.audio_url,
            cost: response.cost,
        })
    }
}

// ── Video ────────────────────────────────────────────────────────────────────

pub struct VideoService {
    client: HostedClient,
}

impl VideoService {
    pub fn new(client: HostedClient) -> Self {
        Self { client }
    }
}

#[derive(Debug, Deserialize)]
struct VideoResponse {
    #[serde(alias = "video_url")]
    video_path: String,
    cost: f64,
}

#[async_trait]
impl VideoRenderer for VideoService {
    async fn render_video(
        &self,
        audio_url: &str,
        settings: &Value,
    ) -> Result<RenderedVideo, ProviderError> {
        let config = self.client.snapshot();
        let key = require_key(&config.fal_key, "FAL_KEY")?;
        let url = require_url(&config.video_url, "SLOPPY_VIDEO_URL")?;

        debug!(url, audio_url, "requesting video render");
        let request = self
            .client
            .http
            .post(url)
            .header(reqwest::header::AUTHORIZATION, format!("Key {key}"));
        let body = json!({ "audio_url": audio_url, "settings": settings });
        let response: VideoResponse = self.client.post(request, &body).await?;
        Ok(RenderedVideo {
            path: response.video_path,
            cost: response.cost,
        })
    }
}
