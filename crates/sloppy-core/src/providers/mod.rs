//! Seams to the hosted services the pipeline delegates to.
//!
//! Script writing, speech synthesis, video rendering and publishing are all
//! opaque calls. [`hosted`] talks to HTTP endpoints; tests plug in their own
//! implementations of the traits.

pub mod hosted;
mod stub;

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::ConfigProvider;

pub use stub::StubPublisher;

#[derive(Debug, Error)]
pub enum ProviderError {
    /// A required key or endpoint is not configured.
    #[error("{0} missing")]
    MissingCredential(&'static str),

    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("provider returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed payload: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedScript {
    pub text: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SynthesizedAudio {
    pub url: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RenderedVideo {
    pub path: String,
    pub cost: f64,
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct PublishReceipt {
    pub url: Option<String>,
}

#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    async fn generate_script(&self, topic: &str) -> Result<GeneratedScript, ProviderError>;
}

#[async_trait]
pub trait AudioSynthesizer: Send + Sync {
    async fn synthesize_audio(&self, text: &str) -> Result<SynthesizedAudio, ProviderError>;
}

#[async_trait]
pub trait VideoRenderer: Send + Sync {
    async fn render_video(
        &self,
        audio_url: &str,
        settings: &Value,
    ) -> Result<RenderedVideo, ProviderError>;
}

#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, video_path: &str, metadata: &Value)
    -> Result<PublishReceipt, ProviderError>;
}

/// The full set of collaborators a worker needs.
#[derive(Clone)]
pub struct Providers {
    pub generator: Arc<dyn ScriptGenerator>,
    pub audio: Arc<dyn AudioSynthesizer>,
    pub video: Arc<dyn VideoRenderer>,
    pub publisher: Arc<dyn Publisher>,
}

impl Providers {
    /// HTTP-backed providers reading endpoints and keys from `config` on
    /// every call. Publishing is stubbed.
    pub fn hosted(config: Arc<ConfigProvider>) -> Result<Self, ProviderError> {
        let client = hosted::HostedClient::new(config)?;
        Ok(Self {
            generator: Arc::new(hosted::ScriptAgent::new(client.clone())),
            audio: Arc::new(hosted::SpeechService::new(client.clone())),
            video: Arc::new(hosted::VideoService::new(client)),
            publisher: Arc::new(StubPublisher),
        })
    }
}

impl std::fmt::Debug for Providers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Providers").finish_non_exhaustive()
    }
}
