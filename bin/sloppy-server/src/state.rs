//! Shared application state injected into every Axum handler.

use std::sync::Arc;

use sloppy_core::config::ConfigProvider;
use sloppy_core::notify::BroadcastNotifier;
use sloppy_core::{Pipeline, SqliteScriptStore};

#[derive(Clone)]
pub struct AppState {
    /// Reloadable configuration.
    pub config: Arc<ConfigProvider>,
    pub pipeline: Pipeline<SqliteScriptStore>,
    /// Fan-out hub the realtime channel subscribes to.
    pub hub: BroadcastNotifier,
}

impl AppState {
    pub fn store(&self) -> &SqliteScriptStore {
        self.pipeline.store()
    }
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use async_trait::async_trait;
    use serde_json::Value;
    use sloppy_core::config::Config;
    use sloppy_core::notify::{NotificationPublisher, Notifier};
    use sloppy_core::providers::{
        AudioSynthesizer, GeneratedScript, ProviderError, Providers, RenderedVideo,
        ScriptGenerator, StubPublisher, SynthesizedAudio, VideoRenderer,
    };
    use sloppy_core::queue::{QueueSettings, TaskQueue};

    pub struct Canned;

    #[async_trait]
    impl ScriptGenerator for Canned {
        async fn generate_script(&self, topic: &str) -> Result<GeneratedScript, ProviderError> {
            let text = (0..12)
                .map(|i| format!("[S{}] {topic}, take {i}.", i % 2 + 1))
                .collect::<Vec<_>>()
                .join("\n");
            Ok(GeneratedScript { text, cost: 0.02 })
        }
    }

    #[async_trait]
    impl AudioSynthesizer for Canned {
        async fn synthesize_audio(&self, _text: &str) -> Result<SynthesizedAudio, ProviderError> {
            Err(ProviderError::MissingCredential("HF_TOKEN"))
        }
    }

    #[async_trait]
    impl VideoRenderer for Canned {
        async fn render_video(
            &self,
            _audio_url: &str,
            _settings: &Value,
        ) -> Result<RenderedVideo, ProviderError> {
            Err(ProviderError::MissingCredential("FAL_KEY"))
        }
    }

    /// State over an in-memory store whose generator succeeds and whose
    /// speech provider is missing its credential.
    pub async fn app_state(config: Config) -> Arc<AppState> {
        app_state_with(Arc::new(ConfigProvider::fixed(config))).await
    }

    /// Same as [`app_state`] over a caller-supplied provider, e.g. one
    /// backed by a temporary env file.
    pub async fn app_state_with(config: Arc<ConfigProvider>) -> Arc<AppState> {
        let store = SqliteScriptStore::in_memory()
            .await
            .expect("in-memory store");
        let hub = BroadcastNotifier::new(16);
        let providers = Providers {
            generator: Arc::new(Canned),
            audio: Arc::new(Canned),
            video: Arc::new(Canned),
            publisher: Arc::new(StubPublisher),
        };
        let queue = TaskQueue::start(providers, QueueSettings::from_config(&config.current()));
        let notifier: Arc<dyn Notifier> = Arc::new(hub.clone());
        let pipeline = Pipeline::new(
            Arc::new(store),
            queue,
            NotificationPublisher::new(notifier),
            Arc::clone(&config),
        );
        Arc::new(AppState {
            config,
            pipeline,
            hub,
        })
    }
}
