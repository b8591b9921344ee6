use async_trait::async_trait;
use serde_json::Value;
use tracing::info;

use super::{ProviderError, PublishReceipt, Publisher};

/// Accepts every upload without contacting the platform.
#[derive(Debug, Clone, Copy, Default)]
pub struct StubPublisher;

#[async_trait]
impl Publisher for StubPublisher {
    async fn publish(
        &self,
        video_path: &str,
        metadata: &Value,
    ) -> Result<PublishReceipt, ProviderError> {
        info!(video_path, %metadata, "upload accepted by stub publisher");
        Ok(PublishReceipt::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn stub_accepts_without_url() {
        let receipt = StubPublisher
            .publish("/videos/1.mp4", &serde_json::json!({ "caption": "hi" }))
            .await
            .unwrap();
        assert!(receipt.url.is_none());
    }
}
