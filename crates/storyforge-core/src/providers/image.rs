//! Image adapter (§4.A): prompt + dimensions in, raw image bytes out. The
//! adapter decodes a base64-encoded upstream body transparently.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::retry::{is_retriable_status, with_retry, Attempt};
use super::{ImageProvider, MockFixtures};
use crate::error::ProviderError;

/// One image-generation request.
#[derive(Debug, Clone)]
pub struct ImageRequest {
    pub prompt: String,
    pub width: u32,
    pub height: u32,
    pub steps: u32,
    pub seed: Option<u64>,
}

/// Real HTTP implementation of [`ImageProvider`].
pub struct HttpImageProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    model: String,
    timeout: Duration,
    max_retry_attempts: u32,
}

impl HttpImageProvider {
    pub fn new(
        base_url: String,
        api_key: String,
        model: String,
        timeout: Duration,
        max_retry_attempts: u32,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            model,
            timeout,
            max_retry_attempts,
        }
    }
}

#[derive(Serialize)]
struct ImageGenRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    width: u32,
    height: u32,
    steps: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    seed: Option<u64>,
}

#[derive(Deserialize)]
struct ImageGenResponse {
    /// Base64-encoded image bytes.
    image_b64: String,
}

/// Minimum accepted body size, guarding against upstream returning a
/// degenerate (near-empty) payload as success. Mirrors the blob store's
/// own `InvalidPayload` threshold (§4.B) one layer earlier.
const MIN_IMAGE_BYTES: usize = 100;

#[async_trait::async_trait]
impl ImageProvider for HttpImageProvider {
    async fn generate(&self, request: ImageRequest) -> Result<Vec<u8>, ProviderError> {
        with_retry(
            self.max_retry_attempts,
            Duration::from_millis(500),
            Duration::from_secs(8),
            |attempt| {
                let request = &request;
                async move {
                    tracing::debug!(provider = "image", attempt, width = request.width, height = request.height, "image generation request");

                    let body = ImageGenRequest {
                        model: &self.model,
                        prompt: &request.prompt,
                        width: request.width,
                        height: request.height,
                        steps: request.steps,
                        seed: request.seed,
                    };

                    let sent = self
                        .client
                        .post(format!("{}/images/generations", self.base_url))
                        .bearer_auth(&self.api_key)
                        .timeout(self.timeout)
                        .json(&body)
                        .send()
                        .await;

                    let response = match sent {
                        Ok(r) => r,
                        Err(e) => {
                            return Attempt::Retriable(ProviderError::Transient {
                                provider: "image",
                                message: e.to_string(),
                            })
                        }
                    };

                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let message = response.text().await.unwrap_or_default();
                        return if is_retriable_status(status) {
                            Attempt::Retriable(ProviderError::Transient {
                                provider: "image",
                                message: format!("HTTP {status}: {message}"),
                            })
                        } else {
                            Attempt::Fatal(ProviderError::BadRequest {
                                provider: "image",
                                message: format!("HTTP {status}: {message}"),
                            })
                        };
                    }

                    let parsed: ImageGenResponse = match response.json().await {
                        Ok(p) => p,
                        Err(e) => {
                            return Attempt::Fatal(ProviderError::UpstreamMalformed {
                                provider: "image",
                                message: e.to_string(),
                            })
                        }
                    };

                    let bytes = match base64::engine::general_purpose::STANDARD.decode(parsed.image_b64) {
                        Ok(b) => b,
                        Err(e) => {
                            return Attempt::Fatal(ProviderError::UpstreamMalformed {
                                provider: "image",
                                message: format!("invalid base64 image body: {e}"),
                            })
                        }
                    };

                    if bytes.len() < MIN_IMAGE_BYTES {
                        return Attempt::Fatal(ProviderError::UpstreamMalformed {
                            provider: "image",
                            message: format!("decoded image body only {} bytes", bytes.len()),
                        });
                    }

                    Attempt::Ok(bytes)
                }
            },
        )
        .await
    }
}

/// Mock implementation: reads canned PNG bytes from a fixture file.
pub struct MockImageProvider {
    fixtures: MockFixtures,
}

impl MockImageProvider {
    pub fn new(fixtures: MockFixtures) -> Self {
        Self { fixtures }
    }
}

#[async_trait::async_trait]
impl ImageProvider for MockImageProvider {
    async fn generate(&self, _request: ImageRequest) -> Result<Vec<u8>, ProviderError> {
        tokio::time::sleep(self.fixtures.delay).await;
        let path = self.fixtures.fixtures_dir.join("image/sample.png");
        std::fs::read(&path).map_err(|e| ProviderError::Transient {
            provider: "image",
            message: format!("mock fixture {} unreadable: {e}", path.display()),
        })
    }
}
