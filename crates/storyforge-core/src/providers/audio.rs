//! Audio adapter (§4.A): narration text + voice in, raw audio bytes out.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::retry::{is_retriable_status, with_retry, Attempt};
use super::{AudioProvider, MockFixtures};
use crate::error::ProviderError;

/// One audio-synthesis request.
#[derive(Debug, Clone)]
pub struct AudioRequest {
    pub text: String,
    pub voice: String,
    pub high_quality: bool,
}

/// Real HTTP implementation of [`AudioProvider`].
pub struct HttpAudioProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_retry_attempts: u32,
}

impl HttpAudioProvider {
    pub fn new(base_url: String, api_key: String, timeout: Duration, max_retry_attempts: u32) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url,
            api_key,
            timeout,
            max_retry_attempts,
        }
    }
}

#[derive(Serialize)]
struct AudioGenRequest<'a> {
    text: &'a str,
    voice: &'a str,
    quality: &'a str,
}

#[derive(Deserialize)]
struct AudioGenResponse {
    /// Base64-encoded audio bytes.
    audio_b64: String,
}

const MIN_AUDIO_BYTES: usize = 100;

#[async_trait::async_trait]
impl AudioProvider for HttpAudioProvider {
    async fn generate(&self, request: AudioRequest) -> Result<Vec<u8>, ProviderError> {
        with_retry(
            self.max_retry_attempts,
            Duration::from_millis(500),
            Duration::from_secs(8),
            |attempt| {
                let request = &request;
                async move {
                    tracing::debug!(provider = "audio", attempt, voice = %request.voice, "audio synthesis request");

                    let body = AudioGenRequest {
                        text: &request.text,
                        voice: &request.voice,
                        quality: if request.high_quality { "high" } else { "standard" },
                    };

                    let sent = self
                        .client
                        .post(format!("{}/audio/speech", self.base_url))
                        .bearer_auth(&self.api_key)
                        .timeout(self.timeout)
                        .json(&body)
                        .send()
                        .await;

                    let response = match sent {
                        Ok(r) => r,
                        Err(e) => {
                            return Attempt::Retriable(ProviderError::Transient {
                                provider: "audio",
                                message: e.to_string(),
                            })
                        }
                    };

                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let message = response.text().await.unwrap_or_default();
                        return if is_retriable_status(status) {
                            Attempt::Retriable(ProviderError::Transient {
                                provider: "audio",
                                message: format!("HTTP {status}: {message}"),
                            })
                        } else {
                            Attempt::Fatal(ProviderError::BadRequest {
                                provider: "audio",
                                message: format!("HTTP {status}: {message}"),
                            })
                        };
                    }

                    let parsed: AudioGenResponse = match response.json().await {
                        Ok(p) => p,
                        Err(e) => {
                            return Attempt::Fatal(ProviderError::UpstreamMalformed {
                                provider: "audio",
                                message: e.to_string(),
                            })
                        }
                    };

                    let bytes = match base64::engine::general_purpose::STANDARD.decode(parsed.audio_b64) {
                        Ok(b) => b,
                        Err(e) => {
                            return Attempt::Fatal(ProviderError::UpstreamMalformed {
                                provider: "audio",
                                message: format!("invalid base64 audio body: {e}"),
                            })
                        }
                    };

                    if bytes.len() < MIN_AUDIO_BYTES {
                        return Attempt::Fatal(ProviderError::UpstreamMalformed {
                            provider: "audio",
                            message: format!("decoded audio body only {} bytes", bytes.len()),
                        });
                    }

                    Attempt::Ok(bytes)
                }
            },
        )
        .await
    }
}

/// Mock implementation: reads canned MP3 bytes from a fixture file.
pub struct MockAudioProvider {
    fixtures: MockFixtures,
}

impl MockAudioProvider {
    pub fn new(fixtures: MockFixtures) -> Self {
        Self { fixtures }
    }
}

#[async_trait::async_trait]
impl AudioProvider for MockAudioProvider {
    async fn generate(&self, _request: AudioRequest) -> Result<Vec<u8>, ProviderError> {
        tokio::time::sleep(self.fixtures.delay).await;
        let path = self.fixtures.fixtures_dir.join("audio/sample.mp3");
        std::fs::read(&path).map_err(|e| ProviderError::Transient {
            provider: "audio",
            message: format!("mock fixture {} unreadable: {e}", path.display()),
        })
    }
}
