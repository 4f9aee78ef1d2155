//! Text LLM adapter (§4.A): sends a prompt, returns the raw text body
//! verbatim (the adapter does not parse JSON; [`crate::prompt`] does).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::retry::{is_retriable_status, with_retry, Attempt};
use super::{MockFixtures, TextParams, TextProvider};
use crate::error::ProviderError;

/// One text-generation request.
///
/// `stage` names which of the four prompt-assembler stages this call
/// belongs to (`"story-plan"`, `"visual-profile"`, `"base-style"`,
/// `"scene-moment"`). The real HTTP adapter ignores it; [`MockTextProvider`]
/// uses it to pick which fixture file to read, since all four stages
/// currently share one `TextParams::model` and so can't be told apart by
/// model name alone.
#[derive(Debug, Clone)]
pub struct TextRequest {
    pub prompt: String,
    pub params: TextParams,
    pub stage: &'static str,
}

/// Real HTTP implementation of [`TextProvider`], using a generic
/// chat-completions-shaped wire format (compatible with any OpenAI-style
/// endpoint; per §6 providers are pluggable by swapping implementations
/// behind the trait).
pub struct HttpTextProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    timeout: Duration,
    max_retry_attempts: u32,
}

impl HttpTextProvider {
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
struct CompletionRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionResponse {
    text: String,
}

#[async_trait::async_trait]
impl TextProvider for HttpTextProvider {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
        with_retry(
            self.max_retry_attempts,
            Duration::from_millis(500),
            Duration::from_secs(8),
            |attempt| {
                let request = &request;
                async move {
                    tracing::debug!(provider = "text", attempt, model = %request.params.model, "text generation request");

                    let body = CompletionRequest {
                        model: &request.params.model,
                        prompt: &request.prompt,
                        temperature: request.params.temperature,
                        max_tokens: request.params.max_tokens,
                    };

                    let sent = self
                        .client
                        .post(format!("{}/completions", self.base_url))
                        .bearer_auth(&self.api_key)
                        .timeout(self.timeout)
                        .json(&body)
                        .send()
                        .await;

                    let response = match sent {
                        Ok(r) => r,
                        Err(e) => {
                            return Attempt::Retriable(ProviderError::Transient {
                                provider: "text",
                                message: e.to_string(),
                            })
                        }
                    };

                    if !response.status().is_success() {
                        let status = response.status().as_u16();
                        let message = response.text().await.unwrap_or_default();
                        return if is_retriable_status(status) {
                            Attempt::Retriable(ProviderError::Transient {
                                provider: "text",
                                message: format!("HTTP {status}: {message}"),
                            })
                        } else {
                            Attempt::Fatal(ProviderError::BadRequest {
                                provider: "text",
                                message: format!("HTTP {status}: {message}"),
                            })
                        };
                    }

                    match response.json::<CompletionResponse>().await {
                        Ok(parsed) => Attempt::Ok(parsed.text),
                        Err(e) => Attempt::Fatal(ProviderError::UpstreamMalformed {
                            provider: "text",
                            message: e.to_string(),
                        }),
                    }
                }
            },
        )
        .await
    }
}

/// Mock implementation: reads canned text from a fixture file after a
/// configurable delay, transparent to callers (§4.A's mock-mode contract).
pub struct MockTextProvider {
    fixtures: MockFixtures,
}

impl MockTextProvider {
    pub fn new(fixtures: MockFixtures) -> Self {
        Self { fixtures }
    }

    /// Fixture file name for a given stage. Keyed on `request.stage` rather
    /// than `request.params.model`: the orchestrator passes the same
    /// configured text model to all four stages, so the model name alone
    /// can't tell a story-plan call from a scene-moment call.
    fn fixture_path(&self, request: &TextRequest) -> std::path::PathBuf {
        self.fixtures.fixtures_dir.join(format!("text/{}.json", request.stage))
    }
}

#[async_trait::async_trait]
impl TextProvider for MockTextProvider {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
        tokio::time::sleep(self.fixtures.delay).await;
        let path = self.fixture_path(&request);
        std::fs::read_to_string(&path).map_err(|e| ProviderError::Transient {
            provider: "text",
            message: format!("mock fixture {} unreadable: {e}", path.display()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request() -> TextRequest {
        TextRequest {
            prompt: "write a story plan".into(),
            params: TextParams {
                model: "story-plan-v1".into(),
                temperature: 0.7,
                max_tokens: 2000,
            },
            stage: "story-plan",
        }
    }

    #[tokio::test]
    async fn successful_response_returns_text_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "text": "{\"title\":\"Forest\"}"
            })))
            .mount(&server)
            .await;

        let provider = HttpTextProvider::new(server.uri(), "key".into(), Duration::from_secs(5), 3);
        let text = provider.generate(request()).await.unwrap();
        assert_eq!(text, "{\"title\":\"Forest\"}");
    }

    #[tokio::test]
    async fn retries_503_then_succeeds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(503))
            .up_to_n_times(2)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({"text": "ok"})))
            .mount(&server)
            .await;

        let provider = HttpTextProvider::new(server.uri(), "key".into(), Duration::from_secs(5), 3);
        let text = provider.generate(request()).await.unwrap();
        assert_eq!(text, "ok");
    }

    #[tokio::test]
    async fn non_retriable_4xx_surfaces_as_bad_request() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(401).set_body_string("invalid api key"))
            .mount(&server)
            .await;

        let provider = HttpTextProvider::new(server.uri(), "key".into(), Duration::from_secs(5), 3);
        let result = provider.generate(request()).await;
        assert!(matches!(result, Err(ProviderError::BadRequest { .. })));
    }

    #[tokio::test]
    async fn exhausted_retries_surface_as_transient() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/completions"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let provider = HttpTextProvider::new(server.uri(), "key".into(), Duration::from_secs(5), 2);
        let result = provider.generate(request()).await;
        assert!(matches!(result, Err(ProviderError::Transient { .. })));
    }

    #[tokio::test]
    async fn mock_provider_reads_fixture() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("text")).unwrap();
        std::fs::write(
            dir.path().join("text/story-plan.json"),
            "{\"title\":\"mock\"}",
        )
        .unwrap();

        let provider = MockTextProvider::new(MockFixtures::new(dir.path(), Duration::from_millis(0)));
        let text = provider.generate(request()).await.unwrap();
        assert_eq!(text, "{\"title\":\"mock\"}");
    }
}
