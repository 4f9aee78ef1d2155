//! Provider adapters (§4.A): typed request/response wrappers over the
//! three external model APIs (text LLM, image, audio), sharing a common
//! timeout/retry/error contract.
//!
//! Grounded on the teacher's `llm::LlmProvider` trait shape
//! (`llm/mod.rs`): one object-safe `async_trait` per provider kind, one
//! real HTTP implementation, and one mock implementation selected at
//! construction time rather than by a runtime branch inside adapter
//! methods (§9's "dynamic runtime monkey-patching maps to an
//! interface/trait abstraction with two implementations").

pub mod audio;
pub mod image;
pub mod retry;
pub mod text;

pub use audio::{AudioRequest, HttpAudioProvider, MockAudioProvider};
pub use image::{HttpImageProvider, ImageRequest, MockImageProvider};
pub use text::{HttpTextProvider, MockTextProvider, TextRequest};

use crate::error::ProviderError;

/// Generation parameters shared by the text LLM adapter.
#[derive(Debug, Clone)]
pub struct TextParams {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

/// Trait abstracting the text LLM adapter. The adapter does not parse the
/// returned text as JSON; callers (the prompt assembler's parsers) do.
#[async_trait::async_trait]
pub trait TextProvider: Send + Sync {
    async fn generate(&self, request: TextRequest) -> Result<String, ProviderError>;
}

/// Trait abstracting the image adapter. Returns raw image bytes (PNG
/// assumed); the adapter is responsible for base64-decoding a base64
/// upstream response.
#[async_trait::async_trait]
pub trait ImageProvider: Send + Sync {
    async fn generate(&self, request: ImageRequest) -> Result<Vec<u8>, ProviderError>;
}

/// Trait abstracting the audio adapter. Returns raw audio bytes (MP3
/// assumed).
#[async_trait::async_trait]
pub trait AudioProvider: Send + Sync {
    async fn generate(&self, request: AudioRequest) -> Result<Vec<u8>, ProviderError>;
}

/// Configuration for mock-mode fixture playback, shared by all three mock
/// adapters.
#[derive(Debug, Clone)]
pub struct MockFixtures {
    pub fixtures_dir: std::path::PathBuf,
    pub delay: std::time::Duration,
}

impl MockFixtures {
    pub fn new(fixtures_dir: impl Into<std::path::PathBuf>, delay: std::time::Duration) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
            delay,
        }
    }
}
