//! Construction of the trait-object collaborators (providers, blob store,
//! repository, broker) from a loaded [`Config`], selecting the mock or
//! real implementation of each at construction time rather than by a
//! runtime branch inside adapter methods -- mirrors the teacher's
//! `llm::factory::create_provider` selecting `LlmProvider` impls once at
//! startup.

use std::sync::Arc;
use std::time::Duration;

use storyforge_core::blob::{BlobStore, LocalFsBlobStore, S3BlobStore};
use storyforge_core::broker::{BrokerClient, MockBrokerClient, RedisBrokerClient};
use storyforge_core::config::Config;
use storyforge_core::error::{BrokerError, ConfigError};
use storyforge_core::orchestrator::Orchestrator;
use storyforge_core::providers::{
    AudioProvider, HttpAudioProvider, HttpImageProvider, HttpTextProvider, ImageProvider, MockAudioProvider, MockFixtures, MockImageProvider, MockTextProvider, TextProvider,
};
use storyforge_core::repository::{init_db, PgRepository, Repository};

/// Every collaborator the orchestrator and dispatcher need, built once at
/// process start from `Config`.
pub struct Wiring {
    pub text: Arc<dyn TextProvider>,
    pub image: Arc<dyn ImageProvider>,
    pub audio: Arc<dyn AudioProvider>,
    pub blob: Arc<dyn BlobStore>,
    pub repository: Arc<dyn Repository>,
    pub broker: Arc<dyn BrokerClient>,
    /// Set only when `broker` is a real [`RedisBrokerClient`] (not the
    /// in-mock-mode stand-in), so `storyforge worker` can spawn its
    /// background reaper (§4.E's expired-claim/due-delayed sweep). Kept
    /// alongside the trait object rather than downcast from it, since
    /// `Arc<dyn BrokerClient>` isn't `Any`.
    pub redis_broker: Option<Arc<RedisBrokerClient>>,
}

impl Wiring {
    pub async fn build(config: &Config) -> anyhow::Result<Self> {
        let (text, image, audio): (Arc<dyn TextProvider>, Arc<dyn ImageProvider>, Arc<dyn AudioProvider>) = if config.mock_ai {
            let fixtures = MockFixtures::new(config.fixtures_dir.clone(), Duration::from_millis(50));
            (Arc::new(MockTextProvider::new(fixtures.clone())), Arc::new(MockImageProvider::new(fixtures.clone())), Arc::new(MockAudioProvider::new(fixtures)))
        } else {
            let text = HttpTextProvider::new(
                config.providers.text.base_url.clone(),
                config.providers.text.api_key.clone().unwrap_or_default(),
                Duration::from_secs(config.providers.text.timeout_secs),
                config.providers.text.max_retry_attempts,
            );
            let image = HttpImageProvider::new(
                config.providers.image.base_url.clone(),
                config.providers.image.api_key.clone().unwrap_or_default(),
                config.providers.image.model.clone(),
                Duration::from_secs(config.providers.image.timeout_secs),
                config.providers.image.max_retry_attempts,
            );
            let audio = HttpAudioProvider::new(
                config.providers.audio.base_url.clone(),
                config.providers.audio.api_key.clone().unwrap_or_default(),
                Duration::from_secs(config.providers.audio.timeout_secs),
                config.providers.audio.max_retry_attempts,
            );
            (Arc::new(text), Arc::new(image), Arc::new(audio))
        };

        let blob: Arc<dyn BlobStore> = if config.mock_ai {
            Arc::new(LocalFsBlobStore::new(storyforge_core::config::expand_tilde(&config.blob.local_root)))
        } else {
            let aws_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
            let mut s3_builder = aws_sdk_s3::config::Builder::from(&aws_config).region(aws_sdk_s3::config::Region::new(config.blob.region.clone()));
            if let Some(endpoint) = &config.blob.endpoint_url {
                s3_builder = s3_builder.endpoint_url(endpoint.clone());
            }
            let s3_client = aws_sdk_s3::Client::from_conf(s3_builder.build());
            Arc::new(S3BlobStore::new(s3_client, &config.blob))
        };

        let repository: Arc<dyn Repository> = {
            let pool = init_db(&config.database.url, config.database.max_connections).await?;
            Arc::new(PgRepository::new(pool))
        };

        let (broker, redis_broker): (Arc<dyn BrokerClient>, Option<Arc<RedisBrokerClient>>) = if config.mock_ai {
            (Arc::new(MockBrokerClient::new(config.pipeline.max_attempts)), None)
        } else {
            let redis_broker = Arc::new(RedisBrokerClient::connect(&config.broker.redis_url, config.pipeline.max_attempts).await?);
            (redis_broker.clone(), Some(redis_broker))
        };

        Ok(Self { text, image, audio, blob, repository, broker, redis_broker })
    }

    pub fn into_orchestrator(self, config: &Config) -> Orchestrator {
        Orchestrator::new(
            self.text,
            self.image,
            self.audio,
            self.blob,
            self.repository,
            self.broker,
            config.providers.text.model.clone(),
            config.pipeline.scene_parallelism,
            config.pipeline.max_attempts,
            Duration::from_secs(config.broker.visibility_timeout_secs),
            config.pipeline.default_scene_count,
            config.broker.queue_name.clone(),
        )
    }
}

/// Re-exported so `main.rs` can surface a clean error when broker
/// connection fails without depending on `storyforge-core::error` directly.
pub type WiringError = ConfigError;
#[allow(dead_code)]
fn _assert_broker_error_convertible(_: BrokerError) {}
