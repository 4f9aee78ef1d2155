//! Configuration management for StoryForge.
//!
//! Supports three-layer configuration loading:
//! 1. Built-in defaults
//! 2. TOML config file
//! 3. Environment variable overrides (`STORYFORGE_` prefix)
//!
//! The resulting `Config` is immutable after load; it is constructed once at
//! worker start and shared by reference.

mod defaults;
mod env_overrides;

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::PathBuf;

/// Top-level configuration for the StoryForge worker.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Outbound model provider settings.
    #[serde(default)]
    pub providers: ProvidersConfig,

    /// Pipeline concurrency and retry settings.
    #[serde(default)]
    pub pipeline: PipelineConfig,

    /// Durable broker settings.
    #[serde(default)]
    pub broker: BrokerConfig,

    /// Blob store settings.
    #[serde(default)]
    pub blob: BlobConfig,

    /// Relational database settings.
    #[serde(default)]
    pub database: DatabaseConfig,

    /// Logging and observability settings.
    #[serde(default)]
    pub logging: LoggingConfig,

    /// When true, provider adapters return canned fixture data instead of
    /// calling out to real APIs.
    #[serde(default)]
    pub mock_ai: bool,

    /// Directory containing canned fixture responses for mock mode.
    #[serde(default = "default_fixtures_dir")]
    pub fixtures_dir: String,
}

/// Per-provider-kind settings shared by the text, image, and audio adapters.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProvidersConfig {
    /// Text LLM adapter configuration.
    #[serde(default)]
    pub text: ProviderConfig,

    /// Image adapter configuration.
    #[serde(default)]
    pub image: ProviderConfig,

    /// Audio adapter configuration.
    #[serde(default)]
    pub audio: ProviderConfig,
}

/// Settings for a single outbound provider adapter.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderConfig {
    /// Base URL of the provider's API.
    #[serde(default)]
    pub base_url: String,

    /// API key, if the provider requires one.
    #[serde(default)]
    pub api_key: Option<String>,

    /// Model identifier passed to the provider.
    #[serde(default)]
    pub model: String,

    /// Per-call timeout in seconds.
    #[serde(default = "default_provider_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum attempts (including the first) before surfacing `Transient`.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

/// Pipeline concurrency and retry policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PipelineConfig {
    /// Max concurrent scenes processed per job.
    #[serde(default = "default_scene_parallelism")]
    pub scene_parallelism: usize,

    /// Max concurrent jobs processed per worker process.
    #[serde(default = "default_job_parallelism")]
    pub job_parallelism: usize,

    /// Redeliveries allowed before a job is marked FAILED.
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Target scene count sent to the plan prompt (§4.D.1). The plan
    /// LLM's own declared scene list is authoritative once parsed (see
    /// DESIGN.md); this is only the requested target, not a hard
    /// per-request override -- the system does not accept a per-request
    /// `num_scenes` hint.
    #[serde(default = "default_scene_count")]
    pub default_scene_count: usize,
}

/// Durable broker (Redis-backed queue) settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BrokerConfig {
    /// Redis connection URL.
    #[serde(default = "default_redis_url")]
    pub redis_url: String,

    /// Queue name for story jobs.
    #[serde(default = "default_queue_name")]
    pub queue_name: String,

    /// Visibility timeout in seconds (default 2h).
    #[serde(default = "default_visibility_timeout_secs")]
    pub visibility_timeout_secs: u64,
}

/// Blob store (object storage) settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BlobConfig {
    /// Bucket for generated images.
    #[serde(default = "default_bucket_images")]
    pub bucket_images: String,

    /// Bucket for generated audio.
    #[serde(default = "default_bucket_audio")]
    pub bucket_audio: String,

    /// Override endpoint URL (for S3-compatible stores other than AWS).
    #[serde(default)]
    pub endpoint_url: Option<String>,

    /// AWS region.
    #[serde(default = "default_region")]
    pub region: String,

    /// Local filesystem root, used when `mock_ai` selects `LocalFsBlobStore`.
    #[serde(default = "default_local_blob_root")]
    pub local_root: String,
}

/// Relational database settings.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DatabaseConfig {
    /// Postgres connection URL.
    #[serde(default = "default_database_url")]
    pub url: String,

    /// Maximum pool connections.
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Logging and observability settings.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct LoggingConfig {
    /// Seconds between periodic status summaries (0 = disabled).
    #[serde(default)]
    pub status_interval_seconds: u64,
}

impl ProviderConfig {
    pub(super) fn with_timeout(timeout_secs: u64) -> Self {
        Self {
            base_url: String::new(),
            api_key: None,
            model: String::new(),
            timeout_secs,
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

fn default_fixtures_dir() -> String {
    "fixtures".to_string()
}
fn default_provider_timeout_secs() -> u64 {
    60
}
fn default_max_retry_attempts() -> u32 {
    3
}
fn default_scene_parallelism() -> usize {
    3
}
fn default_job_parallelism() -> usize {
    1
}
fn default_max_attempts() -> u32 {
    3
}
fn default_scene_count() -> usize {
    3
}
fn default_redis_url() -> String {
    "redis://127.0.0.1:6379".to_string()
}
fn default_queue_name() -> String {
    "storyforge:stories".to_string()
}
fn default_visibility_timeout_secs() -> u64 {
    2 * 60 * 60
}
fn default_bucket_images() -> String {
    "storyforge-images".to_string()
}
fn default_bucket_audio() -> String {
    "storyforge-audio".to_string()
}
fn default_region() -> String {
    "us-east-1".to_string()
}
fn default_local_blob_root() -> String {
    "~/.storyforge/blobs".to_string()
}
fn default_database_url() -> String {
    "postgres://localhost/storyforge".to_string()
}
fn default_max_connections() -> u32 {
    10
}

impl Config {
    /// Load configuration from a TOML file with environment variable overrides.
    ///
    /// The loading sequence:
    /// 1. Determine config file path (argument > `STORYFORGE_CONFIG` env var > default)
    /// 2. Parse TOML file (or use defaults if the default path doesn't exist)
    /// 3. Apply environment variable overrides
    pub fn load(config_path: Option<&str>) -> Result<Config, ConfigError> {
        let (path, explicit) = Self::resolve_config_path(config_path);

        let mut config = match std::fs::read_to_string(&path) {
            Ok(contents) => toml::from_str::<Config>(&contents)
                .map_err(|e| ConfigError::ParseError { source: e })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if explicit {
                    return Err(ConfigError::FileNotFound {
                        path: path.display().to_string(),
                    });
                }
                Config::default()
            }
            Err(_) => {
                return Err(ConfigError::FileNotFound {
                    path: path.display().to_string(),
                });
            }
        };

        config.apply_env_overrides()?;

        Ok(config)
    }

    /// Load configuration and validate it, returning all validation errors at once.
    pub fn load_and_validate(config_path: Option<&str>) -> Result<Config, Vec<ConfigError>> {
        let config = Config::load(config_path).map_err(|e| vec![e])?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration, returning all errors found (not just the first).
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        if !self.mock_ai {
            if self.providers.text.api_key.as_deref().unwrap_or("").is_empty() {
                errors.push(ConfigError::MissingField {
                    field: "providers.text.api_key".to_string(),
                });
            }
            if self.providers.image.api_key.as_deref().unwrap_or("").is_empty() {
                errors.push(ConfigError::MissingField {
                    field: "providers.image.api_key".to_string(),
                });
            }
            if self.providers.audio.api_key.as_deref().unwrap_or("").is_empty() {
                errors.push(ConfigError::MissingField {
                    field: "providers.audio.api_key".to_string(),
                });
            }
        }

        if self.pipeline.scene_parallelism == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "pipeline.scene_parallelism".to_string(),
                message: "must be >= 1".to_string(),
            });
        }
        if self.pipeline.job_parallelism == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "pipeline.job_parallelism".to_string(),
                message: "must be >= 1".to_string(),
            });
        }
        if self.pipeline.max_attempts == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "pipeline.max_attempts".to_string(),
                message: "must be >= 1".to_string(),
            });
        }

        if self.broker.queue_name.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "broker.queue_name".to_string(),
            });
        }
        if self.broker.visibility_timeout_secs == 0 {
            errors.push(ConfigError::InvalidValue {
                field: "broker.visibility_timeout_secs".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }

        if self.database.url.is_empty() {
            errors.push(ConfigError::MissingField {
                field: "database.url".to_string(),
            });
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    /// Resolve the config file path from arguments, env vars, or default.
    ///
    /// Returns `(path, explicit)` where `explicit` is true if the path was
    /// explicitly provided (via argument or env var) rather than using the
    /// default.
    fn resolve_config_path(config_path: Option<&str>) -> (PathBuf, bool) {
        if let Some(path) = config_path {
            return (expand_tilde(path), true);
        }

        if let Ok(env_path) = env::var("STORYFORGE_CONFIG") {
            return (expand_tilde(&env_path), true);
        }

        (expand_tilde("~/.storyforge/config.toml"), false)
    }
}

/// Expand `~` at the start of a path to the user's home directory.
pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    } else if path == "~" {
        if let Some(home) = dirs::home_dir() {
            return home;
        }
    }
    PathBuf::from(path)
}
