//! Environment variable overrides for configuration.

use super::Config;
use crate::error::ConfigError;
use std::env;

impl Config {
    /// Apply environment variable overrides to the configuration.
    ///
    /// Environment variables use the `STORYFORGE_` prefix with double
    /// underscores separating nested keys (e.g. `STORYFORGE_PROVIDERS__TEXT__API_KEY`).
    pub(super) fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Ok(val) = env::var("STORYFORGE_MOCK_AI") {
            self.mock_ai = parse_env_bool("STORYFORGE_MOCK_AI", &val)?;
        }
        if let Ok(val) = env::var("STORYFORGE_FIXTURES_DIR") {
            self.fixtures_dir = val;
        }

        // Providers: text
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__TEXT__BASE_URL") {
            self.providers.text.base_url = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__TEXT__API_KEY") {
            self.providers.text.api_key = Some(val);
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__TEXT__MODEL") {
            self.providers.text.model = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__TEXT__TIMEOUT_SECS") {
            self.providers.text.timeout_secs =
                parse_env_u64("STORYFORGE_PROVIDERS__TEXT__TIMEOUT_SECS", &val)?;
        }

        // Providers: image
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__IMAGE__BASE_URL") {
            self.providers.image.base_url = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__IMAGE__API_KEY") {
            self.providers.image.api_key = Some(val);
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__IMAGE__MODEL") {
            self.providers.image.model = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__IMAGE__TIMEOUT_SECS") {
            self.providers.image.timeout_secs =
                parse_env_u64("STORYFORGE_PROVIDERS__IMAGE__TIMEOUT_SECS", &val)?;
        }

        // Providers: audio
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__AUDIO__BASE_URL") {
            self.providers.audio.base_url = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__AUDIO__API_KEY") {
            self.providers.audio.api_key = Some(val);
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__AUDIO__MODEL") {
            self.providers.audio.model = val;
        }
        if let Ok(val) = env::var("STORYFORGE_PROVIDERS__AUDIO__TIMEOUT_SECS") {
            self.providers.audio.timeout_secs =
                parse_env_u64("STORYFORGE_PROVIDERS__AUDIO__TIMEOUT_SECS", &val)?;
        }

        // Pipeline
        if let Ok(val) = env::var("STORYFORGE_PIPELINE__SCENE_PARALLELISM") {
            self.pipeline.scene_parallelism =
                parse_env_usize("STORYFORGE_PIPELINE__SCENE_PARALLELISM", &val)?;
        }
        if let Ok(val) = env::var("STORYFORGE_PIPELINE__JOB_PARALLELISM") {
            self.pipeline.job_parallelism =
                parse_env_usize("STORYFORGE_PIPELINE__JOB_PARALLELISM", &val)?;
        }
        if let Ok(val) = env::var("STORYFORGE_PIPELINE__MAX_ATTEMPTS") {
            self.pipeline.max_attempts = parse_env_u32("STORYFORGE_PIPELINE__MAX_ATTEMPTS", &val)?;
        }
        if let Ok(val) = env::var("STORYFORGE_PIPELINE__DEFAULT_SCENE_COUNT") {
            self.pipeline.default_scene_count =
                parse_env_usize("STORYFORGE_PIPELINE__DEFAULT_SCENE_COUNT", &val)?;
        }

        // Broker
        if let Ok(val) = env::var("STORYFORGE_BROKER__REDIS_URL") {
            self.broker.redis_url = val;
        }
        if let Ok(val) = env::var("STORYFORGE_BROKER__QUEUE_NAME") {
            self.broker.queue_name = val;
        }
        if let Ok(val) = env::var("STORYFORGE_BROKER__VISIBILITY_TIMEOUT_SECS") {
            self.broker.visibility_timeout_secs =
                parse_env_u64("STORYFORGE_BROKER__VISIBILITY_TIMEOUT_SECS", &val)?;
        }

        // Blob
        if let Ok(val) = env::var("STORYFORGE_BLOB__BUCKET_IMAGES") {
            self.blob.bucket_images = val;
        }
        if let Ok(val) = env::var("STORYFORGE_BLOB__BUCKET_AUDIO") {
            self.blob.bucket_audio = val;
        }
        if let Ok(val) = env::var("STORYFORGE_BLOB__ENDPOINT_URL") {
            self.blob.endpoint_url = Some(val);
        }
        if let Ok(val) = env::var("STORYFORGE_BLOB__REGION") {
            self.blob.region = val;
        }
        if let Ok(val) = env::var("STORYFORGE_BLOB__LOCAL_ROOT") {
            self.blob.local_root = val;
        }

        // Database
        if let Ok(val) = env::var("STORYFORGE_DATABASE__URL") {
            self.database.url = val;
        }
        if let Ok(val) = env::var("STORYFORGE_DATABASE__MAX_CONNECTIONS") {
            self.database.max_connections =
                parse_env_u32("STORYFORGE_DATABASE__MAX_CONNECTIONS", &val)?;
        }

        // Logging
        if let Ok(val) = env::var("STORYFORGE_LOGGING__STATUS_INTERVAL_SECONDS") {
            self.logging.status_interval_seconds =
                parse_env_u64("STORYFORGE_LOGGING__STATUS_INTERVAL_SECONDS", &val)?;
        }

        Ok(())
    }
}

/// Parse an environment variable value as `u32`.
pub(super) fn parse_env_u32(var_name: &str, val: &str) -> Result<u32, ConfigError> {
    val.parse::<u32>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u32"),
    })
}

/// Parse an environment variable value as `u64`.
pub(super) fn parse_env_u64(var_name: &str, val: &str) -> Result<u64, ConfigError> {
    val.parse::<u64>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid u64"),
    })
}

/// Parse an environment variable value as `usize`.
pub(super) fn parse_env_usize(var_name: &str, val: &str) -> Result<usize, ConfigError> {
    val.parse::<usize>().map_err(|_| ConfigError::InvalidValue {
        field: var_name.to_string(),
        message: format!("'{val}' is not a valid usize"),
    })
}

/// Parse an environment variable value as a boolean.
///
/// Accepts: `true`, `false`, `1`, `0`, `yes`, `no` (case-insensitive).
pub(super) fn parse_env_bool(var_name: &str, val: &str) -> Result<bool, ConfigError> {
    match val.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(ConfigError::InvalidValue {
            field: var_name.to_string(),
            message: format!("'{val}' is not a valid boolean (use true/false/1/0/yes/no)"),
        }),
    }
}
