//! Default values for configuration sections that don't derive `Default`
//! uniformly (because different provider kinds need different timeout
//! defaults, or because a default must itself call a shared helper).

use super::{
    default_bucket_audio, default_bucket_images, default_database_url,
    default_job_parallelism, default_local_blob_root, default_max_attempts,
    default_max_connections, default_queue_name, default_redis_url, default_region,
    default_scene_count, default_scene_parallelism, default_visibility_timeout_secs, BlobConfig,
    BrokerConfig, DatabaseConfig, PipelineConfig, ProviderConfig, ProvidersConfig,
};

impl Default for ProvidersConfig {
    fn default() -> Self {
        Self {
            text: ProviderConfig::with_timeout(60),
            image: ProviderConfig::with_timeout(120),
            audio: ProviderConfig::with_timeout(120),
        }
    }
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scene_parallelism: default_scene_parallelism(),
            job_parallelism: default_job_parallelism(),
            max_attempts: default_max_attempts(),
            default_scene_count: default_scene_count(),
        }
    }
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            redis_url: default_redis_url(),
            queue_name: default_queue_name(),
            visibility_timeout_secs: default_visibility_timeout_secs(),
        }
    }
}

impl Default for BlobConfig {
    fn default() -> Self {
        Self {
            bucket_images: default_bucket_images(),
            bucket_audio: default_bucket_audio(),
            endpoint_url: None,
            region: default_region(),
            local_root: default_local_blob_root(),
        }
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
            max_connections: default_max_connections(),
        }
    }
}
