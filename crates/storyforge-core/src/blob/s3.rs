//! S3-backed `BlobStore`. Grounded on the pack's `redis` + `aws-sdk-s3`
//! manifests for this queue+blob shape (see SPEC_FULL.md §4.B).

use aws_sdk_s3::primitives::ByteStream;
use uuid::Uuid;

use super::{object_path, validate_payload, BlobStore, MediaKind};
use crate::config::BlobConfig;
use crate::error::BlobError;

/// S3 (or S3-compatible) object store. Two fixed buckets, one per media
/// kind, matching §4.B's "bucket is fixed per media kind" rule.
pub struct S3BlobStore {
    client: aws_sdk_s3::Client,
    bucket_images: String,
    bucket_audio: String,
}

impl S3BlobStore {
    pub fn new(client: aws_sdk_s3::Client, config: &BlobConfig) -> Self {
        Self {
            client,
            bucket_images: config.bucket_images.clone(),
            bucket_audio: config.bucket_audio.clone(),
        }
    }

    /// Build an `aws_sdk_s3::Client` from the shared AWS config loader,
    /// honoring an optional custom endpoint (for S3-compatible stores).
    pub async fn client_from_config(config: &BlobConfig) -> aws_sdk_s3::Client {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));
        if let Some(endpoint) = &config.endpoint_url {
            loader = loader.endpoint_url(endpoint.clone());
        }
        let shared_config = loader.load().await;
        aws_sdk_s3::Client::new(&shared_config)
    }

    fn bucket_for(&self, kind: MediaKind) -> &str {
        match kind {
            MediaKind::Image => &self.bucket_images,
            MediaKind::Audio => &self.bucket_audio,
        }
    }

    async fn put(&self, story_id: Uuid, sequence: i32, kind: MediaKind, bytes: Vec<u8>) -> Result<String, BlobError> {
        validate_payload(&bytes)?;

        let key = object_path(story_id, sequence, kind);
        let bucket = self.bucket_for(kind);
        let content_type = match kind {
            MediaKind::Image => "image/png",
            MediaKind::Audio => "audio/mpeg",
        };

        self.client
            .put_object()
            .bucket(bucket)
            .key(&key)
            .body(ByteStream::from(bytes))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| BlobError::NotWritable {
                message: format!("put_object {bucket}/{key} failed: {e}"),
            })?;

        Ok(format!("https://{bucket}.s3.amazonaws.com/{key}"))
    }
}

#[async_trait::async_trait]
impl BlobStore for S3BlobStore {
    async fn put_image(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError> {
        self.put(story_id, sequence, MediaKind::Image, bytes).await
    }

    async fn put_audio(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError> {
        self.put(story_id, sequence, MediaKind::Audio, bytes).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn public_url_embeds_bucket_and_key() {
        let story_id = Uuid::nil();
        let key = object_path(story_id, 3, MediaKind::Image);
        assert_eq!(key, format!("{story_id}/3.png"));
    }
}
