//! Local-filesystem-backed `BlobStore`, used in `mock_ai` mode and for
//! tests. Returns a `file://` URL rooted at the configured directory.
//!
//! Grounded on the teacher's `storage/media.rs::store_media`, generalized
//! to the deterministic path convention shared with [`super::s3`].

use uuid::Uuid;

use super::{object_path, validate_payload, BlobStore, MediaKind};
use crate::error::BlobError;

/// Disk-backed blob store rooted at `root`.
pub struct LocalFsBlobStore {
    root: std::path::PathBuf,
}

impl LocalFsBlobStore {
    pub fn new(root: impl Into<std::path::PathBuf>) -> Self {
        Self { root: root.into() }
    }

    async fn put(&self, story_id: Uuid, sequence: i32, kind: MediaKind, bytes: Vec<u8>) -> Result<String, BlobError> {
        validate_payload(&bytes)?;

        let rel_path = object_path(story_id, sequence, kind);
        let bucket = match kind {
            MediaKind::Image => "images",
            MediaKind::Audio => "audio",
        };
        let full_path = self.root.join(bucket).join(&rel_path);

        if let Some(parent) = full_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| BlobError::NotWritable {
                    message: format!("failed to create {}: {e}", parent.display()),
                })?;
        }

        tokio::fs::write(&full_path, &bytes)
            .await
            .map_err(|e| BlobError::NotWritable {
                message: format!("failed to write {}: {e}", full_path.display()),
            })?;

        Ok(format!("file://{}", full_path.display()))
    }
}

#[async_trait::async_trait]
impl BlobStore for LocalFsBlobStore {
    async fn put_image(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError> {
        self.put(story_id, sequence, MediaKind::Image, bytes).await
    }

    async fn put_audio(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError> {
        self.put(story_id, sequence, MediaKind::Audio, bytes).await
    }
}
