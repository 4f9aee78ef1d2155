//! Blob uploader (§4.B): idempotent upload of image/audio bytes to an
//! object store under a deterministic path, returning a public URL.
//!
//! Grounded on the teacher's `storage/media.rs` disk-backed media store,
//! generalized from UUID filenames to the spec's deterministic
//! `<bucket>/<story_id>/<sequence>.<ext>` path convention (so re-uploads
//! for the same `(story_id, sequence, kind)` are idempotent by
//! construction: last-write-wins yields the same URL).

pub mod local;
pub mod s3;

pub use local::LocalFsBlobStore;
pub use s3::S3BlobStore;

use uuid::Uuid;

use crate::error::BlobError;

/// Minimum accepted payload size. Guards against an upstream provider
/// returning an empty body masquerading as success.
pub const MIN_PAYLOAD_BYTES: usize = 100;

/// Which kind of media is being uploaded; determines the destination
/// bucket and file extension.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaKind {
    Image,
    Audio,
}

impl MediaKind {
    pub fn extension(self) -> &'static str {
        match self {
            MediaKind::Image => "png",
            MediaKind::Audio => "mp3",
        }
    }
}

/// Deterministic object path for a given story/sequence/kind, shared by
/// every `BlobStore` implementation so they all agree on idempotency.
pub fn object_path(story_id: Uuid, sequence: i32, kind: MediaKind) -> String {
    format!("{story_id}/{sequence}.{}", kind.extension())
}

fn validate_payload(bytes: &[u8]) -> Result<(), BlobError> {
    if bytes.len() < MIN_PAYLOAD_BYTES {
        return Err(BlobError::InvalidPayload {
            message: format!("payload is only {} bytes (minimum {MIN_PAYLOAD_BYTES})", bytes.len()),
        });
    }
    Ok(())
}

/// Trait abstracting the object store. Implementations MUST be idempotent
/// with respect to `(story_id, sequence, kind)`: re-invocation overwrites
/// and returns the same URL.
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    async fn put_image(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError>;
    async fn put_audio(&self, story_id: Uuid, sequence: i32, bytes: Vec<u8>) -> Result<String, BlobError>;
}
