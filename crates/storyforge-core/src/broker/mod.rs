//! Broker Client (§4.E): enqueue/dequeue jobs on a durable, Redis-backed
//! queue with visibility-timeout semantics and at-least-once delivery.
//!
//! Grounded on the pack's `flowcatalyst` manifest pairing of
//! `redis = { features = ["tokio-comp", "connection-manager"] }` with a
//! durable queue in front of an AI pipeline, and on the `dog-queue`
//! reference file's lease/visibility-timeout vocabulary (claim a job for
//! a bounded lease, reap expired leases back onto the ready queue). The
//! `MockBrokerClient` follows the teacher's preference for a hand-written
//! in-process mock over a mocking framework at its own trait boundaries
//! (`automation/posting_queue.rs::PostExecutor`'s tests).

pub mod mock;
pub mod redis_broker;

pub use mock::MockBrokerClient;
pub use redis_broker::RedisBrokerClient;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::error::BrokerError;

/// The durable job envelope persisted on the queue (§6's envelope schema).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobEnvelope {
    pub story_id: Uuid,
    pub user_id: String,
    pub title: String,
    pub prompt: String,
    pub attempt: u32,
    pub enqueued_at: DateTime<Utc>,
}

/// An opaque handle to a claimed (dequeued) job. Implementations embed
/// whatever bookkeeping they need to `ack`/`nack` the right job; callers
/// must treat the contents as opaque.
#[derive(Debug, Clone)]
pub struct JobHandle {
    pub(crate) queue_name: String,
    pub(crate) job_id: String,
}

/// Object-safe broker trait. [`RedisBrokerClient`] is the production
/// implementation; [`MockBrokerClient`] backs tests.
#[async_trait::async_trait]
pub trait BrokerClient: Send + Sync {
    /// Persist a job envelope durably before returning (§4.E: "Persistence
    /// is durable before return").
    async fn enqueue(&self, queue_name: &str, envelope: JobEnvelope) -> Result<(), BrokerError>;

    /// Claim the next ready job, if any, blocking up to a short poll
    /// interval. The returned handle's implicit ack deadline is
    /// `visibility_timeout` from the moment of the claim.
    async fn dequeue(&self, queue_name: &str, visibility_timeout: Duration) -> Result<Option<(JobHandle, JobEnvelope)>, BrokerError>;

    /// Acknowledge and remove a claimed job.
    async fn ack(&self, handle: &JobHandle) -> Result<(), BrokerError>;

    /// Return a claimed job to the queue for redelivery, or move it to the
    /// dead-letter list if its envelope's `attempt` has reached
    /// `max_attempts`.
    async fn nack(&self, handle: &JobHandle, envelope: JobEnvelope, requeue_delay: Option<Duration>) -> Result<(), BrokerError>;

    /// Extend a claimed job's visibility deadline. Called periodically by
    /// the Orchestrator while a job is in flight (§4.E: "renews visibility
    /// periodically (every `visibility_timeout/3`)").
    async fn renew(&self, handle: &JobHandle, visibility_timeout: Duration) -> Result<(), BrokerError>;
}
