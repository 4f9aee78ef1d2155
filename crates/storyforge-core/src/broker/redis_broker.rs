//! Production [`BrokerClient`] backed by Redis: a ready list, an
//! in-flight sorted set keyed by claim deadline, a delayed-requeue
//! sorted set, and a dead-letter list, all scoped under `{queue_name}:`.
//!
//! Claims and the periodic reap of expired claims are each a single Lua
//! script so the pop-then-track-deadline and expire-then-requeue
//! sequences are atomic with respect to other connections.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio_util::sync::CancellationToken;

use super::{BrokerClient, JobEnvelope, JobHandle};
use crate::error::BrokerError;

const CLAIM_SCRIPT: &str = r"
local job_id = redis.call('LPOP', KEYS[1])
if not job_id then
  return false
end
redis.call('ZADD', KEYS[2], ARGV[1], job_id)
local payload = redis.call('GET', ARGV[2] .. job_id)
return {job_id, payload}
";

const REAP_SCRIPT: &str = r"
local due = redis.call('ZRANGEBYSCORE', KEYS[1], '-inf', ARGV[1], 'LIMIT', 0, ARGV[2])
for _, job_id in ipairs(due) do
  redis.call('ZREM', KEYS[1], job_id)
  redis.call('RPUSH', KEYS[2], job_id)
end
return #due
";

pub struct RedisBrokerClient {
    conn: ConnectionManager,
    max_attempts: u32,
}

impl RedisBrokerClient {
    pub async fn connect(redis_url: &str, max_attempts: u32) -> Result<Self, BrokerError> {
        let client = redis::Client::open(redis_url).map_err(|e| BrokerError::Connection { message: e.to_string() })?;
        let conn = ConnectionManager::new(client).await.map_err(|e| BrokerError::Connection { message: e.to_string() })?;
        Ok(Self { conn, max_attempts })
    }

    fn ready_key(queue_name: &str) -> String {
        format!("{queue_name}:ready")
    }
    fn inflight_key(queue_name: &str) -> String {
        format!("{queue_name}:inflight")
    }
    fn delayed_key(queue_name: &str) -> String {
        format!("{queue_name}:delayed")
    }
    fn dead_key(queue_name: &str) -> String {
        format!("{queue_name}:dead")
    }
    fn job_key_prefix(queue_name: &str) -> String {
        format!("{queue_name}:job:")
    }

    /// Reap jobs whose claim deadline has passed back onto the ready
    /// list (redelivery), and jobs whose delayed-requeue time has arrived.
    /// Called periodically by [`run_reaper`].
    pub async fn reap_due(&self, queue_name: &str) -> Result<(u32, u32), BrokerError> {
        let now = Utc::now().timestamp_millis();
        let mut conn = self.conn.clone();

        let expired_inflight: i64 = redis::Script::new(REAP_SCRIPT)
            .key(Self::inflight_key(queue_name))
            .key(Self::ready_key(queue_name))
            .arg(now)
            .arg(1000)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        let due_delayed: i64 = redis::Script::new(REAP_SCRIPT)
            .key(Self::delayed_key(queue_name))
            .key(Self::ready_key(queue_name))
            .arg(now)
            .arg(1000)
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        Ok((expired_inflight as u32, due_delayed as u32))
    }
}

#[async_trait::async_trait]
impl BrokerClient for RedisBrokerClient {
    async fn enqueue(&self, queue_name: &str, envelope: JobEnvelope) -> Result<(), BrokerError> {
        let job_id = uuid::Uuid::new_v4().to_string();
        let payload = serde_json::to_string(&envelope).map_err(|e| BrokerError::Connection { message: e.to_string() })?;
        let job_key = format!("{}{job_id}", Self::job_key_prefix(queue_name));

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic().set(&job_key, payload).rpush(Self::ready_key(queue_name), &job_id);
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        Ok(())
    }

    async fn dequeue(&self, queue_name: &str, visibility_timeout: Duration) -> Result<Option<(JobHandle, JobEnvelope)>, BrokerError> {
        let deadline = (Utc::now() + chrono::Duration::from_std(visibility_timeout).unwrap_or(chrono::Duration::hours(2))).timestamp_millis();
        let mut conn = self.conn.clone();

        let claimed: Option<(String, String)> = redis::Script::new(CLAIM_SCRIPT)
            .key(Self::ready_key(queue_name))
            .key(Self::inflight_key(queue_name))
            .arg(deadline)
            .arg(Self::job_key_prefix(queue_name))
            .invoke_async(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        let Some((job_id, payload)) = claimed else {
            return Ok(None);
        };

        let envelope: JobEnvelope = serde_json::from_str(&payload).map_err(|e| BrokerError::Connection { message: format!("corrupt job envelope: {e}") })?;

        let handle = JobHandle {
            queue_name: queue_name.to_string(),
            job_id,
        };

        Ok(Some((handle, envelope)))
    }

    async fn ack(&self, handle: &JobHandle) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let job_key = format!("{}{}", Self::job_key_prefix(&handle.queue_name), handle.job_id);

        let mut pipe = redis::pipe();
        pipe.atomic()
            .zrem(Self::inflight_key(&handle.queue_name), &handle.job_id)
            .del(&job_key);
        pipe.query_async::<_, ()>(&mut conn)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        Ok(())
    }

    async fn nack(&self, handle: &JobHandle, envelope: JobEnvelope, requeue_delay: Option<Duration>) -> Result<(), BrokerError> {
        let mut conn = self.conn.clone();
        let job_key = format!("{}{}", Self::job_key_prefix(&handle.queue_name), handle.job_id);
        let payload = serde_json::to_string(&envelope).map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        let _: () = conn.set(&job_key, payload).await.map_err(|e| BrokerError::Connection { message: e.to_string() })?;
        let _: () = conn
            .zrem(Self::inflight_key(&handle.queue_name), &handle.job_id)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        if envelope.attempt >= self.max_attempts {
            let _: () = conn
                .rpush(Self::dead_key(&handle.queue_name), &handle.job_id)
                .await
                .map_err(|e| BrokerError::Connection { message: e.to_string() })?;
            return Ok(());
        }

        match requeue_delay {
            Some(delay) if !delay.is_zero() => {
                let due = (Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default()).timestamp_millis();
                let _: () = conn
                    .zadd(Self::delayed_key(&handle.queue_name), &handle.job_id, due)
                    .await
                    .map_err(|e| BrokerError::Connection { message: e.to_string() })?;
            }
            _ => {
                let _: () = conn
                    .rpush(Self::ready_key(&handle.queue_name), &handle.job_id)
                    .await
                    .map_err(|e| BrokerError::Connection { message: e.to_string() })?;
            }
        }

        Ok(())
    }

    async fn renew(&self, handle: &JobHandle, visibility_timeout: Duration) -> Result<(), BrokerError> {
        let deadline = (Utc::now() + chrono::Duration::from_std(visibility_timeout).unwrap_or(chrono::Duration::hours(2))).timestamp_millis();
        let mut conn = self.conn.clone();

        let updated: i32 = conn
            .zadd(Self::inflight_key(&handle.queue_name), &handle.job_id, deadline)
            .await
            .map_err(|e| BrokerError::Connection { message: e.to_string() })?;

        // ZADD (no XX/NX flags) reports 0 when the member already existed
        // and only its score changed -- that's the expected renewal case,
        // not an error. Only a connection failure above is fatal here.
        let _ = updated;
        Ok(())
    }
}

/// Background task that periodically reaps expired in-flight claims and
/// due delayed-requeue entries back onto the ready list, generalized from
/// the teacher's `automation/mod.rs::run_token_refresh_loop` periodic-
/// refresh-with-cancellation shape (OAuth refresh -> queue maintenance).
pub async fn run_reaper(broker: Arc<RedisBrokerClient>, queue_name: String, tick: Duration, cancel: CancellationToken) {
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                tracing::debug!(queue = %queue_name, "broker reaper cancelled");
                return;
            }
            () = tokio::time::sleep(tick) => {}
        }

        match broker.reap_due(&queue_name).await {
            Ok((expired, due)) if expired > 0 || due > 0 => {
                tracing::info!(queue = %queue_name, expired, due, "reaped jobs back onto ready queue");
            }
            Ok(_) => {}
            Err(e) => tracing::warn!(queue = %queue_name, error = %e, "broker reap attempt failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_helpers_scope_under_queue_name() {
        assert_eq!(RedisBrokerClient::ready_key("stories"), "stories:ready");
        assert_eq!(RedisBrokerClient::inflight_key("stories"), "stories:inflight");
        assert_eq!(RedisBrokerClient::delayed_key("stories"), "stories:delayed");
        assert_eq!(RedisBrokerClient::dead_key("stories"), "stories:dead");
        assert_eq!(RedisBrokerClient::job_key_prefix("stories"), "stories:job:");
    }
}
