//! In-process [`BrokerClient`] mock for tests, following the teacher's
//! preference for a hand-written mock over a mocking framework at its own
//! trait boundaries (`automation/posting_queue.rs::PostExecutor`'s tests).

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use tokio::sync::Mutex;
use uuid::Uuid;

use super::{BrokerClient, JobEnvelope, JobHandle};
use crate::error::BrokerError;

struct Claim {
    queue_name: String,
    envelope: JobEnvelope,
    deadline: Instant,
}

struct State {
    ready: HashMap<String, VecDeque<(String, JobEnvelope)>>,
    inflight: HashMap<String, Claim>,
    dead: HashMap<String, Vec<JobEnvelope>>,
}

/// An in-memory broker for tests. `reject_enqueue`, if set, makes
/// [`enqueue`](BrokerClient::enqueue) always fail, for exercising the
/// Dispatcher's enqueue-failure path (§8 scenario 2).
pub struct MockBrokerClient {
    state: Mutex<State>,
    max_attempts: u32,
    reject_enqueue: bool,
}

impl MockBrokerClient {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Mutex::new(State {
                ready: HashMap::new(),
                inflight: HashMap::new(),
                dead: HashMap::new(),
            }),
            max_attempts,
            reject_enqueue: false,
        }
    }

    /// Build a mock that always fails `enqueue`, for exercising §8
    /// scenario 2 (enqueue failure).
    pub fn rejecting_enqueue(max_attempts: u32) -> Self {
        Self {
            reject_enqueue: true,
            ..Self::new(max_attempts)
        }
    }

    /// Number of jobs currently sitting ready on `queue_name` (test hook).
    pub async fn ready_len(&self, queue_name: &str) -> usize {
        self.state.lock().await.ready.get(queue_name).map_or(0, VecDeque::len)
    }

    /// Number of jobs moved to the dead-letter list for `queue_name`.
    pub async fn dead_len(&self, queue_name: &str) -> usize {
        self.state.lock().await.dead.get(queue_name).map_or(0, Vec::len)
    }
}

#[async_trait::async_trait]
impl BrokerClient for MockBrokerClient {
    async fn enqueue(&self, queue_name: &str, envelope: JobEnvelope) -> Result<(), BrokerError> {
        if self.reject_enqueue {
            return Err(BrokerError::Connection {
                message: "mock broker configured to reject enqueue".to_string(),
            });
        }

        let job_id = Uuid::new_v4().to_string();
        let mut state = self.state.lock().await;
        state.ready.entry(queue_name.to_string()).or_default().push_back((job_id, envelope));
        Ok(())
    }

    async fn dequeue(&self, queue_name: &str, visibility_timeout: Duration) -> Result<Option<(JobHandle, JobEnvelope)>, BrokerError> {
        let mut state = self.state.lock().await;
        let Some((job_id, envelope)) = state.ready.get_mut(queue_name).and_then(VecDeque::pop_front) else {
            return Ok(None);
        };

        state.inflight.insert(
            job_id.clone(),
            Claim {
                queue_name: queue_name.to_string(),
                envelope: envelope.clone(),
                deadline: Instant::now() + visibility_timeout,
            },
        );

        let handle = JobHandle {
            queue_name: queue_name.to_string(),
            job_id,
        };

        Ok(Some((handle, envelope)))
    }

    async fn ack(&self, handle: &JobHandle) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.inflight.remove(&handle.job_id);
        Ok(())
    }

    async fn nack(&self, handle: &JobHandle, envelope: JobEnvelope, _requeue_delay: Option<Duration>) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        state.inflight.remove(&handle.job_id);

        if envelope.attempt >= self.max_attempts {
            state.dead.entry(handle.queue_name.clone()).or_default().push(envelope);
        } else {
            state
                .ready
                .entry(handle.queue_name.clone())
                .or_default()
                .push_back((handle.job_id.clone(), envelope));
        }

        Ok(())
    }

    async fn renew(&self, handle: &JobHandle, visibility_timeout: Duration) -> Result<(), BrokerError> {
        let mut state = self.state.lock().await;
        match state.inflight.get_mut(&handle.job_id) {
            Some(claim) => {
                claim.deadline = Instant::now() + visibility_timeout;
                Ok(())
            }
            None => Err(BrokerError::StaleHandle {
                message: format!("job {} is not currently claimed", handle.job_id),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn envelope() -> JobEnvelope {
        JobEnvelope {
            story_id: Uuid::new_v4(),
            user_id: "u1".into(),
            title: "Forest".into(),
            prompt: "A child finds a magical forest".into(),
            attempt: 1,
            enqueued_at: chrono::Utc::now(),
        }
    }

    #[tokio::test]
    async fn enqueue_then_dequeue_roundtrips_envelope() {
        let broker = MockBrokerClient::new(3);
        broker.enqueue("stories", envelope()).await.unwrap();
        let (handle, envelope) = broker.dequeue("stories", Duration::from_secs(60)).await.unwrap().unwrap();
        assert_eq!(envelope.title, "Forest");
        assert_eq!(handle.queue_name, "stories");
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_returns_none() {
        let broker = MockBrokerClient::new(3);
        let result = broker.dequeue("stories", Duration::from_secs(60)).await.unwrap();
        assert!(result.is_none());
    }

    #[tokio::test]
    async fn ack_removes_job_permanently() {
        let broker = MockBrokerClient::new(3);
        broker.enqueue("stories", envelope()).await.unwrap();
        let (handle, _) = broker.dequeue("stories", Duration::from_secs(60)).await.unwrap().unwrap();
        broker.ack(&handle).await.unwrap();
        assert_eq!(broker.ready_len("stories").await, 0);
        assert_eq!(broker.dead_len("stories").await, 0);
    }

    #[tokio::test]
    async fn nack_below_max_attempts_requeues() {
        let broker = MockBrokerClient::new(3);
        broker.enqueue("stories", envelope()).await.unwrap();
        let (handle, env) = broker.dequeue("stories", Duration::from_secs(60)).await.unwrap().unwrap();
        broker.nack(&handle, env, None).await.unwrap();
        assert_eq!(broker.ready_len("stories").await, 1);
    }

    #[tokio::test]
    async fn nack_at_max_attempts_dead_letters() {
        let broker = MockBrokerClient::new(3);
        broker.enqueue("stories", envelope()).await.unwrap();
        let (handle, mut env) = broker.dequeue("stories", Duration::from_secs(60)).await.unwrap().unwrap();
        env.attempt = 3;
        broker.nack(&handle, env, None).await.unwrap();
        assert_eq!(broker.ready_len("stories").await, 0);
        assert_eq!(broker.dead_len("stories").await, 1);
    }

    #[tokio::test]
    async fn rejecting_enqueue_mock_always_fails() {
        let broker = MockBrokerClient::rejecting_enqueue(3);
        let result = broker.enqueue("stories", envelope()).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn renew_on_unclaimed_handle_is_stale() {
        let broker = MockBrokerClient::new(3);
        let handle = JobHandle {
            queue_name: "stories".into(),
            job_id: "not-claimed".into(),
        };
        let result = broker.renew(&handle, Duration::from_secs(60)).await;
        assert!(matches!(result, Err(BrokerError::StaleHandle { .. })));
    }
}
