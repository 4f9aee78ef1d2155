//! Dispatcher (§4.F): the front of the pipeline. Creates the `Story` row
//! and enqueues the job envelope, in that order, so that the instant a
//! caller receives a `story_id` there is a known row to poll.

use std::sync::Arc;

use chrono::Utc;
use uuid::Uuid;

use crate::broker::{BrokerClient, JobEnvelope};
use crate::domain::StoryStatus;
use crate::error::OrchestratorError;
use crate::repository::Repository;

/// `submit`'s single collaborator set: a repository and a broker, plus
/// the queue name jobs are enqueued onto.
pub struct Dispatcher {
    repository: Arc<dyn Repository>,
    broker: Arc<dyn BrokerClient>,
    queue_name: String,
}

impl Dispatcher {
    pub fn new(repository: Arc<dyn Repository>, broker: Arc<dyn BrokerClient>, queue_name: impl Into<String>) -> Self {
        Self {
            repository,
            broker,
            queue_name: queue_name.into(),
        }
    }

    /// Create the `Story` row (PENDING) and enqueue its job envelope.
    ///
    /// Create-then-enqueue ordering (§4.F) makes "enqueue succeeds but the
    /// response is lost" safe: redelivery finds an existing PENDING row.
    /// An enqueue failure marks the Story FAILED with `error` containing
    /// "enqueue" and surfaces the error to the caller -- nothing is
    /// silently dropped.
    pub async fn submit(&self, title: &str, prompt: &str, user_id: &str) -> Result<Uuid, OrchestratorError> {
        let story_id = Uuid::new_v4();

        self.repository.create_story(story_id, title, prompt, user_id).await?;

        let envelope = JobEnvelope {
            story_id,
            user_id: user_id.to_string(),
            title: title.to_string(),
            prompt: prompt.to_string(),
            attempt: 0,
            enqueued_at: Utc::now(),
        };

        if let Err(enqueue_err) = self.broker.enqueue(&self.queue_name, envelope).await {
            let _ = self
                .repository
                .set_status(story_id, StoryStatus::Failed, Some("enqueue_failed"))
                .await;
            return Err(OrchestratorError::Fatal {
                stage: "enqueue",
                message: enqueue_err.to_string(),
            });
        }

        Ok(story_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerClient;
    use crate::repository::tests_support::InMemoryRepository;

    #[tokio::test]
    async fn submit_creates_pending_story_and_enqueues() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let dispatcher = Dispatcher::new(repository.clone(), broker.clone(), "stories");

        let story_id = dispatcher.submit("Forest", "A child finds a magical forest", "u1").await.unwrap();

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Pending);
        assert_eq!(broker.ready_len("stories").await, 1);
    }

    #[tokio::test]
    async fn submit_marks_story_failed_when_enqueue_fails() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::rejecting_enqueue(3));
        let dispatcher = Dispatcher::new(repository.clone(), broker, "stories");

        let result = dispatcher.submit("Forest", "A child finds a magical forest", "u1").await;
        assert!(result.is_err());

        let stories = repository.all_stories().await;
        assert_eq!(stories.len(), 1);
        let story = &stories[0];
        assert_eq!(story.status, StoryStatus::Failed);
        assert_eq!(story.error.as_deref(), Some("enqueue_failed"));
    }
}
