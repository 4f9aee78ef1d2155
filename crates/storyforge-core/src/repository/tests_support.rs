//! An in-process [`Repository`] double used by tests in other modules
//! (dispatcher, orchestrator) that need a `Story`/`Scene` store without a
//! live Postgres instance. [`PgRepository`](super::PgRepository)'s own
//! test module still exercises the real schema via `#[sqlx::test]`; this
//! type exists purely so unrelated modules can test against the
//! `Repository` trait cheaply.

use std::collections::HashMap;
use std::sync::Mutex;

use chrono::Utc;
use uuid::Uuid;

use crate::domain::{Scene, Story, StoryStatus};
use crate::error::RepositoryError;
use crate::state_machine::is_legal_transition;

use super::Repository;

#[derive(Default)]
struct State {
    stories: HashMap<Uuid, Story>,
    scenes: HashMap<Uuid, Vec<Scene>>,
}

pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State::default()),
        }
    }

    /// Test hook: a snapshot of every `Story` currently stored.
    pub async fn all_stories(&self) -> Vec<Story> {
        self.state.lock().unwrap().stories.values().cloned().collect()
    }
}

impl Default for InMemoryRepository {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl Repository for InMemoryRepository {
    async fn create_story(&self, story_id: Uuid, title: &str, prompt: &str, user_id: &str) -> Result<Story, RepositoryError> {
        let story = Story {
            story_id,
            title: title.to_string(),
            prompt: prompt.to_string(),
            user_id: user_id.to_string(),
            status: StoryStatus::Pending,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            story_metadata: None,
            error: None,
        };

        let mut state = self.state.lock().unwrap();
        state.stories.insert(story_id, story.clone());
        Ok(story)
    }

    async fn set_status(&self, story_id: Uuid, new_status: StoryStatus, error: Option<&str>) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let story = state.stories.get_mut(&story_id).ok_or_else(|| RepositoryError::NotFound {
            message: format!("story {story_id} not found"),
        })?;

        if !is_legal_transition(story.status, new_status) {
            return Err(RepositoryError::Conflict {
                message: format!("{} -> {new_status} is not a legal transition", story.status),
            });
        }

        story.status = new_status;
        story.error = error.map(str::to_string);
        story.updated_at = Utc::now();
        Ok(())
    }

    async fn set_metadata(&self, story_id: Uuid, metadata: serde_json::Value) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let story = state.stories.get_mut(&story_id).ok_or_else(|| RepositoryError::NotFound {
            message: format!("story {story_id} not found"),
        })?;

        if story.status != StoryStatus::Processing {
            return Err(RepositoryError::Conflict {
                message: format!("story {story_id} is not PROCESSING; cannot set metadata"),
            });
        }

        story.story_metadata = Some(metadata);
        story.updated_at = Utc::now();
        Ok(())
    }

    async fn insert_scene(&self, scene: &Scene) -> Result<(), RepositoryError> {
        let mut state = self.state.lock().unwrap();
        let scenes = state.scenes.entry(scene.story_id).or_default();

        if scenes.iter().any(|s| s.sequence == scene.sequence) {
            // Already persisted: idempotent no-op, mirroring `PgRepository`'s
            // `ON CONFLICT (story_id, sequence) DO NOTHING`.
            return Ok(());
        }

        scenes.push(scene.clone());
        Ok(())
    }

    async fn insert_scenes_batch(&self, scenes: &[Scene]) -> Result<(), RepositoryError> {
        for scene in scenes {
            self.insert_scene(scene).await?;
        }
        Ok(())
    }

    async fn get_story(&self, story_id: Uuid) -> Result<Story, RepositoryError> {
        self.state
            .lock()
            .unwrap()
            .stories
            .get(&story_id)
            .cloned()
            .ok_or_else(|| RepositoryError::NotFound {
                message: format!("story {story_id} not found"),
            })
    }

    async fn list_scenes(&self, story_id: Uuid) -> Result<Vec<Scene>, RepositoryError> {
        let mut scenes = self.state.lock().unwrap().scenes.get(&story_id).cloned().unwrap_or_default();
        scenes.sort_by_key(|s| s.sequence);
        Ok(scenes)
    }
}
