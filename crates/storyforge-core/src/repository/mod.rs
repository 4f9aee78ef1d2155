//! Repository (§4.C): persist/update `Story`, insert `Scene` rows, status
//! transitions, ordered reads.
//!
//! Grounded on the teacher's `storage/mod.rs::init_db` (pool
//! construction, embedded `sqlx::migrate!`) and `storage/approval_queue.rs`
//! (typed row -> domain struct conversion, one function per operation).
//! The relational store is realized as PostgreSQL rather than the
//! teacher's SQLite (see DESIGN.md): a multi-process, multi-worker
//! shared-state service doesn't fit SQLite's single-writer model.

#[cfg(any(test, feature = "test-helpers"))]
pub mod tests_support;

use std::time::Duration;

use async_trait::async_trait;
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgPool, Row};
use uuid::Uuid;

use crate::domain::{Scene, Story, StoryStatus};
use crate::error::RepositoryError;
use crate::state_machine::is_legal_transition;

/// Initialize the Postgres connection pool and run embedded migrations.
pub async fn init_db(database_url: &str, max_connections: u32) -> Result<PgPool, RepositoryError> {
    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .acquire_timeout(Duration::from_secs(10))
        .connect(database_url)
        .await
        .map_err(|e| RepositoryError::Connection { source: e })?;

    sqlx::migrate!("./migrations")
        .run(&pool)
        .await
        .map_err(|e| RepositoryError::Migration { source: e })?;

    Ok(pool)
}

/// Object-safe repository trait; [`PgRepository`] is the production
/// implementation backed by Postgres.
#[async_trait]
pub trait Repository: Send + Sync {
    async fn create_story(&self, story_id: Uuid, title: &str, prompt: &str, user_id: &str) -> Result<Story, RepositoryError>;

    /// Atomic, conditional status transition: an `UPDATE ... WHERE status =
    /// ANY(<legal predecessors of new_status>)`, `Err(RepositoryError::Conflict)`
    /// when zero rows match. This rejects transitions from a status that
    /// isn't a legal predecessor of `new_status` (e.g. out of a terminal
    /// state), but it is not a mutual-exclusion lock: `(Processing,
    /// Processing)` is itself a legal transition (`state_machine.rs`), so
    /// two workers racing to claim the same redelivered job both succeed
    /// here and both proceed to run the pipeline. That's intentional --
    /// at-least-once delivery means redelivery during this window is
    /// expected, not an error to be fenced out at the status layer. What
    /// actually prevents duplicated output is scene-level idempotency
    /// (`insert_scene`'s `ON CONFLICT (story_id, sequence) DO NOTHING`) and
    /// the orchestrator skipping scenes already marked complete on retry.
    async fn set_status(&self, story_id: Uuid, new_status: StoryStatus, error: Option<&str>) -> Result<(), RepositoryError>;

    async fn set_metadata(&self, story_id: Uuid, metadata: serde_json::Value) -> Result<(), RepositoryError>;

    async fn insert_scene(&self, scene: &Scene) -> Result<(), RepositoryError>;

    async fn insert_scenes_batch(&self, scenes: &[Scene]) -> Result<(), RepositoryError>;

    async fn get_story(&self, story_id: Uuid) -> Result<Story, RepositoryError>;

    async fn list_scenes(&self, story_id: Uuid) -> Result<Vec<Scene>, RepositoryError>;
}

/// Production `Repository` backed by Postgres via `sqlx`.
pub struct PgRepository {
    pool: PgPool,
}

impl PgRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn story_from_row(row: PgRow) -> Result<Story, RepositoryError> {
    let status_str: String = row.try_get("status").map_err(|e| RepositoryError::Query { source: e })?;
    let status = status_str.parse::<StoryStatus>().map_err(|message| RepositoryError::Conflict { message })?;

    Ok(Story {
        story_id: row.try_get("story_id").map_err(|e| RepositoryError::Query { source: e })?,
        title: row.try_get("title").map_err(|e| RepositoryError::Query { source: e })?,
        prompt: row.try_get("prompt").map_err(|e| RepositoryError::Query { source: e })?,
        user_id: row.try_get("user_id").map_err(|e| RepositoryError::Query { source: e })?,
        status,
        created_at: row.try_get("created_at").map_err(|e| RepositoryError::Query { source: e })?,
        updated_at: row.try_get("updated_at").map_err(|e| RepositoryError::Query { source: e })?,
        story_metadata: row.try_get("story_metadata").map_err(|e| RepositoryError::Query { source: e })?,
        error: row.try_get("error").map_err(|e| RepositoryError::Query { source: e })?,
    })
}

fn scene_from_row(row: PgRow) -> Result<Scene, RepositoryError> {
    Ok(Scene {
        scene_id: row.try_get("scene_id").map_err(|e| RepositoryError::Query { source: e })?,
        story_id: row.try_get("story_id").map_err(|e| RepositoryError::Query { source: e })?,
        sequence: row.try_get("sequence").map_err(|e| RepositoryError::Query { source: e })?,
        title: row.try_get("title").map_err(|e| RepositoryError::Query { source: e })?,
        text: row.try_get("text").map_err(|e| RepositoryError::Query { source: e })?,
        image_prompt: row.try_get("image_prompt").map_err(|e| RepositoryError::Query { source: e })?,
        image_url: row.try_get("image_url").map_err(|e| RepositoryError::Query { source: e })?,
        audio_url: row.try_get("audio_url").map_err(|e| RepositoryError::Query { source: e })?,
        created_at: row.try_get("created_at").map_err(|e| RepositoryError::Query { source: e })?,
        updated_at: row.try_get("updated_at").map_err(|e| RepositoryError::Query { source: e })?,
    })
}

/// Legal predecessor statuses for a conditional `set_status` update,
/// mirroring [`is_legal_transition`] but expressed as the `WHERE` clause
/// set (`Story` may transition to `to` from any status in this list).
fn legal_predecessors(to: StoryStatus) -> Vec<StoryStatus> {
    [
        StoryStatus::Pending,
        StoryStatus::Processing,
        StoryStatus::Completed,
        StoryStatus::Failed,
    ]
    .into_iter()
    .filter(|from| is_legal_transition(*from, to))
    .collect()
}

#[async_trait]
impl Repository for PgRepository {
    async fn create_story(&self, story_id: Uuid, title: &str, prompt: &str, user_id: &str) -> Result<Story, RepositoryError> {
        let row = sqlx::query(
            "INSERT INTO stories (story_id, title, prompt, user_id, status, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, 'PENDING', now(), now()) \
             RETURNING story_id, title, prompt, user_id, status, created_at, updated_at, story_metadata, error",
        )
        .bind(story_id)
        .bind(title)
        .bind(prompt)
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?;

        story_from_row(row)
    }

    async fn set_status(&self, story_id: Uuid, new_status: StoryStatus, error: Option<&str>) -> Result<(), RepositoryError> {
        let predecessors: Vec<&'static str> = legal_predecessors(new_status).iter().map(|s| s.as_str()).collect();
        if predecessors.is_empty() {
            return Err(RepositoryError::Conflict {
                message: format!("no legal predecessor status leads to {new_status}"),
            });
        }

        let result = sqlx::query(
            "UPDATE stories SET status = $1, error = $2, updated_at = now() \
             WHERE story_id = $3 AND status = ANY($4)",
        )
        .bind(new_status.as_str())
        .bind(error)
        .bind(story_id)
        .bind(&predecessors)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                message: format!("story {story_id} is not in a status that can transition to {new_status}"),
            });
        }

        Ok(())
    }

    async fn set_metadata(&self, story_id: Uuid, metadata: serde_json::Value) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE stories SET story_metadata = $1, updated_at = now() \
             WHERE story_id = $2 AND status = 'PROCESSING'",
        )
        .bind(metadata)
        .bind(story_id)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::Conflict {
                message: format!("story {story_id} is not PROCESSING; cannot set metadata"),
            });
        }

        Ok(())
    }

    async fn insert_scene(&self, scene: &Scene) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "INSERT INTO scenes (scene_id, story_id, sequence, title, text, image_prompt, image_url, audio_url, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now()) \
             ON CONFLICT (story_id, sequence) DO NOTHING",
        )
        .bind(scene.scene_id)
        .bind(scene.story_id)
        .bind(scene.sequence)
        .bind(&scene.title)
        .bind(&scene.text)
        .bind(&scene.image_prompt)
        .bind(&scene.image_url)
        .bind(&scene.audio_url)
        .execute(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?;

        // A `(story_id, sequence)` unique-constraint collision resolved by
        // `ON CONFLICT DO NOTHING` is "already persisted" idempotency
        // (§4.G failure semantics), not an error: zero rows affected here
        // just means a prior attempt already won the race.
        let _ = result;
        Ok(())
    }

    async fn insert_scenes_batch(&self, scenes: &[Scene]) -> Result<(), RepositoryError> {
        let mut tx = self.pool.begin().await.map_err(|e| RepositoryError::Query { source: e })?;

        for scene in scenes {
            sqlx::query(
                "INSERT INTO scenes (scene_id, story_id, sequence, title, text, image_prompt, image_url, audio_url, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, now(), now()) \
                 ON CONFLICT (story_id, sequence) DO NOTHING",
            )
            .bind(scene.scene_id)
            .bind(scene.story_id)
            .bind(scene.sequence)
            .bind(&scene.title)
            .bind(&scene.text)
            .bind(&scene.image_prompt)
            .bind(&scene.image_url)
            .bind(&scene.audio_url)
            .execute(&mut *tx)
            .await
            .map_err(|e| RepositoryError::Query { source: e })?;
        }

        tx.commit().await.map_err(|e| RepositoryError::Query { source: e })?;
        Ok(())
    }

    async fn get_story(&self, story_id: Uuid) -> Result<Story, RepositoryError> {
        let row = sqlx::query(
            "SELECT story_id, title, prompt, user_id, status, created_at, updated_at, story_metadata, error \
             FROM stories WHERE story_id = $1",
        )
        .bind(story_id)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?
        .ok_or_else(|| RepositoryError::NotFound {
            message: format!("story {story_id} not found"),
        })?;

        story_from_row(row)
    }

    async fn list_scenes(&self, story_id: Uuid) -> Result<Vec<Scene>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT scene_id, story_id, sequence, title, text, image_prompt, image_url, audio_url, created_at, updated_at \
             FROM scenes WHERE story_id = $1 ORDER BY sequence ASC",
        )
        .bind(story_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| RepositoryError::Query { source: e })?;

        rows.into_iter().map(scene_from_row).collect()
    }
}
