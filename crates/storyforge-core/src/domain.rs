//! Domain types for the story-generation pipeline: the `Story` job-level
//! aggregate and its child `Scene` rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Canonical status values for a `Story`. See [`crate::state_machine`] for
/// the legal transition graph between these values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum StoryStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

impl StoryStatus {
    /// Returns `true` for `COMPLETED` and `FAILED`: a `Story` never leaves
    /// these statuses once entered.
    pub fn is_terminal(self) -> bool {
        matches!(self, StoryStatus::Completed | StoryStatus::Failed)
    }

    /// The string form stored in the `status` column.
    pub fn as_str(self) -> &'static str {
        match self {
            StoryStatus::Pending => "PENDING",
            StoryStatus::Processing => "PROCESSING",
            StoryStatus::Completed => "COMPLETED",
            StoryStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for StoryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StoryStatus::Pending),
            "PROCESSING" => Ok(StoryStatus::Processing),
            "COMPLETED" => Ok(StoryStatus::Completed),
            "FAILED" => Ok(StoryStatus::Failed),
            other => Err(format!("unknown story status: {other}")),
        }
    }
}

/// The job-level aggregate: one row per submitted story request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Story {
    pub story_id: Uuid,
    pub title: String,
    pub prompt: String,
    pub user_id: String,
    pub status: StoryStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Opaque plan payload (characters, visual profile, base style)
    /// captured from stage 1. `None` until `set_metadata` is called.
    pub story_metadata: Option<serde_json::Value>,
    /// Short machine-tagged diagnostic, populated only on `FAILED`.
    pub error: Option<String>,
}

/// A derived child entity of `Story`: one illustrated, narrated scene.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scene {
    pub scene_id: Uuid,
    pub story_id: Uuid,
    pub sequence: i32,
    pub title: String,
    pub text: String,
    pub image_prompt: String,
    pub image_url: Option<String>,
    pub audio_url: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Scene {
    /// A scene is considered persisted-and-done when both of its derived
    /// media URLs are populated. Per the conservative reading of the
    /// partial-scene-reuse open question (see DESIGN.md), such a scene is
    /// frozen and skipped on redelivery.
    pub fn is_complete(&self) -> bool {
        self.image_url.is_some() && self.audio_url.is_some()
    }
}

/// A character appearing in the stage-1 plan.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanCharacter {
    pub name: String,
    pub role: String,
    pub visual_description: String,
}

/// A single scene as declared by the stage-1 plan (before per-scene
/// moment/image/audio generation has run).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanScene {
    pub sequence: i32,
    pub title: String,
    pub text: String,
    pub image_prompt: String,
}

/// The stage-1 LLM output: title, characters, and the declared scene list.
/// The scene count in this structure is the authoritative `N` referenced
/// throughout the spec (see DESIGN.md for the Open-Question resolution).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryPlan {
    pub title: String,
    pub characters: Vec<PlanCharacter>,
    pub scenes: Vec<PlanScene>,
}

impl StoryPlan {
    pub fn scene_count(&self) -> usize {
        self.scenes.len()
    }
}

/// Per-character canonical appearance, computed once per story and reused
/// across scenes as a style anchor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VisualProfile {
    pub characters: Vec<CharacterAppearance>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CharacterAppearance {
    pub name: String,
    pub canonical_appearance: String,
}

/// Shared illustration style anchor, computed once per story.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaseStyle {
    pub palette: String,
    pub lighting: String,
    pub medium: String,
    pub composition_notes: String,
}

/// Per-scene moment description produced by stage 4, used to compose the
/// final image prompt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneMoment {
    pub moment_description: String,
    pub camera: String,
    pub mood: String,
}

/// Opaque structured plan payload persisted via `set_metadata`: the plan,
/// visual profile, and base style captured from stage 1, preserved for
/// reproducibility per §3's `story_metadata` field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoryMetadata {
    pub plan: StoryPlan,
    pub visual_profile: VisualProfile,
    pub base_style: BaseStyle,
}
