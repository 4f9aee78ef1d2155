//! Pipeline Orchestrator (§4.G): the worker loop that drives one claimed
//! job from plan through finalize. Idempotent and resumable -- every step
//! re-checks persisted state before doing work, so a crash at any point
//! leaves nothing for the resumed attempt to redo beyond what wasn't yet
//! durably written.
//!
//! Grounded on the teacher's `automation/mod.rs::Runtime` /
//! `run_token_refresh_loop` shape for the background renewal task, and on
//! `automation/posting_queue.rs`'s claim-then-process-then-ack worker loop
//! for the overall structure (one dequeue, one bounded unit of work, one
//! ack/nack).

mod renewal;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::blob::BlobStore;
use crate::broker::{BrokerClient, JobEnvelope, JobHandle};
use crate::domain::{BaseStyle, PlanScene, Scene, StoryMetadata, StoryPlan, StoryStatus, VisualProfile};
use crate::error::ProviderError;
use crate::prompt;
use crate::providers::{AudioProvider, AudioRequest, ImageProvider, ImageRequest, TextParams, TextProvider, TextRequest};
use crate::repository::Repository;

const TEXT_TEMPERATURE: f32 = 0.7;
const TEXT_MAX_TOKENS: u32 = 2000;
const IMAGE_WIDTH: u32 = 1024;
const IMAGE_HEIGHT: u32 = 1024;
const IMAGE_STEPS: u32 = 30;
const NARRATOR_VOICE: &str = "narrator-1";
/// Fraction of the broker's visibility timeout used as the per-job soft
/// deadline (§4.G "Cancellation"). Leaves headroom for the in-flight
/// attempt's ack/nack call itself to land before the broker's own
/// visibility expiry would trigger a competing redelivery.
const SOFT_DEADLINE_FRACTION: f64 = 0.8;

/// What happened to one dequeued job. `run_once` returns `None` if the
/// queue was empty.
#[derive(Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// The job reached a terminal outcome (COMPLETED or FAILED) or was
    /// already terminal, and the broker was told to stop redelivering it.
    Acked,
    /// A retriable failure occurred; the job was returned to the broker
    /// for redelivery.
    Nacked,
    /// The per-job soft deadline expired before processing finished. No
    /// ack/nack was sent; the broker's own visibility timeout will expire
    /// and hand the job to another worker.
    DeadlineExceeded,
}

/// Internal classification of a stage failure, kept separate from
/// [`crate::error::OrchestratorError`] because non-scene stages (plan,
/// visual profile, base style) don't have a scene sequence to report.
enum Failure {
    Fatal { stage: &'static str, message: String },
    Retriable { stage: &'static str, sequence: Option<i32>, message: String },
}

impl Failure {
    fn from_provider(stage: &'static str, err: ProviderError) -> Self {
        match err {
            ProviderError::Transient { message, .. } => Failure::Retriable { stage, sequence: None, message },
            ProviderError::BadRequest { message, .. } | ProviderError::UpstreamMalformed { message, .. } => {
                Failure::Fatal { stage, message }
            }
        }
    }

    fn tag(&self) -> String {
        match self {
            Failure::Fatal { stage, message } => format!("{stage}: {message}"),
            Failure::Retriable { stage, sequence: Some(seq), message } => format!("{stage}[scene {seq}]: {message}"),
            Failure::Retriable { stage, sequence: None, message } => format!("{stage}: {message}"),
        }
    }
}

/// Bundle of per-scene collaborators, so `process_scene` doesn't need a
/// ten-argument signature.
#[derive(Clone)]
struct SceneContext {
    text: Arc<dyn TextProvider>,
    image: Arc<dyn ImageProvider>,
    audio: Arc<dyn AudioProvider>,
    blob: Arc<dyn BlobStore>,
    repository: Arc<dyn Repository>,
    text_model: String,
}

impl SceneContext {
    fn text_params(&self) -> TextParams {
        TextParams { model: self.text_model.clone(), temperature: TEXT_TEMPERATURE, max_tokens: TEXT_MAX_TOKENS }
    }
}

/// The pipeline orchestrator: one instance per worker process, shared
/// across every job it claims.
pub struct Orchestrator {
    text: Arc<dyn TextProvider>,
    image: Arc<dyn ImageProvider>,
    audio: Arc<dyn AudioProvider>,
    blob: Arc<dyn BlobStore>,
    repository: Arc<dyn Repository>,
    broker: Arc<dyn BrokerClient>,
    text_model: String,
    scene_parallelism: usize,
    max_attempts: u32,
    visibility_timeout: Duration,
    default_scene_count: usize,
    queue_name: String,
}

impl Orchestrator {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        text: Arc<dyn TextProvider>,
        image: Arc<dyn ImageProvider>,
        audio: Arc<dyn AudioProvider>,
        blob: Arc<dyn BlobStore>,
        repository: Arc<dyn Repository>,
        broker: Arc<dyn BrokerClient>,
        text_model: String,
        scene_parallelism: usize,
        max_attempts: u32,
        visibility_timeout: Duration,
        default_scene_count: usize,
        queue_name: String,
    ) -> Self {
        Self {
            text,
            image,
            audio,
            blob,
            repository,
            broker,
            text_model,
            scene_parallelism,
            max_attempts,
            visibility_timeout,
            default_scene_count,
            queue_name,
        }
    }

    /// Claim and process at most one job. `Ok(None)` means the queue had
    /// nothing ready.
    pub async fn run_once(&self) -> Result<Option<ProcessOutcome>, crate::error::BrokerError> {
        let claimed = self.broker.dequeue(&self.queue_name, self.visibility_timeout).await?;
        let Some((handle, envelope)) = claimed else {
            return Ok(None);
        };

        Ok(Some(self.process(handle, envelope).await))
    }

    /// Process one claimed job under a soft deadline (§4.G
    /// "Cancellation"). Never returns an error: every failure mode is
    /// resolved to an ack, a nack, or letting the deadline expire before
    /// this function returns.
    pub async fn process(&self, handle: JobHandle, mut envelope: JobEnvelope) -> ProcessOutcome {
        let soft_deadline = Duration::from_secs_f64(self.visibility_timeout.as_secs_f64() * SOFT_DEADLINE_FRACTION);

        match tokio::time::timeout(soft_deadline, self.process_within_deadline(&handle, &mut envelope)).await {
            Ok(outcome) => outcome,
            Err(_) => {
                tracing::warn!(story_id = %envelope.story_id, "soft deadline exceeded, ceasing work without ack");
                ProcessOutcome::DeadlineExceeded
            }
        }
    }

    async fn process_within_deadline(&self, handle: &JobHandle, envelope: &mut JobEnvelope) -> ProcessOutcome {
        let story_id = envelope.story_id;

        // Step 1: terminal guard. A redelivered job whose prior attempt
        // already finished is a no-op; just stop the redelivery.
        let story = match self.repository.get_story(story_id).await {
            Ok(story) => story,
            Err(e) => {
                tracing::error!(story_id = %story_id, error = %e, "failed to load story, nacking for redelivery");
                let _ = self.broker.nack(handle, envelope.clone(), Some(Duration::from_secs(5))).await;
                return ProcessOutcome::Nacked;
            }
        };

        if story.status.is_terminal() {
            let _ = self.broker.ack(handle).await;
            return ProcessOutcome::Acked;
        }

        // Step 2: claim. PROCESSING->PROCESSING is a legal no-op transition
        // (state_machine.rs), so a second worker racing to claim the same
        // redelivered job does not conflict here -- it succeeds too, and
        // both run `run_stages` concurrently. The `Err` arm below only
        // fires on a genuinely illegal transition (e.g. the story already
        // went terminal between the step-1 load and this update). Safety
        // against duplicated work comes from scene-level idempotency
        // (`insert_scene`'s `ON CONFLICT DO NOTHING`) and step 5 below
        // skipping scenes already complete, not from exclusivity here.
        if let Err(e) = self.repository.set_status(story_id, StoryStatus::Processing, None).await {
            tracing::info!(story_id = %story_id, error = %e, "claim lost the race, nacking short delay");
            let _ = self.broker.nack(handle, envelope.clone(), Some(Duration::from_secs(5))).await;
            return ProcessOutcome::Nacked;
        }

        // Step 3: background visibility renewal for the remainder of
        // this attempt.
        let renewal_cancel = CancellationToken::new();
        let renewal_handle = renewal::spawn(self.broker.clone(), handle.clone(), self.visibility_timeout, renewal_cancel.clone());

        let result = self.run_stages(story_id).await;
        renewal_cancel.cancel();
        let _ = renewal_handle.await;

        match result {
            Ok(()) => {
                let _ = self.broker.ack(handle).await;
                ProcessOutcome::Acked
            }
            Err(failure @ Failure::Fatal { .. }) => {
                let _ = self.repository.set_status(story_id, StoryStatus::Failed, Some(&failure.tag())).await;
                let _ = self.broker.ack(handle).await;
                ProcessOutcome::Acked
            }
            Err(failure @ Failure::Retriable { .. }) => {
                envelope.attempt += 1;
                if envelope.attempt >= self.max_attempts {
                    let _ = self.repository.set_status(story_id, StoryStatus::Failed, Some(&failure.tag())).await;
                    let _ = self.broker.ack(handle).await;
                    ProcessOutcome::Acked
                } else {
                    tracing::info!(story_id = %story_id, attempt = envelope.attempt, error = %failure.tag(), "retriable failure, nacking for redelivery");
                    let _ = self.broker.nack(handle, envelope.clone(), None).await;
                    ProcessOutcome::Nacked
                }
            }
        }
    }

    /// Steps 3-7: plan, visual profile + base style, per-scene fan-out,
    /// finalize. The `Story` is already PROCESSING by the time this runs.
    async fn run_stages(&self, story_id: Uuid) -> Result<(), Failure> {
        let story = self.repository.get_story(story_id).await.map_err(|e| Failure::Fatal { stage: "persist", message: e.to_string() })?;

        // Step 3: plan. Reuse a previously-persisted plan on redelivery
        // instead of re-prompting the LLM for it.
        let metadata: Option<StoryMetadata> = story
            .story_metadata
            .as_ref()
            .and_then(|v| serde_json::from_value(v.clone()).ok());

        let (plan, visual_profile, base_style) = match metadata {
            Some(m) => (m.plan, m.visual_profile, m.base_style),
            None => {
                let plan = self.run_plan_stage(&story.title, &story.prompt).await?;
                let (visual_profile, base_style) = self.run_style_stages(&plan).await?;

                let full = StoryMetadata { plan: plan.clone(), visual_profile: visual_profile.clone(), base_style: base_style.clone() };
                self.repository
                    .set_metadata(story_id, serde_json::to_value(&full).unwrap_or(serde_json::Value::Null))
                    .await
                    .map_err(|e| Failure::Fatal { stage: "persist", message: e.to_string() })?;

                (plan, visual_profile, base_style)
            }
        };

        // Step 5: existing scenes, so redelivery only regenerates what's
        // missing (§3's "frozen once both URLs exist" rule).
        let existing = self.repository.list_scenes(story_id).await.map_err(|e| Failure::Fatal { stage: "persist", message: e.to_string() })?;
        let done: HashSet<i32> = existing.iter().filter(|s| s.is_complete()).map(|s| s.sequence).collect();
        let missing: Vec<PlanScene> = plan.scenes.iter().filter(|s| !done.contains(&s.sequence)).cloned().collect();

        // Step 6: per-scene fan-out, bounded by `scene_parallelism`.
        let ctx = SceneContext {
            text: self.text.clone(),
            image: self.image.clone(),
            audio: self.audio.clone(),
            blob: self.blob.clone(),
            repository: self.repository.clone(),
            text_model: self.text_model.clone(),
        };

        let semaphore = Arc::new(Semaphore::new(self.scene_parallelism.max(1)));
        let mut tasks = tokio::task::JoinSet::new();

        for scene in missing {
            let permit_sema = semaphore.clone();
            let plan = plan.clone();
            let visual_profile = visual_profile.clone();
            let base_style = base_style.clone();
            let ctx = ctx.clone();

            tasks.spawn(async move {
                let _permit = permit_sema.acquire_owned().await.expect("semaphore never closed");
                process_scene(story_id, &plan, &scene, &visual_profile, &base_style, &ctx).await
            });
        }

        let mut first_error = None;
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(failure)) => {
                    first_error.get_or_insert(failure);
                }
                Err(join_err) => {
                    first_error.get_or_insert(Failure::Retriable {
                        stage: "scene",
                        sequence: None,
                        message: format!("scene task panicked: {join_err}"),
                    });
                }
            }
        }

        if let Some(failure) = first_error {
            return Err(failure);
        }

        // Step 7: finalize.
        self.repository
            .set_status(story_id, StoryStatus::Completed, None)
            .await
            .map_err(|e| Failure::Fatal { stage: "persist", message: e.to_string() })?;

        Ok(())
    }

    async fn run_plan_stage(&self, title: &str, user_prompt: &str) -> Result<StoryPlan, Failure> {
        let prompt_text = prompt::build_plan_prompt(title, user_prompt, self.default_scene_count);
        let raw = self
            .text
            .generate(TextRequest { prompt: prompt_text, params: self.text_params(), stage: "story-plan" })
            .await
            .map_err(|e| Failure::from_provider("plan", e))?;

        prompt::parse_plan_response(&raw, self.default_scene_count).map_err(|e| Failure::from_provider("plan", e))
    }

    async fn run_style_stages(&self, plan: &StoryPlan) -> Result<(VisualProfile, BaseStyle), Failure> {
        let visual_prompt = prompt::build_visual_profile_prompt(plan);
        let base_style_prompt = prompt::build_base_style_prompt(plan);

        let (visual_raw, base_style_raw) = tokio::join!(
            self.text.generate(TextRequest { prompt: visual_prompt, params: self.text_params(), stage: "visual-profile" }),
            self.text.generate(TextRequest { prompt: base_style_prompt, params: self.text_params(), stage: "base-style" }),
        );

        let visual_profile = prompt::parse_visual_profile_response(&visual_raw.map_err(|e| Failure::from_provider("visual_profile", e))?)
            .map_err(|e| Failure::from_provider("visual_profile", e))?;

        let base_style = prompt::parse_base_style_response(&base_style_raw.map_err(|e| Failure::from_provider("base_style", e))?)
            .map_err(|e| Failure::from_provider("base_style", e))?;

        Ok((visual_profile, base_style))
    }

    fn text_params(&self) -> TextParams {
        TextParams { model: self.text_model.clone(), temperature: TEXT_TEMPERATURE, max_tokens: TEXT_MAX_TOKENS }
    }
}

/// One scene's stages 6a-e: moment, image prompt composition, image +
/// audio generation (in parallel), upload, persist. A failure here never
/// touches the `Story` row directly; it's reported back to `run_stages`
/// for job-level classification.
async fn process_scene(
    story_id: Uuid,
    plan: &StoryPlan,
    scene: &PlanScene,
    visual_profile: &VisualProfile,
    base_style: &BaseStyle,
    ctx: &SceneContext,
) -> Result<(), Failure> {
    let moment_prompt = prompt::build_scene_moment_prompt(scene, visual_profile, base_style);
    let moment_raw = ctx
        .text
        .generate(TextRequest { prompt: moment_prompt, params: ctx.text_params(), stage: "scene-moment" })
        .await
        .map_err(|e| scene_failure("moment", scene.sequence, e))?;

    let moment = prompt::parse_scene_moment_response(&moment_raw).map_err(|e| scene_failure("moment", scene.sequence, e))?;

    let image_prompt = prompt::compose_image_prompt(base_style, visual_profile, &plan.characters, scene, &moment);

    let image_fut = async {
        let bytes = ctx
            .image
            .generate(ImageRequest { prompt: image_prompt.clone(), width: IMAGE_WIDTH, height: IMAGE_HEIGHT, steps: IMAGE_STEPS, seed: None })
            .await
            .map_err(|e| scene_failure("image", scene.sequence, e))?;

        ctx.blob
            .put_image(story_id, scene.sequence, bytes)
            .await
            .map_err(|e| Failure::Retriable { stage: "image", sequence: Some(scene.sequence), message: e.to_string() })
    };

    let audio_fut = async {
        let bytes = ctx
            .audio
            .generate(AudioRequest { text: scene.text.clone(), voice: NARRATOR_VOICE.to_string(), high_quality: true })
            .await
            .map_err(|e| scene_failure("audio", scene.sequence, e))?;

        ctx.blob
            .put_audio(story_id, scene.sequence, bytes)
            .await
            .map_err(|e| Failure::Retriable { stage: "audio", sequence: Some(scene.sequence), message: e.to_string() })
    };

    let (image_result, audio_result) = tokio::join!(image_fut, audio_fut);
    let image_url = image_result?;
    let audio_url = audio_result?;

    let now = chrono::Utc::now();
    let scene_row = Scene {
        scene_id: Uuid::new_v4(),
        story_id,
        sequence: scene.sequence,
        title: scene.title.clone(),
        text: scene.text.clone(),
        image_prompt,
        image_url: Some(image_url),
        audio_url: Some(audio_url),
        created_at: now,
        updated_at: now,
    };

    ctx.repository
        .insert_scene(&scene_row)
        .await
        .map_err(|e| Failure::Retriable { stage: "persist", sequence: Some(scene.sequence), message: e.to_string() })
}

/// Per-scene provider failures are always redeliverable: no scene media
/// has been persisted yet, so losing this attempt and retrying the whole
/// job costs nothing beyond the wasted calls, and the attempt counter
/// still bounds it (§4.G: "stage-level failures in per-scene work do not
/// immediately fail the Story").
fn scene_failure(stage: &'static str, sequence: i32, err: ProviderError) -> Failure {
    Failure::Retriable { stage, sequence: Some(sequence), message: err.to_string() }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::MockBrokerClient;
    use crate::domain::{BaseStyle as DomainBaseStyle, CharacterAppearance, PlanCharacter, SceneMoment, StoryPlan as DomainStoryPlan, VisualProfile as DomainVisualProfile};
    use crate::repository::tests_support::InMemoryRepository;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn sample_plan(scene_count: usize) -> DomainStoryPlan {
        DomainStoryPlan {
            title: "Forest".into(),
            characters: vec![PlanCharacter { name: "Mira".into(), role: "protagonist".into(), visual_description: "a curious child".into() }],
            scenes: (0..scene_count as i32)
                .map(|i| PlanScene { sequence: i, title: format!("scene {i}"), text: format!("Mira does thing {i}"), image_prompt: format!("forest scene {i}") })
                .collect(),
        }
    }

    fn sample_visual_profile() -> DomainVisualProfile {
        DomainVisualProfile { characters: vec![CharacterAppearance { name: "Mira".into(), canonical_appearance: "brown hair, green cloak".into() }] }
    }

    fn sample_base_style() -> DomainBaseStyle {
        DomainBaseStyle {
            palette: "warm autumn tones".into(),
            lighting: "soft dappled light".into(),
            medium: "watercolor".into(),
            composition_notes: "wide establishing shots".into(),
        }
    }

    fn sample_moment() -> SceneMoment {
        SceneMoment { moment_description: "Mira pauses at the tree line".into(), camera: "wide".into(), mood: "wonder".into() }
    }

    /// A `TextProvider` test double that inspects the prompt's opening
    /// words (each `prompt::build_*_prompt` function starts with a
    /// distinct role sentence) to decide which canned response to return.
    struct ScriptedTextProvider {
        plan: String,
        visual_profile: String,
        base_style: String,
        moment: String,
    }

    impl ScriptedTextProvider {
        fn well_formed(scene_count: usize) -> Self {
            let plan = sample_plan(scene_count);
            Self {
                plan: serde_json::to_string(&plan).unwrap(),
                visual_profile: serde_json::to_string(&sample_visual_profile()).unwrap(),
                base_style: serde_json::to_string(&sample_base_style()).unwrap(),
                moment: serde_json::to_string(&sample_moment()).unwrap(),
            }
        }
    }

    #[async_trait::async_trait]
    impl TextProvider for ScriptedTextProvider {
        async fn generate(&self, request: TextRequest) -> Result<String, ProviderError> {
            let response = match request.stage {
                "story-plan" => &self.plan,
                "visual-profile" => &self.visual_profile,
                "base-style" => &self.base_style,
                "scene-moment" => &self.moment,
                other => panic!("unrecognized stage in ScriptedTextProvider: {other}"),
            };
            Ok(response.clone())
        }
    }

    /// Always returns a non-JSON string, for the malformed-plan scenario.
    struct NonJsonTextProvider;

    #[async_trait::async_trait]
    impl TextProvider for NonJsonTextProvider {
        async fn generate(&self, _request: TextRequest) -> Result<String, ProviderError> {
            Ok("I'm sorry, I can't produce a plan right now.".to_string())
        }
    }

    struct SucceedingImageProvider {
        calls: AtomicUsize,
    }

    impl SucceedingImageProvider {
        fn new() -> Self {
            Self { calls: AtomicUsize::new(0) }
        }

        fn call_count(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait::async_trait]
    impl ImageProvider for SucceedingImageProvider {
        async fn generate(&self, _request: ImageRequest) -> Result<Vec<u8>, ProviderError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(vec![0u8; 200])
        }
    }

    /// Fails with a transient error on the first N calls, then succeeds.
    struct FlakyImageProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    impl FlakyImageProvider {
        fn new(fail_first: usize) -> Self {
            Self { calls: AtomicUsize::new(0), fail_first }
        }
    }

    #[async_trait::async_trait]
    impl ImageProvider for FlakyImageProvider {
        async fn generate(&self, _request: ImageRequest) -> Result<Vec<u8>, ProviderError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_first {
                Err(ProviderError::Transient { provider: "image", message: "503".to_string() })
            } else {
                Ok(vec![0u8; 200])
            }
        }
    }

    struct SucceedingAudioProvider;

    #[async_trait::async_trait]
    impl AudioProvider for SucceedingAudioProvider {
        async fn generate(&self, _request: AudioRequest) -> Result<Vec<u8>, ProviderError> {
            Ok(vec![0u8; 200])
        }
    }

    struct AlwaysFailingAudioProvider;

    #[async_trait::async_trait]
    impl AudioProvider for AlwaysFailingAudioProvider {
        async fn generate(&self, _request: AudioRequest) -> Result<Vec<u8>, ProviderError> {
            Err(ProviderError::Transient { provider: "audio", message: "500 upstream".to_string() })
        }
    }

    fn in_memory_blob() -> Arc<crate::blob::LocalFsBlobStore> {
        let dir = std::env::temp_dir().join(format!("storyforge-orchestrator-test-{}", Uuid::new_v4()));
        Arc::new(crate::blob::LocalFsBlobStore::new(dir))
    }

    fn build_orchestrator(
        text: Arc<dyn TextProvider>,
        image: Arc<dyn ImageProvider>,
        audio: Arc<dyn AudioProvider>,
        repository: Arc<dyn Repository>,
        broker: Arc<dyn BrokerClient>,
        max_attempts: u32,
    ) -> Orchestrator {
        Orchestrator::new(
            text,
            image,
            audio,
            in_memory_blob(),
            repository,
            broker,
            "test-model".to_string(),
            3,
            max_attempts,
            Duration::from_secs(30),
            3,
            "stories".to_string(),
        )
    }

    #[tokio::test]
    async fn happy_path_completes_all_scenes() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: chrono::Utc::now() };
        broker.enqueue("stories", envelope).await.unwrap();

        let orchestrator = build_orchestrator(
            Arc::new(ScriptedTextProvider::well_formed(3)),
            Arc::new(SucceedingImageProvider::new()),
            Arc::new(SucceedingAudioProvider),
            repository.clone(),
            broker.clone(),
            3,
        );

        let outcome = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked);

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);
        assert!(story.story_metadata.is_some());

        let scenes = repository.list_scenes(story_id).await.unwrap();
        assert_eq!(scenes.len(), 3);
        assert!(scenes.iter().all(Scene::is_complete));
    }

    #[tokio::test]
    async fn malformed_plan_fails_story_on_first_attempt() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: chrono::Utc::now() };
        broker.enqueue("stories", envelope).await.unwrap();

        let orchestrator = build_orchestrator(
            Arc::new(NonJsonTextProvider),
            Arc::new(SucceedingImageProvider::new()),
            Arc::new(SucceedingAudioProvider),
            repository.clone(),
            broker.clone(),
            3,
        );

        let outcome = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked);

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Failed);
        assert!(story.error.as_deref().unwrap_or_default().contains("plan"));

        let scenes = repository.list_scenes(story_id).await.unwrap();
        assert!(scenes.is_empty());
    }

    #[tokio::test]
    async fn transient_scene_failure_nacks_then_second_attempt_completes() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: chrono::Utc::now() };
        broker.enqueue("stories", envelope).await.unwrap();

        // Fails once across the whole scene fan-out, then every
        // subsequent call succeeds -- so the first attempt nacks and the
        // second attempt (redelivery) completes.
        let flaky_image = Arc::new(FlakyImageProvider::new(1));

        let orchestrator = build_orchestrator(
            Arc::new(ScriptedTextProvider::well_formed(3)),
            flaky_image,
            Arc::new(SucceedingAudioProvider),
            repository.clone(),
            broker.clone(),
            3,
        );

        let first = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(first, ProcessOutcome::Nacked);
        assert_eq!(repository.get_story(story_id).await.unwrap().status, StoryStatus::Processing);

        let second = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(second, ProcessOutcome::Acked);
        assert_eq!(repository.get_story(story_id).await.unwrap().status, StoryStatus::Completed);
    }

    #[tokio::test]
    async fn attempts_exhausted_fails_story() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(1));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: chrono::Utc::now() };
        broker.enqueue("stories", envelope).await.unwrap();

        // max_attempts = 1: the very first retriable failure exhausts it.
        let orchestrator = build_orchestrator(
            Arc::new(ScriptedTextProvider::well_formed(3)),
            Arc::new(SucceedingImageProvider::new()),
            Arc::new(AlwaysFailingAudioProvider),
            repository.clone(),
            broker.clone(),
            1,
        );

        let outcome = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked);

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Failed);
        assert!(story.error.as_deref().unwrap_or_default().contains("audio"));
    }

    #[tokio::test]
    async fn resumed_job_only_regenerates_missing_scenes() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;
        repository.set_status(story_id, StoryStatus::Processing, None).await.unwrap();

        let plan = sample_plan(3);
        repository
            .set_metadata(
                story_id,
                serde_json::to_value(&StoryMetadata { plan: plan.clone(), visual_profile: sample_visual_profile(), base_style: sample_base_style() }).unwrap(),
            )
            .await
            .unwrap();

        // Two of three scenes already complete, simulating a crash right
        // after those finished but before the third.
        let now = chrono::Utc::now();
        for seq in 0..2 {
            repository
                .insert_scene(&Scene {
                    scene_id: Uuid::new_v4(),
                    story_id,
                    sequence: seq,
                    title: format!("scene {seq}"),
                    text: format!("Mira does thing {seq}"),
                    image_prompt: format!("forest scene {seq}"),
                    image_url: Some(format!("https://example.com/{seq}.png")),
                    audio_url: Some(format!("https://example.com/{seq}.mp3")),
                    created_at: now,
                    updated_at: now,
                })
                .await
                .unwrap();
        }

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: now };
        broker.enqueue("stories", envelope).await.unwrap();

        let image_provider = Arc::new(SucceedingImageProvider::new());

        let orchestrator = build_orchestrator(
            Arc::new(ScriptedTextProvider::well_formed(3)),
            image_provider.clone(),
            Arc::new(SucceedingAudioProvider),
            repository.clone(),
            broker.clone(),
            3,
        );

        let outcome = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked);
        assert_eq!(image_provider.call_count(), 1, "only the missing scene's image should have been generated");

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);

        let scenes = repository.list_scenes(story_id).await.unwrap();
        assert_eq!(scenes.len(), 3);
        assert!(scenes.iter().all(Scene::is_complete));
    }

    #[tokio::test]
    async fn dequeue_on_empty_queue_returns_none() {
        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));

        let orchestrator = build_orchestrator(
            Arc::new(ScriptedTextProvider::well_formed(3)),
            Arc::new(SucceedingImageProvider::new()),
            Arc::new(SucceedingAudioProvider),
            repository,
            broker,
            3,
        );

        assert!(orchestrator.run_once().await.unwrap().is_none());
    }

    /// Drives a job through the real `MockTextProvider`/`MockImageProvider`/
    /// `MockAudioProvider` adapters (the ones `mock_ai` actually wires up),
    /// reading the fixture set committed under `fixtures/`, rather than the
    /// bespoke test doubles the other tests in this module use. Exercises
    /// the mock-mode contract end to end: a submitted job reaches
    /// COMPLETED with every scene's image/audio URL populated.
    #[tokio::test]
    async fn mock_mode_end_to_end_completes_via_real_adapters() {
        let fixtures_dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures");
        let fixtures = crate::providers::MockFixtures::new(fixtures_dir, Duration::from_millis(0));

        let text = Arc::new(crate::providers::MockTextProvider::new(fixtures.clone()));
        let image = Arc::new(crate::providers::MockImageProvider::new(fixtures.clone()));
        let audio = Arc::new(crate::providers::MockAudioProvider::new(fixtures));

        let repository = Arc::new(InMemoryRepository::new());
        let broker = Arc::new(MockBrokerClient::new(3));
        let story_id = repository.create_story(Uuid::new_v4(), "Forest", "a child finds a magical forest", "u1").await.unwrap().story_id;

        let envelope = JobEnvelope { story_id, user_id: "u1".into(), title: "Forest".into(), prompt: "a child finds a magical forest".into(), attempt: 0, enqueued_at: chrono::Utc::now() };
        broker.enqueue("stories", envelope).await.unwrap();

        // The committed story-plan fixture declares 3 scenes.
        let orchestrator = build_orchestrator(text, image, audio, repository.clone(), broker.clone(), 3);

        let outcome = orchestrator.run_once().await.unwrap().unwrap();
        assert_eq!(outcome, ProcessOutcome::Acked);

        let story = repository.get_story(story_id).await.unwrap();
        assert_eq!(story.status, StoryStatus::Completed);

        let scenes = repository.list_scenes(story_id).await.unwrap();
        assert_eq!(scenes.len(), 3);
        assert!(scenes.iter().all(Scene::is_complete));
    }
}
