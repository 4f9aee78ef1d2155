//! Prompt Assembler (§4.D): deterministic construction of structured
//! JSON-producing prompts for each LLM stage, and response parsing.
//!
//! Stateless by design (§4.D: "Stateless"). Grounded on the teacher's
//! `content/generator.rs` + `content/frameworks.rs` (deterministic,
//! template-driven prompt construction with an explicit output contract),
//! generalized from a single tweet-generation template to four
//! JSON-schema-producing templates.

mod compose;
mod extract;

pub use compose::compose_image_prompt;
pub use extract::extract_json_object;

use crate::domain::{BaseStyle, PlanCharacter, PlanScene, SceneMoment, StoryPlan, VisualProfile};
use crate::error::ProviderError;

/// Build the stage-1 story-plan prompt (§4.D.1).
pub fn build_plan_prompt(title: &str, user_prompt: &str, scene_count: usize) -> String {
    format!(
        "You are a children's-story planner. Produce a JSON object (and \
         nothing else) with this exact shape:\n\
         {{\"title\": string, \"characters\": [{{\"name\": string, \"role\": \
         string, \"visual_description\": string}}], \"scenes\": \
         [{{\"sequence\": integer, \"title\": string, \"text\": string, \
         \"image_prompt\": string}}]}}\n\n\
         Requirements:\n\
         - Exactly {scene_count} scenes, with \"sequence\" values 0..{max_seq} \
         in order.\n\
         - Every \"text\" and \"image_prompt\" field must be non-empty.\n\
         - At least one character.\n\n\
         Working title: {title}\n\
         User request: {user_prompt}",
        max_seq = scene_count.saturating_sub(1),
    )
}

/// Parse and validate a stage-1 plan response per §4.D.1's rules: scene
/// count equals the request, sequences are `0..N-1`, every `text`/
/// `image_prompt` is non-empty, and the character list is non-empty.
pub fn parse_plan_response(raw: &str, expected_scene_count: usize) -> Result<StoryPlan, ProviderError> {
    let json = extract_json_object(raw).ok_or_else(|| ProviderError::UpstreamMalformed {
        provider: "text",
        message: "no JSON object found in plan response".into(),
    })?;

    let plan: StoryPlan = serde_json::from_str(&json).map_err(|e| ProviderError::UpstreamMalformed {
        provider: "text",
        message: format!("plan response failed schema validation: {e}"),
    })?;

    if plan.characters.is_empty() {
        return Err(ProviderError::UpstreamMalformed {
            provider: "text",
            message: "plan response has no characters".into(),
        });
    }

    if plan.scene_count() != expected_scene_count {
        return Err(ProviderError::UpstreamMalformed {
            provider: "text",
            message: format!(
                "plan declared {} scenes, expected {expected_scene_count}",
                plan.scene_count()
            ),
        });
    }

    let mut sequences: Vec<i32> = plan.scenes.iter().map(|s| s.sequence).collect();
    sequences.sort_unstable();
    let expected: Vec<i32> = (0..expected_scene_count as i32).collect();
    if sequences != expected {
        return Err(ProviderError::UpstreamMalformed {
            provider: "text",
            message: format!("plan scene sequences {sequences:?} are not a dense 0..N-1 range"),
        });
    }

    for scene in &plan.scenes {
        if scene.text.trim().is_empty() || scene.image_prompt.trim().is_empty() {
            return Err(ProviderError::UpstreamMalformed {
                provider: "text",
                message: format!("scene {} has an empty text or image_prompt", scene.sequence),
            });
        }
    }

    Ok(plan)
}

/// Build the stage-2 visual-profile prompt (§4.D.2).
pub fn build_visual_profile_prompt(plan: &StoryPlan) -> String {
    let characters: Vec<String> = plan
        .characters
        .iter()
        .map(|c| format!("- {} ({}): {}", c.name, c.role, c.visual_description))
        .collect();

    format!(
        "You are a visual-continuity artist. Given this cast, produce a JSON \
         object (and nothing else) with this exact shape:\n\
         {{\"characters\": [{{\"name\": string, \"canonical_appearance\": \
         string}}]}}\n\n\
         The canonical_appearance must be detailed enough to keep the \
         character visually consistent across illustrations of different \
         scenes.\n\n\
         Cast:\n{}",
        characters.join("\n")
    )
}

/// Parse a stage-2 visual-profile response.
pub fn parse_visual_profile_response(raw: &str) -> Result<VisualProfile, ProviderError> {
    let json = extract_json_object(raw).ok_or_else(|| ProviderError::UpstreamMalformed {
        provider: "text",
        message: "no JSON object found in visual-profile response".into(),
    })?;

    serde_json::from_str(&json).map_err(|e| ProviderError::UpstreamMalformed {
        provider: "text",
        message: format!("visual-profile response failed schema validation: {e}"),
    })
}

/// Build the stage-3 base-style prompt (§4.D.3).
pub fn build_base_style_prompt(plan: &StoryPlan) -> String {
    format!(
        "You are an art director. Given this story's title and scene list, \
         produce a JSON object (and nothing else) with this exact shape:\n\
         {{\"palette\": string, \"lighting\": string, \"medium\": string, \
         \"composition_notes\": string}}\n\n\
         This becomes the single shared style anchor applied to every \
         illustration in the story, so keep it broadly applicable rather \
         than scene-specific.\n\n\
         Title: {}\n\
         Scenes: {}",
        plan.title,
        plan.scenes.iter().map(|s| s.title.as_str()).collect::<Vec<_>>().join(", "),
    )
}

/// Parse a stage-3 base-style response.
pub fn parse_base_style_response(raw: &str) -> Result<BaseStyle, ProviderError> {
    let json = extract_json_object(raw).ok_or_else(|| ProviderError::UpstreamMalformed {
        provider: "text",
        message: "no JSON object found in base-style response".into(),
    })?;

    serde_json::from_str(&json).map_err(|e| ProviderError::UpstreamMalformed {
        provider: "text",
        message: format!("base-style response failed schema validation: {e}"),
    })
}

/// Build the stage-4 scene-moment prompt (§4.D.4).
pub fn build_scene_moment_prompt(
    scene: &PlanScene,
    visual_profile: &VisualProfile,
    base_style: &BaseStyle,
) -> String {
    format!(
        "You are a storyboard artist. Given this scene and the story's shared \
         style anchors, produce a JSON object (and nothing else) with this \
         exact shape:\n\
         {{\"moment_description\": string, \"camera\": string, \"mood\": \
         string}}\n\n\
         Scene title: {}\n\
         Scene text: {}\n\
         Base style: palette={}, lighting={}, medium={}\n\
         Known characters: {}",
        scene.title,
        scene.text,
        base_style.palette,
        base_style.lighting,
        base_style.medium,
        visual_profile.characters.iter().map(|c| c.name.as_str()).collect::<Vec<_>>().join(", "),
    )
}

/// Parse a stage-4 scene-moment response.
pub fn parse_scene_moment_response(raw: &str) -> Result<SceneMoment, ProviderError> {
    let json = extract_json_object(raw).ok_or_else(|| ProviderError::UpstreamMalformed {
        provider: "text",
        message: "no JSON object found in scene-moment response".into(),
    })?;

    serde_json::from_str(&json).map_err(|e| ProviderError::UpstreamMalformed {
        provider: "text",
        message: format!("scene-moment response failed schema validation: {e}"),
    })
}

/// Which characters from a visual profile are referenced by a scene's
/// `text` or `image_prompt`, via case-insensitive whole-word matching
/// (§4.D's image-prompt concatenation rule).
pub fn characters_present_in_scene<'a>(scene: &PlanScene, characters: &'a [PlanCharacter]) -> Vec<&'a PlanCharacter> {
    characters
        .iter()
        .filter(|c| compose::name_appears_whole_word(&scene.text, &c.name) || compose::name_appears_whole_word(&scene.image_prompt, &c.name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_plan() -> StoryPlan {
        StoryPlan {
            title: "Forest".into(),
            characters: vec![PlanCharacter {
                name: "Mira".into(),
                role: "protagonist".into(),
                visual_description: "a curious child".into(),
            }],
            scenes: vec![
                PlanScene { sequence: 0, title: "s0".into(), text: "Mira enters the forest".into(), image_prompt: "forest entrance".into() },
                PlanScene { sequence: 1, title: "s1".into(), text: "she finds a glowing tree".into(), image_prompt: "glowing tree".into() },
            ],
        }
    }

    #[test]
    fn parse_plan_response_accepts_well_formed_plan() {
        let plan = sample_plan();
        let raw = serde_json::to_string(&plan).unwrap();
        let parsed = parse_plan_response(&raw, 2).unwrap();
        assert_eq!(parsed.scenes.len(), 2);
    }

    #[test]
    fn parse_plan_response_tolerates_surrounding_prose() {
        let plan = sample_plan();
        let json = serde_json::to_string(&plan).unwrap();
        let raw = format!("Sure, here is the plan:\n{json}\nLet me know if you want changes!");
        let parsed = parse_plan_response(&raw, 2).unwrap();
        assert_eq!(parsed.title, "Forest");
    }

    #[test]
    fn parse_plan_response_rejects_wrong_scene_count() {
        let plan = sample_plan();
        let raw = serde_json::to_string(&plan).unwrap();
        let result = parse_plan_response(&raw, 3);
        assert!(matches!(result, Err(ProviderError::UpstreamMalformed { .. })));
    }

    #[test]
    fn parse_plan_response_rejects_non_dense_sequences() {
        let mut plan = sample_plan();
        plan.scenes[1].sequence = 5;
        let raw = serde_json::to_string(&plan).unwrap();
        let result = parse_plan_response(&raw, 2);
        assert!(matches!(result, Err(ProviderError::UpstreamMalformed { .. })));
    }

    #[test]
    fn parse_plan_response_rejects_empty_text() {
        let mut plan = sample_plan();
        plan.scenes[0].text = "   ".into();
        let raw = serde_json::to_string(&plan).unwrap();
        let result = parse_plan_response(&raw, 2);
        assert!(matches!(result, Err(ProviderError::UpstreamMalformed { .. })));
    }

    #[test]
    fn parse_plan_response_rejects_no_characters() {
        let mut plan = sample_plan();
        plan.characters.clear();
        let raw = serde_json::to_string(&plan).unwrap();
        let result = parse_plan_response(&raw, 2);
        assert!(matches!(result, Err(ProviderError::UpstreamMalformed { .. })));
    }

    #[test]
    fn parse_plan_response_rejects_non_json() {
        let result = parse_plan_response("not json at all", 2);
        assert!(result.is_err());
    }

    #[test]
    fn characters_present_in_scene_matches_whole_words_case_insensitively() {
        let characters = vec![
            PlanCharacter { name: "Mira".into(), role: "protagonist".into(), visual_description: "".into() },
            PlanCharacter { name: "Ira".into(), role: "side".into(), visual_description: "".into() },
        ];
        let scene = PlanScene {
            sequence: 0,
            title: "s0".into(),
            text: "MIRA walks alone".into(),
            image_prompt: "a lantern".into(),
        };
        let present = characters_present_in_scene(&scene, &characters);
        let names: Vec<&str> = present.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Mira"]);
    }
}
