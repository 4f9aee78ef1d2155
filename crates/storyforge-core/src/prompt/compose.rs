//! Deterministic, order-stable composition of the final image prompt
//! (§4.D): base style + visual profile for characters present in the
//! scene + scene moment.

use regex::Regex;
use std::sync::OnceLock;

use crate::domain::{BaseStyle, PlanCharacter, PlanScene, SceneMoment, VisualProfile};

/// Returns `true` if `name` appears in `text` as a case-insensitive whole
/// word (not as a substring of a longer word).
pub fn name_appears_whole_word(text: &str, name: &str) -> bool {
    if name.trim().is_empty() {
        return false;
    }

    static CACHE: OnceLock<std::sync::Mutex<std::collections::HashMap<String, Regex>>> = OnceLock::new();
    let cache = CACHE.get_or_init(|| std::sync::Mutex::new(std::collections::HashMap::new()));

    let key = name.to_lowercase();
    let mut guard = cache.lock().expect("name regex cache poisoned");
    let regex = guard.entry(key.clone()).or_insert_with(|| {
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(name))).expect("valid generated regex")
    });

    regex.is_match(text)
}

/// Compose the final image prompt string for one scene: base style,
/// then the canonical appearance of each character present in the
/// scene's `text` or `image_prompt` (in plan order), then the scene
/// moment. Deterministic and order-stable per §4.D.
pub fn compose_image_prompt(
    base_style: &BaseStyle,
    visual_profile: &VisualProfile,
    plan_characters: &[PlanCharacter],
    scene: &PlanScene,
    moment: &SceneMoment,
) -> String {
    let mut parts = Vec::new();

    parts.push(format!(
        "Style: {}, lighting: {}, medium: {}. {}",
        base_style.palette, base_style.lighting, base_style.medium, base_style.composition_notes
    ));

    for character in plan_characters {
        let present = name_appears_whole_word(&scene.text, &character.name) || name_appears_whole_word(&scene.image_prompt, &character.name);
        if !present {
            continue;
        }
        if let Some(appearance) = visual_profile.characters.iter().find(|c| c.name == character.name) {
            parts.push(format!("{}: {}", appearance.name, appearance.canonical_appearance));
        }
    }

    parts.push(format!(
        "Moment: {}. Camera: {}. Mood: {}.",
        moment.moment_description, moment.camera, moment.mood
    ));

    parts.join(" ")
}
