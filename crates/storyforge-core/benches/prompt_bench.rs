//! Benchmarks for the prompt assembler (§4.D): prompt construction and
//! response parsing run once per LLM call per scene, so their cost is
//! dwarfed by the network round-trip -- these guard against accidental
//! quadratic behavior in the character-matching / JSON-extraction paths,
//! not absolute latency.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use storyforge_core::domain::{BaseStyle, CharacterAppearance, PlanCharacter, PlanScene, SceneMoment, VisualProfile};
use storyforge_core::prompt::{compose_image_prompt, extract_json_object};

fn sample_scene() -> PlanScene {
    PlanScene {
        sequence: 0,
        title: "The Clearing".into(),
        text: "Mira and Oswin walk together into the glowing clearing, unsure of what waits beyond the old oak.".into(),
        image_prompt: "Mira with Oswin the owl beside the glowing clearing".into(),
    }
}

fn sample_plan_characters() -> Vec<PlanCharacter> {
    vec![
        PlanCharacter { name: "Mira".into(), role: "protagonist".into(), visual_description: "a curious child".into() },
        PlanCharacter { name: "Oswin".into(), role: "guide".into(), visual_description: "a wise owl".into() },
    ]
}

fn sample_visual_profile() -> VisualProfile {
    VisualProfile {
        characters: vec![
            CharacterAppearance { name: "Mira".into(), canonical_appearance: "curly red hair, green coat, freckled".into() },
            CharacterAppearance { name: "Oswin".into(), canonical_appearance: "a grey owl with round glasses".into() },
        ],
    }
}

fn sample_base_style() -> BaseStyle {
    BaseStyle {
        palette: "warm autumn tones".into(),
        lighting: "soft dappled light".into(),
        medium: "watercolor".into(),
        composition_notes: "wide establishing shots".into(),
    }
}

fn sample_moment() -> SceneMoment {
    SceneMoment { moment_description: "Mira steps through a ring of mushrooms".into(), camera: "low angle".into(), mood: "wonder".into() }
}

fn bench_compose_image_prompt(c: &mut Criterion) {
    let style = sample_base_style();
    let profile = sample_visual_profile();
    let characters = sample_plan_characters();
    let scene = sample_scene();
    let moment = sample_moment();

    c.bench_function("compose_image_prompt", |b| {
        b.iter(|| compose_image_prompt(black_box(&style), black_box(&profile), black_box(&characters), black_box(&scene), black_box(&moment)))
    });
}

fn bench_extract_json_object(c: &mut Criterion) {
    let raw = "Sure, here's the plan you asked for:\n\n\
        {\"title\":\"Forest\",\"characters\":[{\"name\":\"Mira\",\"role\":\"protagonist\",\"visual_description\":\"a curious child\"}],\
        \"scenes\":[{\"sequence\":0,\"title\":\"s0\",\"text\":\"Mira enters the forest\",\"image_prompt\":\"forest entrance\"}]}\n\n\
        Let me know if you'd like any changes!";

    c.bench_function("extract_json_object", |b| b.iter(|| extract_json_object(black_box(raw))));
}

criterion_group!(benches, bench_compose_image_prompt, bench_extract_json_object);
criterion_main!(benches);
