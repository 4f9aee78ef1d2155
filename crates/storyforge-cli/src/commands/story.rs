//! `storyforge story`: print a story's full record plus its scenes in
//! sequence order, including each scene's derived media URLs once ready.

use uuid::Uuid;

use storyforge_core::config::Config;
use storyforge_core::repository::{init_db, PgRepository, Repository};

pub async fn execute(config: &Config, story_id: Uuid) -> anyhow::Result<()> {
    let pool = init_db(&config.database.url, config.database.max_connections).await?;
    let repository = PgRepository::new(pool);

    let story = repository.get_story(story_id).await?;
    let scenes = repository.list_scenes(story_id).await?;

    println!("story_id: {}", story.story_id);
    println!("title: {}", story.title);
    println!("status: {}", story.status);
    if let Some(error) = &story.error {
        println!("error: {error}");
    }
    println!("scenes: {}/{}", scenes.iter().filter(|s| s.is_complete()).count(), scenes.len());

    for scene in &scenes {
        println!("  [{}] {}", scene.sequence, scene.title);
        println!("      text: {}", scene.text);
        println!("      image: {}", scene.image_url.as_deref().unwrap_or("(pending)"));
        println!("      audio: {}", scene.audio_url.as_deref().unwrap_or("(pending)"));
    }

    Ok(())
}
