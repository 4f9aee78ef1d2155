//! `storyforge status`: print a story's current status and, if failed,
//! its diagnostic tag.

use uuid::Uuid;

use storyforge_core::config::Config;
use storyforge_core::repository::{init_db, PgRepository, Repository};

pub async fn execute(config: &Config, story_id: Uuid) -> anyhow::Result<()> {
    let pool = init_db(&config.database.url, config.database.max_connections).await?;
    let repository = PgRepository::new(pool);

    let story = repository.get_story(story_id).await?;
    println!("story_id: {}", story.story_id);
    println!("status: {}", story.status);
    if let Some(error) = &story.error {
        println!("error: {error}");
    }
    Ok(())
}
