//! `storyforge migrate`: apply embedded SQL migrations and exit, without
//! building providers, blob store, or broker. Useful for deploy scripts
//! that run migrations as a separate step ahead of starting workers.

use storyforge_core::config::Config;
use storyforge_core::repository::init_db;

pub async fn execute(config: &Config) -> anyhow::Result<()> {
    init_db(&config.database.url, config.database.max_connections).await?;
    println!("migrations applied");
    Ok(())
}
