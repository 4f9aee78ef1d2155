//! `storyforge submit`: enqueue a new story via the [`Dispatcher`], the
//! same front door a future HTTP ingress would call.

use storyforge_core::config::Config;
use storyforge_core::dispatch::Dispatcher;

use super::SubmitArgs;
use crate::wiring::Wiring;

pub async fn execute(config: &Config, args: SubmitArgs) -> anyhow::Result<()> {
    let wiring = Wiring::build(config).await?;
    let dispatcher = Dispatcher::new(wiring.repository, wiring.broker, config.broker.queue_name.clone());

    let story_id = dispatcher.submit(&args.title, &args.prompt, &args.user_id).await?;
    println!("{story_id}");
    Ok(())
}
