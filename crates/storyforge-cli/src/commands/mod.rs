//! Subcommand implementations. Each module owns one `storyforge` verb and
//! its `clap::Args` struct, mirroring the teacher CLI's one-module-per-
//! command layout.

pub mod migrate;
pub mod status;
pub mod story;
pub mod submit;
pub mod worker;

/// Arguments for `storyforge submit`.
#[derive(clap::Args)]
pub struct SubmitArgs {
    /// Story title
    #[arg(short, long)]
    pub title: String,

    /// Free-text story prompt
    #[arg(short, long)]
    pub prompt: String,

    /// Identifier of the requesting user
    #[arg(short, long, default_value = "cli")]
    pub user_id: String,
}

/// Arguments for `storyforge status`.
#[derive(clap::Args)]
pub struct StatusArgs {
    /// Story UUID
    pub story_id: String,
}

/// Arguments for `storyforge story`.
#[derive(clap::Args)]
pub struct StoryArgs {
    /// Story UUID
    pub story_id: String,
}
