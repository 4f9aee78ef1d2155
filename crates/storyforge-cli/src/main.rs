//! StoryForge CLI -- operator/test front door for the story-generation
//! pipeline.
//!
//! Entry point for the `storyforge` binary. Parses CLI arguments,
//! initializes logging, and dispatches to subcommand handlers.
mod commands;
mod wiring;

use clap::Parser;
use storyforge_core::config::Config;
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

/// StoryForge: asynchronous multi-scene illustrated audio story pipeline.
#[derive(Parser)]
#[command(name = "storyforge")]
#[command(version)]
#[command(about = "Asynchronous multi-scene illustrated audio story pipeline")]
#[command(after_help = "\
Quick start:
  1. storyforge migrate                     — apply database migrations
  2. storyforge submit -t TITLE -p PROMPT   — enqueue a story
  3. storyforge worker                      — run the pipeline daemon
  4. storyforge status STORY_ID             — check progress")]
struct Cli {
    /// Path to config.toml
    #[arg(short = 'c', long, global = true, default_value = "~/.storyforge/config.toml")]
    config: String,

    /// Enable verbose logging (debug level)
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    quiet: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Apply pending database migrations and exit
    Migrate,
    /// Run the pipeline worker daemon until shutdown
    Worker,
    /// Submit a new story for generation
    Submit(commands::SubmitArgs),
    /// Show a story's status
    Status(commands::StatusArgs),
    /// Show a story's full plan and scenes
    Story(commands::StoryArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing-subscriber.
    //
    // Priority: RUST_LOG env var > --verbose/--quiet flags > default (warn).
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("storyforge=debug,storyforge_core=debug,info")
    } else if cli.quiet {
        EnvFilter::new("error")
    } else {
        EnvFilter::new("storyforge=info,storyforge_core=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(cli.verbose)
        .compact()
        .init();

    // `migrate` only needs a database URL, not provider credentials, so it
    // skips the full `validate()` pass (which requires API keys unless
    // `mock_ai` is set) and never builds a `Wiring`.
    if matches!(cli.command, Commands::Migrate) {
        let config = Config::load(Some(&cli.config)).map_err(|e| anyhow::anyhow!("failed to load configuration: {e}"))?;
        return commands::migrate::execute(&config).await;
    }

    let config = load_config(&cli.config)?;

    match cli.command {
        Commands::Migrate => unreachable!(),
        Commands::Worker => commands::worker::execute(&config).await,
        Commands::Submit(args) => commands::submit::execute(&config, args).await,
        Commands::Status(args) => commands::status::execute(&config, parse_story_id(&args.story_id)?).await,
        Commands::Story(args) => commands::story::execute(&config, parse_story_id(&args.story_id)?).await,
    }
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    Config::load_and_validate(Some(path)).map_err(|errors| {
        let messages = errors.iter().map(|e| e.to_string()).collect::<Vec<_>>().join("\n  - ");
        anyhow::anyhow!(
            "Invalid configuration:\n  - {messages}\n\
             Hint: copy config.example.toml to {path} and fill in provider credentials, \
             or set mock_ai = true for a local dry run."
        )
    })
}

fn parse_story_id(raw: &str) -> anyhow::Result<Uuid> {
    Uuid::parse_str(raw).map_err(|e| anyhow::anyhow!("invalid story id '{raw}': {e}"))
}
