//! Core library for StoryForge, an asynchronous story-generation pipeline:
//! plan -> per-scene moment -> image -> audio -> blob upload -> relational
//! persistence, driven by a durable job queue.
//!
//! This crate contains the domain model, configuration, error types, the
//! provider adapters, blob storage, the relational repository, the broker
//! client, the prompt assembler, the dispatcher, the pipeline orchestrator,
//! and the worker task-lifecycle manager. The `storyforge-cli` binary
//! crate wires these together behind a command-line interface.
pub mod blob;
pub mod broker;
pub mod config;
pub mod dispatch;
pub mod domain;
pub mod error;
pub mod orchestrator;
pub mod prompt;
pub mod providers;
pub mod repository;
pub mod runtime;
pub mod state_machine;

pub use error::*;

/// Returns the version of the storyforge-core library.
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
