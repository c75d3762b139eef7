//! Input/Output for job runs
//!
//! This module handles logging setup and persistence of output artifacts.

pub mod artifacts;
mod output;

pub use artifacts::{load_json, publish_json, store_json, ArtifactStore, DirectoryStore, MemoryStore};
pub use output::{log_on_coordinator_only, setup_output};
