//! Core data structures for bitforge.
//!
//! This module contains the types shared by every engine:
//! - Project configuration (`bitforge.toml`)
//! - Discovered source artifacts
//! - Pipeline stages and hooks
//! - Tool detection results and build results

pub mod artifact;
pub mod config;
pub mod hook;
pub mod result;
pub mod stage;
pub mod tool;

pub use artifact::{ArtifactRole, DiscoveryResult, Language, SourceArtifact};
pub use config::{ConfigError, ProjectConfig, CONFIG_FILE};
pub use hook::{HookCommand, HookMode, HookValue, HooksConfig};
pub use result::BuildResult;
pub use stage::{CleanLevel, HookPoint, PipelineStage};
pub use tool::{ToolInfo, VersionRange};
