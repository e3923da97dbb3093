//! bitforge - a vendor-abstracted build pipeline generator for FPGA toolchains
//!
//! This crate provides the core library functionality for bitforge,
//! including tool detection, source discovery and ordering, script
//! assembly, and pipeline execution through backend plugins.

pub mod builder;
pub mod core;
pub mod ops;
pub mod util;

pub use builder::{BackendCapability, PluginRegistry, ScriptAssembler};
pub use core::{
    BuildResult, DiscoveryResult, HookPoint, PipelineStage, ProjectConfig, SourceArtifact,
    ToolInfo,
};
