//! Command implementations

use std::path::PathBuf;

use anyhow::{Context, Result};

use bitforge::core::{CleanLevel, PipelineStage, ProjectConfig};

pub mod backend;
pub mod build;
pub mod clean;
pub mod completions;
pub mod gui;
pub mod program;
pub mod scan;
pub mod script;

/// Flags shared by every command.
pub struct GlobalArgs {
    pub config: Option<PathBuf>,
    pub yes: bool,
    pub verbose: bool,
}

/// Load `--config`, or find `bitforge.toml` from the current directory.
pub fn load_project(global: &GlobalArgs) -> Result<ProjectConfig> {
    let cwd = std::env::current_dir().context("failed to get current directory")?;
    let config = match &global.config {
        Some(path) => ProjectConfig::load(&cwd.join(path))?,
        None => ProjectConfig::discover(&cwd)?,
    };
    Ok(config)
}

pub fn parse_stages(names: &[String]) -> Result<Vec<PipelineStage>> {
    names
        .iter()
        .map(|name| name.parse::<PipelineStage>().map_err(|e| anyhow::anyhow!("{}", e)))
        .collect()
}

pub fn parse_clean_level(level: &str) -> Result<CleanLevel> {
    level.parse().map_err(|e| anyhow::anyhow!("{}", e))
}
