//! Plugin registry setup for a project.

use std::path::{Path, PathBuf};

use anyhow::{bail, Result};

use crate::builder::backend::{BackendCapability, PluginEnv, PluginRegistry};
use crate::core::config::ProjectConfig;
use crate::util::config::{global_config_dir, tools_config_for, ToolOverride};

/// Plugin directory inside a project or the global config dir.
pub const PLUGIN_DIR: &str = "plugins";

/// Plugin environment for a project: merged `tools.toml`, the project's own
/// tool override for its vendor, and the default plugin directories.
pub fn plugin_env(config: &ProjectConfig) -> PluginEnv {
    let env = base_env(&config.root);
    let fpga = &config.fpga;
    if fpga.tool_path.is_none() && fpga.tool_version.is_none() {
        return env;
    }
    let tool_path = fpga.tool_path.as_ref().map(|p| {
        if p.is_absolute() {
            p.clone()
        } else {
            config.root.join(p)
        }
    });
    env.with_vendor_override(
        &fpga.vendor,
        ToolOverride {
            path: tool_path,
            version: fpga.tool_version.clone(),
        },
    )
}

/// Plugin environment for a directory without a project file.
pub fn base_env(root: &Path) -> PluginEnv {
    let mut tools = tools_config_for(root);
    for dir in default_plugin_dirs(root) {
        if !tools.plugins.dirs.contains(&dir) {
            tools.plugins.dirs.push(dir);
        }
    }
    PluginEnv::new(tools)
}

/// `~/.bitforge/plugins` and `<root>/.bitforge/plugins`.
pub fn default_plugin_dirs(root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(global) = global_config_dir() {
        dirs.push(global.join(PLUGIN_DIR));
    }
    dirs.push(root.join(".bitforge").join(PLUGIN_DIR));
    dirs
}

/// Discovered registry for a project.
pub fn registry_for(config: &ProjectConfig) -> PluginRegistry {
    PluginRegistry::with_builtin(plugin_env(config))
}

/// Backend named `name`, or the one handling the project's vendor.
pub fn select_backend<'r>(
    registry: &'r PluginRegistry,
    config: &ProjectConfig,
    name: Option<&str>,
) -> Result<&'r dyn BackendCapability> {
    let wanted = name.unwrap_or(&config.fpga.vendor);
    match registry.resolve(wanted) {
        Some(backend) => Ok(backend),
        None => {
            let known: Vec<&str> = registry.names().collect();
            bail!(
                "no backend for `{}` (available: {})",
                wanted,
                if known.is_empty() {
                    "none".to_string()
                } else {
                    known.join(", ")
                }
            )
        }
    }
}
