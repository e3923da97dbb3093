//! User tool configuration for bitforge.
//!
//! Tool overrides live outside `bitforge.toml` so that machine-specific
//! install locations never end up in version control:
//! - Global: `~/.bitforge/tools.toml` - User-wide defaults
//! - Project: `.bitforge/tools.toml` - Project-specific overrides
//!
//! Project config takes precedence over global config.
//!
//! ```toml
//! [tools.vivado]
//! path = "/opt/Xilinx/Vivado/2023.2"
//! version = "2023.2"
//!
//! [plugins]
//! dirs = ["~/fpga/plugins"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Per-tool override.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolOverride {
    /// Executable or install directory
    pub path: Option<PathBuf>,

    /// Version to report instead of probing
    pub version: Option<String>,
}

/// Plugin search settings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PluginSettings {
    /// Extra directories scanned for plugin descriptors
    pub dirs: Vec<PathBuf>,
}

/// Contents of a `tools.toml` file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub tools: BTreeMap<String, ToolOverride>,

    pub plugins: PluginSettings,
}

impl ToolsConfig {
    /// Load tool configuration from a file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read tool config: {}", path.display()))?;

        toml::from_str(&contents)
            .with_context(|| format!("failed to parse tool config: {}", path.display()))
    }

    /// Load with fallback to defaults if the file is missing or broken.
    pub fn load_or_default(path: &Path) -> Self {
        if path.exists() {
            Self::load(path).unwrap_or_else(|e| {
                tracing::warn!("failed to load tool config from {}: {:#}", path.display(), e);
                Self::default()
            })
        } else {
            Self::default()
        }
    }

    /// Save tool configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).with_context(|| {
                format!("failed to create config directory: {}", parent.display())
            })?;
        }

        let contents =
            toml::to_string_pretty(self).with_context(|| "failed to serialize tool config")?;

        std::fs::write(path, contents)
            .with_context(|| format!("failed to write tool config: {}", path.display()))?;

        Ok(())
    }

    /// Merge another config into this one (other takes precedence).
    ///
    /// Tool entries merge field by field; plugin directories accumulate.
    pub fn merge(&mut self, other: ToolsConfig) {
        for (name, tool) in other.tools {
            let entry = self.tools.entry(name).or_default();
            if tool.path.is_some() {
                entry.path = tool.path;
            }
            if tool.version.is_some() {
                entry.version = tool.version;
            }
        }
        for dir in other.plugins.dirs {
            if !self.plugins.dirs.contains(&dir) {
                self.plugins.dirs.push(dir);
            }
        }
    }

    /// Override for a tool, matched case-insensitively.
    pub fn tool(&self, name: &str) -> Option<&ToolOverride> {
        self.tools
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v)
    }
}

/// Load merged tool configuration from global and project locations.
pub fn load_tools_config(global_path: Option<&Path>, project_path: &Path) -> ToolsConfig {
    let mut config = ToolsConfig::default();

    if let Some(global_path) = global_path {
        config.merge(ToolsConfig::load_or_default(global_path));
    }

    config.merge(ToolsConfig::load_or_default(project_path));
    config
}

/// Load the effective tool configuration for a project root.
pub fn tools_config_for(project_root: &Path) -> ToolsConfig {
    let global = global_tools_config_path();
    load_tools_config(global.as_deref(), &project_tools_config_path(project_root))
}

/// Get the global bitforge config directory (~/.bitforge).
pub fn global_config_dir() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|b| b.home_dir().join(".bitforge"))
}

/// Get the global tool config path (~/.bitforge/tools.toml).
pub fn global_tools_config_path() -> Option<PathBuf> {
    global_config_dir().map(|dir| dir.join("tools.toml"))
}

/// Get the project tool config path (.bitforge/tools.toml).
pub fn project_tools_config_path(project_root: &Path) -> PathBuf {
    project_root.join(".bitforge").join("tools.toml")
}

/// Default plugin descriptor directories: `~/.bitforge/plugins` and
/// `.bitforge/plugins` under the project root.
pub fn default_plugin_dirs(project_root: &Path) -> Vec<PathBuf> {
    let mut dirs = Vec::new();
    if let Some(global) = global_config_dir() {
        dirs.push(global.join("plugins"));
    }
    dirs.push(project_root.join(".bitforge").join("plugins"));
    dirs
}
