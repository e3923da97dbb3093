//! The parsed `bitforge.toml` project configuration.
//!
//! Only the fields the pipeline actually consumes are typed here. Options
//! tables that are passed straight through to the tool stay as
//! `toml::Value` maps.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::artifact::ArtifactRole;
use crate::core::hook::HooksConfig;

/// Name of the project configuration file.
pub const CONFIG_FILE: &str = "bitforge.toml";

/// Errors raised while locating, loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not find `bitforge.toml` in `{}` or any parent directory", .dir.display())]
    NotFound { dir: PathBuf },

    #[error("failed to read {}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("missing required field `{0}`")]
    MissingField(&'static str),
}

/// `[project]`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectMeta {
    pub name: String,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: Option<String>,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// `[fpga]` (also accepted as `[backend]`)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FpgaConfig {
    /// Backend vendor identifier, e.g. `xilinx`
    pub vendor: String,

    /// Target device part number
    pub part: String,

    /// Explicit top-level module
    #[serde(default)]
    pub top_module: Option<String>,

    /// Explicit tool executable or install directory
    #[serde(default)]
    pub tool_path: Option<PathBuf>,

    /// Tool version to assume instead of probing
    #[serde(default)]
    pub tool_version: Option<String>,

    /// Default HDL for new projects (`verilog` or `vhdl`)
    #[serde(default = "default_target_language")]
    pub target_language: String,
}

fn default_target_language() -> String {
    "Verilog".to_string()
}

/// One entry of `source.hdl`, `source.constraints` or `source.ip_cores`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceGroup {
    /// Literal path
    #[serde(default)]
    pub path: Option<String>,

    /// Glob pattern (`**` allowed)
    #[serde(default)]
    pub pattern: Option<String>,

    /// Patterns dropped from the expansion
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Explicit language; `auto` or absent means detect
    #[serde(default)]
    pub language: Option<String>,

    #[serde(default, rename = "type")]
    pub role: ArtifactRole,
}

impl SourceGroup {
    /// The path expression to expand, pattern first.
    pub fn expression(&self) -> Option<&str> {
        self.pattern.as_deref().or(self.path.as_deref())
    }

    /// Explicit language, ignoring `auto`.
    pub fn explicit_language(&self) -> Option<&str> {
        self.language
            .as_deref()
            .filter(|l| !l.eq_ignore_ascii_case("auto"))
    }
}

/// `[source.block_design]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BlockDesignConfig {
    /// Existing `.bd` file to open
    #[serde(default)]
    pub bd_file: Option<String>,

    /// Tcl script that recreates the block design
    #[serde(default)]
    pub tcl_script: Option<String>,

    /// Use the block design as the top module
    #[serde(default)]
    pub is_top: bool,

    /// Wrapper module to set as top when not generated automatically
    #[serde(default)]
    pub wrapper_name: Option<String>,

    #[serde(default = "default_true")]
    pub auto_wrapper: bool,

    #[serde(default = "default_true")]
    pub generate_wrapper: bool,
}

fn default_true() -> bool {
    true
}

/// `[source]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SourceConfig {
    #[serde(default)]
    pub hdl: Vec<SourceGroup>,

    #[serde(default)]
    pub constraints: Vec<SourceGroup>,

    #[serde(default)]
    pub ip_cores: Vec<SourceGroup>,

    #[serde(default)]
    pub block_design: Option<BlockDesignConfig>,
}

/// Free-form option table passed through to the tool.
pub type OptionMap = BTreeMap<String, toml::Value>;

/// `[build.synthesis]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynthesisConfig {
    #[serde(default)]
    pub strategy: Option<String>,

    #[serde(default)]
    pub options: OptionMap,
}

/// `[build.implementation]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ImplementationConfig {
    #[serde(default)]
    pub options: OptionMap,
}

/// `[build.bitstream]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BitstreamConfig {
    #[serde(default)]
    pub options: OptionMap,

    /// Where generated images are copied (relative to the project root)
    #[serde(default)]
    pub output_dir: Option<String>,
}

/// `[build]`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BuildSettings {
    #[serde(default)]
    pub synthesis: SynthesisConfig,

    #[serde(default)]
    pub implementation: ImplementationConfig,

    #[serde(default)]
    pub bitstream: BitstreamConfig,

    #[serde(default)]
    pub hooks: HooksConfig,

    /// Limit for each tool run, in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u64>,
}

/// The whole project description.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub project: ProjectMeta,

    #[serde(alias = "backend")]
    pub fpga: FpgaConfig,

    #[serde(default)]
    pub source: SourceConfig,

    #[serde(default)]
    pub build: BuildSettings,

    /// Where the tool project is materialised, relative to the root
    #[serde(default = "default_project_dir")]
    pub project_dir: PathBuf,

    /// Directory containing the configuration file
    #[serde(skip)]
    pub root: PathBuf,
}

fn default_project_dir() -> PathBuf {
    PathBuf::from("build")
}

impl ProjectConfig {
    /// Load and validate a configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    /// Parse configuration text; `path` locates the project root.
    pub fn parse(content: &str, path: &Path) -> Result<Self, ConfigError> {
        let mut config: ProjectConfig =
            toml::from_str(content).map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })?;

        config.root = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .unwrap_or(Path::new("."))
            .to_path_buf();
        config.validate()?;
        Ok(config)
    }

    /// Locate `bitforge.toml` starting at `start` and searching upward.
    pub fn find(start: &Path) -> Result<PathBuf, ConfigError> {
        let mut current = start.to_path_buf();
        loop {
            let candidate = current.join(CONFIG_FILE);
            if candidate.is_file() {
                return Ok(candidate);
            }
            if !current.pop() {
                return Err(ConfigError::NotFound {
                    dir: start.to_path_buf(),
                });
            }
        }
    }

    /// Find and load the configuration governing `cwd`.
    pub fn discover(cwd: &Path) -> Result<Self, ConfigError> {
        let path = Self::find(cwd)?;
        Self::load(&path)
    }

    /// Minimal required-field checks.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.project.name.trim().is_empty() {
            return Err(ConfigError::MissingField("project.name"));
        }
        if self.fpga.vendor.trim().is_empty() {
            return Err(ConfigError::MissingField("fpga.vendor"));
        }
        if self.fpga.part.trim().is_empty() {
            return Err(ConfigError::MissingField("fpga.part"));
        }
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.project.name
    }

    /// Absolute (root-joined) project directory.
    pub fn project_dir(&self) -> PathBuf {
        self.root.join(&self.project_dir)
    }

    pub fn hooks(&self) -> &HooksConfig {
        &self.build.hooks
    }
}

/// Render an option value the way Tcl `set_property` expects it.
pub fn tcl_value(value: &toml::Value) -> String {
    match value {
        toml::Value::String(s) => s.clone(),
        toml::Value::Boolean(b) => b.to_string(),
        toml::Value::Integer(i) => i.to_string(),
        toml::Value::Float(f) => f.to_string(),
        other => other.to_string(),
    }
}

/// Read a boolean option, accepting `true`/`false` strings too.
pub fn option_bool(options: &OptionMap, key: &str) -> Option<bool> {
    match options.get(key)? {
        toml::Value::Boolean(b) => Some(*b),
        toml::Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
