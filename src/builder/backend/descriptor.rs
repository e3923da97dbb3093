//! Plugin descriptors.
//!
//! A plugin directory holds `*.toml` files, each describing one backend that
//! drives an external tool with plain command lines:
//!
//! ```toml
//! [plugin]
//! name = "ice40"
//! kind = "vendor"
//! vendor = "lattice"
//! description = "Yosys + nextpnr flow for iCE40"
//!
//! [tool]
//! executable = "yosys"
//! version_arg = "-V"
//!
//! [stages.synthesize]
//! args = ["-p", "synth_ice40 -top {top} -json {project_dir}/{name}.json", "{hdl}"]
//!
//! [stages.implement]
//! program = "nextpnr-ice40"
//! args = ["--json", "{project_dir}/{name}.json", "--asc", "{project_dir}/{name}.asc"]
//!
//! [program_device]
//! program = "iceprog"
//! args = ["{image}"]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use thiserror::Error;
use tracing::{debug, warn};

use crate::builder::backend::capability::PluginKind;
use crate::core::stage::PipelineStage;
use crate::core::tool::VersionRange;

/// Errors raised while loading plugin descriptors.
#[derive(Debug, Error)]
pub enum PluginError {
    #[error("failed to read plugin descriptor {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse plugin descriptor {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("invalid plugin descriptor {}: {reason}", .path.display())]
    Invalid { path: PathBuf, reason: String },
}

/// `[plugin]`
#[derive(Debug, Clone, Deserialize)]
pub struct PluginMeta {
    pub name: String,

    #[serde(default = "default_kind")]
    pub kind: PluginKind,

    #[serde(default)]
    pub vendor: Option<String>,

    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default)]
    pub description: String,
}

fn default_kind() -> PluginKind {
    PluginKind::Tool
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// `[tool]`
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ToolSection {
    /// Name used for detection and `tools.toml` overrides; defaults to the
    /// executable name
    #[serde(default)]
    pub name: Option<String>,

    pub executable: String,

    #[serde(default)]
    pub version_arg: Option<String>,

    #[serde(default)]
    pub min_version: Option<String>,

    #[serde(default)]
    pub max_version: Option<String>,
}

impl ToolSection {
    pub fn tool_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.executable)
    }

    /// Supported range, when both ends are given.
    pub fn version_range(&self) -> Option<VersionRange> {
        match (&self.min_version, &self.max_version) {
            (Some(min), Some(max)) => Some(VersionRange::new(min, max)),
            _ => None,
        }
    }
}

/// One command line. `program` defaults to the tool executable.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CommandSpec {
    #[serde(default)]
    pub program: Option<String>,

    #[serde(default)]
    pub args: Vec<String>,
}

/// A parsed descriptor file.
#[derive(Debug, Clone, Deserialize)]
pub struct PluginDescriptor {
    pub plugin: PluginMeta,

    pub tool: ToolSection,

    /// Commands keyed by stage name (`synthesize`, `implement`, ...)
    #[serde(default)]
    pub stages: BTreeMap<String, CommandSpec>,

    #[serde(default)]
    pub program_device: Option<CommandSpec>,

    /// File the descriptor was read from
    #[serde(skip)]
    pub source: PathBuf,
}

impl PluginDescriptor {
    pub fn load(path: &Path) -> Result<Self, PluginError> {
        let content = std::fs::read_to_string(path).map_err(|source| PluginError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&content, path)
    }

    pub fn parse(content: &str, path: &Path) -> Result<Self, PluginError> {
        let mut descriptor: PluginDescriptor =
            toml::from_str(content).map_err(|source| PluginError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        descriptor.source = path.to_path_buf();
        descriptor.validate()?;
        Ok(descriptor)
    }

    fn validate(&self) -> Result<(), PluginError> {
        let invalid = |reason: String| PluginError::Invalid {
            path: self.source.clone(),
            reason,
        };

        if self.plugin.name.trim().is_empty() {
            return Err(invalid("plugin.name is empty".to_string()));
        }
        if self.tool.executable.trim().is_empty() {
            return Err(invalid("tool.executable is empty".to_string()));
        }
        for key in self.stages.keys() {
            key.parse::<PipelineStage>().map_err(&invalid)?;
        }
        Ok(())
    }

    /// Command for `stage`, if the descriptor defines one.
    pub fn stage_command(&self, stage: PipelineStage) -> Option<&CommandSpec> {
        self.stages
            .iter()
            .find(|(key, _)| key.parse::<PipelineStage>().ok() == Some(stage))
            .map(|(_, command)| command)
    }
}

/// Load every descriptor in `dir`, sorted by file name.
///
/// A missing directory yields nothing. Broken descriptors are logged and
/// skipped so one bad file cannot hide the others.
pub fn load_descriptors(dir: &Path) -> Vec<PluginDescriptor> {
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            debug!("plugin directory {} not readable: {}", dir.display(), e);
            return Vec::new();
        }
    };

    let mut paths: Vec<PathBuf> = entries
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|path| path.is_file() && path.extension().is_some_and(|ext| ext == "toml"))
        .collect();
    paths.sort();

    paths
        .iter()
        .filter_map(|path| match PluginDescriptor::load(path) {
            Ok(descriptor) => Some(descriptor),
            Err(e) => {
                warn!("{}", e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    const ICE40: &str = r#"
[plugin]
name = "ice40"
kind = "vendor"
vendor = "lattice"

[tool]
executable = "yosys"
version_arg = "-V"
min_version = "0.30"
max_version = "0.99"

[stages.synth]
args = ["-p", "synth_ice40 -top {top}", "{hdl}"]

[program_device]
program = "iceprog"
args = ["{image}"]
"#;

    #[test]
    fn test_parse_descriptor() {
        let descriptor = PluginDescriptor::parse(ICE40, Path::new("ice40.toml")).unwrap();
        assert_eq!(descriptor.plugin.name, "ice40");
        assert_eq!(descriptor.plugin.kind, PluginKind::Vendor);
        assert_eq!(descriptor.plugin.version, "1.0.0");
        assert_eq!(descriptor.tool.tool_name(), "yosys");
        assert_eq!(
            descriptor.tool.version_range(),
            Some(VersionRange::new("0.30", "0.99"))
        );

        let synth = descriptor.stage_command(PipelineStage::Synthesize).unwrap();
        assert_eq!(synth.args.len(), 3);
        assert!(descriptor.stage_command(PipelineStage::Implement).is_none());
        assert_eq!(
            descriptor.program_device.unwrap().program.as_deref(),
            Some("iceprog")
        );
    }

    #[test]
    fn test_invalid_descriptors() {
        let unknown_stage = "[plugin]\nname = \"x\"\n[tool]\nexecutable = \"x\"\n[stages.route]\nargs = []\n";
        assert!(matches!(
            PluginDescriptor::parse(unknown_stage, Path::new("x.toml")),
            Err(PluginError::Invalid { .. })
        ));

        let no_tool = "[plugin]\nname = \"x\"\n";
        assert!(matches!(
            PluginDescriptor::parse(no_tool, Path::new("x.toml")),
            Err(PluginError::Parse { .. })
        ));
    }

    #[test]
    fn test_load_descriptors_skips_broken_files() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("b_ice40.toml"), ICE40).unwrap();
        fs::write(tmp.path().join("a_broken.toml"), "[plugin\n").unwrap();
        fs::write(tmp.path().join("notes.txt"), "not a descriptor").unwrap();

        let loaded = load_descriptors(tmp.path());
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].source, tmp.path().join("b_ice40.toml"));

        assert!(load_descriptors(&tmp.path().join("missing")).is_empty());
    }
}
