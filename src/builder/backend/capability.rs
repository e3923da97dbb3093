//! Backend capability trait and shared request/report types.
//!
//! A backend is one implementation of the build-stage operations for a
//! vendor toolchain or tool category. Operations a backend does not provide
//! return a failed [`BuildResult`] rather than panicking or erroring.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::builder::script::Script;
use crate::core::artifact::DiscoveryResult;
use crate::core::config::ProjectConfig;
use crate::core::result::BuildResult;
use crate::core::stage::{CleanLevel, PipelineStage};
use crate::core::tool::ToolInfo;

/// Category a backend belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PluginKind {
    /// FPGA vendor toolchain (project, synthesis, implementation, bitstream)
    Vendor,
    IpCore,
    /// High-level synthesis
    Hls,
    Documentation,
    Deployment,
    /// Any other external tool
    Tool,
}

impl PluginKind {
    pub const ALL: [PluginKind; 6] = [
        PluginKind::Vendor,
        PluginKind::IpCore,
        PluginKind::Hls,
        PluginKind::Documentation,
        PluginKind::Deployment,
        PluginKind::Tool,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            PluginKind::Vendor => "vendor",
            PluginKind::IpCore => "ip_core",
            PluginKind::Hls => "hls",
            PluginKind::Documentation => "documentation",
            PluginKind::Deployment => "deployment",
            PluginKind::Tool => "tool",
        }
    }
}

impl fmt::Display for PluginKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for PluginKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "vendor" => Ok(PluginKind::Vendor),
            "ip_core" | "ip" => Ok(PluginKind::IpCore),
            "hls" => Ok(PluginKind::Hls),
            "documentation" | "docs" => Ok(PluginKind::Documentation),
            "deployment" | "deploy" => Ok(PluginKind::Deployment),
            "tool" => Ok(PluginKind::Tool),
            _ => Err(format!("unknown plugin kind: {}", s)),
        }
    }
}

/// Inputs for one stage-execution call.
#[derive(Debug, Clone)]
pub struct StageRequest<'a> {
    pub config: &'a ProjectConfig,
    pub discovery: &'a DiscoveryResult,

    /// Write configured hooks into generated scripts
    pub embed_hooks: bool,

    pub clean_level: CleanLevel,

    /// Upper bound for one tool invocation
    pub timeout: Option<Duration>,
}

impl<'a> StageRequest<'a> {
    pub fn new(config: &'a ProjectConfig, discovery: &'a DiscoveryResult) -> Self {
        StageRequest {
            config,
            discovery,
            embed_hooks: true,
            clean_level: CleanLevel::default(),
            timeout: None,
        }
    }

    pub fn with_hooks(mut self, embed: bool) -> Self {
        self.embed_hooks = embed;
        self
    }

    pub fn with_clean_level(mut self, level: CleanLevel) -> Self {
        self.clean_level = level;
        self
    }

    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Outcome of a backend's environment check.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CompatibilityCheck {
    pub compatible: bool,

    /// Detected tools, installed or not
    pub tools: Vec<ToolInfo>,

    /// Human-readable problems
    pub issues: Vec<String>,
}

impl CompatibilityCheck {
    /// Check a set of detected tools.
    ///
    /// Missing tools make the check fail. A version outside the declared
    /// range is reported as an issue too.
    pub fn from_tools(tools: Vec<ToolInfo>) -> Self {
        let mut issues = Vec::new();
        for tool in &tools {
            if !tool.is_installed() {
                issues.push(format!("{} is not installed", tool.name()));
            } else if !tool.is_compatible() {
                if let Some(range) = tool.version_range() {
                    issues.push(format!(
                        "{} {} is outside the supported range {}",
                        tool.name(),
                        tool.version(),
                        range
                    ));
                }
            }
        }
        CompatibilityCheck {
            compatible: issues.is_empty(),
            tools,
            issues,
        }
    }
}

/// Result for an operation the backend does not provide.
pub fn unsupported(backend: &str, operation: &str) -> BuildResult {
    BuildResult::failed(format!("{} does not support {}", backend, operation))
}

/// A pluggable implementation of the build-stage operations.
///
/// The registry owns each backend and calls [`initialize`](Self::initialize)
/// exactly once after registration.
pub trait BackendCapability {
    /// Unique registry name.
    fn name(&self) -> &str;

    fn kind(&self) -> PluginKind;

    /// Vendor identifier matched by `fpga.vendor`, e.g. `xilinx`.
    fn vendor(&self) -> Option<&str> {
        None
    }

    fn version(&self) -> &str {
        "1.0.0"
    }

    fn description(&self) -> &str {
        ""
    }

    /// Prepare the backend. `false` leaves it registered but degraded.
    fn initialize(&mut self) -> bool {
        true
    }

    /// Release whatever `initialize` acquired.
    fn cleanup(&mut self) {}

    /// Run tool detection without changing the backend.
    fn detect_tool(&self) -> Option<ToolInfo> {
        None
    }

    /// Tool found by the last `initialize`.
    fn tool(&self) -> Option<&ToolInfo> {
        None
    }

    fn check_compatibility(&self) -> CompatibilityCheck {
        match self.tool() {
            Some(tool) => CompatibilityCheck::from_tools(vec![tool.clone()]),
            None => CompatibilityCheck {
                compatible: true,
                ..Default::default()
            },
        }
    }

    /// Whether the backend drives the tool with generated scripts that can
    /// carry hook commands.
    fn supports_script_hooks(&self) -> bool {
        false
    }

    /// Generated script for `stages`, for backends that use one.
    fn script(&self, _stages: &[PipelineStage], _request: &StageRequest<'_>) -> Option<Script> {
        None
    }

    /// Execute `stages` in canonical order as one unit.
    fn run_stages(&self, stages: &[PipelineStage], _request: &StageRequest<'_>) -> BuildResult {
        let names: Vec<&str> = stages.iter().map(PipelineStage::as_str).collect();
        unsupported(self.name(), &names.join(", "))
    }

    /// Create the project, import sources and recover design structure.
    fn create_project(&self, request: &StageRequest<'_>) -> BuildResult {
        self.run_stages(
            &[
                PipelineStage::CreateProject,
                PipelineStage::ImportFiles,
                PipelineStage::RecoverStructure,
            ],
            request,
        )
    }

    fn synthesize(&self, request: &StageRequest<'_>) -> BuildResult {
        self.run_stages(&[PipelineStage::Synthesize], request)
    }

    fn implement(&self, request: &StageRequest<'_>) -> BuildResult {
        self.run_stages(&[PipelineStage::Implement], request)
    }

    /// Produce the final device image.
    fn generate_artifact(&self, request: &StageRequest<'_>) -> BuildResult {
        self.run_stages(&[PipelineStage::GenerateBitstream], request)
    }

    fn clean(&self, request: &StageRequest<'_>) -> BuildResult {
        self.run_stages(&[PipelineStage::Clean], request)
    }

    fn program_device(&self, _request: &StageRequest<'_>, _image: Option<&Path>) -> BuildResult {
        unsupported(self.name(), "device programming")
    }

    /// Start the tool interactively without waiting for it.
    fn open_gui(&self, _request: &StageRequest<'_>) -> BuildResult {
        unsupported(self.name(), "GUI mode")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Docs;

    impl BackendCapability for Docs {
        fn name(&self) -> &str {
            "docs"
        }

        fn kind(&self) -> PluginKind {
            PluginKind::Documentation
        }
    }

    #[test]
    fn test_plugin_kind_parse() {
        assert_eq!("vendor".parse::<PluginKind>(), Ok(PluginKind::Vendor));
        assert_eq!("ip-core".parse::<PluginKind>(), Ok(PluginKind::IpCore));
        assert_eq!("HLS".parse::<PluginKind>(), Ok(PluginKind::Hls));
        assert!("compiler".parse::<PluginKind>().is_err());
        for kind in PluginKind::ALL {
            assert_eq!(kind.as_str().parse::<PluginKind>(), Ok(kind));
        }
    }

    #[test]
    fn test_default_operations_are_unsupported() {
        let config = ProjectConfig::parse(
            "[project]\nname = \"d\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\n",
            Path::new("/work/bitforge.toml"),
        )
        .unwrap();
        let discovery = DiscoveryResult::default();
        let request = StageRequest::new(&config, &discovery);

        let result = Docs.synthesize(&request);
        assert!(!result.success);
        assert_eq!(result.first_error(), Some("docs does not support synthesize"));
        assert!(!Docs.program_device(&request, None).success);
        assert!(Docs.script(&PipelineStage::BUILD, &request).is_none());
        assert!(Docs.check_compatibility().compatible);
    }

    #[test]
    fn test_compatibility_from_tools() {
        use crate::core::tool::VersionRange;

        let ok = ToolInfo::installed("vivado", "2023.2", "/opt/vivado")
            .with_range(Some(VersionRange::new("2019.1", "2024.2")));
        assert!(CompatibilityCheck::from_tools(vec![ok]).compatible);

        let old = ToolInfo::installed("vivado", "2018.3", "/opt/vivado")
            .with_range(Some(VersionRange::new("2019.1", "2024.2")));
        let check = CompatibilityCheck::from_tools(vec![old]);
        assert!(!check.compatible);
        assert!(check.issues[0].contains("outside the supported range"));

        let missing = CompatibilityCheck::from_tools(vec![ToolInfo::absent("vivado")]);
        assert_eq!(missing.issues, vec!["vivado is not installed"]);
    }
}
