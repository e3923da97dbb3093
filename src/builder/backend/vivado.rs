//! Built-in Xilinx Vivado backend.

use std::path::Path;
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::builder::backend::capability::{BackendCapability, PluginKind, StageRequest};
use crate::builder::runner::ScriptRunner;
use crate::builder::script::{AssemblyContext, Script, ScriptAssembler, ScriptFragment, VivadoTemplates};
use crate::builder::toolchain::{AdapterRegistry, ToolDetector, ToolSpec, VersionAdapter};
use crate::core::config::ProjectConfig;
use crate::core::result::BuildResult;
use crate::core::stage::PipelineStage;
use crate::core::tool::ToolInfo;
use crate::util::config::ToolOverride;

pub const VIVADO_BACKEND: &str = "vivado";

/// Drives Vivado through generated Tcl scripts.
///
/// `initialize` detects the tool and resolves a version adapter. Without an
/// installed tool the backend stays registered but every build operation
/// fails with a descriptive result.
pub struct VivadoBackend {
    spec: ToolSpec,
    hint: ToolOverride,
    detector: ToolDetector,
    adapters: AdapterRegistry,
    tool: Option<ToolInfo>,
    adapter: Option<Arc<dyn VersionAdapter>>,
}

impl VivadoBackend {
    pub fn new() -> Self {
        VivadoBackend {
            spec: ToolSpec::vivado(),
            hint: ToolOverride::default(),
            detector: ToolDetector::new(),
            adapters: AdapterRegistry::with_builtin(),
            tool: None,
            adapter: None,
        }
    }

    /// Use an explicit tool location or version.
    pub fn with_override(mut self, hint: ToolOverride) -> Self {
        self.hint = hint;
        self
    }

    pub fn with_spec(mut self, spec: ToolSpec) -> Self {
        self.spec = spec;
        self
    }

    pub fn with_adapters(mut self, adapters: AdapterRegistry) -> Self {
        self.adapters = adapters;
        self
    }

    /// Adapter resolved for the detected version.
    pub fn adapter(&self) -> Option<&Arc<dyn VersionAdapter>> {
        self.adapter.as_ref()
    }

    fn adapted_config(&self, config: &ProjectConfig) -> ProjectConfig {
        match &self.adapter {
            Some(adapter) => adapter.adapt_config(config.clone()),
            None => config.clone(),
        }
    }

    fn ready_tool(&self) -> Result<&ToolInfo, BuildResult> {
        match &self.tool {
            Some(tool) if tool.is_installed() => Ok(tool),
            _ => Err(BuildResult::failed(
                "vivado was not found; set fpga.tool_path or [tools.vivado] in .bitforge/tools.toml",
            )),
        }
    }

    fn runner<'a>(&self, tool: &'a ToolInfo, request: &StageRequest<'_>) -> ScriptRunner<'a> {
        ScriptRunner::new(tool, &request.config.root)
            .with_adapter(self.adapter.clone())
            .with_timeout(request.timeout)
    }
}

impl Default for VivadoBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl BackendCapability for VivadoBackend {
    fn name(&self) -> &str {
        VIVADO_BACKEND
    }

    fn kind(&self) -> PluginKind {
        PluginKind::Vendor
    }

    fn vendor(&self) -> Option<&str> {
        Some("xilinx")
    }

    fn description(&self) -> &str {
        "Xilinx Vivado design suite (Tcl batch flow)"
    }

    fn initialize(&mut self) -> bool {
        let tool = self.detector.detect(&self.spec, &self.hint);
        if !tool.is_installed() {
            warn!("vivado not found; the vivado backend is degraded");
            self.tool = Some(tool);
            self.adapter = None;
            return false;
        }

        if !tool.is_compatible() {
            if let Some(range) = tool.version_range() {
                warn!(
                    "vivado {} is outside the supported range {}; continuing anyway",
                    tool.version(),
                    range
                );
            }
        }

        self.adapter = self.adapters.resolve(&tool);
        info!("vivado {} at {}", tool.version(), tool.path().display());
        self.tool = Some(tool);
        true
    }

    fn cleanup(&mut self) {
        self.tool = None;
        self.adapter = None;
    }

    fn detect_tool(&self) -> Option<ToolInfo> {
        Some(self.detector.detect(&self.spec, &self.hint))
    }

    fn tool(&self) -> Option<&ToolInfo> {
        self.tool.as_ref()
    }

    fn supports_script_hooks(&self) -> bool {
        true
    }

    fn script(&self, stages: &[PipelineStage], request: &StageRequest<'_>) -> Option<Script> {
        let config = self.adapted_config(request.config);
        let script = ScriptAssembler::new(&VivadoTemplates)
            .with_hooks(request.embed_hooks)
            .with_clean_level(request.clean_level)
            .assemble(&config, request.discovery, stages);
        Some(script)
    }

    fn run_stages(&self, stages: &[PipelineStage], request: &StageRequest<'_>) -> BuildResult {
        let tool = match self.ready_tool() {
            Ok(tool) => tool,
            Err(result) => return result,
        };
        let Some(script) = self.script(stages, request) else {
            return BuildResult::failed("no script generated");
        };
        if script.is_empty() {
            return BuildResult::ok().with_warning("no stages requested");
        }

        let name = script_name(&script.stages());
        debug!("running stages {:?} as `{}`", script.stages(), name);
        let result = self.runner(tool, request).run_batch(&script, &name);

        let stages: Vec<&str> = script.stages().iter().map(PipelineStage::as_str).collect();
        result.with_log("stages", stages.join(","))
    }

    fn program_device(&self, request: &StageRequest<'_>, image: Option<&Path>) -> BuildResult {
        let tool = match self.ready_tool() {
            Ok(tool) => tool,
            Err(result) => return result,
        };

        let start = Instant::now();
        let ctx = AssemblyContext {
            config: request.config,
            discovery: request.discovery,
            clean_level: request.clean_level,
        };
        let mut fragment = ScriptFragment::preamble();
        fragment.extend(VivadoTemplates.program_device(image, &ctx));

        let result = self
            .runner(tool, request)
            .run_batch(&Script::from(fragment), "program");
        result.with_duration(start.elapsed())
    }

    fn open_gui(&self, request: &StageRequest<'_>) -> BuildResult {
        let tool = match self.ready_tool() {
            Ok(tool) => tool,
            Err(result) => return result,
        };
        let config = self.adapted_config(request.config);
        let script = ScriptAssembler::new(&VivadoTemplates).gui(&config, request.discovery);
        self.runner(tool, request).launch_gui(&script)
    }
}

/// Script name for a stage set: `build` for the full flow, otherwise the
/// stage names joined with `+`.
fn script_name(stages: &[PipelineStage]) -> String {
    if stages == PipelineStage::BUILD {
        return "build".to_string();
    }
    stages
        .iter()
        .map(PipelineStage::as_str)
        .collect::<Vec<_>>()
        .join("+")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::artifact::DiscoveryResult;
    use tempfile::TempDir;

    fn config(root: &Path) -> ProjectConfig {
        ProjectConfig::parse(
            "[project]\nname = \"blinky\"\n[fpga]\nvendor = \"xilinx\"\npart = \"xc7a35t\"\n",
            &root.join("bitforge.toml"),
        )
        .unwrap()
    }

    #[test]
    fn test_explicit_dir_without_tool_degrades() {
        let tmp = TempDir::new().unwrap();
        let mut backend = VivadoBackend::new().with_override(ToolOverride {
            path: Some(tmp.path().to_path_buf()),
            version: None,
        });

        assert!(!backend.initialize());
        let tool = backend.tool().unwrap();
        assert!(!tool.is_installed());
        assert!(!backend.check_compatibility().compatible);

        let config = config(tmp.path());
        let discovery = DiscoveryResult::default();
        let result = backend.synthesize(&StageRequest::new(&config, &discovery));
        assert!(!result.success);
        assert!(result.first_error().unwrap().contains("vivado was not found"));
    }

    #[test]
    fn test_script_without_tool() {
        let tmp = TempDir::new().unwrap();
        let backend = VivadoBackend::new();
        let config = config(tmp.path());
        let discovery = DiscoveryResult::default();
        let request = StageRequest::new(&config, &discovery);

        let script = backend
            .script(&[PipelineStage::Implement], &request)
            .unwrap();
        assert!(script.has_preamble());
        assert_eq!(script.stages(), vec![PipelineStage::Implement]);
    }

    #[test]
    fn test_script_name() {
        assert_eq!(script_name(&PipelineStage::BUILD), "build");
        assert_eq!(script_name(&[PipelineStage::Synthesize]), "synthesize");
        assert_eq!(
            script_name(&[PipelineStage::Synthesize, PipelineStage::Implement]),
            "synthesize+implement"
        );
    }

    #[cfg(unix)]
    fn fake_vivado(dir: &Path, version: &str) -> std::path::PathBuf {
        use std::os::unix::fs::PermissionsExt;

        let path = dir.join("vivado");
        let body = format!(
            "#!/bin/sh\nif [ \"$1\" = \"-version\" ] || [ \"$1\" = \"--version\" ]; then\n  echo 'Vivado v{} (64-bit)'\n  exit 0\nfi\ncat \"$4\"\n",
            version
        );
        std::fs::write(&path, body).unwrap();
        let mut perms = std::fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        std::fs::set_permissions(&path, perms).unwrap();
        path
    }

    #[test]
    #[cfg(unix)]
    fn test_initialize_resolves_adapter() {
        let tmp = TempDir::new().unwrap();
        let exe = fake_vivado(tmp.path(), "2023.2");
        let mut backend = VivadoBackend::new().with_override(ToolOverride {
            path: Some(exe),
            version: None,
        });

        assert!(backend.initialize());
        assert_eq!(backend.tool().unwrap().version(), "2023.2");
        assert_eq!(backend.adapter().unwrap().name(), "vivado-2023");
        assert!(backend.check_compatibility().compatible);

        // The adapter fills in the release's default strategy.
        let config = config(tmp.path());
        let discovery = DiscoveryResult::default();
        let script = backend
            .script(&[PipelineStage::Synthesize], &StageRequest::new(&config, &discovery))
            .unwrap();
        assert!(script.render().contains("Vivado Synthesis 2023"));

        backend.cleanup();
        assert!(backend.tool().is_none());
    }

    #[test]
    #[cfg(unix)]
    fn test_run_stages_through_tool() {
        let tmp = TempDir::new().unwrap();
        // The fake tool echoes the script, which ends with the completion marker.
        let exe = fake_vivado(tmp.path(), "2023.2");
        let mut backend = VivadoBackend::new().with_override(ToolOverride {
            path: Some(exe),
            version: None,
        });
        assert!(backend.initialize());

        let config = config(tmp.path());
        let discovery = DiscoveryResult::default();
        let result = backend.synthesize(&StageRequest::new(&config, &discovery));
        assert!(result.success, "{:?}", result.errors);
        assert_eq!(result.logs["stages"], "synthesize");
        assert!(result.logs["stdout"].contains("launch_runs synth_1"));
    }
}
