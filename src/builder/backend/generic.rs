//! Backend that runs descriptor-defined command lines.
//!
//! Placeholders in arguments are substituted from the project:
//! `{name}`, `{part}`, `{top}`, `{vendor}`, `{root}`, `{project_dir}` and
//! `{image}`. An argument that is exactly `{hdl}` or `{constraints}` expands
//! to one argument per discovered file.

use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;
use std::time::Instant;

use tracing::{debug, info, warn};

use crate::builder::backend::capability::{BackendCapability, PluginKind, StageRequest};
use crate::builder::backend::descriptor::{CommandSpec, PluginDescriptor};
use crate::builder::toolchain::{platform_executable_names, ToolDetector, ToolSpec};
use crate::core::result::BuildResult;
use crate::core::stage::PipelineStage;
use crate::core::tool::ToolInfo;
use crate::util::config::ToolOverride;
use crate::util::process::{ProcessBuilder, ProcessError};

/// A backend built from a [`PluginDescriptor`].
pub struct GenericToolBackend {
    descriptor: PluginDescriptor,
    spec: ToolSpec,
    hint: ToolOverride,
    detector: ToolDetector,
    tool: Option<ToolInfo>,
}

impl GenericToolBackend {
    pub fn new(descriptor: PluginDescriptor, hint: ToolOverride) -> Self {
        let section = &descriptor.tool;
        let mut spec = ToolSpec::new(section.tool_name())
            .with_executables(platform_executable_names(&section.executable));
        if let Some(arg) = &section.version_arg {
            spec = spec.with_version_arg(arg);
        }
        if let Some(range) = section.version_range() {
            spec = spec.with_version_range(range);
        }

        GenericToolBackend {
            descriptor,
            spec,
            hint,
            detector: ToolDetector::new(),
            tool: None,
        }
    }

    pub fn descriptor(&self) -> &PluginDescriptor {
        &self.descriptor
    }

    fn run_command(
        &self,
        label: &str,
        command: &CommandSpec,
        vars: &Variables<'_>,
        request: &StageRequest<'_>,
        result: &mut BuildResult,
    ) -> bool {
        let program = match &command.program {
            Some(program) => program.clone(),
            None => match &self.tool {
                Some(tool) if tool.is_installed() => tool.path().display().to_string(),
                _ => self.descriptor.tool.executable.clone(),
            },
        };
        let args = vars.expand(&command.args);

        let mut process = ProcessBuilder::new(&program).args(&args).cwd(&request.config.root);
        if let Some(timeout) = request.timeout {
            process = process.timeout(timeout);
        }
        info!("{}: {}", self.name(), label);
        debug!("{}", process.display_command());

        result
            .logs
            .insert(format!("{}.command", label), process.display_command());
        match process.exec() {
            Ok(output) => {
                let code = output.status.code();
                result.logs.insert(
                    format!("{}.stdout", label),
                    String::from_utf8_lossy(&output.stdout).into_owned(),
                );
                result.logs.insert(
                    format!("{}.stderr", label),
                    String::from_utf8_lossy(&output.stderr).into_owned(),
                );
                result.logs.insert(
                    format!("{}.returncode", label),
                    code.map_or_else(|| "none".to_string(), |c| c.to_string()),
                );
                if code == Some(0) {
                    true
                } else {
                    let status = code.map_or_else(|| "a signal".to_string(), |c| format!("code {}", c));
                    result.fail(format!("{} `{}` exited with {}", label, program, status));
                    false
                }
            }
            Err(e) => {
                if let Some(ProcessError::TimedOut { stdout, stderr, .. }) = e.downcast_ref() {
                    result.logs.insert(format!("{}.stdout", label), stdout.clone());
                    result.logs.insert(format!("{}.stderr", label), stderr.clone());
                    result
                        .logs
                        .insert(format!("{}.returncode", label), "none".to_string());
                }
                result.fail(format!("{}: {:#}", label, e));
                false
            }
        }
    }
}

impl BackendCapability for GenericToolBackend {
    fn name(&self) -> &str {
        &self.descriptor.plugin.name
    }

    fn kind(&self) -> PluginKind {
        self.descriptor.plugin.kind
    }

    fn vendor(&self) -> Option<&str> {
        self.descriptor.plugin.vendor.as_deref()
    }

    fn version(&self) -> &str {
        &self.descriptor.plugin.version
    }

    fn description(&self) -> &str {
        &self.descriptor.plugin.description
    }

    fn initialize(&mut self) -> bool {
        let tool = self.detector.detect(&self.spec, &self.hint);
        let installed = tool.is_installed();
        if !installed {
            warn!(
                "{} not found; the {} backend is degraded",
                tool.name(),
                self.descriptor.plugin.name
            );
        }
        self.tool = Some(tool);
        installed
    }

    fn cleanup(&mut self) {
        self.tool = None;
    }

    fn detect_tool(&self) -> Option<ToolInfo> {
        Some(self.detector.detect(&self.spec, &self.hint))
    }

    fn tool(&self) -> Option<&ToolInfo> {
        self.tool.as_ref()
    }

    /// Runs the defined commands in canonical order, stopping at the first
    /// failure. Stages the descriptor leaves out are skipped with a warning.
    fn run_stages(&self, stages: &[PipelineStage], request: &StageRequest<'_>) -> BuildResult {
        let start = Instant::now();
        let stages: BTreeSet<PipelineStage> = stages.iter().copied().collect();
        let vars = Variables::new(request, None);
        let mut result = BuildResult::ok();
        let mut ran = Vec::new();

        for stage in &stages {
            let Some(command) = self.descriptor.stage_command(*stage) else {
                result
                    .warnings
                    .push(format!("{} defines no {} command", self.name(), stage));
                continue;
            };
            ran.push(stage.as_str());
            if !self.run_command(stage.as_str(), command, &vars, request, &mut result) {
                break;
            }
        }

        if ran.is_empty() {
            let names: Vec<&str> = stages.iter().map(PipelineStage::as_str).collect();
            return BuildResult::failed(format!(
                "{} does not support {}",
                self.name(),
                names.join(", ")
            ));
        }

        result
            .with_log("stages", ran.join(","))
            .with_duration(start.elapsed())
    }

    fn program_device(&self, request: &StageRequest<'_>, image: Option<&Path>) -> BuildResult {
        let Some(command) = &self.descriptor.program_device else {
            return BuildResult::failed(format!(
                "{} does not support device programming",
                self.name()
            ));
        };
        let start = Instant::now();
        let vars = Variables::new(request, image);
        let mut result = BuildResult::ok();
        self.run_command("program", command, &vars, request, &mut result);
        result.with_duration(start.elapsed())
    }
}

/// Values substituted into descriptor arguments.
struct Variables<'a> {
    scalars: BTreeMap<&'static str, String>,
    request: &'a StageRequest<'a>,
}

impl<'a> Variables<'a> {
    fn new(request: &'a StageRequest<'a>, image: Option<&Path>) -> Self {
        let config = request.config;
        let mut scalars = BTreeMap::new();
        scalars.insert("name", config.name().to_string());
        scalars.insert("part", config.fpga.part.clone());
        scalars.insert("vendor", config.fpga.vendor.clone());
        scalars.insert("top", config.fpga.top_module.clone().unwrap_or_default());
        scalars.insert("root", config.root.display().to_string());
        scalars.insert("project_dir", config.project_dir().display().to_string());
        scalars.insert(
            "image",
            image
                .map(|p| {
                    if p.is_absolute() {
                        p.to_path_buf()
                    } else {
                        config.root.join(p)
                    }
                })
                .map(|p| p.display().to_string())
                .unwrap_or_default(),
        );
        Variables { scalars, request }
    }

    fn expand(&self, args: &[String]) -> Vec<String> {
        let mut expanded = Vec::with_capacity(args.len());
        for arg in args {
            match arg.as_str() {
                "{hdl}" => expanded.extend(
                    self.request
                        .discovery
                        .hdl
                        .iter()
                        .map(|a| a.absolute_path().display().to_string()),
                ),
                "{constraints}" => expanded.extend(
                    self.request
                        .discovery
                        .constraints
                        .iter()
                        .map(|a| a.absolute_path().display().to_string()),
                ),
                _ => {
                    let mut value = arg.clone();
                    for (key, replacement) in &self.scalars {
                        value = value.replace(&format!("{{{}}}", key), replacement);
                    }
                    expanded.push(value);
                }
            }
        }
        expanded
    }
}
