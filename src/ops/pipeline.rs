//! Pipeline driver.
//!
//! Runs the requested stages through a backend in canonical order and stops
//! at the first failure. Hooks either travel inside the generated script
//! (script mode) or run on the host around the stages (host mode). Backends
//! that cannot carry hooks in a script always get host hooks.
//!
//! In host mode consecutive stages without hooks between them are executed
//! as one backend call, so the tool is only restarted at hook boundaries.

use std::collections::BTreeSet;
use std::time::{Duration, Instant};

use serde::Serialize;
use tracing::{info, warn};

use crate::builder::backend::{BackendCapability, StageRequest};
use crate::builder::hooks::HookExecutor;
use crate::core::artifact::DiscoveryResult;
use crate::core::config::ProjectConfig;
use crate::core::hook::HookMode;
use crate::core::result::BuildResult;
use crate::core::stage::{CleanLevel, HookPoint, PipelineStage};

/// Limit for one tool run unless `build.timeout` or the caller sets one.
pub const DEFAULT_STAGE_TIMEOUT: Duration = Duration::from_secs(6 * 60 * 60);

/// Effective limit for a tool run: the explicit value, then
/// `build.timeout`, then [`DEFAULT_STAGE_TIMEOUT`].
pub fn stage_timeout(config: &ProjectConfig, explicit: Option<Duration>) -> Duration {
    explicit
        .or_else(|| config.build.timeout.map(Duration::from_secs))
        .unwrap_or(DEFAULT_STAGE_TIMEOUT)
}

/// Options for [`run_pipeline`].
#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    /// Stages to run; empty means the full build
    pub stages: Vec<PipelineStage>,

    pub clean_level: CleanLevel,

    /// Overrides `build.hooks.mode`
    pub hook_mode: Option<HookMode>,

    /// Keep going when a host hook fails
    pub continue_on_hook_failure: bool,

    /// Limit for each tool run; see [`stage_timeout`]
    pub timeout: Option<Duration>,
}

impl PipelineOptions {
    pub fn full() -> Self {
        Self::default()
    }

    pub fn single(stage: PipelineStage) -> Self {
        PipelineOptions {
            stages: vec![stage],
            ..Default::default()
        }
    }
}

/// One executed step.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum PipelineStep {
    Hook {
        point: HookPoint,
        result: BuildResult,
    },
    Stages {
        stages: Vec<PipelineStage>,
        result: BuildResult,
    },
}

impl PipelineStep {
    pub fn result(&self) -> &BuildResult {
        match self {
            PipelineStep::Hook { result, .. } | PipelineStep::Stages { result, .. } => result,
        }
    }

    pub fn label(&self) -> String {
        match self {
            PipelineStep::Hook { point, .. } => format!("hook {}", point),
            PipelineStep::Stages { stages, .. } => stages
                .iter()
                .map(PipelineStage::as_str)
                .collect::<Vec<_>>()
                .join(" + "),
        }
    }
}

/// Aggregated outcome of a pipeline run.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    pub backend: String,
    pub hook_mode: HookMode,
    pub steps: Vec<PipelineStep>,
    pub success: bool,
    pub duration: Duration,
}

impl PipelineReport {
    /// The step that stopped the pipeline.
    pub fn failed_step(&self) -> Option<&PipelineStep> {
        self.steps.iter().find(|step| !step.result().success)
    }

    /// Stages that completed successfully.
    pub fn completed_stages(&self) -> Vec<PipelineStage> {
        self.steps
            .iter()
            .filter_map(|step| match step {
                PipelineStep::Stages { stages, result } if result.success => Some(stages.clone()),
                _ => None,
            })
            .flatten()
            .collect()
    }

    pub fn errors(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.result().errors.iter().map(String::as_str))
            .collect()
    }

    pub fn warnings(&self) -> Vec<&str> {
        self.steps
            .iter()
            .flat_map(|step| step.result().warnings.iter().map(String::as_str))
            .collect()
    }
}

/// Run stages through `backend`.
pub fn run_pipeline(
    backend: &dyn BackendCapability,
    config: &ProjectConfig,
    discovery: &DiscoveryResult,
    options: &PipelineOptions,
) -> PipelineReport {
    let start = Instant::now();
    let stages: Vec<PipelineStage> = if options.stages.is_empty() {
        PipelineStage::BUILD.to_vec()
    } else {
        options
            .stages
            .iter()
            .copied()
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    };

    let requested_mode = options.hook_mode.unwrap_or(config.hooks().mode);
    let hook_mode = if backend.supports_script_hooks() {
        requested_mode
    } else {
        HookMode::Host
    };

    let request = StageRequest::new(config, discovery)
        .with_hooks(hook_mode == HookMode::Script)
        .with_clean_level(options.clean_level)
        .with_timeout(Some(stage_timeout(config, options.timeout)));

    info!(
        "running {} stage(s) with {} ({} hooks)",
        stages.len(),
        backend.name(),
        match hook_mode {
            HookMode::Script => "script",
            HookMode::Host => "host",
        }
    );

    let mut driver = Driver {
        backend,
        config,
        request,
        executor: hook_executor(config, options),
        steps: Vec::new(),
    };
    let success = match hook_mode {
        HookMode::Script => driver.run_stages(&stages),
        HookMode::Host => driver.run_with_host_hooks(&stages),
    };

    if !success {
        warn!("pipeline stopped after a failure");
    }
    PipelineReport {
        backend: backend.name().to_string(),
        hook_mode,
        steps: driver.steps,
        success,
        duration: start.elapsed(),
    }
}

fn hook_executor(config: &ProjectConfig, options: &PipelineOptions) -> HookExecutor {
    let executor = HookExecutor::new(&config.root);
    if options.continue_on_hook_failure {
        executor.continue_on_failure()
    } else {
        executor
    }
}

struct Driver<'a> {
    backend: &'a dyn BackendCapability,
    config: &'a ProjectConfig,
    request: StageRequest<'a>,
    executor: HookExecutor,
    steps: Vec<PipelineStep>,
}

impl Driver<'_> {
    fn run_stages(&mut self, stages: &[PipelineStage]) -> bool {
        if stages.is_empty() {
            return true;
        }
        let result = self.backend.run_stages(stages, &self.request);
        let success = result.success;
        self.steps.push(PipelineStep::Stages {
            stages: stages.to_vec(),
            result,
        });
        success
    }

    fn run_hook(&mut self, point: HookPoint) -> bool {
        let hooks = self.config.hooks();
        if hooks.resolve(point, &self.config.root).is_empty() {
            return true;
        }
        let outcome = self.executor.run_point(hooks, point, &self.config.root);
        self.steps.push(PipelineStep::Hook {
            point,
            result: outcome.result,
        });
        outcome.proceed
    }

    fn has_hooks(&self, points: &[HookPoint]) -> bool {
        points
            .iter()
            .any(|&point| !self.config.hooks().resolve(point, &self.config.root).is_empty())
    }

    fn run_with_host_hooks(&mut self, stages: &[PipelineStage]) -> bool {
        let mut pending: Vec<PipelineStage> = Vec::new();

        for &stage in stages {
            if self.has_hooks(stage.pre_hooks()) {
                if !self.run_stages(&std::mem::take(&mut pending)) {
                    return false;
                }
                for &point in stage.pre_hooks() {
                    // An aborted pre-stage hook keeps the stage from running.
                    if !self.run_hook(point) {
                        return false;
                    }
                }
            }

            pending.push(stage);

            if self.has_hooks(stage.post_hooks()) {
                if !self.run_stages(&std::mem::take(&mut pending)) {
                    return false;
                }
                for &point in stage.post_hooks() {
                    if !self.run_hook(point) {
                        return false;
                    }
                }
            }
        }

        self.run_stages(&pending)
    }
}

/// Human-readable summary of a pipeline run.
pub fn format_report(report: &PipelineReport) -> String {
    let mut output = String::new();
    for step in &report.steps {
        let result = step.result();
        let status = if result.success { "[OK]" } else { "[!!]" };
        output.push_str(&format!(
            "  {} {} ({:.1}s)\n",
            status,
            step.label(),
            result.duration.as_secs_f64()
        ));
        for error in &result.errors {
            output.push_str(&format!("      error: {}\n", error));
        }
    }

    if report.success {
        output.push_str(&format!(
            "Finished in {:.1}s with {}\n",
            report.duration.as_secs_f64(),
            report.backend
        ));
    } else {
        output.push_str("Build failed\n");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::builder::backend::PluginKind;
    use crate::builder::script::Script;
    use std::cell::RefCell;
    use std::path::Path;
    use tempfile::TempDir;

    /// Records which stage groups it was asked to run.
    struct Recorder {
        script_hooks: bool,
        fail_on: Option<PipelineStage>,
        calls: RefCell<Vec<(Vec<PipelineStage>, bool)>>,
    }

    impl Recorder {
        fn new(script_hooks: bool) -> Self {
            Recorder {
                script_hooks,
                fail_on: None,
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls(&self) -> Vec<Vec<PipelineStage>> {
            self.calls.borrow().iter().map(|(s, _)| s.clone()).collect()
        }
    }

    impl BackendCapability for Recorder {
        fn name(&self) -> &str {
            "recorder"
        }

        fn kind(&self) -> PluginKind {
            PluginKind::Vendor
        }

        fn supports_script_hooks(&self) -> bool {
            self.script_hooks
        }

        fn script(&self, _stages: &[PipelineStage], _request: &StageRequest<'_>) -> Option<Script> {
            None
        }

        fn run_stages(&self, stages: &[PipelineStage], request: &StageRequest<'_>) -> BuildResult {
            self.calls
                .borrow_mut()
                .push((stages.to_vec(), request.embed_hooks));
            match self.fail_on {
                Some(stage) if stages.contains(&stage) => BuildResult::failed(format!("{} failed", stage)),
                _ => BuildResult::ok(),
            }
        }
    }

    fn config(root: &Path, hooks: &str) -> ProjectConfig {
        let text = format!(
            "[project]\nname = \"b\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\n[build.hooks]\n{}",
            hooks
        );
        ProjectConfig::parse(&text, &root.join("bitforge.toml")).unwrap()
    }

    #[test]
    fn test_script_mode_is_one_call() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "pre_synth = \"echo hi\"\n");
        let backend = Recorder::new(true);

        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &PipelineOptions::full());
        assert!(report.success);
        assert_eq!(report.hook_mode, HookMode::Script);
        assert_eq!(backend.calls(), vec![PipelineStage::BUILD.to_vec()]);
        assert!(backend.calls.borrow()[0].1);
    }

    #[test]
    #[cfg(unix)]
    fn test_host_hooks_split_stages() {
        let tmp = TempDir::new().unwrap();
        let config = config(
            tmp.path(),
            "mode = \"host\"\npre_synth = \"echo pre\"\npost_impl = [\"echo a\", \"echo b\"]\n",
        );
        let backend = Recorder::new(true);

        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &PipelineOptions::full());
        assert!(report.success, "{:?}", report.errors());
        assert_eq!(
            backend.calls(),
            vec![
                vec![
                    PipelineStage::CreateProject,
                    PipelineStage::ImportFiles,
                    PipelineStage::RecoverStructure
                ],
                vec![PipelineStage::Synthesize, PipelineStage::Implement],
                vec![PipelineStage::GenerateBitstream],
            ]
        );
        assert!(!backend.calls.borrow()[0].1);

        let labels: Vec<String> = report.steps.iter().map(PipelineStep::label).collect();
        assert_eq!(
            labels,
            vec![
                "create_project + import_files + recover_structure",
                "hook pre_synth",
                "synthesize + implement",
                "hook post_impl",
                "generate_bitstream",
            ]
        );
        assert_eq!(report.completed_stages().len(), 6);
    }

    #[test]
    #[cfg(unix)]
    fn test_failed_pre_hook_skips_stage() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "pre_impl = \"exit 4\"\n");
        // Backends without script support always get host hooks.
        let backend = Recorder::new(false);

        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &PipelineOptions::full());
        assert!(!report.success);
        assert_eq!(report.hook_mode, HookMode::Host);
        assert!(!report.completed_stages().contains(&PipelineStage::Implement));
        assert!(backend
            .calls()
            .iter()
            .all(|stages| !stages.contains(&PipelineStage::Implement)));
        assert!(matches!(
            report.failed_step(),
            Some(PipelineStep::Hook { point: HookPoint::PreImpl, .. })
        ));
    }

    #[test]
    #[cfg(unix)]
    fn test_continue_on_hook_failure() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "pre_impl = \"exit 4\"\n");
        let backend = Recorder::new(false);
        let options = PipelineOptions {
            continue_on_hook_failure: true,
            ..PipelineOptions::full()
        };

        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &options);
        assert!(report.success);
        assert!(report.completed_stages().contains(&PipelineStage::Implement));
        assert_eq!(report.warnings().len(), 1);
    }

    #[test]
    fn test_stops_at_first_failed_stage() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "mode = \"host\"\npost_synth = \"true\"\n");
        let mut backend = Recorder::new(true);
        backend.fail_on = Some(PipelineStage::Synthesize);

        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &PipelineOptions::full());
        assert!(!report.success);
        assert_eq!(backend.calls().len(), 1);
        assert_eq!(report.errors(), vec!["synthesize failed"]);
        assert!(!report.steps.iter().any(|s| matches!(s, PipelineStep::Hook { .. })));
    }

    #[test]
    fn test_single_stage_runs_only_that_stage() {
        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let backend = Recorder::new(true);

        let report = run_pipeline(
            &backend,
            &config,
            &DiscoveryResult::default(),
            &PipelineOptions::single(PipelineStage::Implement),
        );
        assert!(report.success);
        assert_eq!(backend.calls(), vec![vec![PipelineStage::Implement]]);
        assert!(format_report(&report).contains("[OK] implement"));
    }

    #[test]
    fn test_stage_timeout_precedence() {
        let tmp = TempDir::new().unwrap();
        let plain = config(tmp.path(), "");
        assert_eq!(stage_timeout(&plain, None), DEFAULT_STAGE_TIMEOUT);

        let text = "[project]\nname = \"b\"\n[fpga]\nvendor = \"xilinx\"\npart = \"p\"\n[build]\ntimeout = 42\n";
        let limited = ProjectConfig::parse(text, &tmp.path().join("bitforge.toml")).unwrap();
        assert_eq!(stage_timeout(&limited, None), Duration::from_secs(42));
        assert_eq!(
            stage_timeout(&limited, Some(Duration::from_secs(3))),
            Duration::from_secs(3)
        );
    }

    #[test]
    #[cfg(unix)]
    fn test_hung_stage_is_stopped_by_timeout() {
        use crate::builder::backend::{GenericToolBackend, PluginDescriptor};
        use crate::util::config::ToolOverride;

        let tmp = TempDir::new().unwrap();
        let config = config(tmp.path(), "");
        let descriptor = PluginDescriptor::parse(
            "[plugin]\nname = \"slow\"\nkind = \"tool\"\n[tool]\nexecutable = \"sh\"\n\
             [stages.synthesize]\nargs = [\"-c\", \"echo started; sleep 5\"]\n",
            Path::new("slow.toml"),
        )
        .unwrap();
        let mut backend = GenericToolBackend::new(descriptor, ToolOverride::default());
        assert!(backend.initialize());

        let options = PipelineOptions {
            timeout: Some(Duration::from_millis(300)),
            ..PipelineOptions::single(PipelineStage::Synthesize)
        };
        let started = Instant::now();
        let report = run_pipeline(&backend, &config, &DiscoveryResult::default(), &options);

        assert!(!report.success);
        assert!(started.elapsed() < Duration::from_secs(4));
        let result = report.failed_step().unwrap().result();
        assert!(result.first_error().unwrap().contains("timed out"));
        assert_eq!(result.logs["synthesize.stdout"].trim(), "started");
    }
}
