//! Running assembled scripts through the external tool.
//!
//! Scripts are written to a temporary file and handed to the tool as
//! `<tool> -mode <batch|gui> -source <file>`. Batch runs block until the
//! tool exits; GUI runs are started detached and only their pid is reported.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::builder::script::Script;
use crate::builder::toolchain::VersionAdapter;
use crate::core::result::BuildResult;
use crate::core::tool::ToolInfo;
use crate::util::process::{ProcessBuilder, ProcessError};

/// Printed as the last line of every batch script.
pub const COMPLETION_MARKER: &str = "BITFORGE: script complete";

/// Lines of tool output containing errors worth surfacing.
const ERROR_TAGS: &[&str] = &["ERROR:", "[ERROR]", "CRITICAL WARNING:"];

/// Executes scripts with one detected tool.
pub struct ScriptRunner<'a> {
    tool: &'a ToolInfo,
    adapter: Option<Arc<dyn VersionAdapter>>,
    cwd: PathBuf,
    timeout: Option<Duration>,
}

impl<'a> ScriptRunner<'a> {
    pub fn new(tool: &'a ToolInfo, cwd: impl Into<PathBuf>) -> Self {
        ScriptRunner {
            tool,
            adapter: None,
            cwd: cwd.into(),
            timeout: None,
        }
    }

    pub fn with_adapter(mut self, adapter: Option<Arc<dyn VersionAdapter>>) -> Self {
        self.adapter = adapter;
        self
    }

    /// Kill a batch run that takes longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Full argument vector (program first) for running `script_path`.
    pub fn command(&self, mode: &str, script_path: &Path) -> Vec<String> {
        let args = vec![
            self.tool.path().display().to_string(),
            "-mode".to_string(),
            mode.to_string(),
            "-source".to_string(),
            script_path.display().to_string(),
        ];
        match &self.adapter {
            Some(adapter) => adapter.adapt_command(args),
            None => args,
        }
    }

    /// Run a script in batch mode and wait for it.
    pub fn run_batch(&self, script: &Script, name: &str) -> BuildResult {
        if !self.tool.is_installed() {
            return BuildResult::failed(format!(
                "{} not found; cannot run {}",
                self.tool.name(),
                name
            ));
        }

        match self.try_run_batch(script, name) {
            Ok(result) => result,
            Err(e) => BuildResult::failed(format!("{:#}", e)).with_artifact("script", name),
        }
    }

    fn try_run_batch(&self, script: &Script, name: &str) -> Result<BuildResult> {
        let start = Instant::now();
        let mut text = script.render();
        text.push_str(&format!("puts \"{}\"\n", COMPLETION_MARKER));

        let mut file = tempfile::Builder::new()
            .prefix(&format!("bitforge-{}-", name))
            .suffix(".tcl")
            .tempfile()
            .context("failed to create temporary script")?;
        file.write_all(text.as_bytes())
            .context("failed to write temporary script")?;
        file.flush()?;

        let argv = self.command("batch", file.path());
        let mut process = ProcessBuilder::new(&argv[0]).args(&argv[1..]).cwd(&self.cwd);
        if let Some(timeout) = self.timeout {
            process = process.timeout(timeout);
        }

        info!("running {} ({})", name, self.tool.name());
        debug!("{}", process.display_command());
        let output = match process.exec() {
            Ok(output) => output,
            Err(e) => return self.timed_out(e, name, &argv, start),
        };

        let raw_stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        // Tags are matched on the raw text; adapters may rewrite them.
        let stdout = match &self.adapter {
            Some(adapter) => adapter.adapt_output(&raw_stdout),
            None => raw_stdout.clone(),
        };
        let code = output.status.code();

        let mut result = BuildResult::ok()
            .with_artifact("script", name)
            .with_log("command", argv.join(" "))
            .with_log("stdout", stdout.clone())
            .with_log("stderr", stderr.clone())
            .with_log(
                "returncode",
                code.map_or_else(|| "none".to_string(), |c| c.to_string()),
            );

        for line in raw_stdout.lines().chain(stderr.lines()) {
            if ERROR_TAGS.iter().any(|tag| line.contains(tag)) {
                result.errors.push(line.trim().to_string());
            }
        }
        let warnings = raw_stdout.lines().filter(|l| l.contains("WARNING")).count();

        match code {
            Some(0) if raw_stdout.contains(COMPLETION_MARKER) => {}
            Some(0) => result.fail(format!("{} ended without reaching the end of the script", name)),
            Some(code) => result.fail(format!(
                "{} exited with code {} while running {}",
                self.tool.name(),
                code,
                name
            )),
            None => result.fail(format!("{} was terminated by a signal", self.tool.name())),
        }
        if result.success {
            // Matched tags on a clean exit are informational only.
            let informational = std::mem::take(&mut result.errors);
            result.warnings.extend(informational);
        } else {
            warn!("{} failed", name);
        }

        Ok(result
            .with_metric("tool_warnings", warnings)
            .with_duration(start.elapsed()))
    }

    /// Failed result for a run killed at its timeout, with the output it
    /// produced until then. Other errors are passed through.
    fn timed_out(
        &self,
        error: anyhow::Error,
        name: &str,
        argv: &[String],
        start: Instant,
    ) -> Result<BuildResult> {
        let (timeout, stdout, stderr) = match error.downcast::<ProcessError>() {
            Ok(ProcessError::TimedOut {
                timeout,
                stdout,
                stderr,
                ..
            }) => (timeout, stdout, stderr),
            Err(e) => return Err(e),
        };
        warn!("{} timed out", name);
        let stdout = match &self.adapter {
            Some(adapter) => adapter.adapt_output(&stdout),
            None => stdout,
        };
        let result = BuildResult::failed(format!(
            "{} timed out after {}s while running {}",
            self.tool.name(),
            timeout.as_secs_f64(),
            name
        ))
        .with_artifact("script", name)
        .with_log("command", argv.join(" "))
        .with_log("stdout", stdout)
        .with_log("stderr", stderr)
        .with_log("returncode", "none")
        .with_duration(start.elapsed());
        Ok(result)
    }

    /// Start the tool in GUI mode without waiting.
    ///
    /// The script file is kept on disk since the tool reads it after we return.
    pub fn launch_gui(&self, script: &Script) -> BuildResult {
        if !self.tool.is_installed() {
            return BuildResult::failed(format!(
                "{} not found; cannot open the GUI",
                self.tool.name()
            ));
        }
        match self.try_launch_gui(script) {
            Ok(result) => result,
            Err(e) => BuildResult::failed(format!("{:#}", e)),
        }
    }

    fn try_launch_gui(&self, script: &Script) -> Result<BuildResult> {
        let mut file = tempfile::Builder::new()
            .prefix("bitforge-gui-")
            .suffix(".tcl")
            .tempfile()
            .context("failed to create temporary script")?;
        file.write_all(script.render().as_bytes())
            .context("failed to write temporary script")?;
        let (_, path) = file.keep().context("failed to keep GUI script")?;

        let argv = self.command("gui", &path);
        let pid = ProcessBuilder::new(&argv[0])
            .args(&argv[1..])
            .cwd(&self.cwd)
            .spawn_detached()?;

        info!("started {} GUI (pid {})", self.tool.name(), pid);
        Ok(BuildResult::ok()
            .with_artifact("pid", pid.to_string())
            .with_artifact("script", path.display().to_string())
            .with_log("command", argv.join(" ")))
    }
}
