//! Host-side hook execution.
//!
//! Hook entries that name an existing script are dispatched to an
//! interpreter picked by file extension; anything else runs through the
//! platform shell. Commands run strictly in order and are never retried.
//! When one exits non-zero the failure policy decides whether the remaining
//! commands (and the stage they guard) still run. The default policy aborts.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::core::hook::{HookCommand, HooksConfig};
use crate::core::result::BuildResult;
use crate::core::stage::HookPoint;
use crate::util::process::{find_executable, shell_command, ProcessBuilder, ProcessError};

/// Upper bound for a single hook command.
pub const DEFAULT_HOOK_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A hook command that did not run to completion.
#[derive(Debug, Error)]
pub enum HookError {
    #[error("failed to run hook command `{command}`: {reason}")]
    Spawn { command: String, reason: String },

    #[error("hook command `{command}` timed out after {}s", .timeout.as_secs_f64())]
    TimedOut {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

impl HookError {
    /// Record for a command that did not complete, keeping captured output.
    fn into_record(self, duration: Duration) -> HookRecord {
        let message = self.to_string();
        match self {
            HookError::Spawn { command, .. } => HookRecord {
                command,
                exit_code: None,
                stdout: String::new(),
                stderr: message,
                duration,
            },
            HookError::TimedOut {
                command,
                stdout,
                stderr,
                ..
            } => HookRecord {
                command,
                exit_code: None,
                stdout,
                stderr: if stderr.is_empty() {
                    message
                } else {
                    format!("{}\n{}", stderr.trim_end(), message)
                },
                duration,
            },
        }
    }
}

/// What to do after a hook command fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Abort,
}

/// Details handed to the failure policy.
#[derive(Debug)]
pub struct HookFailure<'a> {
    pub hook: &'a str,
    pub command: &'a str,
    /// `None` when the command could not be started or was killed
    pub exit_code: Option<i32>,
    pub stderr: &'a str,
}

/// Captured outcome of one hook command.
#[derive(Debug, Clone)]
pub struct HookRecord {
    pub command: String,
    pub exit_code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
    pub duration: Duration,
}

impl HookRecord {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// Result of running one hook.
#[derive(Debug, Clone)]
pub struct HookOutcome {
    /// Whether the pipeline may go on
    pub proceed: bool,
    /// Commands that actually ran, in order
    pub records: Vec<HookRecord>,
    pub result: BuildResult,
}

type FailurePolicy = Box<dyn FnMut(&HookFailure<'_>) -> HookDecision>;

/// Runs hook commands on the host.
pub struct HookExecutor {
    cwd: PathBuf,
    timeout: Duration,
    policy: FailurePolicy,
}

impl HookExecutor {
    /// Executor running commands in `cwd`, aborting on the first failure.
    pub fn new(cwd: impl Into<PathBuf>) -> Self {
        HookExecutor {
            cwd: cwd.into(),
            timeout: DEFAULT_HOOK_TIMEOUT,
            policy: Box::new(|_| HookDecision::Abort),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Ask `policy` whenever a command fails.
    pub fn with_policy<F>(mut self, policy: F) -> Self
    where
        F: FnMut(&HookFailure<'_>) -> HookDecision + 'static,
    {
        self.policy = Box::new(policy);
        self
    }

    /// Keep going after failures.
    pub fn continue_on_failure(self) -> Self {
        self.with_policy(|_| HookDecision::Continue)
    }

    /// Resolve and run the hooks configured for `point`.
    pub fn run_point(&mut self, hooks: &HooksConfig, point: HookPoint, base: &Path) -> HookOutcome {
        let commands = hooks.resolve(point, base);
        self.run(&commands, point.as_str())
    }

    /// Run `commands` in order for the hook named `hook_name`.
    pub fn run(&mut self, commands: &[HookCommand], hook_name: &str) -> HookOutcome {
        let start = Instant::now();
        let mut result = BuildResult::ok();
        let mut records = Vec::with_capacity(commands.len());
        let mut proceed = true;

        if !commands.is_empty() {
            info!("running {} hook ({} command(s))", hook_name, commands.len());
        }

        for (index, command) in commands.iter().enumerate() {
            let record = self.run_one(command);
            let key = format!("{}.{:02}", hook_name, index);
            result.logs.insert(format!("{}.command", key), record.command.clone());
            result.logs.insert(format!("{}.stdout", key), record.stdout.clone());
            result.logs.insert(format!("{}.stderr", key), record.stderr.clone());
            result.logs.insert(
                format!("{}.exit_code", key),
                record
                    .exit_code
                    .map_or_else(|| "none".to_string(), |c| c.to_string()),
            );

            let failed = !record.success();
            if failed {
                let failure = HookFailure {
                    hook: hook_name,
                    command: &record.command,
                    exit_code: record.exit_code,
                    stderr: &record.stderr,
                };
                let decision = (self.policy)(&failure);
                let message = match record.exit_code {
                    Some(code) => format!(
                        "{} hook `{}` exited with code {}",
                        hook_name, record.command, code
                    ),
                    None => format!("{} hook `{}` did not complete", hook_name, record.command),
                };
                warn!("{}", message);

                match decision {
                    HookDecision::Abort => {
                        result.fail(message);
                        proceed = false;
                    }
                    HookDecision::Continue => {
                        result.warnings.push(message);
                    }
                }
            }

            records.push(record);
            if !proceed {
                break;
            }
        }

        result = result
            .with_metric("commands_run", records.len())
            .with_duration(start.elapsed());
        HookOutcome {
            proceed,
            records,
            result,
        }
    }

    fn run_one(&self, command: &HookCommand) -> HookRecord {
        let start = Instant::now();
        self.run_command(command)
            .unwrap_or_else(|e| e.into_record(start.elapsed()))
    }

    /// Run a single command in the executor's directory.
    ///
    /// A non-zero exit is still `Ok`; the error covers commands that could
    /// not be started or were killed at the timeout.
    pub fn run_command(&self, command: &HookCommand) -> Result<HookRecord, HookError> {
        let shown = command.display();
        let start = Instant::now();
        debug!("hook command: {}", shown);

        let process = self.process_for(command).cwd(&self.cwd).timeout(self.timeout);
        match process.exec() {
            Ok(output) => Ok(HookRecord {
                command: shown,
                exit_code: output.status.code(),
                stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
                duration: start.elapsed(),
            }),
            Err(e) => match e.downcast::<ProcessError>() {
                Ok(ProcessError::TimedOut {
                    timeout,
                    stdout,
                    stderr,
                    ..
                }) => Err(HookError::TimedOut {
                    command: shown,
                    timeout,
                    stdout,
                    stderr,
                }),
                Err(e) => Err(HookError::Spawn {
                    command: shown,
                    reason: format!("{:#}", e),
                }),
            },
        }
    }

    fn process_for(&self, command: &HookCommand) -> ProcessBuilder {
        match command {
            HookCommand::Command(line) => shell_command(line),
            HookCommand::Script(path) => script_process(path),
        }
    }
}

/// Interpreter invocation for a hook script, by extension.
pub fn script_process(path: &Path) -> ProcessBuilder {
    let extension = path
        .extension()
        .map(|e| e.to_string_lossy().to_lowercase())
        .unwrap_or_default();

    match extension.as_str() {
        "sh" | "bash" => ProcessBuilder::new("sh").arg(path),
        "py" => ProcessBuilder::new(python()).arg(path),
        "tcl" => ProcessBuilder::new("tclsh").arg(path),
        "bat" | "cmd" => ProcessBuilder::new("cmd").arg("/C").arg(path),
        "ps1" => ProcessBuilder::new("powershell")
            .args(["-ExecutionPolicy", "Bypass", "-File"])
            .arg(path),
        _ => ProcessBuilder::new(path),
    }
}

fn python() -> &'static str {
    if find_executable("python3").is_some() {
        "python3"
    } else {
        "python"
    }
}
