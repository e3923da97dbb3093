//! Subprocess execution utilities.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Output, Stdio};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use thiserror::Error;
use tracing::debug;

/// Interval between exit checks while waiting with a timeout.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// How long to wait for the pipe readers after a timed-out child is killed.
const DRAIN_GRACE: Duration = Duration::from_millis(500);

#[derive(Debug, Error)]
pub enum ProcessError {
    /// The child outlived its timeout and was killed. Output captured up to
    /// that point is kept.
    #[error("`{command}` timed out after {}s{}", .timeout.as_secs_f64(), captured(.stdout, .stderr))]
    TimedOut {
        command: String,
        timeout: Duration,
        stdout: String,
        stderr: String,
    },
}

fn captured(stdout: &str, stderr: &str) -> String {
    let mut text = String::new();
    if !stdout.trim().is_empty() {
        text.push_str(&format!("\nstdout:\n{}", stdout.trim_end()));
    }
    if !stderr.trim().is_empty() {
        text.push_str(&format!("\nstderr:\n{}", stderr.trim_end()));
    }
    text
}

/// Builder for subprocess execution.
#[derive(Debug, Clone)]
pub struct ProcessBuilder {
    program: PathBuf,
    args: Vec<String>,
    env: HashMap<String, String>,
    cwd: Option<PathBuf>,
    timeout: Option<Duration>,
}

impl ProcessBuilder {
    /// Create a new process builder for the given program.
    pub fn new(program: impl AsRef<Path>) -> Self {
        ProcessBuilder {
            program: program.as_ref().to_path_buf(),
            args: Vec::new(),
            env: HashMap::new(),
            cwd: None,
            timeout: None,
        }
    }

    /// Add a single argument.
    pub fn arg(mut self, arg: impl AsRef<OsStr>) -> Self {
        self.args.push(arg.as_ref().to_string_lossy().into_owned());
        self
    }

    /// Add multiple arguments.
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<OsStr>,
    {
        self.args.extend(
            args.into_iter()
                .map(|s| s.as_ref().to_string_lossy().into_owned()),
        );
        self
    }

    /// Set an environment variable.
    pub fn env(mut self, key: impl AsRef<str>, value: impl AsRef<str>) -> Self {
        self.env
            .insert(key.as_ref().to_string(), value.as_ref().to_string());
        self
    }

    /// Set the working directory.
    pub fn cwd(mut self, cwd: impl AsRef<Path>) -> Self {
        self.cwd = Some(cwd.as_ref().to_path_buf());
        self
    }

    /// Kill the process if it runs longer than `timeout`.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Get the program path.
    pub fn get_program(&self) -> &Path {
        &self.program
    }

    /// Get the arguments.
    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    /// Build the Command.
    fn build_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(&self.args);

        for (key, value) in &self.env {
            cmd.env(key, value);
        }

        if let Some(ref cwd) = self.cwd {
            cmd.current_dir(cwd);
        }

        cmd
    }

    /// Execute the command and wait for completion, capturing output.
    ///
    /// With a timeout set, the child runs in its own process group (on unix)
    /// and the whole group is killed once the timeout expires. The error is a
    /// [`ProcessError::TimedOut`] carrying whatever output was captured.
    pub fn exec(&self) -> Result<Output> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::piped());
        cmd.stderr(Stdio::piped());

        let Some(timeout) = self.timeout else {
            return cmd
                .spawn()
                .with_context(|| format!("failed to spawn `{}`", self.program.display()))?
                .wait_with_output()
                .with_context(|| format!("failed to wait for `{}`", self.program.display()));
        };

        #[cfg(unix)]
        {
            use std::os::unix::process::CommandExt;
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;

        // Drain pipes on separate threads so a chatty child cannot block on a full pipe.
        let stdout = Drain::start(child.stdout.take());
        let stderr = Drain::start(child.stderr.take());

        match wait_timeout(&mut child, timeout)? {
            Some(status) => Ok(Output {
                status,
                stdout: stdout.finish(),
                stderr: stderr.finish(),
            }),
            None => {
                kill_tree(&mut child);
                let deadline = Instant::now() + DRAIN_GRACE;
                Err(ProcessError::TimedOut {
                    command: self.display_command(),
                    timeout,
                    stdout: String::from_utf8_lossy(&stdout.snapshot(deadline)).into_owned(),
                    stderr: String::from_utf8_lossy(&stderr.snapshot(deadline)).into_owned(),
                }
                .into())
            }
        }
    }

    /// Execute and require success.
    pub fn exec_and_check(&self) -> Result<Output> {
        let output = self.exec()?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!(
                "`{}` failed with exit code {:?}\n{}",
                self.display_command(),
                output.status.code(),
                stderr
            );
        }
        Ok(output)
    }

    /// Execute and return status only, inheriting stdio.
    pub fn status(&self) -> Result<ExitStatus> {
        let mut cmd = self.build_command();
        let status = cmd
            .status()
            .with_context(|| format!("failed to execute `{}`", self.program.display()))?;
        Ok(status)
    }

    /// Start the process without waiting for it and return its pid.
    pub fn spawn_detached(&self) -> Result<u32> {
        let mut cmd = self.build_command();
        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::null());

        let child = cmd
            .spawn()
            .with_context(|| format!("failed to spawn `{}`", self.program.display()))?;
        Ok(child.id())
    }

    /// Display the command for error messages.
    pub fn display_command(&self) -> String {
        let mut parts = vec![self.program.display().to_string()];
        parts.extend(self.args.iter().cloned());
        parts.join(" ")
    }
}

/// A pipe read to the end on a background thread.
struct Drain {
    buf: Arc<Mutex<Vec<u8>>>,
    handle: thread::JoinHandle<()>,
}

impl Drain {
    fn start<R: Read + Send + 'static>(pipe: Option<R>) -> Self {
        let buf = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&buf);
        let handle = thread::spawn(move || {
            let Some(mut pipe) = pipe else {
                return;
            };
            let mut chunk = [0u8; 8192];
            loop {
                match pipe.read(&mut chunk) {
                    Ok(0) | Err(_) => break,
                    Ok(n) => sink
                        .lock()
                        .unwrap_or_else(|e| e.into_inner())
                        .extend_from_slice(&chunk[..n]),
                }
            }
        });
        Drain { buf, handle }
    }

    /// Everything read, after the pipe closed.
    fn finish(self) -> Vec<u8> {
        let Drain { buf, handle } = self;
        let _ = handle.join();
        Drain::take_buf(&buf)
    }

    /// Everything read so far, waiting until `deadline` for the pipe to close.
    fn snapshot(self, deadline: Instant) -> Vec<u8> {
        while !self.handle.is_finished() && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(10));
        }
        self.take()
    }

    fn take(&self) -> Vec<u8> {
        Drain::take_buf(&self.buf)
    }

    fn take_buf(buf: &Mutex<Vec<u8>>) -> Vec<u8> {
        std::mem::take(&mut *buf.lock().unwrap_or_else(|e| e.into_inner()))
    }
}

/// Kill a child and, on unix, the process group it leads.
fn kill_tree(child: &mut Child) {
    #[cfg(unix)]
    {
        let group = format!("-{}", child.id());
        if let Err(e) = Command::new("kill").args(["-KILL", "--", &group]).status() {
            debug!("failed to kill process group {}: {}", group, e);
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn wait_timeout(child: &mut Child, timeout: Duration) -> Result<Option<ExitStatus>> {
    let deadline = Instant::now() + timeout;
    loop {
        if let Some(status) = child.try_wait().context("failed to poll child process")? {
            return Ok(Some(status));
        }
        if Instant::now() >= deadline {
            return Ok(None);
        }
        thread::sleep(POLL_INTERVAL);
    }
}

/// Find an executable in PATH.
pub fn find_executable(name: &str) -> Option<PathBuf> {
    which::which(name).ok()
}

/// Combined stdout and stderr as lossy text.
pub fn combined_output(output: &Output) -> String {
    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));
    text
}

/// Command that runs `line` through the platform shell.
pub fn shell_command(line: &str) -> ProcessBuilder {
    if cfg!(windows) {
        ProcessBuilder::new("cmd").args(["/C", line])
    } else {
        ProcessBuilder::new("sh").args(["-c", line])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[cfg(unix)]
    fn test_process_builder() {
        let output = ProcessBuilder::new("echo").arg("hello").exec().unwrap();

        assert!(output.status.success());
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout.trim(), "hello");
    }

    #[test]
    fn test_display_command() {
        let pb = ProcessBuilder::new("vivado").args(["-mode", "batch", "-source", "build.tcl"]);

        assert_eq!(pb.display_command(), "vivado -mode batch -source build.tcl");
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_kills_process() {
        let started = Instant::now();
        let err = ProcessBuilder::new("sleep")
            .arg("5")
            .timeout(Duration::from_millis(200))
            .exec()
            .unwrap_err();

        assert!(err.to_string().contains("timed out"));
        assert!(started.elapsed() < Duration::from_secs(4));
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_keeps_partial_output() {
        let started = Instant::now();
        let err = shell_command("echo MARK$((40+2)); sleep 5")
            .timeout(Duration::from_millis(500))
            .exec()
            .unwrap_err();

        // The shell's `sleep` child is part of the killed group, so the
        // pipes close well before it would have finished.
        assert!(started.elapsed() < Duration::from_secs(4));
        assert!(err.to_string().contains("MARK42"));
        match err.downcast_ref::<ProcessError>() {
            Some(ProcessError::TimedOut { stdout, .. }) => assert_eq!(stdout.trim(), "MARK42"),
            None => panic!("expected a timeout error, got {:#}", err),
        }
    }

    #[test]
    #[cfg(unix)]
    fn test_timeout_captures_output() {
        let output = shell_command("echo out; echo err 1>&2")
            .timeout(Duration::from_secs(5))
            .exec()
            .unwrap();

        assert!(output.status.success());
        let text = combined_output(&output);
        assert!(text.contains("out"));
        assert!(text.contains("err"));
    }

    #[test]
    fn test_spawn_missing_program_fails() {
        let result = ProcessBuilder::new("definitely-not-a-real-binary-xyz").exec();
        assert!(result.is_err());
    }
}
