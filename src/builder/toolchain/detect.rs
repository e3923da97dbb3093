//! Tool detection.
//!
//! Locates an installed vendor executable and extracts its version. A tool
//! that cannot be found is reported as absent, never as an error.

use std::path::{Path, PathBuf};
use std::sync::LazyLock;
use std::time::Duration;

use rayon::prelude::*;
use regex::Regex;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::tool::{ToolInfo, VersionRange, UNKNOWN_VERSION};
use crate::util::config::ToolOverride;
use crate::util::process::{combined_output, find_executable, ProcessBuilder};

/// Default limit for a version probe.
pub const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// Depth limit when searching install roots or explicit directories.
const MAX_SEARCH_DEPTH: usize = 6;

/// Patterns applied, in order, to `--version` output.
static VERSION_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Version\s+([\d.]+)",
        r"v([\d.]+)",
        r"(\d{4}\.\d+)",
        r"(\d+\.\d+\.\d+)",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("valid version pattern"))
    .collect()
});

/// Install roots searched when the tool is not on PATH.
#[cfg(windows)]
fn default_install_roots() -> Vec<PathBuf> {
    [
        "C:/Xilinx/Vivado",
        "C:/Xilinx/Vitis",
        "C:/intelFPGA",
        "C:/Altera",
        "C:/lscc",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[cfg(not(windows))]
fn default_install_roots() -> Vec<PathBuf> {
    [
        "/opt/Xilinx/Vivado",
        "/tools/Xilinx/Vivado",
        "/opt/intelFPGA",
        "/opt/lscc",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

/// Executable file names a tool may have on this platform.
pub fn platform_executable_names(name: &str) -> Vec<String> {
    if cfg!(windows) {
        vec![format!("{}.exe", name), format!("{}.bat", name)]
    } else {
        vec![name.to_string()]
    }
}

/// What to look for when detecting one tool.
#[derive(Debug, Clone)]
pub struct ToolSpec {
    /// Tool name reported in `ToolInfo`
    pub name: String,

    /// Candidate executable file names
    pub executables: Vec<String>,

    /// Argument that makes the tool print its version
    pub version_arg: String,

    /// Directories searched recursively after PATH
    pub install_roots: Vec<PathBuf>,

    /// Fallback extracting a version from the executable path
    pub path_version_pattern: Option<Regex>,

    /// Supported versions
    pub version_range: Option<VersionRange>,
}

impl ToolSpec {
    /// A spec with platform executable names and default install roots.
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        ToolSpec {
            executables: platform_executable_names(&name),
            name,
            version_arg: "--version".to_string(),
            install_roots: default_install_roots(),
            path_version_pattern: None,
            version_range: None,
        }
    }

    /// The Xilinx Vivado design suite.
    pub fn vivado() -> Self {
        ToolSpec::new("vivado")
            .with_path_version_pattern(r"Vivado[/\\](\d{4}\.\d+)")
            .with_version_range(
                VersionRange::new("2018.0", "2024.2").with_recommended("2023.2"),
            )
    }

    pub fn with_version_arg(mut self, arg: impl Into<String>) -> Self {
        self.version_arg = arg.into();
        self
    }

    pub fn with_install_roots(mut self, roots: Vec<PathBuf>) -> Self {
        self.install_roots = roots;
        self
    }

    pub fn with_executables(mut self, names: Vec<String>) -> Self {
        self.executables = names;
        self
    }

    pub fn with_version_range(mut self, range: VersionRange) -> Self {
        self.version_range = Some(range);
        self
    }

    /// Set the path fallback pattern. Its first capture group is the version.
    /// Invalid patterns are logged and ignored.
    pub fn with_path_version_pattern(mut self, pattern: &str) -> Self {
        match Regex::new(pattern) {
            Ok(re) => self.path_version_pattern = Some(re),
            Err(e) => warn!("ignoring invalid version pattern `{}`: {}", pattern, e),
        }
        self
    }
}

/// Locates tools and probes their versions.
#[derive(Debug, Clone)]
pub struct ToolDetector {
    probe_timeout: Duration,
}

impl ToolDetector {
    pub fn new() -> Self {
        ToolDetector {
            probe_timeout: PROBE_TIMEOUT,
        }
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    /// Detect one tool.
    ///
    /// Search order: the override path, then PATH, then install roots. An
    /// override that names an existing directory is authoritative: when it
    /// holds no matching executable the tool is absent.
    pub fn detect(&self, spec: &ToolSpec, hint: &ToolOverride) -> ToolInfo {
        let Some(exe) = self.locate(spec, hint.path.as_deref()) else {
            debug!("{} not found", spec.name);
            return ToolInfo::absent(&spec.name);
        };

        let version = hint
            .version
            .clone()
            .or_else(|| self.probe_version(&exe, &spec.version_arg))
            .or_else(|| version_from_path(spec, &exe))
            .unwrap_or_else(|| UNKNOWN_VERSION.to_string());

        debug!("detected {} {} at {}", spec.name, version, exe.display());

        // An unknown version cannot be range-checked.
        let range = if version == UNKNOWN_VERSION {
            None
        } else {
            spec.version_range.clone()
        };

        ToolInfo::installed(&spec.name, version, exe).with_range(range)
    }

    /// Detect several tools in parallel. Results keep the input order.
    pub fn detect_all(&self, requests: &[(ToolSpec, ToolOverride)]) -> Vec<ToolInfo> {
        requests
            .par_iter()
            .map(|(spec, hint)| self.detect(spec, hint))
            .collect()
    }

    fn locate(&self, spec: &ToolSpec, explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(path) = explicit {
            if path.is_file() {
                return Some(path.to_path_buf());
            }
            if path.is_dir() {
                return find_in_dir(path, &spec.executables);
            }
            warn!(
                "configured path for {} does not exist: {}",
                spec.name,
                path.display()
            );
        }

        for exe in &spec.executables {
            if let Some(found) = find_executable(exe) {
                return Some(found);
            }
        }

        spec.install_roots
            .iter()
            .filter(|root| root.is_dir())
            .find_map(|root| find_in_dir(root, &spec.executables))
    }

    fn probe_version(&self, exe: &Path, version_arg: &str) -> Option<String> {
        let output = ProcessBuilder::new(exe)
            .arg(version_arg)
            .timeout(self.probe_timeout)
            .exec();

        match output {
            Ok(output) if output.status.success() => extract_version(&combined_output(&output)),
            Ok(output) => {
                debug!(
                    "version probe of {} exited with {:?}",
                    exe.display(),
                    output.status.code()
                );
                None
            }
            Err(e) => {
                debug!("version probe of {} failed: {:#}", exe.display(), e);
                None
            }
        }
    }
}

impl Default for ToolDetector {
    fn default() -> Self {
        Self::new()
    }
}

/// First version-like token in tool output.
pub fn extract_version(output: &str) -> Option<String> {
    VERSION_PATTERNS
        .iter()
        .find_map(|re| re.captures(output))
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

fn version_from_path(spec: &ToolSpec, exe: &Path) -> Option<String> {
    let re = spec.path_version_pattern.as_ref()?;
    let text = exe.to_string_lossy();
    re.captures(&text)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
}

/// Look for any of `names` directly in `dir`, then recursively.
fn find_in_dir(dir: &Path, names: &[String]) -> Option<PathBuf> {
    for name in names {
        let candidate = dir.join(name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }

    WalkDir::new(dir)
        .max_depth(MAX_SEARCH_DEPTH)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .find(|e| {
            let file_name = e.file_name().to_string_lossy();
            names.iter().any(|n| *n == file_name)
        })
        .map(|e| e.into_path())
}
