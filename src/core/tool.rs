//! Detected external tool information.
//!
//! A `ToolInfo` is produced once by the tool detector and then only read.
//! Absence is represented in-band (`installed == false`) rather than as an
//! error so that backends can degrade instead of failing.

use std::fmt;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Placeholder version used when no version could be extracted.
pub const UNKNOWN_VERSION: &str = "unknown";

/// Supported version window for a tool.
///
/// Comparison is plain lexicographic string ordering. Vendor release strings
/// such as `2019.1` or `2023.2` sort correctly under it; anything fancier is
/// deliberately not attempted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionRange {
    /// Oldest supported version (inclusive)
    pub min: String,

    /// Newest supported version (inclusive)
    pub max: String,

    /// Version the backend was primarily tested against
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recommended: Option<String>,
}

impl VersionRange {
    /// Create a new range.
    pub fn new(min: impl Into<String>, max: impl Into<String>) -> Self {
        VersionRange {
            min: min.into(),
            max: max.into(),
            recommended: None,
        }
    }

    /// Set the recommended version.
    pub fn with_recommended(mut self, recommended: impl Into<String>) -> Self {
        self.recommended = Some(recommended.into());
        self
    }

    /// Check whether `version` falls inside the range.
    ///
    /// Bounds are compared as strings, which orders `YYYY.N` releases.
    pub fn contains(&self, version: &str) -> bool {
        self.min.as_str() <= version && version <= self.max.as_str()
    }
}

impl fmt::Display for VersionRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.recommended {
            Some(rec) => write!(f, "{} - {} (recommended: {})", self.min, self.max, rec),
            None => write!(f, "{} - {}", self.min, self.max),
        }
    }
}

/// Information about a detected (or missing) tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolInfo {
    name: String,
    version: String,
    path: PathBuf,
    installed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    version_range: Option<VersionRange>,
}

impl ToolInfo {
    /// Record an installed tool.
    pub fn installed(
        name: impl Into<String>,
        version: impl Into<String>,
        path: impl Into<PathBuf>,
    ) -> Self {
        ToolInfo {
            name: name.into(),
            version: version.into(),
            path: path.into(),
            installed: true,
            version_range: None,
        }
    }

    /// Record a tool that could not be found.
    pub fn absent(name: impl Into<String>) -> Self {
        ToolInfo {
            name: name.into(),
            version: UNKNOWN_VERSION.to_string(),
            path: PathBuf::new(),
            installed: false,
            version_range: None,
        }
    }

    /// Attach a compatibility range.
    pub fn with_range(mut self, range: Option<VersionRange>) -> Self {
        self.version_range = range;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_installed(&self) -> bool {
        self.installed
    }

    pub fn version_range(&self) -> Option<&VersionRange> {
        self.version_range.as_ref()
    }

    /// Installed and, when a range is attached, inside it.
    pub fn is_compatible(&self) -> bool {
        if !self.installed {
            return false;
        }
        match &self.version_range {
            Some(range) => range.contains(&self.version),
            None => true,
        }
    }
}
