//! Discovered source artifacts.

use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Language (or file category) of a discovered artifact.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Language {
    Verilog,
    #[serde(alias = "sv")]
    SystemVerilog,
    Vhdl,
    Constraint,
    Tcl,
    BlockDesign,
    IpCore,
    Xml,
    Unknown,
}

impl Language {
    /// Classify by file extension (case-insensitive).
    pub fn from_extension(ext: &str) -> Option<Language> {
        let lang = match ext.to_ascii_lowercase().as_str() {
            "v" | "vh" => Language::Verilog,
            "sv" | "svh" => Language::SystemVerilog,
            "vhd" | "vhdl" => Language::Vhdl,
            "xdc" => Language::Constraint,
            "tcl" => Language::Tcl,
            "bd" => Language::BlockDesign,
            "xci" | "xco" => Language::IpCore,
            "xml" => Language::Xml,
            _ => return None,
        };
        Some(lang)
    }

    /// Guess from the leading text of a file.
    ///
    /// Looks for a declaration keyword together with its closing partner.
    pub fn sniff(head: &str) -> Language {
        let text = head.to_lowercase();
        if text.contains("module") && text.contains("endmodule") {
            Language::Verilog
        } else if text.contains("entity") && text.contains("architecture") {
            Language::Vhdl
        } else if text.contains("class") || text.contains("interface") {
            Language::SystemVerilog
        } else {
            Language::Unknown
        }
    }

    pub fn is_hdl(&self) -> bool {
        matches!(
            self,
            Language::Verilog | Language::SystemVerilog | Language::Vhdl
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Language::Verilog => "verilog",
            Language::SystemVerilog => "systemverilog",
            Language::Vhdl => "vhdl",
            Language::Constraint => "constraint",
            Language::Tcl => "tcl",
            Language::BlockDesign => "block_design",
            Language::IpCore => "ip_core",
            Language::Xml => "xml",
            Language::Unknown => "unknown",
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Language {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verilog" => Ok(Language::Verilog),
            "systemverilog" | "sv" => Ok(Language::SystemVerilog),
            "vhdl" => Ok(Language::Vhdl),
            "constraint" | "xdc" => Ok(Language::Constraint),
            "tcl" => Ok(Language::Tcl),
            "block_design" | "bd" => Ok(Language::BlockDesign),
            "ip_core" | "ip" => Ok(Language::IpCore),
            "xml" => Ok(Language::Xml),
            "unknown" => Ok(Language::Unknown),
            _ => Err(format!("unknown language: {}", s)),
        }
    }
}

/// What an artifact is used for in the project.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactRole {
    #[default]
    Source,
    Test,
    Constraint,
    Include,
}

/// A file (or IP directory) found by discovery. Read-only after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceArtifact {
    absolute_path: PathBuf,
    relative_path: PathBuf,
    language: Language,
    role: ArtifactRole,
    size: u64,
    is_dir: bool,
}

impl SourceArtifact {
    pub fn new(
        absolute_path: PathBuf,
        relative_path: PathBuf,
        language: Language,
        role: ArtifactRole,
        size: u64,
        is_dir: bool,
    ) -> Self {
        SourceArtifact {
            absolute_path,
            relative_path,
            language,
            role,
            size,
            is_dir,
        }
    }

    pub fn absolute_path(&self) -> &Path {
        &self.absolute_path
    }

    pub fn relative_path(&self) -> &Path {
        &self.relative_path
    }

    pub fn language(&self) -> Language {
        self.language
    }

    pub fn role(&self) -> ArtifactRole {
        self.role
    }

    pub fn size(&self) -> u64 {
        self.size
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    /// Lowercased extension, empty when there is none.
    pub fn extension(&self) -> String {
        self.absolute_path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default()
    }

    /// File name without extension.
    pub fn stem(&self) -> String {
        self.absolute_path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_name(&self) -> String {
        self.absolute_path
            .file_name()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Output of a discovery scan, grouped by kind.
#[derive(Debug, Clone, Default, Serialize)]
pub struct DiscoveryResult {
    pub hdl: Vec<SourceArtifact>,
    pub constraints: Vec<SourceArtifact>,
    pub ip_cores: Vec<SourceArtifact>,
    pub block_designs: Vec<SourceArtifact>,
}

impl DiscoveryResult {
    pub fn total(&self) -> usize {
        self.hdl.len() + self.constraints.len() + self.ip_cores.len() + self.block_designs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.total() == 0
    }
}
