//! Source file discovery.
//!
//! Expands the path expressions of each `[[source.*]]` group into classified
//! [`SourceArtifact`]s. A broken pattern or unreadable path only empties its
//! own group; the scan as a whole never fails.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use glob::Pattern;
use tracing::{debug, warn};
use walkdir::WalkDir;

use crate::core::artifact::{ArtifactRole, DiscoveryResult, Language, SourceArtifact};
use crate::core::config::{BlockDesignConfig, ProjectConfig, SourceGroup};
use crate::util::fs::{is_glob_pattern, normalize_path, read_head, relative_path};

/// Bytes read when sniffing a file's language.
const SNIFF_LIMIT: usize = 1024;

/// File name marking a packaged IP directory.
const IP_COMPONENT_FILE: &str = "component.xml";

/// Which `[source]` list a group came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum GroupKind {
    Hdl,
    Constraint,
    IpCore,
}

/// Expands source groups relative to a base directory.
#[derive(Debug, Clone)]
pub struct FileDiscovery {
    base: PathBuf,
}

impl FileDiscovery {
    pub fn new(base: impl AsRef<Path>) -> Self {
        FileDiscovery {
            base: normalize_path(base.as_ref()),
        }
    }

    pub fn base(&self) -> &Path {
        &self.base
    }

    /// Scan every group declared in the configuration.
    pub fn scan(&self, config: &ProjectConfig) -> DiscoveryResult {
        let source = &config.source;
        let result = DiscoveryResult {
            hdl: self.scan_groups(&source.hdl, GroupKind::Hdl),
            constraints: self.scan_groups(&source.constraints, GroupKind::Constraint),
            ip_cores: self.scan_groups(&source.ip_cores, GroupKind::IpCore),
            block_designs: source
                .block_design
                .as_ref()
                .map(|bd| self.scan_block_design(bd))
                .unwrap_or_default(),
        };

        debug!(
            "discovered {} hdl, {} constraint, {} ip, {} block design file(s)",
            result.hdl.len(),
            result.constraints.len(),
            result.ip_cores.len(),
            result.block_designs.len()
        );
        result
    }

    /// Scan a list of groups, de-duplicating by absolute path.
    fn scan_groups(&self, groups: &[SourceGroup], kind: GroupKind) -> Vec<SourceArtifact> {
        let mut seen = HashSet::new();
        let mut artifacts = Vec::new();

        for group in groups {
            for artifact in self.scan_group(group, kind) {
                if seen.insert(artifact.absolute_path().to_path_buf()) {
                    artifacts.push(artifact);
                }
            }
        }
        artifacts
    }

    fn scan_group(&self, group: &SourceGroup, kind: GroupKind) -> Vec<SourceArtifact> {
        let Some(expr) = group.expression() else {
            warn!("source group has neither `path` nor `pattern`, skipping");
            return Vec::new();
        };

        let paths = match kind {
            GroupKind::IpCore => self.expand_ip(expr, &group.exclude),
            _ => self.expand(expr, &group.exclude),
        };

        paths
            .into_iter()
            .filter_map(|path| self.make_artifact(path, group, kind))
            .collect()
    }

    /// Expand a path expression into existing files, minus excludes.
    ///
    /// Literal paths are used as-is; wildcard expressions are globbed under
    /// the base directory. Directories are skipped.
    pub fn expand(&self, expr: &str, exclude: &[String]) -> Vec<PathBuf> {
        self.candidates(expr)
            .into_iter()
            .filter(|p| p.is_file())
            .filter(|p| !self.is_excluded(p, exclude))
            .collect()
    }

    /// Like [`expand`](Self::expand), but IP directories survive and a
    /// literal directory is searched for IP descriptors.
    fn expand_ip(&self, expr: &str, exclude: &[String]) -> Vec<PathBuf> {
        let mut out = Vec::new();
        for path in self.candidates(expr) {
            if self.is_excluded(&path, exclude) {
                continue;
            }
            if path.is_file() {
                if is_ip_file(&path) {
                    out.push(path);
                }
            } else if path.is_dir() {
                if is_glob_pattern(expr) {
                    if is_ip_dir(&path) {
                        out.push(path);
                    }
                } else {
                    out.extend(
                        collect_ip_dir(&path)
                            .into_iter()
                            .filter(|p| !self.is_excluded(p, exclude)),
                    );
                }
            }
        }
        out
    }

    fn candidates(&self, expr: &str) -> Vec<PathBuf> {
        let full = self.absolutize(Path::new(expr));

        if !is_glob_pattern(expr) {
            return if full.exists() { vec![full] } else { Vec::new() };
        }

        let pattern = full.to_string_lossy();
        match glob::glob(&pattern) {
            Ok(paths) => paths
                .filter_map(|entry| match entry {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!("glob error: {}", e);
                        None
                    }
                })
                .collect(),
            Err(e) => {
                warn!("invalid pattern `{}`: {}", expr, e);
                Vec::new()
            }
        }
    }

    /// Exclude patterns match either the absolute path (pattern joined to
    /// the base) or the path relative to the base.
    fn is_excluded(&self, path: &Path, exclude: &[String]) -> bool {
        let absolute = path.to_string_lossy();
        let relative = path
            .strip_prefix(&self.base)
            .ok()
            .map(|p| p.to_string_lossy().into_owned());

        exclude.iter().any(|raw| {
            let joined = self.absolutize(Path::new(raw));
            let abs_hit = Pattern::new(&joined.to_string_lossy())
                .map(|p| p.matches(&absolute))
                .unwrap_or(false);
            let rel_hit = match (&relative, Pattern::new(raw)) {
                (Some(rel), Ok(p)) => p.matches(rel),
                _ => false,
            };
            abs_hit || rel_hit
        })
    }

    fn absolutize(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            self.base.join(path)
        }
    }

    fn make_artifact(
        &self,
        path: PathBuf,
        group: &SourceGroup,
        kind: GroupKind,
    ) -> Option<SourceArtifact> {
        let absolute = normalize_path(&path);
        let metadata = match std::fs::metadata(&absolute) {
            Ok(m) => m,
            Err(e) => {
                warn!("cannot read {}: {}", absolute.display(), e);
                return None;
            }
        };

        let (language, role) = match kind {
            GroupKind::Hdl => (self.classify(&absolute, group.explicit_language()), group.role),
            GroupKind::Constraint => (
                explicit(group.explicit_language())
                    .or_else(|| extension_language(&absolute))
                    .unwrap_or(Language::Constraint),
                ArtifactRole::Constraint,
            ),
            GroupKind::IpCore => (Language::IpCore, group.role),
        };

        Some(SourceArtifact::new(
            absolute.clone(),
            relative_path(&self.base, &absolute),
            language,
            role,
            metadata.len(),
            metadata.is_dir(),
        ))
    }

    /// Explicit language, then extension, then a sniff of the leading bytes.
    pub fn classify(&self, path: &Path, explicit_language: Option<&str>) -> Language {
        if let Some(lang) = explicit(explicit_language) {
            return lang;
        }
        if let Some(lang) = extension_language(path) {
            return lang;
        }
        match read_head(path, SNIFF_LIMIT) {
            Ok(head) => Language::sniff(&head),
            Err(e) => {
                debug!("{:#}", e);
                Language::Unknown
            }
        }
    }

    fn scan_block_design(&self, bd: &BlockDesignConfig) -> Vec<SourceArtifact> {
        let entries = [
            (bd.bd_file.as_deref(), Language::BlockDesign),
            (bd.tcl_script.as_deref(), Language::Tcl),
        ];

        entries
            .into_iter()
            .filter_map(|(path, language)| {
                let full = self.absolutize(Path::new(path?));
                if !full.is_file() {
                    warn!("block design file not found: {}", full.display());
                    return None;
                }
                let absolute = normalize_path(&full);
                let size = std::fs::metadata(&absolute).map(|m| m.len()).unwrap_or(0);
                Some(SourceArtifact::new(
                    absolute.clone(),
                    relative_path(&self.base, &absolute),
                    language,
                    ArtifactRole::Source,
                    size,
                    false,
                ))
            })
            .collect()
    }
}

fn explicit(language: Option<&str>) -> Option<Language> {
    let raw = language?;
    match raw.parse() {
        Ok(lang) => Some(lang),
        Err(e) => {
            warn!("{}, detecting instead", e);
            None
        }
    }
}

fn extension_language(path: &Path) -> Option<Language> {
    path.extension()
        .and_then(|e| e.to_str())
        .and_then(Language::from_extension)
}

fn is_ip_file(path: &Path) -> bool {
    let is_descriptor = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xci") || e.eq_ignore_ascii_case("xco"));
    is_descriptor || path.file_name().is_some_and(|n| n == IP_COMPONENT_FILE)
}

fn has_xci(dir: &Path) -> bool {
    std::fs::read_dir(dir)
        .map(|entries| {
            entries.filter_map(|e| e.ok()).any(|e| {
                e.path()
                    .extension()
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("xci"))
            })
        })
        .unwrap_or(false)
}

fn is_ip_dir(dir: &Path) -> bool {
    dir.join(IP_COMPONENT_FILE).is_file() || has_xci(dir)
}

/// Recursively collect IP descriptors and directories holding `.xci` files.
fn collect_ip_dir(root: &Path) -> Vec<PathBuf> {
    let mut out = Vec::new();
    for entry in WalkDir::new(root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if entry.file_type().is_file() {
            if is_ip_file(path) {
                out.push(path.to_path_buf());
            }
        } else if entry.depth() > 0 && entry.file_type().is_dir() && has_xci(path) {
            out.push(path.to_path_buf());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    fn group(pattern: &str, exclude: &[&str]) -> SourceGroup {
        SourceGroup {
            pattern: Some(pattern.to_string()),
            exclude: exclude.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }

    fn names(artifacts: &[SourceArtifact]) -> Vec<String> {
        artifacts
            .iter()
            .map(|a| a.relative_path().to_string_lossy().replace('\\', "/"))
            .collect()
    }

    #[test]
    fn test_recursive_pattern_with_exclude() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "src/top.v", "module top; endmodule");
        touch(tmp.path(), "src/core/alu.v", "module alu; endmodule");
        touch(tmp.path(), "src/sim/tb.v", "module tb; endmodule");

        let discovery = FileDiscovery::new(tmp.path());
        let artifacts =
            discovery.scan_groups(&[group("src/**/*.v", &["src/sim/*"])], GroupKind::Hdl);

        assert_eq!(names(&artifacts), vec!["src/core/alu.v", "src/top.v"]);
        assert!(artifacts.iter().all(|a| a.language() == Language::Verilog));
    }

    #[test]
    fn test_absolute_exclude_pattern() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "rtl/a.v", "");
        touch(tmp.path(), "rtl/b.v", "");

        let discovery = FileDiscovery::new(tmp.path());
        let abs = discovery.base().join("rtl/b.v");
        let artifacts = discovery.scan_groups(
            &[group("rtl/*.v", &[abs.to_str().unwrap()])],
            GroupKind::Hdl,
        );
        assert_eq!(names(&artifacts), vec!["rtl/a.v"]);
    }

    #[test]
    fn test_overlapping_patterns_dedup() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "rtl/a.v", "");
        touch(tmp.path(), "rtl/b.sv", "");

        let discovery = FileDiscovery::new(tmp.path());
        let artifacts = discovery.scan_groups(
            &[group("rtl/*", &[]), group("rtl/*.v", &[]), group("**/a.v", &[])],
            GroupKind::Hdl,
        );

        assert_eq!(names(&artifacts), vec!["rtl/a.v", "rtl/b.sv"]);
        assert_eq!(artifacts[1].language(), Language::SystemVerilog);
    }

    #[test]
    fn test_directories_skipped_for_hdl() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "rtl/dir.v/inner.txt", "");
        touch(tmp.path(), "rtl/real.v", "");

        let discovery = FileDiscovery::new(tmp.path());
        let artifacts = discovery.scan_groups(&[group("rtl/*.v", &[])], GroupKind::Hdl);
        assert_eq!(names(&artifacts), vec!["rtl/real.v"]);
    }

    #[test]
    fn test_literal_path_and_missing_path() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "pins.xdc", "set_property PACKAGE_PIN W5 [get_ports clk]");

        let discovery = FileDiscovery::new(tmp.path());
        let groups = vec![
            SourceGroup {
                path: Some("pins.xdc".into()),
                ..Default::default()
            },
            SourceGroup {
                path: Some("missing.xdc".into()),
                ..Default::default()
            },
        ];
        let artifacts = discovery.scan_groups(&groups, GroupKind::Constraint);

        assert_eq!(names(&artifacts), vec!["pins.xdc"]);
        assert_eq!(artifacts[0].role(), ArtifactRole::Constraint);
        assert_eq!(artifacts[0].language(), Language::Constraint);
    }

    #[test]
    fn test_malformed_pattern_yields_empty_group() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "rtl/a.v", "");

        let discovery = FileDiscovery::new(tmp.path());
        let artifacts = discovery.scan_groups(
            &[group("rtl/[*.v", &[]), group("rtl/a.v", &[])],
            GroupKind::Hdl,
        );
        assert_eq!(names(&artifacts), vec!["rtl/a.v"]);
    }

    #[test]
    fn test_language_detection() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "a.txt", "module a(input x);\nendmodule\n");
        touch(tmp.path(), "b.inc", "entity b is end;\narchitecture rtl of b is begin end;");
        touch(tmp.path(), "c.dat", "random bytes");
        touch(tmp.path(), "d.v", "");

        let discovery = FileDiscovery::new(tmp.path());
        assert_eq!(discovery.classify(&tmp.path().join("a.txt"), None), Language::Verilog);
        assert_eq!(discovery.classify(&tmp.path().join("b.inc"), None), Language::Vhdl);
        assert_eq!(discovery.classify(&tmp.path().join("c.dat"), None), Language::Unknown);
        assert_eq!(
            discovery.classify(&tmp.path().join("d.v"), Some("systemverilog")),
            Language::SystemVerilog
        );
        assert_eq!(
            discovery.classify(&tmp.path().join("d.v"), Some("klingon")),
            Language::Verilog
        );
    }

    #[test]
    fn test_ip_directory_collection() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "ip/clk_wiz/clk_wiz.xci", "<xci/>");
        touch(tmp.path(), "ip/legacy/fifo.xco", "");
        touch(tmp.path(), "ip/custom/component.xml", "<component/>");
        touch(tmp.path(), "ip/custom/hdl/core.v", "");

        let discovery = FileDiscovery::new(tmp.path());
        let groups = vec![SourceGroup {
            path: Some("ip".into()),
            ..Default::default()
        }];
        let artifacts = discovery.scan_groups(&groups, GroupKind::IpCore);
        let found = names(&artifacts);

        assert!(found.contains(&"ip/clk_wiz".to_string()));
        assert!(found.contains(&"ip/clk_wiz/clk_wiz.xci".to_string()));
        assert!(found.contains(&"ip/legacy/fifo.xco".to_string()));
        assert!(found.contains(&"ip/custom/component.xml".to_string()));
        assert!(!found.iter().any(|f| f.ends_with("core.v")));

        let dir = artifacts
            .iter()
            .find(|a| a.relative_path() == Path::new("ip/clk_wiz"))
            .unwrap();
        assert!(dir.is_dir());
        assert_eq!(dir.language(), Language::IpCore);
    }

    #[test]
    fn test_ip_glob_keeps_ip_directories() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "ip/a/a.xci", "");
        touch(tmp.path(), "ip/b/readme.md", "");

        let discovery = FileDiscovery::new(tmp.path());
        let artifacts = discovery.scan_groups(&[group("ip/*", &[])], GroupKind::IpCore);
        assert_eq!(names(&artifacts), vec!["ip/a"]);
    }

    #[test]
    fn test_block_design_entries() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "bd/system.tcl", "create_bd_design system");

        let discovery = FileDiscovery::new(tmp.path());
        let bd = BlockDesignConfig {
            tcl_script: Some("bd/system.tcl".into()),
            bd_file: Some("bd/missing.bd".into()),
            ..Default::default()
        };
        let artifacts = discovery.scan_block_design(&bd);

        assert_eq!(artifacts.len(), 1);
        assert_eq!(artifacts[0].language(), Language::Tcl);
    }

    #[test]
    fn test_scan_full_config() {
        let tmp = TempDir::new().unwrap();
        touch(tmp.path(), "src/top.v", "module top; endmodule");
        touch(tmp.path(), "xdc/pins.xdc", "");
        let config = ProjectConfig::parse(
            r#"
[project]
name = "p"

[fpga]
vendor = "xilinx"
part = "xc7a35t"

[[source.hdl]]
pattern = "src/*.v"

[[source.constraints]]
pattern = "xdc/*.xdc"
"#,
            &tmp.path().join("bitforge.toml"),
        )
        .unwrap();

        let result = FileDiscovery::new(&config.root).scan(&config);
        assert_eq!(result.hdl.len(), 1);
        assert_eq!(result.constraints.len(), 1);
        assert!(result.ip_cores.is_empty());
        assert_eq!(result.total(), 2);
    }
}
