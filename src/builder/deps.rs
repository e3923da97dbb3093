//! HDL dependency ordering.
//!
//! This is a best-effort heuristic, not a parser. Declared and referenced
//! unit names are pulled out with line-oriented regular expressions, and the
//! resulting order is only as good as that extraction. Missed references
//! simply mean "no detected dependency"; nothing here ever fails.

use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

use regex::Regex;
use tracing::debug;

use crate::core::artifact::{Language, SourceArtifact};

static VERILOG_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*module\s+(\w+)").expect("valid module pattern"));

static VHDL_DECL: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?mi)^\s*entity\s+(\w+)\s+is").expect("valid entity pattern"));

static VERILOG_REF: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\s*(\w+)\s+\w+\s*\(|^\s*(\w+)\s+#").expect("valid instance pattern"));

static VHDL_REF: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^\s*component\s+(\w+)|^\s*entity\s+work\.(\w+)|^\s*use\s+work\.(\w+)")
        .expect("valid component pattern")
});

/// Words that look like instantiations to the Verilog reference pattern.
const VERILOG_KEYWORDS: &[&str] = &["assign", "always", "initial", "if", "else"];

/// Names one artifact declares and references.
#[derive(Debug, Clone)]
pub struct DependencyUnit<'a> {
    pub artifact: &'a SourceArtifact,
    pub declared: Vec<String>,
    pub references: Vec<String>,
}

impl<'a> DependencyUnit<'a> {
    /// Read and scan an artifact. Unreadable files yield an empty unit.
    pub fn scan(artifact: &'a SourceArtifact) -> Self {
        let content = match std::fs::read(artifact.absolute_path()) {
            Ok(bytes) => String::from_utf8_lossy(&bytes).into_owned(),
            Err(e) => {
                debug!("cannot read {}: {}", artifact.absolute_path().display(), e);
                String::new()
            }
        };
        Self::from_source(artifact, &content)
    }

    /// Scan already-loaded text.
    pub fn from_source(artifact: &'a SourceArtifact, content: &str) -> Self {
        DependencyUnit {
            artifact,
            declared: extract_declarations(content, artifact.language()),
            references: extract_references(content, artifact.language()),
        }
    }

    fn path(&self) -> &'a Path {
        self.artifact.absolute_path()
    }
}

/// Unit names declared in `content`.
pub fn extract_declarations(content: &str, language: Language) -> Vec<String> {
    let re = match language {
        Language::Verilog | Language::SystemVerilog => &*VERILOG_DECL,
        Language::Vhdl => &*VHDL_DECL,
        _ => return Vec::new(),
    };
    re.captures_iter(content)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().to_string())
        .collect()
}

/// Unit names referenced by `content`, in first-occurrence order.
pub fn extract_references(content: &str, language: Language) -> Vec<String> {
    let mut refs: Vec<String> = Vec::new();
    let mut push = |name: &str| {
        if !refs.iter().any(|r| r == name) {
            refs.push(name.to_string());
        }
    };

    match language {
        Language::Verilog | Language::SystemVerilog => {
            for line in content.lines() {
                // Declaration lines carry the port list, not an instance.
                if line.contains("module") && !line.contains("endmodule") {
                    continue;
                }
                for caps in VERILOG_REF.captures_iter(line) {
                    if let Some(m) = caps.get(1).or_else(|| caps.get(2)) {
                        if !VERILOG_KEYWORDS.contains(&m.as_str()) {
                            push(m.as_str());
                        }
                    }
                }
            }
        }
        Language::Vhdl => {
            for line in content.lines() {
                let lower = line.to_lowercase();
                if lower.contains("entity") && lower.contains("is") && !lower.contains("end") {
                    continue;
                }
                for caps in VHDL_REF.captures_iter(line) {
                    if let Some(m) = caps.get(1).or_else(|| caps.get(2)).or_else(|| caps.get(3)) {
                        push(m.as_str());
                    }
                }
            }
        }
        _ => {}
    }
    refs
}

/// Order HDL artifacts so that declaring files precede referencing files.
///
/// Artifacts are visited in input order and each one appears at most once
/// (keyed by absolute path). A unit is marked visited on entry, so a
/// reference cycle is cut at the first re-entry: of two mutually referencing
/// files, the one listed first is emitted last. When several files declare
/// the same name, the first one wins.
pub fn order(artifacts: &[SourceArtifact]) -> Vec<SourceArtifact> {
    let units: Vec<DependencyUnit<'_>> = artifacts.iter().map(DependencyUnit::scan).collect();
    order_units(&units)
        .into_iter()
        .map(|i| units[i].artifact.clone())
        .collect()
}

/// Ordering over pre-scanned units; returns indices into `units`.
pub fn order_units(units: &[DependencyUnit<'_>]) -> Vec<usize> {
    let mut declared_in: HashMap<&str, usize> = HashMap::new();
    for (i, unit) in units.iter().enumerate() {
        for name in &unit.declared {
            declared_in.entry(name.as_str()).or_insert(i);
        }
    }

    let mut visited: HashSet<&Path> = HashSet::new();
    let mut output = Vec::with_capacity(units.len());

    for i in 0..units.len() {
        visit(i, units, &declared_in, &mut visited, &mut output);
    }
    output
}

fn visit<'a>(
    index: usize,
    units: &[DependencyUnit<'a>],
    declared_in: &HashMap<&str, usize>,
    visited: &mut HashSet<&'a Path>,
    output: &mut Vec<usize>,
) {
    let unit = &units[index];
    if !visited.insert(unit.path()) {
        return;
    }

    for reference in &unit.references {
        if let Some(&dep) = declared_in.get(reference.as_str()) {
            if dep != index && !visited.contains(units[dep].path()) {
                visit(dep, units, declared_in, visited, output);
            }
        }
    }

    output.push(index);
}
