//! Backend compatibility report.
//!
//! Lists every registered backend with the tools it detected and whether the
//! installation can be used, similar to a doctor check.

use anyhow::{bail, Result};
use serde::Serialize;

use crate::builder::backend::{PluginInfo, PluginRegistry, PluginState};
use crate::core::tool::ToolInfo;

/// Compatibility of one backend.
#[derive(Debug, Clone, Serialize)]
pub struct BackendCompatibility {
    #[serde(flatten)]
    pub info: PluginInfo,
    pub compatible: bool,
    pub tools: Vec<ToolInfo>,
    pub issues: Vec<String>,
}

/// Report over a set of backends.
#[derive(Debug, Clone, Serialize)]
pub struct CompatibilityReport {
    pub backends: Vec<BackendCompatibility>,
}

impl CompatibilityReport {
    pub fn all_compatible(&self) -> bool {
        self.backends.iter().all(|b| b.compatible)
    }

    pub fn incompatible_count(&self) -> usize {
        self.backends.iter().filter(|b| !b.compatible).count()
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// Check every backend, or only the one resolved from `only`.
pub fn compatibility_report(
    registry: &PluginRegistry,
    only: Option<&str>,
) -> Result<CompatibilityReport> {
    let names: Vec<String> = match only {
        Some(wanted) => match registry.resolve(wanted) {
            Some(backend) => vec![backend.name().to_string()],
            None => bail!("unknown backend `{}`", wanted),
        },
        None => registry.names().map(str::to_string).collect(),
    };

    let mut backends = Vec::with_capacity(names.len());
    for name in &names {
        let (Some(backend), Some(info)) = (registry.get(name), registry.info(name)) else {
            continue;
        };
        let check = backend.check_compatibility();
        let mut issues = check.issues;
        if info.state == PluginState::Degraded && issues.is_empty() {
            issues.push(format!("{} failed to initialize", name));
        }
        backends.push(BackendCompatibility {
            compatible: check.compatible && info.state == PluginState::Ready,
            info,
            tools: check.tools,
            issues,
        });
    }

    Ok(CompatibilityReport { backends })
}

/// Format the report for the terminal.
pub fn format_report(report: &CompatibilityReport, verbose: bool) -> String {
    use std::fmt::Write;

    let mut output = String::new();

    if report.backends.is_empty() {
        writeln!(output, "No backends registered.").unwrap();
        return output;
    }

    for backend in &report.backends {
        let info = &backend.info;
        writeln!(output, "{} ({}, v{})", info.name, info.kind, info.version).unwrap();
        if verbose && !info.description.is_empty() {
            writeln!(output, "  {}", info.description).unwrap();
        }
        writeln!(
            output,
            "  Compatible: {}",
            if backend.compatible { "yes" } else { "no" }
        )
        .unwrap();

        for tool in &backend.tools {
            let status = if tool.is_compatible() { "[OK]" } else { "[!!]" };
            if tool.is_installed() {
                writeln!(
                    output,
                    "  {} {} {} ({})",
                    status,
                    tool.name(),
                    tool.version(),
                    tool.path().display()
                )
                .unwrap();
            } else {
                writeln!(output, "  {} {} not found", status, tool.name()).unwrap();
            }
            if let Some(range) = tool.version_range() {
                writeln!(output, "      Supported: {}", range).unwrap();
            }
        }

        for issue in &backend.issues {
            writeln!(output, "      {}", issue).unwrap();
        }
        writeln!(output).unwrap();
    }

    let failed = report.incompatible_count();
    writeln!(
        output,
        "Summary: {} compatible, {} not usable",
        report.backends.len() - failed,
        failed
    )
    .unwrap();
    output
}
