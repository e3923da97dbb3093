//! Version adapters.
//!
//! An adapter compensates for quirks of one tool release line. All three
//! transformations are pure and idempotent, so callers can resolve and apply
//! an adapter as often as they like.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use regex::Regex;
use tracing::debug;

use crate::core::config::ProjectConfig;
use crate::core::tool::ToolInfo;

/// Version-specific rewrites for commands, configuration and output.
pub trait VersionAdapter: Send + Sync {
    /// Adapter name for logs and reports.
    fn name(&self) -> &str;

    /// Rewrite the tool invocation arguments (program first).
    fn adapt_command(&self, args: Vec<String>) -> Vec<String> {
        args
    }

    /// Fill in version-specific configuration defaults.
    fn adapt_config(&self, config: ProjectConfig) -> ProjectConfig {
        config
    }

    /// Normalise tool output text.
    fn adapt_output(&self, text: &str) -> String {
        text.to_string()
    }
}

/// Maps tool name + version pattern to adapters, first match wins.
#[derive(Default)]
pub struct AdapterRegistry {
    adapters: HashMap<String, Vec<(Regex, Arc<dyn VersionAdapter>)>>,
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with the built-in Vivado adapters.
    pub fn with_builtin() -> Self {
        let mut registry = Self::new();
        for (pattern, adapter) in vivado_adapters() {
            // Built-in patterns are literals known to compile.
            if let Err(e) = registry.register("vivado", pattern, adapter) {
                tracing::error!("{:#}", e);
            }
        }
        registry
    }

    /// Register an adapter for versions matching `version_pattern`.
    ///
    /// The pattern is anchored at the start of the version string.
    pub fn register(
        &mut self,
        tool_name: &str,
        version_pattern: &str,
        adapter: Arc<dyn VersionAdapter>,
    ) -> Result<()> {
        let regex = Regex::new(&format!("^(?:{})", version_pattern))
            .with_context(|| format!("invalid version pattern `{}`", version_pattern))?;
        self.adapters
            .entry(tool_name.to_string())
            .or_default()
            .push((regex, adapter));
        Ok(())
    }

    /// First adapter (in registration order) whose pattern matches the version.
    pub fn resolve(&self, tool: &ToolInfo) -> Option<Arc<dyn VersionAdapter>> {
        let candidates = self.adapters.get(tool.name())?;
        let found = candidates
            .iter()
            .find(|(re, _)| re.is_match(tool.version()))
            .map(|(_, adapter)| Arc::clone(adapter));

        if let Some(adapter) = &found {
            debug!(
                "using adapter {} for {} {}",
                adapter.name(),
                tool.name(),
                tool.version()
            );
        }
        found
    }

    /// Number of adapters registered for a tool.
    pub fn count(&self, tool_name: &str) -> usize {
        self.adapters.get(tool_name).map_or(0, Vec::len)
    }
}

/// Built-in Vivado release-line adapter.
#[derive(Debug, Clone)]
pub struct VivadoAdapter {
    name: &'static str,
    default_strategy: &'static str,
    force_batch: bool,
    normalize_tags: bool,
}

impl VivadoAdapter {
    pub fn v2019() -> Self {
        VivadoAdapter {
            name: "vivado-2019",
            default_strategy: "Vivado Synthesis 2019",
            force_batch: true,
            normalize_tags: false,
        }
    }

    pub fn v2023() -> Self {
        VivadoAdapter {
            name: "vivado-2023",
            default_strategy: "Vivado Synthesis 2023",
            force_batch: false,
            normalize_tags: false,
        }
    }

    pub fn v2024() -> Self {
        VivadoAdapter {
            name: "vivado-2024",
            default_strategy: "Vivado Synthesis 2024",
            force_batch: true,
            normalize_tags: true,
        }
    }
}

impl VersionAdapter for VivadoAdapter {
    fn name(&self) -> &str {
        self.name
    }

    fn adapt_command(&self, mut args: Vec<String>) -> Vec<String> {
        let is_vivado = args
            .first()
            .is_some_and(|program| program.to_lowercase().contains("vivado"));
        if self.force_batch && is_vivado && !args.iter().any(|a| a == "-mode") {
            args.push("-mode".to_string());
            args.push("batch".to_string());
        }
        args
    }

    fn adapt_config(&self, mut config: ProjectConfig) -> ProjectConfig {
        if config.build.synthesis.strategy.is_none() {
            config.build.synthesis.strategy = Some(self.default_strategy.to_string());
        }
        config
    }

    fn adapt_output(&self, text: &str) -> String {
        if self.normalize_tags {
            text.replace("INFO:", "[INFO]").replace("WARNING:", "[WARNING]")
        } else {
            text.to_string()
        }
    }
}

fn vivado_adapters() -> Vec<(&'static str, Arc<dyn VersionAdapter>)> {
    let adapters: [(&'static str, VivadoAdapter); 3] = [
        (r"2019\..*", VivadoAdapter::v2019()),
        (r"2023\..*", VivadoAdapter::v2023()),
        (r"2024\..*", VivadoAdapter::v2024()),
    ];
    adapters
        .into_iter()
        .map(|(pattern, adapter)| (pattern, Arc::new(adapter) as Arc<dyn VersionAdapter>))
        .collect()
}
