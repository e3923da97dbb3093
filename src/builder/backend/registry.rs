//! Plugin registry - owns one capability object per backend name.
//!
//! The registry is populated from two sources: factories (the built-in
//! backends, or whatever a test registers) and plugin directories holding
//! descriptor files. [`PluginRegistry::discover`] always clears and rebuilds
//! from both, so running it twice never duplicates entries and a removed
//! descriptor disappears. All mutation happens on the driving thread.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde::Serialize;
use tracing::{debug, info, warn};

use crate::builder::backend::capability::{BackendCapability, PluginKind};
use crate::builder::backend::descriptor::load_descriptors;
use crate::builder::backend::generic::GenericToolBackend;
use crate::builder::backend::vivado::{VivadoBackend, VIVADO_BACKEND};
use crate::util::config::{ToolOverride, ToolsConfig};

/// Builds a fresh backend instance.
pub type PluginFactory = Box<dyn Fn(&PluginEnv) -> Box<dyn BackendCapability>>;

/// Settings backends are constructed with.
#[derive(Debug, Clone, Default)]
pub struct PluginEnv {
    /// Merged `tools.toml` contents
    pub tools: ToolsConfig,

    /// Overrides from the project file, keyed by vendor
    pub vendor_overrides: BTreeMap<String, ToolOverride>,
}

impl PluginEnv {
    pub fn new(tools: ToolsConfig) -> Self {
        PluginEnv {
            tools,
            vendor_overrides: BTreeMap::new(),
        }
    }

    /// Apply a project-level override to backends of `vendor`.
    pub fn with_vendor_override(mut self, vendor: &str, hint: ToolOverride) -> Self {
        self.vendor_overrides.insert(vendor.to_lowercase(), hint);
        self
    }

    /// Effective override for a tool: the vendor's project-level override
    /// field by field over the `tools.toml` entry.
    pub fn override_for(&self, tool: &str, vendor: Option<&str>) -> ToolOverride {
        let mut hint = self.tools.tool(tool).cloned().unwrap_or_default();
        if let Some(project) = vendor.and_then(|v| self.vendor_overrides.get(&v.to_lowercase())) {
            if project.path.is_some() {
                hint.path = project.path.clone();
            }
            if project.version.is_some() {
                hint.version = project.version.clone();
            }
        }
        hint
    }
}

/// Whether a registered plugin initialized cleanly.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum PluginState {
    Ready,
    /// `initialize` returned false; queryable but may refuse to build
    Degraded,
}

struct Registered {
    plugin: Box<dyn BackendCapability>,
    state: PluginState,
}

/// Registry of backends.
pub struct PluginRegistry {
    plugins: BTreeMap<String, Registered>,
    factories: Vec<PluginFactory>,
    plugin_dirs: Vec<PathBuf>,
    env: PluginEnv,
}

impl PluginRegistry {
    /// An empty registry with no sources.
    pub fn new(env: PluginEnv) -> Self {
        PluginRegistry {
            plugins: BTreeMap::new(),
            factories: Vec::new(),
            plugin_dirs: Vec::new(),
            env,
        }
    }

    /// Registry with the built-in backends and the configured plugin
    /// directories, already discovered.
    pub fn with_builtin(env: PluginEnv) -> Self {
        let dirs = env.tools.plugins.dirs.clone();
        let mut registry = Self::new(env);
        registry.add_factory(Box::new(|env: &PluginEnv| {
            Box::new(
                VivadoBackend::new().with_override(env.override_for(VIVADO_BACKEND, Some("xilinx"))),
            ) as Box<dyn BackendCapability>
        }));
        for dir in dirs {
            registry.add_plugin_dir(dir);
        }
        registry.discover();
        registry
    }

    /// Add a source of backends used by [`discover`](Self::discover).
    pub fn add_factory(&mut self, factory: PluginFactory) {
        self.factories.push(factory);
    }

    /// Add a directory scanned for descriptors by [`discover`](Self::discover).
    pub fn add_plugin_dir(&mut self, dir: impl Into<PathBuf>) {
        let dir = dir.into();
        if !self.plugin_dirs.contains(&dir) {
            self.plugin_dirs.push(dir);
        }
    }

    pub fn plugin_dirs(&self) -> &[PathBuf] {
        &self.plugin_dirs
    }

    /// Rebuild the registry from its factories and plugin directories.
    ///
    /// Returns the number of registered plugins.
    pub fn discover(&mut self) -> usize {
        self.clear();

        let mut found: Vec<Box<dyn BackendCapability>> =
            self.factories.iter().map(|factory| factory(&self.env)).collect();

        for dir in &self.plugin_dirs {
            debug!("scanning plugin directory {}", dir.display());
            for descriptor in load_descriptors(dir) {
                let hint = self
                    .env
                    .override_for(descriptor.tool.tool_name(), descriptor.plugin.vendor.as_deref());
                found.push(Box::new(GenericToolBackend::new(descriptor, hint)));
            }
        }

        for plugin in found {
            self.register(plugin);
        }
        debug!("{} plugin(s) registered", self.plugins.len());
        self.plugins.len()
    }

    /// Register and initialize a backend.
    ///
    /// The first registration of a name wins; later ones are logged and
    /// dropped. Returns whether the plugin was added.
    pub fn register(&mut self, mut plugin: Box<dyn BackendCapability>) -> bool {
        let name = plugin.name().to_string();
        if self.plugins.contains_key(&name) {
            warn!("plugin `{}` is already registered; ignoring duplicate", name);
            return false;
        }

        let state = if plugin.initialize() {
            PluginState::Ready
        } else {
            warn!("plugin `{}` failed to initialize; registered as degraded", name);
            PluginState::Degraded
        };
        info!("registered {} plugin `{}`", plugin.kind(), name);
        self.plugins.insert(name, Registered { plugin, state });
        true
    }

    /// Remove a backend, calling its cleanup. Returns whether it existed.
    pub fn unregister(&mut self, name: &str) -> bool {
        match self.plugins.remove(name) {
            Some(mut entry) => {
                entry.plugin.cleanup();
                info!("unregistered plugin `{}`", name);
                true
            }
            None => false,
        }
    }

    /// Rediscover everything. Returns false if a previously registered
    /// plugin did not come back.
    pub fn reload_all(&mut self) -> bool {
        let previous: Vec<String> = self.plugins.keys().cloned().collect();
        self.discover();

        let missing: Vec<&str> = previous
            .iter()
            .filter(|name| !self.plugins.contains_key(*name))
            .map(String::as_str)
            .collect();
        if missing.is_empty() {
            true
        } else {
            warn!("plugins not reloaded: {}", missing.join(", "));
            false
        }
    }

    pub fn get(&self, name: &str) -> Option<&dyn BackendCapability> {
        self.plugins.get(name).map(|entry| entry.plugin.as_ref())
    }

    /// First vendor backend (in name order) whose vendor matches,
    /// ignoring case.
    pub fn get_by_vendor(&self, vendor: &str) -> Option<&dyn BackendCapability> {
        self.plugins
            .values()
            .map(|entry| entry.plugin.as_ref())
            .filter(|plugin| plugin.kind() == PluginKind::Vendor)
            .find(|plugin| plugin.vendor().is_some_and(|v| v.eq_ignore_ascii_case(vendor)))
    }

    /// Backend named `name`, or else the vendor backend for `name`.
    pub fn resolve(&self, name: &str) -> Option<&dyn BackendCapability> {
        self.get(name).or_else(|| self.get_by_vendor(name))
    }

    pub fn list_by_kind(&self, kind: PluginKind) -> BTreeMap<&str, &dyn BackendCapability> {
        self.plugins
            .iter()
            .filter(|(_, entry)| entry.plugin.kind() == kind)
            .map(|(name, entry)| (name.as_str(), entry.plugin.as_ref()))
            .collect()
    }

    pub fn state(&self, name: &str) -> Option<PluginState> {
        self.plugins.get(name).map(|entry| entry.state)
    }

    /// All backends, ordered by name.
    pub fn all(&self) -> impl Iterator<Item = &dyn BackendCapability> + '_ {
        self.plugins.values().map(|entry| entry.plugin.as_ref())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> + '_ {
        self.plugins.keys().map(String::as_str)
    }

    /// Descriptive summary of one backend.
    pub fn info(&self, name: &str) -> Option<PluginInfo> {
        let entry = self.plugins.get(name)?;
        Some(PluginInfo::new(entry.plugin.as_ref(), entry.state))
    }

    /// Summaries of every backend, ordered by name.
    pub fn summaries(&self) -> Vec<PluginInfo> {
        self.plugins
            .values()
            .map(|entry| PluginInfo::new(entry.plugin.as_ref(), entry.state))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.plugins.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plugins.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.plugins.contains_key(name)
    }

    fn clear(&mut self) {
        for entry in self.plugins.values_mut() {
            entry.plugin.cleanup();
        }
        self.plugins.clear();
    }
}

/// Summary of a backend for display purposes.
#[derive(Debug, Clone, Serialize)]
pub struct PluginInfo {
    pub name: String,
    pub kind: PluginKind,
    pub version: String,
    pub description: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub vendor: Option<String>,

    pub state: PluginState,

    /// Detected tool as `name version`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool: Option<String>,
}

impl PluginInfo {
    fn new(plugin: &dyn BackendCapability, state: PluginState) -> Self {
        PluginInfo {
            name: plugin.name().to_string(),
            kind: plugin.kind(),
            version: plugin.version().to_string(),
            description: plugin.description().to_string(),
            vendor: plugin.vendor().map(str::to_string),
            state,
            tool: plugin
                .tool()
                .filter(|tool| tool.is_installed())
                .map(|tool| format!("{} {}", tool.name(), tool.version())),
        }
    }
}
