//! FPGA build engines.
//!
//! Turns a project description into tool runs: sources are discovered and
//! ordered, scripts are assembled per stage, and a backend executes them
//! with hooks around each stage.

pub mod backend;
pub mod deps;
pub mod discovery;
pub mod hooks;
pub mod runner;
pub mod script;
pub mod toolchain;

pub use backend::{BackendCapability, PluginKind, PluginRegistry, StageRequest};
pub use discovery::FileDiscovery;
pub use hooks::{HookDecision, HookExecutor};
pub use runner::ScriptRunner;
pub use script::{Script, ScriptAssembler};
pub use toolchain::{AdapterRegistry, ToolDetector, ToolSpec};
