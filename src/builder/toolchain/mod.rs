//! External tool handling.
//!
//! Detection priority for a tool:
//! 1. Configured path (`fpga.tool_path` or `.bitforge/tools.toml`)
//! 2. The process search path
//! 3. Well-known vendor install roots
//!
//! Once detected, a version adapter may be resolved to smooth over
//! release-specific differences.

mod adapter;
mod detect;

pub use adapter::{AdapterRegistry, VersionAdapter, VivadoAdapter};
pub use detect::{extract_version, platform_executable_names, ToolDetector, ToolSpec, PROBE_TIMEOUT};
