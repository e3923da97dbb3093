//! Backend plugins.
//!
//! Each backend implements [`BackendCapability`] for one vendor toolchain or
//! tool category. Backends are held by a [`PluginRegistry`] and resolved by
//! name or by vendor. Built-in:
//! - `vivado`: Xilinx Vivado via generated Tcl scripts
//!
//! Further backends come from TOML descriptors in plugin directories and run
//! plain command lines ([`GenericToolBackend`]).

mod capability;
mod descriptor;
mod generic;
mod registry;
mod vivado;

pub use capability::{
    unsupported, BackendCapability, CompatibilityCheck, PluginKind, StageRequest,
};
pub use descriptor::{load_descriptors, CommandSpec, PluginDescriptor, PluginError};
pub use generic::GenericToolBackend;
pub use registry::{PluginEnv, PluginFactory, PluginInfo, PluginRegistry, PluginState};
pub use vivado::{VivadoBackend, VIVADO_BACKEND};
