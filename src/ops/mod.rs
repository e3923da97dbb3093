//! High-level operations.
//!
//! This module contains the implementation of bitforge commands.

pub mod compat;
pub mod pipeline;
pub mod plugins;
pub mod scan;

pub use compat::{compatibility_report, BackendCompatibility, CompatibilityReport};
pub use pipeline::{
    run_pipeline, stage_timeout, PipelineOptions, PipelineReport, PipelineStep,
    DEFAULT_STAGE_TIMEOUT,
};
pub use plugins::{registry_for, select_backend};
pub use scan::{format_scan, scan};
