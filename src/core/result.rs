//! Uniform result record for pipeline stages and hook invocations.

use std::collections::BTreeMap;
use std::time::Duration;

use serde::Serialize;

/// Outcome of one stage execution or hook invocation.
///
/// A fresh value is produced per call. Aggregation across a pipeline is the
/// caller's job (see `ops::pipeline::PipelineReport`).
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildResult {
    pub success: bool,

    /// Named outputs (file paths, process ids, ...)
    pub artifacts: BTreeMap<String, String>,

    /// Captured output streams and command lines
    pub logs: BTreeMap<String, String>,

    /// Free-form measurements
    pub metrics: BTreeMap<String, serde_json::Value>,

    pub warnings: Vec<String>,

    pub errors: Vec<String>,

    pub duration: Duration,
}

impl BuildResult {
    /// A successful, empty result.
    pub fn ok() -> Self {
        BuildResult {
            success: true,
            ..Default::default()
        }
    }

    /// A failed result carrying one error message.
    pub fn failed(error: impl Into<String>) -> Self {
        BuildResult {
            success: false,
            errors: vec![error.into()],
            ..Default::default()
        }
    }

    pub fn with_artifact(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.artifacts.insert(key.into(), value.into());
        self
    }

    pub fn with_log(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.logs.insert(key.into(), value.into());
        self
    }

    pub fn with_metric(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.metrics.insert(key.into(), value.into());
        self
    }

    pub fn with_warning(mut self, warning: impl Into<String>) -> Self {
        self.warnings.push(warning.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self.metrics
            .insert("duration_secs".to_string(), duration.as_secs_f64().into());
        self
    }

    /// Mark as failed and record why.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.success = false;
        self.errors.push(error.into());
    }

    /// First error message, if any.
    pub fn first_error(&self) -> Option<&str> {
        self.errors.first().map(String::as_str)
    }
}
