//! Admission control types

use crate::errors::{ExecError, Result};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use uuid::Uuid;

fn default_max_concurrent() -> usize {
    1
}

/// Per-tool concurrency limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    #[serde(default = "default_max_concurrent")]
    pub max_concurrent: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent: default_max_concurrent(),
        }
    }
}

impl ConcurrencyConfig {
    pub fn new(max_concurrent: usize) -> Self {
        Self { max_concurrent }
    }

    /// Parse from a loosely typed tool definition; a missing limit means 1
    pub fn from_value(value: &serde_json::Value) -> Result<Self> {
        let config: Self = serde_json::from_value(value.clone())
            .map_err(|e| ExecError::ConfigError(format!("invalid concurrency config: {}", e)))?;
        if config.max_concurrent == 0 {
            return Err(ExecError::ConfigError(
                "max_concurrent must be at least 1".to_string(),
            ));
        }
        Ok(config)
    }
}

/// Metadata for one admission-controlled operation
#[derive(Debug, Clone)]
pub struct OperationContext {
    pub operation_id: String,
    pub operation_type: String,
    pub started_at: Instant,
}

impl OperationContext {
    /// Context for `operation_id`, started now
    pub fn new(operation_id: impl Into<String>) -> Self {
        Self {
            operation_id: operation_id.into(),
            operation_type: "operation".to_string(),
            started_at: Instant::now(),
        }
    }

    /// Context with a generated id
    pub fn generate() -> Self {
        Self::new(Uuid::new_v4().to_string())
    }

    pub fn with_type(mut self, operation_type: impl Into<String>) -> Self {
        self.operation_type = operation_type.into();
        self
    }

    /// Override the start time (used when re-registering work already in flight)
    pub fn with_started_at(mut self, started_at: Instant) -> Self {
        self.started_at = started_at;
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }
}

/// Result of an admission check
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionDecision {
    pub allowed: bool,
    pub tool_name: String,
    /// Operations in flight for the tool when the check ran
    pub current_operations: usize,
    /// `None` when the tool has no configured limit
    pub max_allowed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl AdmissionDecision {
    pub(crate) fn allow(tool_name: &str, current: usize, max: Option<usize>) -> Self {
        Self {
            allowed: true,
            tool_name: tool_name.to_string(),
            current_operations: current,
            max_allowed: max,
            message: None,
        }
    }

    pub(crate) fn reject(tool_name: &str, current: usize, max: usize) -> Self {
        let message = ExecError::AdmissionRejected {
            tool_name: tool_name.to_string(),
            current,
            max,
        }
        .to_string();
        Self {
            allowed: false,
            tool_name: tool_name.to_string(),
            current_operations: current,
            max_allowed: Some(max),
            message: Some(message),
        }
    }

    /// Convert a rejection into an error; `Ok` when allowed
    pub fn into_result(self) -> Result<Self> {
        match (self.allowed, self.max_allowed) {
            (false, Some(max)) => Err(ExecError::AdmissionRejected {
                tool_name: self.tool_name,
                current: self.current_operations,
                max,
            }),
            _ => Ok(self),
        }
    }
}

/// Returned by a successful `finish_operation`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinishedOperation {
    pub operation_id: String,
    pub tool_name: String,
    pub duration: Duration,
}

/// One in-flight operation, elapsed time computed at snapshot time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActiveOperation {
    pub operation_id: String,
    pub operation_type: String,
    pub duration_secs: f64,
}

/// In-flight operations of one tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolActivity {
    pub tool_name: String,
    pub count: usize,
    pub operations: Vec<ActiveOperation>,
}

/// Outcome of a stale sweep
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StaleSweep {
    pub cleaned_count: usize,
    pub max_age_seconds: f64,
    pub stale_operations: Vec<String>,
}
