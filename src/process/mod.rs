//! Process supervision
//!
//! Spawns shell commands, tracks background runs by token, and collects
//! their output exactly once.

pub mod metrics;
mod registry;
pub mod spawn;
pub mod supervisor;
pub mod types;

pub use metrics::MetricsSampler;
pub use spawn::ShellConfig;
pub use supervisor::{
    format_duration, truncate_command, ProcessSupervisor, SupervisorConfig, DEFAULT_DRAIN_TIMEOUT,
};
pub use types::{
    AsyncStart, ExecFailure, ExecResult, ExecSuccess, FailureKind, LiveStatus, ProcessMetrics,
    ProcessState, ProcessStatusReport, ProcessToken, QueryResponse, RunningProcess, WaitOutcome,
};
