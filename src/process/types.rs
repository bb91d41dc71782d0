//! Process supervision types
//!
//! Tokens, lifecycle states and the tagged execution result.

use crate::output::{apply_output_limits, CommandOutput, OutputLimits};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

/// Opaque handle for an asynchronously started process
///
/// Only the registry can map a token to a pid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessToken(Uuid);

impl ProcessToken {
    /// Generate a fresh random token
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse a token received from a caller; `None` if malformed
    pub fn parse(raw: &str) -> Option<Self> {
        Uuid::parse_str(raw.trim()).ok().map(Self)
    }

    /// First 8 characters, for listings
    pub fn short(&self) -> String {
        self.0.to_string()[..8].to_string()
    }
}

impl Default for ProcessToken {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ProcessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Process lifecycle
///
/// Running → {Completed, TimedOut, Failed, Terminated}. Terminal states
/// are never left.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProcessState {
    Running,
    Completed,
    #[serde(rename = "timeout")]
    TimedOut,
    #[serde(rename = "error")]
    Failed,
    Terminated,
}

impl ProcessState {
    /// Check if this is a terminal state
    pub fn is_terminal(&self) -> bool {
        !matches!(self, ProcessState::Running)
    }

    /// Whether `next` is reachable from this state in one step
    pub fn can_transition_to(&self, next: ProcessState) -> bool {
        matches!(self, ProcessState::Running) && next.is_terminal()
    }
}

/// Liveness as seen by a non-blocking status check
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LiveStatus {
    Running,
    /// Exited but not yet collected by a wait
    NotRunning,
}

/// Why an execution did not succeed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FailureKind {
    /// Process ran and exited non-zero (or by signal)
    NonZeroExit { code: Option<i32> },
    /// Bounded wait expired; process was force-killed
    Timeout { timeout_ms: u64 },
    /// OS refused to start the process
    SpawnFailure,
    /// Killed on request
    Terminated,
    /// Exit status could not be collected
    WaitError,
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FailureKind::NonZeroExit { code: Some(code) } => {
                write!(f, "Command exited with code {}", code)
            }
            FailureKind::NonZeroExit { code: None } => write!(f, "Command killed by signal"),
            FailureKind::Timeout { timeout_ms } => write!(
                f,
                "Command timed out after {:.1} seconds",
                *timeout_ms as f64 / 1000.0
            ),
            FailureKind::SpawnFailure => write!(f, "Error starting command"),
            FailureKind::Terminated => write!(f, "Command was terminated"),
            FailureKind::WaitError => write!(f, "Error waiting for process"),
        }
    }
}

/// A run that exited with code 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecSuccess {
    pub pid: u32,
    pub output: CommandOutput,
    pub duration_ms: u64,
}

/// A run that did not succeed
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecFailure {
    /// Absent when the process never started
    pub pid: Option<u32>,
    pub kind: FailureKind,
    /// Human-readable reason
    pub message: String,
    /// Whatever was captured before the failure
    pub output: CommandOutput,
    pub duration_ms: u64,
}

/// Outcome of running a command
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum ExecResult {
    Success(ExecSuccess),
    Failure(ExecFailure),
}

impl ExecResult {
    /// Build a result from an exit code
    pub fn from_exit(pid: u32, code: Option<i32>, output: CommandOutput, duration: Duration) -> Self {
        match code {
            Some(0) => ExecResult::Success(ExecSuccess {
                pid,
                output,
                duration_ms: duration.as_millis() as u64,
            }),
            code => Self::failure(Some(pid), FailureKind::NonZeroExit { code }, output, duration),
        }
    }

    /// Failure with the default message for its kind
    pub fn failure(
        pid: Option<u32>,
        kind: FailureKind,
        output: CommandOutput,
        duration: Duration,
    ) -> Self {
        let message = kind.to_string();
        ExecResult::Failure(ExecFailure {
            pid,
            kind,
            message,
            output,
            duration_ms: duration.as_millis() as u64,
        })
    }

    /// Spawn failure with the OS reason attached
    pub fn spawn_failure(reason: impl fmt::Display, duration: Duration) -> Self {
        ExecResult::Failure(ExecFailure {
            pid: None,
            kind: FailureKind::SpawnFailure,
            message: format!("Error starting command: {}", reason),
            output: CommandOutput::default(),
            duration_ms: duration.as_millis() as u64,
        })
    }

    /// Whether the command exited with code 0
    pub fn is_success(&self) -> bool {
        matches!(self, ExecResult::Success(_))
    }

    /// Process id, if one was started
    pub fn pid(&self) -> Option<u32> {
        match self {
            ExecResult::Success(ok) => Some(ok.pid),
            ExecResult::Failure(err) => err.pid,
        }
    }

    /// Captured output
    pub fn output(&self) -> &CommandOutput {
        match self {
            ExecResult::Success(ok) => &ok.output,
            ExecResult::Failure(err) => &err.output,
        }
    }

    /// Captured stdout
    pub fn stdout(&self) -> &str {
        &self.output().stdout
    }

    /// Error text: failure reason (if any) followed by stderr
    pub fn error_text(&self) -> String {
        match self {
            ExecResult::Success(ok) => ok.output.stderr.clone(),
            ExecResult::Failure(err) if err.output.stderr.is_empty() => err.message.clone(),
            ExecResult::Failure(err) => format!("{}\n{}", err.message, err.output.stderr),
        }
    }

    /// Failure kind, `None` on success
    pub fn failure_kind(&self) -> Option<&FailureKind> {
        match self {
            ExecResult::Success(_) => None,
            ExecResult::Failure(err) => Some(&err.kind),
        }
    }

    /// Wall-clock duration
    pub fn duration(&self) -> Duration {
        let ms = match self {
            ExecResult::Success(ok) => ok.duration_ms,
            ExecResult::Failure(err) => err.duration_ms,
        };
        Duration::from_millis(ms)
    }

    /// Apply output limits to the captured text
    pub fn bounded(self, limits: Option<&OutputLimits>) -> Self {
        match self {
            ExecResult::Success(mut ok) => {
                ok.output = apply_output_limits(ok.output, limits);
                ExecResult::Success(ok)
            }
            ExecResult::Failure(mut err) => {
                err.output = apply_output_limits(err.output, limits);
                ExecResult::Failure(err)
            }
        }
    }

    /// Terminal lifecycle state this outcome represents
    pub fn terminal_state(&self) -> ProcessState {
        match self.failure_kind() {
            None | Some(FailureKind::NonZeroExit { .. }) => ProcessState::Completed,
            Some(FailureKind::Timeout { .. }) => ProcessState::TimedOut,
            Some(FailureKind::Terminated) => ProcessState::Terminated,
            Some(FailureKind::SpawnFailure) | Some(FailureKind::WaitError) => ProcessState::Failed,
        }
    }
}

/// Returned immediately by `execute_async`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AsyncStart {
    pub token: ProcessToken,
    pub pid: u32,
    pub status: ProcessState,
    /// Stored only; takes effect when passed to a later wait
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timeout_hint_ms: Option<u64>,
}

/// Best-effort live metrics; absent fields could not be sampled
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProcessMetrics {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    /// Resident set size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_rss: Option<u64>,
    /// Virtual memory size in bytes
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_virtual: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub create_time: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub os_status: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cmdline: Option<Vec<String>>,
}

impl ProcessMetrics {
    /// Resident memory in MB
    pub fn rss_mb(&self) -> Option<f64> {
        self.memory_rss.map(|bytes| bytes as f64 / (1024.0 * 1024.0))
    }

    /// Virtual memory in MB
    pub fn vms_mb(&self) -> Option<f64> {
        self.memory_virtual.map(|bytes| bytes as f64 / (1024.0 * 1024.0))
    }
}

/// Non-blocking status of a tracked process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProcessStatusReport {
    pub token: ProcessToken,
    pub status: LiveStatus,
    pub pid: u32,
    pub command: String,
    pub runtime_ms: u64,
    /// Set once the process has exited
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exit_code: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<ProcessMetrics>,
}

/// Final result of waiting on a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WaitOutcome {
    pub token: ProcessToken,
    pub status: ProcessState,
    pub result: ExecResult,
}

impl WaitOutcome {
    /// Whether the process exited with code 0
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }
}

/// Answer to `query_process`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum QueryResponse {
    Status(ProcessStatusReport),
    Finished(WaitOutcome),
}

/// Row of `list_running_processes`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunningProcess {
    /// First 8 characters of the token
    pub token: String,
    pub pid: u32,
    pub command: String,
    pub runtime_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cpu_percent: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub memory_mb: Option<f64>,
}
