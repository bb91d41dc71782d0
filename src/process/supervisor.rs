//! Process supervisor
//!
//! Runs shell commands in two modes:
//! - synchronous `execute`, bounded by an optional timeout
//! - asynchronous `execute_async`, tracked by an opaque token until a
//!   `wait_for_process` or a termination consumes it
//!
//! Every public operation returns a value; a misbehaving command never
//! takes the supervisor down.

use crate::errors::{ExecError, Result};
use crate::output::CommandOutput;
use crate::process::metrics::MetricsSampler;
use crate::process::registry::{ProcessHandle, ProcessRegistry};
use crate::process::spawn::{spawn_supervised, ChildControl, ExitRecord, ExitWait, ShellConfig};
use crate::process::types::{
    AsyncStart, ExecFailure, ExecResult, FailureKind, LiveStatus, ProcessMetrics, ProcessState,
    ProcessStatusReport, ProcessToken, QueryResponse, RunningProcess, WaitOutcome,
};
use futures_util::future::join_all;
use std::fmt::Write as _;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// Default grace period for collecting output after a kill
pub const DEFAULT_DRAIN_TIMEOUT: Duration = Duration::from_secs(2);

/// Default width of the command column in status reports
pub const DEFAULT_MAX_COMMAND_WIDTH: usize = 60;

/// Supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Applied when a call supplies no timeout of its own
    pub default_timeout: Option<Duration>,
    /// How long to keep reading pipes after a process exits or is killed
    pub drain_timeout: Duration,
    pub shell: ShellConfig,
    pub max_command_width: usize,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            default_timeout: None,
            drain_timeout: DEFAULT_DRAIN_TIMEOUT,
            shell: ShellConfig::default(),
            max_command_width: DEFAULT_MAX_COMMAND_WIDTH,
        }
    }
}

impl SupervisorConfig {
    pub fn with_default_timeout(mut self, timeout: Duration) -> Self {
        self.default_timeout = Some(timeout);
        self
    }

    pub fn with_drain_timeout(mut self, drain: Duration) -> Self {
        self.drain_timeout = drain;
        self
    }

    pub fn with_shell(mut self, shell: ShellConfig) -> Self {
        self.shell = shell;
        self
    }
}

/// Spawns, tracks, awaits and terminates shell commands
///
/// Cloning is cheap and clones share one registry.
#[derive(Debug, Clone)]
pub struct ProcessSupervisor {
    registry: Arc<ProcessRegistry>,
    sampler: Arc<MetricsSampler>,
    config: SupervisorConfig,
}

impl Default for ProcessSupervisor {
    fn default() -> Self {
        Self::new(SupervisorConfig::default())
    }
}

impl ProcessSupervisor {
    /// Create a supervisor with its own empty registry
    pub fn new(config: SupervisorConfig) -> Self {
        Self {
            registry: Arc::new(ProcessRegistry::new()),
            sampler: Arc::new(MetricsSampler::new()),
            config,
        }
    }

    pub fn config(&self) -> &SupervisorConfig {
        &self.config
    }

    /// Number of processes currently tracked by token
    pub fn tracked_count(&self) -> usize {
        self.registry.len()
    }

    /// Run `command` to completion or until `timeout` expires
    ///
    /// On timeout the process is force-killed and whatever output it had
    /// produced is returned with a `Timeout` failure. No token is issued.
    pub async fn execute(&self, command: &str, timeout: Option<Duration>) -> ExecResult {
        let started = Instant::now();
        let timeout = timeout.or(self.config.default_timeout);

        let control = match spawn_supervised(command, &self.config.shell, self.config.drain_timeout) {
            Ok(control) => control,
            Err(e) => {
                warn!(command, error = %e, "Failed to start command");
                return ExecResult::spawn_failure(spawn_reason(e), started.elapsed());
            }
        };

        debug!(
            pid = control.pid(),
            command,
            timeout_ms = timeout.map(|t| t.as_millis() as u64),
            "Started command"
        );

        let result = self.collect(&control, timeout, started).await;
        debug!(
            pid = control.pid(),
            success = result.is_success(),
            stdout_len = result.output().stdout.len(),
            stderr_len = result.output().stderr.len(),
            "Command finished"
        );
        result
    }

    /// Start `command` without waiting for it
    ///
    /// `timeout` is recorded as a hint only; the process is never killed
    /// because of it. Pass a timeout to `wait_for_process` to bound a wait.
    pub async fn execute_async(
        &self,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<AsyncStart> {
        let control = spawn_supervised(command, &self.config.shell, self.config.drain_timeout)
            .map_err(|e| {
                warn!(command, error = %e, "Failed to start background command");
                e
            })?;

        let pid = control.pid();
        let token = self.registry.insert(command, timeout, control);
        info!(token = %token, pid, command, "Started background command");

        Ok(AsyncStart {
            token,
            pid,
            status: ProcessState::Running,
            timeout_hint_ms: timeout.map(|t| t.as_millis() as u64),
        })
    }

    /// Non-blocking status of a tracked process
    pub fn get_process_status(&self, token: &ProcessToken) -> Result<ProcessStatusReport> {
        let handle = self.lookup(token)?;
        let runtime_ms = handle.started.elapsed().as_millis() as u64;

        let report = match handle.control.exit_record() {
            Some(record) => ProcessStatusReport {
                token: *token,
                status: LiveStatus::NotRunning,
                pid: handle.pid,
                command: handle.command,
                runtime_ms,
                exit_code: record.code,
                metrics: None,
            },
            None => ProcessStatusReport {
                token: *token,
                status: LiveStatus::Running,
                pid: handle.pid,
                command: handle.command,
                runtime_ms,
                exit_code: None,
                metrics: self.sampler.sample(handle.pid),
            },
        };
        Ok(report)
    }

    /// Wait for a tracked process and consume its token
    ///
    /// The token is removed in the same step that claims the result, so
    /// exactly one caller receives it. Everyone else gets `ProcessNotFound`.
    pub async fn wait_for_process(
        &self,
        token: &ProcessToken,
        timeout: Option<Duration>,
    ) -> Result<WaitOutcome> {
        let handle = self.lookup(token)?;
        let timeout = timeout.or(self.config.default_timeout);

        let result = self.collect(&handle.control, timeout, handle.started).await;
        let status = result.terminal_state();

        if self.registry.remove(token, status).is_none() {
            // Another waiter or a termination claimed it first
            debug!(token = %token, "Result already consumed");
            return Err(not_found(token));
        }
        self.sampler.forget(handle.pid);

        info!(
            token = %token,
            pid = handle.pid,
            status = ?status,
            duration_ms = result.duration().as_millis() as u64,
            "Background command collected"
        );

        Ok(WaitOutcome {
            token: *token,
            status,
            result,
        })
    }

    /// Status when `wait` is false, otherwise a bounded wait
    pub async fn query_process(
        &self,
        token: &ProcessToken,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<QueryResponse> {
        if wait {
            self.wait_for_process(token, timeout)
                .await
                .map(QueryResponse::Finished)
        } else {
            self.get_process_status(token).map(QueryResponse::Status)
        }
    }

    /// Force-kill a tracked process and drop its token
    ///
    /// Returns false for unknown or already consumed tokens.
    pub async fn terminate_by_token(&self, token: &ProcessToken) -> bool {
        match self.registry.remove(token, ProcessState::Terminated) {
            Some(handle) => {
                self.kill_handle(handle).await;
                true
            }
            None => {
                debug!(token = %token, "Terminate requested for unknown token");
                false
            }
        }
    }

    /// Force-kill a tracked process by pid
    ///
    /// Pids the registry does not own are never signalled.
    pub async fn terminate_process(&self, pid: u32) -> bool {
        match self.registry.remove_by_pid(pid, ProcessState::Terminated) {
            Some(handle) => {
                self.kill_handle(handle).await;
                true
            }
            None => {
                debug!(pid, "Terminate requested for untracked pid");
                false
            }
        }
    }

    /// Tracked processes that have not exited yet
    pub fn list_running_processes(&self) -> Vec<RunningProcess> {
        let mut handles: Vec<ProcessHandle> = self
            .registry
            .snapshot()
            .into_iter()
            .filter(|handle| handle.control.exit_record().is_none())
            .collect();
        handles.sort_by_key(|handle| handle.started);

        handles
            .into_iter()
            .map(|handle| {
                let metrics = self.sampler.sample(handle.pid);
                RunningProcess {
                    token: handle.token.short(),
                    pid: handle.pid,
                    command: handle.command,
                    runtime_ms: handle.started.elapsed().as_millis() as u64,
                    cpu_percent: metrics.as_ref().and_then(|m| m.cpu_percent),
                    memory_mb: metrics.as_ref().and_then(|m| m.rss_mb()),
                }
            })
            .collect()
    }

    /// Live metrics for a tracked pid
    pub fn get_process_info(&self, pid: u32) -> Option<ProcessMetrics> {
        self.registry.get_by_pid(pid)?;
        self.sampler.sample(pid)
    }

    /// Human-readable summary of running background processes
    pub fn status_report(&self) -> String {
        let running = self.list_running_processes();
        let timestamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");

        let mut report = format!(
            "[{}] Background Jobs Status ({} running):\n",
            timestamp,
            running.len()
        );
        if running.is_empty() {
            report.push_str("  No background processes currently running.\n");
            return report;
        }

        for process in &running {
            let _ = writeln!(
                report,
                "  Token: {} | PID: {} | Runtime: {} | Status: running",
                process.token,
                process.pid,
                format_duration(Duration::from_millis(process.runtime_ms))
            );
            let _ = writeln!(
                report,
                "    Command: {}",
                truncate_command(&process.command, self.config.max_command_width)
            );
            let _ = writeln!(
                report,
                "    CPU: {:.1}% | Memory: {:.1}MB",
                process.cpu_percent.unwrap_or(0.0),
                process.memory_mb.unwrap_or(0.0)
            );
        }
        report
    }

    /// Kill every tracked process and clear the registry
    pub async fn shutdown(&self) -> usize {
        let handles = self.registry.drain(ProcessState::Terminated);
        let count = handles.len();
        if count > 0 {
            info!(count, "Terminating tracked processes");
        }
        join_all(handles.into_iter().map(|handle| self.kill_handle(handle))).await;
        count
    }

    fn lookup(&self, token: &ProcessToken) -> Result<ProcessHandle> {
        self.registry.get(token).ok_or_else(|| {
            debug!(token = %token, "Unknown process token");
            not_found(token)
        })
    }

    async fn kill_handle(&self, handle: ProcessHandle) {
        let (record, _) = handle.control.kill_and_collect(self.config.drain_timeout).await;
        self.sampler.forget(handle.pid);
        match record {
            Some(record) => info!(
                token = %handle.token,
                pid = handle.pid,
                exit_code = record.code,
                "Terminated process"
            ),
            None => warn!(
                token = %handle.token,
                pid = handle.pid,
                "Kill requested but exit was not observed"
            ),
        }
    }

    /// Bounded wait on a child, killing it when the bound expires
    async fn collect(
        &self,
        control: &ChildControl,
        timeout: Option<Duration>,
        started: Instant,
    ) -> ExecResult {
        let pid = control.pid();
        match control.wait_exit(timeout).await {
            ExitWait::Exited(record) => {
                result_from_record(pid, record, control.output(), started.elapsed())
            }
            ExitWait::TimedOut => {
                let timeout_ms = timeout.map(|t| t.as_millis() as u64).unwrap_or_default();
                warn!(pid, timeout_ms, "Command timed out, killing process");
                let (_, output) = control.kill_and_collect(self.config.drain_timeout).await;
                ExecResult::failure(
                    Some(pid),
                    FailureKind::Timeout { timeout_ms },
                    output,
                    started.elapsed(),
                )
            }
            ExitWait::Lost => {
                warn!(pid, "Supervisor task ended without an exit status");
                ExecResult::failure(
                    Some(pid),
                    FailureKind::WaitError,
                    control.output(),
                    started.elapsed(),
                )
            }
        }
    }
}

fn result_from_record(
    pid: u32,
    record: ExitRecord,
    output: CommandOutput,
    duration: Duration,
) -> ExecResult {
    if let Some(reason) = record.wait_error {
        return ExecResult::Failure(ExecFailure {
            pid: Some(pid),
            kind: FailureKind::WaitError,
            message: format!("{}: {}", FailureKind::WaitError, reason),
            output,
            duration_ms: duration.as_millis() as u64,
        });
    }
    if record.killed {
        return ExecResult::failure(Some(pid), FailureKind::Terminated, output, duration);
    }
    ExecResult::from_exit(pid, record.code, output, duration)
}

fn spawn_reason(err: ExecError) -> String {
    match err {
        ExecError::SpawnFailure { reason, .. } => reason,
        other => other.to_string(),
    }
}

fn not_found(token: &ProcessToken) -> ExecError {
    ExecError::ProcessNotFound {
        token: token.to_string(),
    }
}

/// Format a duration as `HH:MM:SS`
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    format!("{:02}:{:02}:{:02}", secs / 3600, (secs % 3600) / 60, secs % 60)
}

/// Shorten `command` to at most `max_width` characters
pub fn truncate_command(command: &str, max_width: usize) -> String {
    if command.chars().count() <= max_width {
        return command.to_string();
    }
    let keep = max_width.saturating_sub(3);
    let mut shortened: String = command.chars().take(keep).collect();
    shortened.push_str("...");
    shortened
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(0)), "00:00:00");
        assert_eq!(format_duration(Duration::from_secs(3725)), "01:02:05");
        assert_eq!(format_duration(Duration::from_millis(59_999)), "00:00:59");
    }

    #[test]
    fn test_truncate_command() {
        assert_eq!(truncate_command("ls -la", 60), "ls -la");
        let long = "x".repeat(80);
        let short = truncate_command(&long, 60);
        assert_eq!(short.chars().count(), 60);
        assert!(short.ends_with("..."));
    }

    #[test]
    fn test_result_from_record() {
        let killed = ExitRecord {
            code: None,
            killed: true,
            wait_error: None,
        };
        let result = result_from_record(7, killed, CommandOutput::default(), Duration::ZERO);
        assert_eq!(result.failure_kind(), Some(&FailureKind::Terminated));

        let lost = ExitRecord {
            code: None,
            killed: false,
            wait_error: Some("no child".to_string()),
        };
        let result = result_from_record(7, lost, CommandOutput::default(), Duration::ZERO);
        assert_eq!(result.terminal_state(), ProcessState::Failed);
        assert!(result.error_text().contains("no child"));
    }

    #[tokio::test]
    async fn test_unknown_token_is_not_found() {
        let supervisor = ProcessSupervisor::default();
        let token = ProcessToken::new();

        assert!(supervisor.get_process_status(&token).unwrap_err().is_not_found());
        assert!(supervisor
            .wait_for_process(&token, None)
            .await
            .unwrap_err()
            .is_not_found());
        assert!(!supervisor.terminate_by_token(&token).await);
        assert!(!supervisor.terminate_process(u32::MAX - 1).await);
        assert!(supervisor.get_process_info(std::process::id()).is_none());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_success() {
        let supervisor = ProcessSupervisor::default();
        let result = supervisor.execute("echo hello", None).await;

        assert!(result.is_success());
        assert!(result.stdout().contains("hello"));
        assert!(result.pid().is_some());
        assert_eq!(supervisor.tracked_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_timeout_returns_partial_output() {
        let supervisor = ProcessSupervisor::default();
        let result = supervisor
            .execute("echo started; sleep 10", Some(Duration::from_millis(300)))
            .await;

        assert!(!result.is_success());
        assert!(matches!(result.failure_kind(), Some(FailureKind::Timeout { .. })));
        assert!(result.error_text().contains("timed out"));
        assert!(result.stdout().contains("started"));
        assert!(result.duration() < Duration::from_secs(5));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_execute_spawn_failure() {
        let config = SupervisorConfig::default()
            .with_shell(ShellConfig::new("/definitely/not/a/shell", "-c"));
        let supervisor = ProcessSupervisor::new(config);
        let result = supervisor.execute("echo hi", None).await;

        assert_eq!(result.failure_kind(), Some(&FailureKind::SpawnFailure));
        assert!(result.pid().is_none());
        assert!(supervisor.execute_async("echo hi", None).await.is_err());
        assert_eq!(supervisor.tracked_count(), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_async_hint_is_not_enforced() {
        let supervisor = ProcessSupervisor::default();
        let start = supervisor
            .execute_async("sleep 1; echo done", Some(Duration::from_millis(100)))
            .await
            .unwrap();
        assert_eq!(start.timeout_hint_ms, Some(100));

        tokio::time::sleep(Duration::from_millis(300)).await;
        let outcome = supervisor.wait_for_process(&start.token, None).await.unwrap();
        assert!(outcome.is_success());
        assert_eq!(outcome.status, ProcessState::Completed);
        assert!(outcome.result.stdout().contains("done"));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_status_report_lists_running() {
        let supervisor = ProcessSupervisor::default();
        let start = supervisor.execute_async("sleep 5", None).await.unwrap();

        let running = supervisor.list_running_processes();
        assert_eq!(running.len(), 1);
        assert_eq!(running[0].pid, start.pid);
        assert_eq!(running[0].token, start.token.short());

        let report = supervisor.status_report();
        assert!(report.contains("(1 running)"));
        assert!(report.contains("Command: sleep 5"));

        assert_eq!(supervisor.shutdown().await, 1);
        assert!(supervisor.list_running_processes().is_empty());
        assert!(supervisor.status_report().contains("No background processes"));
    }
}
