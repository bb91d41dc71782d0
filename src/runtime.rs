//! Tool runtime
//!
//! Ties the three pieces together the way a tool plugin uses them: take an
//! admission slot for the tool, run the command, bound its output, release
//! the slot. Background runs keep their slot until the process is collected
//! or terminated.

use crate::concurrency::{AdmissionPermit, ConcurrencyController, OperationContext, StaleSweep};
use crate::config::Config;
use crate::errors::Result;
use crate::output::OutputLimits;
use crate::process::{
    AsyncStart, ExecResult, ProcessStatusReport, ProcessSupervisor, ProcessToken, QueryResponse,
    WaitOutcome,
};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info};

#[derive(Debug, Default)]
struct OutputPolicy {
    defaults: Option<OutputLimits>,
    tools: HashMap<String, OutputLimits>,
}

/// Coordinator for admission, execution and output bounding
#[derive(Debug, Clone)]
pub struct ToolRuntime {
    supervisor: ProcessSupervisor,
    admission: ConcurrencyController,
    output: Arc<RwLock<OutputPolicy>>,
    background: Arc<Mutex<HashMap<ProcessToken, AdmissionPermit>>>,
}

impl Default for ToolRuntime {
    fn default() -> Self {
        Self::new(ProcessSupervisor::default(), ConcurrencyController::new())
    }
}

impl ToolRuntime {
    pub fn new(supervisor: ProcessSupervisor, admission: ConcurrencyController) -> Self {
        Self {
            supervisor,
            admission,
            output: Arc::new(RwLock::new(OutputPolicy::default())),
            background: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Build a runtime with limits and output policy taken from `config`
    pub fn from_config(config: &Config) -> Self {
        let runtime = Self::new(
            ProcessSupervisor::new(config.executor.supervisor_config()),
            ConcurrencyController::new(),
        );
        for (tool, limit) in config.concurrency.tool_configs() {
            runtime.admission.register_config(tool, limit);
        }
        {
            let mut policy = runtime.output_policy_mut();
            policy.defaults = config.output.defaults.clone();
            policy.tools = config
                .output
                .tools
                .iter()
                .map(|(tool, limits)| (tool.clone(), limits.clone()))
                .collect();
        }
        runtime
    }

    pub fn supervisor(&self) -> &ProcessSupervisor {
        &self.supervisor
    }

    pub fn admission(&self) -> &ConcurrencyController {
        &self.admission
    }

    fn output_policy_mut(&self) -> std::sync::RwLockWriteGuard<'_, OutputPolicy> {
        self.output.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn background(&self) -> MutexGuard<'_, HashMap<ProcessToken, AdmissionPermit>> {
        self.background.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Output limits for one tool
    pub fn set_output_limits(&self, tool_name: &str, limits: OutputLimits) {
        self.output_policy_mut()
            .tools
            .insert(tool_name.to_string(), limits);
    }

    /// Output limits for tools without their own entry
    pub fn set_default_output_limits(&self, limits: Option<OutputLimits>) {
        self.output_policy_mut().defaults = limits;
    }

    /// Effective output limits for `tool_name`
    pub fn output_limits_for(&self, tool_name: &str) -> Option<OutputLimits> {
        let policy = self.output.read().unwrap_or_else(PoisonError::into_inner);
        policy
            .tools
            .get(tool_name)
            .or(policy.defaults.as_ref())
            .cloned()
    }

    /// Run `command` for `tool_name` and wait for it
    ///
    /// Fails with `AdmissionRejected` when the tool is at its limit.
    /// Otherwise the result is returned with bounded output.
    pub async fn run(
        &self,
        tool_name: &str,
        command: &str,
        timeout: Option<Duration>,
    ) -> Result<ExecResult> {
        let permit = self.admission.admit(
            tool_name,
            OperationContext::generate().with_type("execute"),
        )?;

        let result = self.supervisor.execute(command, timeout).await;
        let limits = self.output_limits_for(tool_name);
        drop(permit);

        Ok(result.bounded(limits.as_ref()))
    }

    /// Start `command` in the background for `tool_name`
    ///
    /// The admission slot stays taken until `wait` collects the process or
    /// `terminate` kills it.
    pub async fn spawn(
        &self,
        tool_name: &str,
        command: &str,
        timeout_hint: Option<Duration>,
    ) -> Result<AsyncStart> {
        let permit = self.admission.admit(
            tool_name,
            OperationContext::generate().with_type("execute_async"),
        )?;

        let start = self.supervisor.execute_async(command, timeout_hint).await?;
        debug!(
            token = %start.token,
            tool_name,
            operation_id = permit.operation_id(),
            "Holding admission slot for background command"
        );
        self.background().insert(start.token, permit);
        Ok(start)
    }

    /// Non-blocking status of a background command
    pub fn status(&self, token: &ProcessToken) -> Result<ProcessStatusReport> {
        self.supervisor.get_process_status(token).map_err(|e| {
            if e.is_not_found() {
                self.release_background(token);
            }
            e
        })
    }

    /// Wait for a background command, bound its output, free its slot
    ///
    /// A token the supervisor no longer knows (terminated or collected
    /// through the supervisor directly) still has its slot freed here.
    pub async fn wait(&self, token: &ProcessToken, timeout: Option<Duration>) -> Result<WaitOutcome> {
        let mut outcome = match self.supervisor.wait_for_process(token, timeout).await {
            Ok(outcome) => outcome,
            Err(e) => {
                if e.is_not_found() {
                    self.release_background(token);
                }
                return Err(e);
            }
        };

        let permit = self.background().remove(token);
        let limits = match &permit {
            Some(permit) => self.output_limits_for(permit.tool_name()),
            None => self.output.read().unwrap_or_else(PoisonError::into_inner).defaults.clone(),
        };
        drop(permit);

        outcome.result = outcome.result.bounded(limits.as_ref());
        Ok(outcome)
    }

    /// Status when `wait` is false, otherwise a bounded wait
    pub async fn query(
        &self,
        token: &ProcessToken,
        wait: bool,
        timeout: Option<Duration>,
    ) -> Result<QueryResponse> {
        if wait {
            self.wait(token, timeout).await.map(QueryResponse::Finished)
        } else {
            self.status(token).map(QueryResponse::Status)
        }
    }

    /// Kill a background command and free its slot
    pub async fn terminate(&self, token: &ProcessToken) -> bool {
        let terminated = self.supervisor.terminate_by_token(token).await;
        self.release_background(token);
        terminated
    }

    fn release_background(&self, token: &ProcessToken) {
        if let Some(permit) = self.background().remove(token) {
            debug!(
                token = %token,
                tool_name = permit.tool_name(),
                "Released background admission slot"
            );
        }
    }

    /// Finish admission-tracked operations older than `max_age`
    pub fn sweep_stale(&self, max_age: Duration) -> StaleSweep {
        self.admission.cleanup_stale_operations(max_age)
    }

    /// Sweep stale operations every `interval` until the task is aborted
    pub fn spawn_stale_sweeper(&self, interval: Duration, max_age: Duration) -> JoinHandle<()> {
        let runtime = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // First tick completes immediately
            ticker.tick().await;
            loop {
                ticker.tick().await;
                let sweep = runtime.sweep_stale(max_age);
                if sweep.cleaned_count > 0 {
                    info!(
                        cleaned_count = sweep.cleaned_count,
                        "Stale sweeper finished abandoned operations"
                    );
                }
            }
        })
    }

    /// Kill all background commands and release their slots
    pub async fn shutdown(&self) -> usize {
        let killed = self.supervisor.shutdown().await;
        self.background().clear();
        killed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::concurrency::ConcurrencyConfig;
    use crate::errors::ExecError;

    #[test]
    fn test_output_limits_lookup() {
        let runtime = ToolRuntime::default();
        assert!(runtime.output_limits_for("git").is_none());

        runtime.set_default_output_limits(Some(OutputLimits::new().with_max_total(100)));
        runtime.set_output_limits("git", OutputLimits::new().with_max_total(10));

        assert_eq!(runtime.output_limits_for("git").unwrap().max_total_length, Some(10));
        assert_eq!(runtime.output_limits_for("other").unwrap().max_total_length, Some(100));
    }

    #[test]
    fn test_from_config_registers_limits() {
        let mut config = Config::default();
        config.concurrency.limits.insert("git".to_string(), 2);
        config
            .output
            .tools
            .insert("git".to_string(), OutputLimits::new().with_max_stdout(50));

        let runtime = ToolRuntime::from_config(&config);
        assert_eq!(runtime.admission().config_for("git"), Some(ConcurrencyConfig::new(2)));
        assert_eq!(runtime.output_limits_for("git").unwrap().max_stdout_length, Some(50));
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_bounds_output_and_releases_slot() {
        let runtime = ToolRuntime::default();
        runtime.admission().register_config("t", ConcurrencyConfig::new(1));
        runtime.set_output_limits("t", OutputLimits::new().with_max_stdout(40));

        let result = runtime
            .run("t", "for i in $(seq 1 50); do echo line-$i; done", None)
            .await
            .unwrap();

        assert!(result.is_success());
        assert!(result.output().truncated);
        assert!(result.stdout().chars().count() <= 40);
        assert_eq!(runtime.admission().active_count("t"), 0);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_background_slot_held_until_wait() {
        let runtime = ToolRuntime::default();
        runtime.admission().register_config("t", ConcurrencyConfig::new(1));

        let start = runtime.spawn("t", "sleep 0.2; echo bg", None).await.unwrap();
        let err = runtime.run("t", "echo blocked", None).await.unwrap_err();
        assert!(matches!(err, ExecError::AdmissionRejected { .. }));

        let outcome = runtime.wait(&start.token, Some(Duration::from_secs(5))).await.unwrap();
        assert!(outcome.result.stdout().contains("bg"));
        assert_eq!(runtime.admission().active_count("t"), 0);
        assert!(runtime.run("t", "echo free", None).await.unwrap().is_success());
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_terminate_releases_slot() {
        let runtime = ToolRuntime::default();
        runtime.admission().register_config("t", ConcurrencyConfig::new(1));

        let start = runtime.spawn("t", "sleep 10", None).await.unwrap();
        assert_eq!(runtime.admission().active_count("t"), 1);

        assert!(runtime.terminate(&start.token).await);
        assert!(!runtime.terminate(&start.token).await);
        assert_eq!(runtime.admission().active_count("t"), 0);
        assert!(runtime.status(&start.token).unwrap_err().is_not_found());
    }
}
