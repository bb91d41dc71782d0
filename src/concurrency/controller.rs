//! Per-tool admission controller
//!
//! Bounds the number of in-flight operations per tool name. The check and the
//! insert of `start_operation` happen under one lock, so two racing callers
//! can never both take the last slot.

use crate::concurrency::types::{
    ActiveOperation, AdmissionDecision, ConcurrencyConfig, FinishedOperation, OperationContext,
    StaleSweep, ToolActivity,
};
use crate::errors::{ExecError, Result};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

#[derive(Debug)]
struct TrackedOperation {
    tool_name: String,
    context: OperationContext,
}

#[derive(Debug, Default)]
struct ControllerState {
    configs: HashMap<String, ConcurrencyConfig>,
    active: HashMap<String, HashSet<String>>,
    operations: HashMap<String, TrackedOperation>,
}

impl ControllerState {
    fn active_count(&self, tool_name: &str) -> usize {
        self.active.get(tool_name).map_or(0, HashSet::len)
    }

    fn decide(&self, tool_name: &str) -> AdmissionDecision {
        let current = self.active_count(tool_name);
        match self.configs.get(tool_name) {
            Some(config) if current >= config.max_concurrent => {
                AdmissionDecision::reject(tool_name, current, config.max_concurrent)
            }
            Some(config) => AdmissionDecision::allow(tool_name, current, Some(config.max_concurrent)),
            None => AdmissionDecision::allow(tool_name, current, None),
        }
    }

    fn remove(&mut self, operation_id: &str) -> Option<TrackedOperation> {
        let tracked = self.operations.remove(operation_id)?;
        if let Some(ids) = self.active.get_mut(&tracked.tool_name) {
            ids.remove(operation_id);
            if ids.is_empty() {
                self.active.remove(&tracked.tool_name);
            }
        }
        Some(tracked)
    }

    fn activity(&self, tool_name: &str) -> ToolActivity {
        let mut operations: Vec<ActiveOperation> = self
            .active
            .get(tool_name)
            .into_iter()
            .flatten()
            .filter_map(|id| self.operations.get(id))
            .map(|tracked| ActiveOperation {
                operation_id: tracked.context.operation_id.clone(),
                operation_type: tracked.context.operation_type.clone(),
                duration_secs: tracked.context.elapsed().as_secs_f64(),
            })
            .collect();
        operations.sort_by(|a, b| b.duration_secs.total_cmp(&a.duration_secs));

        ToolActivity {
            tool_name: tool_name.to_string(),
            count: operations.len(),
            operations,
        }
    }
}

/// Shared admission controller; clones share state
#[derive(Debug, Clone, Default)]
pub struct ConcurrencyController {
    state: Arc<Mutex<ControllerState>>,
}

impl ConcurrencyController {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, ControllerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Set or replace the limit for `tool_name`
    ///
    /// A limit of zero would block the tool forever and is raised to 1.
    pub fn register_config(&self, tool_name: &str, mut config: ConcurrencyConfig) {
        if config.max_concurrent == 0 {
            warn!(tool_name, "max_concurrent of 0 raised to 1");
            config.max_concurrent = 1;
        }
        self.lock().configs.insert(tool_name.to_string(), config);
        debug!(tool_name, max_concurrent = config.max_concurrent, "Registered concurrency config");
    }

    /// Limit configured for `tool_name`, if any
    pub fn config_for(&self, tool_name: &str) -> Option<ConcurrencyConfig> {
        self.lock().configs.get(tool_name).copied()
    }

    /// Informational check; does not reserve a slot
    pub fn can_start_operation(&self, tool_name: &str, _context: &OperationContext) -> AdmissionDecision {
        self.lock().decide(tool_name)
    }

    /// Admit and track `context` under `tool_name`
    ///
    /// Fails with `AdmissionRejected` when the tool is at its limit and with
    /// `DuplicateOperation` when the id is already tracked.
    pub fn start_operation(
        &self,
        tool_name: &str,
        context: OperationContext,
    ) -> Result<AdmissionDecision> {
        let operation_id = context.operation_id.clone();
        let decision = {
            let mut state = self.lock();
            if state.operations.contains_key(&operation_id) {
                return Err(ExecError::DuplicateOperation { operation_id });
            }

            let decision = state.decide(tool_name).into_result()?;
            state
                .active
                .entry(tool_name.to_string())
                .or_default()
                .insert(operation_id.clone());
            state.operations.insert(
                operation_id.clone(),
                TrackedOperation {
                    tool_name: tool_name.to_string(),
                    context,
                },
            );
            decision
        };

        info!(tool_name, operation_id = %operation_id, "Started tracking operation");
        Ok(decision)
    }

    /// Stop tracking `operation_id`
    pub fn finish_operation(&self, operation_id: &str) -> Result<FinishedOperation> {
        let removed = self.lock().remove(operation_id);
        let Some(tracked) = removed else {
            warn!(operation_id, "Attempted to finish unknown operation");
            return Err(ExecError::OperationNotFound {
                operation_id: operation_id.to_string(),
            });
        };

        let duration = tracked.context.elapsed();
        info!(
            operation_id,
            tool_name = %tracked.tool_name,
            duration_secs = duration.as_secs_f64(),
            "Finished tracking operation"
        );
        Ok(FinishedOperation {
            operation_id: operation_id.to_string(),
            tool_name: tracked.tool_name,
            duration,
        })
    }

    /// Finish every operation older than `max_age`
    pub fn cleanup_stale_operations(&self, max_age: Duration) -> StaleSweep {
        let mut stale: Vec<String> = {
            let mut state = self.lock();
            let ids: Vec<String> = state
                .operations
                .iter()
                .filter(|(_, tracked)| tracked.context.elapsed() > max_age)
                .map(|(id, _)| id.clone())
                .collect();
            for id in &ids {
                state.remove(id);
            }
            ids
        };
        stale.sort();

        info!(
            cleaned_count = stale.len(),
            max_age_secs = max_age.as_secs_f64(),
            "Cleaned up stale operations"
        );
        StaleSweep {
            cleaned_count: stale.len(),
            max_age_seconds: max_age.as_secs_f64(),
            stale_operations: stale,
        }
    }

    /// Snapshot of in-flight operations, for one tool or all of them
    pub fn get_active_operations(&self, tool_name: Option<&str>) -> Vec<ToolActivity> {
        let state = self.lock();
        match tool_name {
            Some(tool_name) => vec![state.activity(tool_name)],
            None => {
                let mut tools: Vec<&String> = state.active.keys().collect();
                tools.sort();
                tools.into_iter().map(|tool| state.activity(tool)).collect()
            }
        }
    }

    /// Number of operations tracked for `tool_name`
    pub fn active_count(&self, tool_name: &str) -> usize {
        self.lock().active_count(tool_name)
    }

    /// Start an operation and finish it when the permit is dropped
    pub fn admit(&self, tool_name: &str, context: OperationContext) -> Result<AdmissionPermit> {
        let operation_id = context.operation_id.clone();
        self.start_operation(tool_name, context)?;
        Ok(AdmissionPermit {
            controller: self.clone(),
            operation_id,
            tool_name: tool_name.to_string(),
            released: false,
        })
    }
}

/// Slot held for one admitted operation
///
/// Dropping the permit finishes the operation.
#[derive(Debug)]
pub struct AdmissionPermit {
    controller: ConcurrencyController,
    operation_id: String,
    tool_name: String,
    released: bool,
}

impl AdmissionPermit {
    pub fn operation_id(&self) -> &str {
        &self.operation_id
    }

    pub fn tool_name(&self) -> &str {
        &self.tool_name
    }

    /// Finish now instead of on drop
    pub fn release(mut self) -> Result<FinishedOperation> {
        self.released = true;
        self.controller.finish_operation(&self.operation_id)
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        // A stale sweep may already have finished it
        if self.controller.lock().remove(&self.operation_id).is_some() {
            debug!(operation_id = %self.operation_id, "Released admission permit");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    fn aged(id: &str, age: Duration) -> OperationContext {
        let started = Instant::now()
            .checked_sub(age)
            .expect("monotonic clock too close to its origin");
        OperationContext::new(id).with_started_at(started)
    }

    #[test]
    fn test_unconfigured_tool_is_unlimited_but_tracked() {
        let controller = ConcurrencyController::new();
        for i in 0..5 {
            controller
                .start_operation("free", OperationContext::new(format!("op-{}", i)))
                .unwrap();
        }
        assert_eq!(controller.active_count("free"), 5);
        let decision = controller.can_start_operation("free", &OperationContext::generate());
        assert!(decision.allowed);
        assert_eq!(decision.max_allowed, None);
    }

    #[test]
    fn test_limit_enforced_then_released() {
        let controller = ConcurrencyController::new();
        controller.register_config("t", ConcurrencyConfig::new(2));

        controller.start_operation("t", OperationContext::new("a")).unwrap();
        controller.start_operation("t", OperationContext::new("b")).unwrap();

        let err = controller.start_operation("t", OperationContext::new("c")).unwrap_err();
        assert!(matches!(err, ExecError::AdmissionRejected { current: 2, max: 2, .. }));
        assert_eq!(controller.active_count("t"), 2);

        let check = controller.can_start_operation("t", &OperationContext::new("c"));
        assert!(!check.allowed);
        assert_eq!(check.current_operations, 2);

        controller.finish_operation("a").unwrap();
        assert!(controller.start_operation("t", OperationContext::new("c")).is_ok());
    }

    #[test]
    fn test_zero_limit_raised_to_one() {
        let controller = ConcurrencyController::new();
        controller.register_config("t", ConcurrencyConfig::new(0));
        assert_eq!(controller.config_for("t"), Some(ConcurrencyConfig::new(1)));

        assert!(controller.start_operation("t", OperationContext::new("a")).is_ok());
        assert!(controller.start_operation("t", OperationContext::new("b")).is_err());
    }

    #[test]
    fn test_duplicate_and_unknown_operations() {
        let controller = ConcurrencyController::new();
        controller.start_operation("t", OperationContext::new("dup")).unwrap();

        let err = controller.start_operation("t", OperationContext::new("dup")).unwrap_err();
        assert!(matches!(err, ExecError::DuplicateOperation { .. }));

        let finished = controller.finish_operation("dup").unwrap();
        assert_eq!(finished.tool_name, "t");
        assert!(controller.finish_operation("dup").unwrap_err().is_not_found());
    }

    #[test]
    fn test_cleanup_stale_operations() {
        let controller = ConcurrencyController::new();
        controller.register_config("t", ConcurrencyConfig::new(3));
        controller.start_operation("t", aged("old", Duration::from_secs(120))).unwrap();
        controller.start_operation("t", OperationContext::new("fresh")).unwrap();

        let sweep = controller.cleanup_stale_operations(Duration::from_secs(60));
        assert_eq!(sweep.cleaned_count, 1);
        assert_eq!(sweep.stale_operations, vec!["old".to_string()]);

        let active = controller.get_active_operations(Some("t"));
        assert_eq!(active[0].count, 1);
        assert_eq!(active[0].operations[0].operation_id, "fresh");
    }

    #[test]
    fn test_active_operations_all_tools() {
        let controller = ConcurrencyController::new();
        controller.start_operation("b", OperationContext::new("1")).unwrap();
        controller.start_operation("a", OperationContext::new("2")).unwrap();

        let all = controller.get_active_operations(None);
        let names: Vec<&str> = all.iter().map(|t| t.tool_name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);

        let missing = controller.get_active_operations(Some("none"));
        assert_eq!(missing[0].count, 0);
    }

    #[test]
    fn test_permit_releases_on_drop() {
        let controller = ConcurrencyController::new();
        controller.register_config("t", ConcurrencyConfig::new(1));

        {
            let permit = controller.admit("t", OperationContext::new("p")).unwrap();
            assert_eq!(permit.tool_name(), "t");
            assert!(controller.admit("t", OperationContext::new("q")).is_err());
        }
        assert_eq!(controller.active_count("t"), 0);

        let permit = controller.admit("t", OperationContext::new("q")).unwrap();
        assert_eq!(permit.release().unwrap().operation_id, "q");
        assert_eq!(controller.active_count("t"), 0);
    }

    #[test]
    fn test_concurrent_start_respects_limit() {
        let controller = ConcurrencyController::new();
        controller.register_config("t", ConcurrencyConfig::new(3));

        let handles: Vec<_> = (0..16)
            .map(|i| {
                let controller = controller.clone();
                std::thread::spawn(move || {
                    controller
                        .start_operation("t", OperationContext::new(format!("op-{}", i)))
                        .is_ok()
                })
            })
            .collect();
        let admitted = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();

        assert_eq!(admitted, 3);
        assert_eq!(controller.active_count("t"), 3);
    }
}
