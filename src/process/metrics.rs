//! Best-effort process metrics
//!
//! Sampling never fails the caller: missing data becomes `None` fields.
//! A pid that cannot be sampled is logged once, then only at trace level.

use crate::process::types::ProcessMetrics;
use chrono::DateTime;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use sysinfo::{Pid, System};
use tracing::{trace, warn};

/// Shared sampler; keeps one `System` so CPU usage has a previous sample
#[derive(Debug)]
pub struct MetricsSampler {
    system: Mutex<System>,
    reported: Mutex<HashSet<u32>>,
}

impl Default for MetricsSampler {
    fn default() -> Self {
        Self::new()
    }
}

impl MetricsSampler {
    /// Create a sampler with an empty process table
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
            reported: Mutex::new(HashSet::new()),
        }
    }

    /// Sample `pid`; `None` when the process is not visible
    pub fn sample(&self, pid: u32) -> Option<ProcessMetrics> {
        let sys_pid = Pid::from_u32(pid);
        let mut system = self.system.lock().unwrap_or_else(PoisonError::into_inner);

        if !system.refresh_process(sys_pid) {
            self.report_failure(pid, "process not visible to the OS sampler");
            return None;
        }

        let Some(process) = system.process(sys_pid) else {
            self.report_failure(pid, "process vanished during sampling");
            return None;
        };

        let cmdline = process.cmd().to_vec();

        Some(ProcessMetrics {
            cpu_percent: Some(process.cpu_usage()),
            memory_rss: Some(process.memory()),
            memory_virtual: Some(process.virtual_memory()),
            create_time: DateTime::from_timestamp(process.start_time() as i64, 0),
            os_status: Some(process.status().to_string()),
            cmdline: (!cmdline.is_empty()).then_some(cmdline),
        })
    }

    /// Drop per-pid bookkeeping once the process is no longer tracked
    pub fn forget(&self, pid: u32) {
        self.reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&pid);
    }

    fn report_failure(&self, pid: u32, reason: &str) {
        let first = self
            .reported
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(pid);
        if first {
            warn!(pid, reason, "Process metrics unavailable");
        } else {
            trace!(pid, reason, "Process metrics unavailable");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_current_process() {
        let sampler = MetricsSampler::new();
        let metrics = sampler.sample(std::process::id()).unwrap();

        assert!(metrics.memory_rss.unwrap_or(0) > 0);
        assert!(metrics.os_status.is_some());
    }

    #[test]
    fn test_unknown_pid_is_none() {
        let sampler = MetricsSampler::new();
        // Pids near u32::MAX are never allocated on supported platforms
        assert!(sampler.sample(u32::MAX - 1).is_none());
        assert!(sampler.sample(u32::MAX - 1).is_none());
        sampler.forget(u32::MAX - 1);
    }
}
