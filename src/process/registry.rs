//! Token registry for supervised processes
//!
//! Sole index of owned pids. Handles are keyed by token; a secondary index
//! maps each pid to the token that most recently claimed it. The OS may hand
//! a reaped pid to a new child while the old token is still tracked, so the
//! pid index is repointed on collision and never used to reach a handle by
//! token. Both maps are edited under one lock and no I/O happens while it is
//! held. Removal is the single point of consumption: whoever removes a token
//! owns its terminal result.

use crate::process::spawn::ChildControl;
use crate::process::types::{ProcessState, ProcessToken};
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tracing::debug;

/// Registry entry owning one supervised process
#[derive(Debug, Clone)]
pub(crate) struct ProcessHandle {
    pub token: ProcessToken,
    pub pid: u32,
    pub command: String,
    pub started: Instant,
    pub state: ProcessState,
    /// Timeout supplied at spawn; never enforced by the registry
    pub timeout_hint: Option<Duration>,
    pub control: ChildControl,
}

#[derive(Debug, Default)]
struct RegistryInner {
    handles: HashMap<ProcessToken, ProcessHandle>,
    pids: HashMap<u32, ProcessToken>,
}

impl RegistryInner {
    fn take(&mut self, token: &ProcessToken, terminal: ProcessState) -> Option<ProcessHandle> {
        let mut handle = self.handles.remove(token)?;
        // Only drop the pid entry if it still points at this token
        if self.pids.get(&handle.pid) == Some(token) {
            self.pids.remove(&handle.pid);
        }
        debug_assert!(handle.state.can_transition_to(terminal));
        handle.state = terminal;
        Some(handle)
    }
}

/// Explicitly constructed registry; lives as long as its supervisor
#[derive(Debug, Default)]
pub(crate) struct ProcessRegistry {
    inner: Mutex<RegistryInner>,
}

impl ProcessRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Track a freshly spawned process under a new token
    pub fn insert(
        &self,
        command: &str,
        timeout_hint: Option<Duration>,
        control: ChildControl,
    ) -> ProcessToken {
        let pid = control.pid();
        let handle = ProcessHandle {
            token: ProcessToken::new(),
            pid,
            command: command.to_string(),
            started: Instant::now(),
            state: ProcessState::Running,
            timeout_hint,
            control,
        };
        let token = handle.token;

        let mut inner = self.lock();
        if let Some(previous) = inner.pids.insert(pid, token) {
            debug!(pid, previous = %previous, token = %token, "Pid reused, repointed to newest token");
        }
        inner.handles.insert(token, handle);
        token
    }

    /// Copy of the handle for `token`
    pub fn get(&self, token: &ProcessToken) -> Option<ProcessHandle> {
        self.lock().handles.get(token).cloned()
    }

    /// Copy of the handle currently owning `pid`
    pub fn get_by_pid(&self, pid: u32) -> Option<ProcessHandle> {
        let inner = self.lock();
        let token = inner.pids.get(&pid)?;
        inner.handles.get(token).cloned()
    }

    /// Remove `token`, recording its terminal state; `None` if already gone
    pub fn remove(&self, token: &ProcessToken, terminal: ProcessState) -> Option<ProcessHandle> {
        let handle = self.lock().take(token, terminal);
        if let Some(handle) = &handle {
            debug!(token = %token, pid = handle.pid, state = ?terminal, "Released process token");
        }
        handle
    }

    /// Remove whichever token owns `pid`
    pub fn remove_by_pid(&self, pid: u32, terminal: ProcessState) -> Option<ProcessHandle> {
        let mut inner = self.lock();
        let token = *inner.pids.get(&pid)?;
        inner.take(&token, terminal)
    }

    /// Remove everything
    pub fn drain(&self, terminal: ProcessState) -> Vec<ProcessHandle> {
        let mut inner = self.lock();
        inner.pids.clear();
        inner
            .handles
            .drain()
            .map(|(_, mut handle)| {
                handle.state = terminal;
                handle
            })
            .collect()
    }

    /// Copies of every tracked handle
    pub fn snapshot(&self) -> Vec<ProcessHandle> {
        self.lock().handles.values().cloned().collect()
    }

    /// Number of tracked processes
    pub fn len(&self) -> usize {
        self.lock().handles.len()
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use crate::process::spawn::{spawn_supervised, ShellConfig};

    fn spawn(command: &str) -> ChildControl {
        spawn_supervised(command, &ShellConfig::default(), Duration::from_secs(1)).unwrap()
    }

    #[tokio::test]
    async fn test_insert_and_get() {
        let registry = ProcessRegistry::new();
        let control = spawn("true");
        let pid = control.pid();
        let token = registry.insert("true", Some(Duration::from_secs(3)), control);

        let handle = registry.get(&token).unwrap();
        assert_eq!(handle.pid, pid);
        assert_eq!(handle.state, ProcessState::Running);
        assert_eq!(handle.timeout_hint, Some(Duration::from_secs(3)));
        assert_eq!(registry.get_by_pid(pid).unwrap().token, token);
        assert_eq!(registry.len(), 1);
    }

    #[tokio::test]
    async fn test_remove_once() {
        let registry = ProcessRegistry::new();
        let token = registry.insert("true", None, spawn("true"));

        let handle = registry.remove(&token, ProcessState::Completed).unwrap();
        assert_eq!(handle.state, ProcessState::Completed);
        assert!(registry.remove(&token, ProcessState::Completed).is_none());
        assert!(registry.get(&token).is_none());
        assert_eq!(registry.len(), 0);
    }

    #[tokio::test]
    async fn test_remove_by_pid_and_drain() {
        let registry = ProcessRegistry::new();
        let control = spawn("true");
        let pid = control.pid();
        let first = registry.insert("true", None, control);
        registry.insert("true", None, spawn("true"));

        let handle = registry.remove_by_pid(pid, ProcessState::Terminated).unwrap();
        assert_eq!(handle.token, first);
        assert!(registry.get(&first).is_none());

        let rest = registry.drain(ProcessState::Terminated);
        assert_eq!(rest.len(), 1);
        assert_eq!(registry.len(), 0);
        assert!(registry.snapshot().is_empty());
    }

    #[tokio::test]
    async fn test_reused_pid_keeps_tokens_apart() {
        let registry = ProcessRegistry::new();
        let control = spawn("sleep 5");
        let pid = control.pid();

        let old = registry.insert("old-cmd", None, control.clone());
        let new = registry.insert("new-cmd", None, control);
        assert_eq!(registry.len(), 2);

        assert_eq!(registry.get(&old).unwrap().command, "old-cmd");
        assert_eq!(registry.get(&new).unwrap().command, "new-cmd");
        assert_eq!(registry.get_by_pid(pid).unwrap().token, new);

        // Consuming the stale token leaves the newer owner reachable
        let stale = registry.remove(&old, ProcessState::Completed).unwrap();
        assert_eq!(stale.command, "old-cmd");
        assert_eq!(registry.get(&new).unwrap().command, "new-cmd");
        assert_eq!(registry.get_by_pid(pid).unwrap().token, new);

        let current = registry.remove_by_pid(pid, ProcessState::Terminated).unwrap();
        assert_eq!(current.token, new);
        assert!(registry.get_by_pid(pid).is_none());
        assert_eq!(registry.len(), 0);
        current.control.request_kill();
    }
}
