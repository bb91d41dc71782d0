//! Child spawning and supervision
//!
//! Each spawned child is owned by a dedicated supervise task. Callers never
//! touch the OS handle: they hold a `ChildControl` that can request a kill,
//! observe the exit record and snapshot captured output.

use crate::errors::{ExecError, Result};
use crate::output::CommandOutput;
use futures_util::future::join_all;
use std::process::Stdio;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio::process::{Child, Command};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

const READ_CHUNK: usize = 8192;

/// Shell used to interpret command strings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellConfig {
    pub program: String,
    pub flag: String,
}

impl Default for ShellConfig {
    fn default() -> Self {
        if cfg!(windows) {
            Self::new("cmd", "/C")
        } else {
            Self::new("sh", "-c")
        }
    }
}

impl ShellConfig {
    /// Shell program plus the flag that takes a command string
    pub fn new(program: impl Into<String>, flag: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            flag: flag.into(),
        }
    }

    /// Build the OS command for `command`
    fn command(&self, command: &str) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.arg(&self.flag).arg(command);
        cmd
    }
}

/// How a supervised child ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct ExitRecord {
    /// `None` when killed by a signal or when the status was lost
    pub code: Option<i32>,
    /// Kill was requested before the child exited on its own
    pub killed: bool,
    pub wait_error: Option<String>,
}

/// Result of a bounded wait on a child
#[derive(Debug, Clone)]
pub(crate) enum ExitWait {
    Exited(ExitRecord),
    TimedOut,
    /// Supervise task vanished without publishing an exit record
    Lost,
}

/// Incrementally filled stdout/stderr buffers
#[derive(Debug, Clone, Default)]
pub(crate) struct OutputCapture {
    stdout: Arc<Mutex<Vec<u8>>>,
    stderr: Arc<Mutex<Vec<u8>>>,
}

impl OutputCapture {
    /// Decode whatever has been captured so far
    pub fn snapshot(&self) -> CommandOutput {
        let stdout = self.stdout.lock().unwrap_or_else(PoisonError::into_inner);
        let stderr = self.stderr.lock().unwrap_or_else(PoisonError::into_inner);
        CommandOutput::from_bytes(&stdout, &stderr)
    }
}

/// Caller-side view of a supervised child
#[derive(Debug, Clone)]
pub(crate) struct ChildControl {
    pid: u32,
    kill: Arc<Notify>,
    /// Set as soon as the child is reaped, before its pipes are drained
    reaped_rx: watch::Receiver<Option<ExitRecord>>,
    /// Set once output is drained too
    exit_rx: watch::Receiver<Option<ExitRecord>>,
    capture: OutputCapture,
}

impl ChildControl {
    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Exit record once the child has been reaped
    ///
    /// Available before `wait_exit` returns when a grandchild still holds
    /// the output pipes open.
    pub fn exit_record(&self) -> Option<ExitRecord> {
        self.reaped_rx.borrow().clone()
    }

    /// Ask the supervise task to force-kill the child; idempotent
    pub fn request_kill(&self) {
        self.kill.notify_one();
    }

    /// Captured output so far
    pub fn output(&self) -> CommandOutput {
        self.capture.snapshot()
    }

    /// Wait for the exit record, bounded by `limit` when given
    pub async fn wait_exit(&self, limit: Option<Duration>) -> ExitWait {
        let mut rx = self.exit_rx.clone();
        let wait = async move {
            loop {
                if let Some(record) = rx.borrow_and_update().clone() {
                    return Some(record);
                }
                if rx.changed().await.is_err() {
                    return rx.borrow().clone();
                }
            }
        };

        let record = match limit {
            Some(limit) => match tokio::time::timeout(limit, wait).await {
                Ok(record) => record,
                Err(_) => return ExitWait::TimedOut,
            },
            None => wait.await,
        };

        match record {
            Some(record) => ExitWait::Exited(record),
            None => ExitWait::Lost,
        }
    }

    /// Force-kill and wait for the supervise task to publish the exit
    pub async fn kill_and_collect(&self, drain_timeout: Duration) -> (Option<ExitRecord>, CommandOutput) {
        self.request_kill();
        // The supervise task reaps, then drains for up to `drain_timeout`
        let record = match self.wait_exit(Some(drain_timeout * 2)).await {
            ExitWait::Exited(record) => Some(record),
            ExitWait::TimedOut | ExitWait::Lost => None,
        };
        (record, self.output())
    }
}

/// Spawn `command` through `shell` and hand it to a supervise task
pub(crate) fn spawn_supervised(
    command: &str,
    shell: &ShellConfig,
    drain_timeout: Duration,
) -> Result<ChildControl> {
    let mut cmd = shell.command(command);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    // Own process group so a kill also reaches grandchildren holding the pipes
    #[cfg(unix)]
    cmd.process_group(0);

    let mut child = cmd.spawn().map_err(|e| ExecError::SpawnFailure {
        command: command.to_string(),
        reason: e.to_string(),
    })?;

    let pid = child.id().ok_or_else(|| ExecError::SpawnFailure {
        command: command.to_string(),
        reason: "process exited before its pid could be read".to_string(),
    })?;

    let capture = OutputCapture::default();
    let mut readers = Vec::with_capacity(2);
    if let Some(stdout) = child.stdout.take() {
        readers.push(tokio::spawn(pump(stdout, capture.stdout.clone())));
    }
    if let Some(stderr) = child.stderr.take() {
        readers.push(tokio::spawn(pump(stderr, capture.stderr.clone())));
    }

    let kill = Arc::new(Notify::new());
    let (reaped_tx, reaped_rx) = watch::channel(None);
    let (exit_tx, exit_rx) = watch::channel(None);

    tokio::spawn(supervise(
        child,
        pid,
        readers,
        kill.clone(),
        ExitSenders {
            reaped: reaped_tx,
            drained: exit_tx,
        },
        drain_timeout,
    ));

    Ok(ChildControl {
        pid,
        kill,
        reaped_rx,
        exit_rx,
        capture,
    })
}

async fn pump<R: AsyncRead + Unpin>(mut reader: R, sink: Arc<Mutex<Vec<u8>>>) {
    let mut buf = vec![0u8; READ_CHUNK];
    loop {
        match reader.read(&mut buf).await {
            Ok(0) => break,
            Ok(n) => sink
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .extend_from_slice(&buf[..n]),
            Err(e) => {
                trace!(error = %e, "Output pipe read failed");
                break;
            }
        }
    }
}

struct ExitSenders {
    reaped: watch::Sender<Option<ExitRecord>>,
    drained: watch::Sender<Option<ExitRecord>>,
}

async fn supervise(
    mut child: Child,
    pid: u32,
    readers: Vec<JoinHandle<()>>,
    kill: Arc<Notify>,
    senders: ExitSenders,
    drain_timeout: Duration,
) {
    let (status, killed) = tokio::select! {
        status = child.wait() => (status, false),
        _ = kill.notified() => {
            force_kill(&mut child, pid);
            (child.wait().await, true)
        }
    };

    let record = match status {
        Ok(status) => ExitRecord {
            code: status.code(),
            killed,
            wait_error: None,
        },
        Err(e) => {
            warn!(pid, error = %e, "Failed to collect exit status");
            ExitRecord {
                code: None,
                killed,
                wait_error: Some(e.to_string()),
            }
        }
    };

    // Receivers may all be gone already; nothing left to notify then
    let _ = senders.reaped.send(Some(record.clone()));

    if tokio::time::timeout(drain_timeout, join_all(readers))
        .await
        .is_err()
    {
        debug!(pid, "Output still open after exit, returning what was captured");
    }

    let _ = senders.drained.send(Some(record));
}

fn force_kill(child: &mut Child, pid: u32) {
    #[cfg(unix)]
    {
        // SAFETY: killpg takes no pointers. `child` has not been waited on,
        // so the OS cannot have recycled `pid`, and the child leads its own
        // process group (`process_group(0)` at spawn). The group id therefore
        // still names only processes we started.
        let rc = unsafe { libc::killpg(pid as libc::pid_t, libc::SIGKILL) };
        if rc != 0 {
            trace!(pid, "killpg failed, falling back to direct kill");
        }
    }

    if let Err(e) = child.start_kill() {
        trace!(pid, error = %e, "start_kill failed, child already exited");
    }
}
