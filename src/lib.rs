//! cmdexec - command execution core for agent tool plugins
//!
//! Three cooperating pieces:
//!
//! - **process**: spawns shell commands, tracks background runs by opaque
//!   token, and hands each result out exactly once
//! - **concurrency**: per-tool admission control over in-flight operations
//! - **output**: caps stdout/stderr with end, start, middle or smart truncation
//!
//! [`runtime::ToolRuntime`] wires them into the usual flow: admit, run,
//! bound, release.

pub mod errors;
pub mod process;
pub mod concurrency;
pub mod output;
pub mod runtime;

// Re-export commonly used types
pub use errors::{ErrorKind, ExecError, Result};
pub use runtime::ToolRuntime;

// Ambient layers
pub mod config;
pub mod logging;
pub mod cli;
