//! Error types for the command execution core
//!
//! Every public operation reports failure as a value: either an
//! `ExecResult::Failure` (process outcomes) or one of these variants.

use serde::Serialize;
use thiserror::Error;

/// Main error type for the execution core
#[derive(Error, Debug)]
pub enum ExecError {
    /// The OS refused to start the process; no token was issued
    #[error("Failed to spawn '{command}': {reason}")]
    SpawnFailure { command: String, reason: String },

    /// Unknown, consumed or terminated token
    #[error("Process with token {token} not found")]
    ProcessNotFound { token: String },

    /// Per-tool concurrency limit reached
    #[error(
        "Operation rejected: maximum concurrent operations ({max}) already running for tool '{tool_name}' ({current} active)"
    )]
    AdmissionRejected {
        tool_name: String,
        current: usize,
        max: usize,
    },

    /// finish_operation on an id that is not tracked
    #[error("Operation not found: {operation_id}")]
    OperationNotFound { operation_id: String },

    /// start_operation with an id that is already in flight
    #[error("Operation already in flight: {operation_id}")]
    DuplicateOperation { operation_id: String },

    /// Configuration errors
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// I/O errors
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

/// Coarse classification used by callers that only branch on the category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SpawnFailure,
    NotFound,
    AdmissionRejected,
    Config,
    Io,
}

impl ExecError {
    /// Category of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExecError::SpawnFailure { .. } => ErrorKind::SpawnFailure,
            ExecError::ProcessNotFound { .. } | ExecError::OperationNotFound { .. } => {
                ErrorKind::NotFound
            }
            ExecError::AdmissionRejected { .. } | ExecError::DuplicateOperation { .. } => {
                ErrorKind::AdmissionRejected
            }
            ExecError::ConfigError(_) => ErrorKind::Config,
            ExecError::IoError(_) => ErrorKind::Io,
        }
    }

    /// True for unknown tokens and operations
    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

/// Result type alias for execution core operations
pub type Result<T> = std::result::Result<T, ExecError>;
