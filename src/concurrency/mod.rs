//! Per-tool concurrency admission control

pub mod controller;
pub mod types;

pub use controller::{AdmissionPermit, ConcurrencyController};
pub use types::{
    ActiveOperation, AdmissionDecision, ConcurrencyConfig, FinishedOperation, OperationContext,
    StaleSweep, ToolActivity,
};
