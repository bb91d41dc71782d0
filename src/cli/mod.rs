//! CLI module for cmdexec
//!
//! Argument parsing and terminal rendering of results.

pub mod args;
pub mod render;

pub use args::{Args, Commands, LimitArgs, RunArgs, SpawnArgs, Verbosity};
