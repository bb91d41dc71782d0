//! Command-line argument parsing for cmdexec
//!
//! Provides clap-based CLI with subcommands and verbosity control.

use crate::output::{OutputLimits, TruncateStrategy};
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::time::Duration;

/// cmdexec - supervised shell command execution with bounded output
#[derive(Parser, Debug)]
#[command(name = "cmdexec")]
#[command(author = "Jerome (Kubashen) Naidoo")]
#[command(version)]
#[command(about = "Run shell commands under supervision with admission control and bounded output", long_about = None)]
pub struct Args {
    /// Configuration file path
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Verbosity level: -q (quiet), default (normal), -v (verbose), -vv (very verbose)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Quiet mode (only warnings and errors are logged)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    /// Subcommand
    #[command(subcommand)]
    pub command: Commands,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a command and wait for it
    Run(RunArgs),

    /// Start a command in the background, poll its status, then collect it
    Spawn(SpawnArgs),

    /// Display the effective configuration
    Config,
}

/// Output limit flags shared by run and spawn
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct LimitArgs {
    /// Truncation strategy: end, start, middle or smart
    #[arg(long)]
    pub strategy: Option<String>,

    /// Maximum stdout length in characters
    #[arg(long)]
    pub max_stdout: Option<usize>,

    /// Maximum stderr length in characters
    #[arg(long)]
    pub max_stderr: Option<usize>,

    /// Maximum combined stdout + stderr length in characters
    #[arg(long)]
    pub max_total: Option<usize>,

    /// Lines kept from the start when truncating
    #[arg(long)]
    pub first_lines: Option<usize>,

    /// Lines kept from the end when truncating
    #[arg(long)]
    pub last_lines: Option<usize>,

    /// Keep the untruncated text alongside the bounded one
    #[arg(long)]
    pub raw: bool,
}

/// Arguments of `cmdexec run`
#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    /// Shell command to execute
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Tool name used for admission control and output limits
    #[arg(long, default_value = "shell")]
    pub tool: String,

    /// Kill the command after this many seconds
    #[arg(short, long)]
    pub timeout: Option<u64>,

    #[command(flatten)]
    pub limits: LimitArgs,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments of `cmdexec spawn`
#[derive(ClapArgs, Debug, Clone)]
pub struct SpawnArgs {
    /// Shell command to execute
    #[arg(value_name = "COMMAND")]
    pub command: String,

    /// Tool name used for admission control and output limits
    #[arg(long, default_value = "shell")]
    pub tool: String,

    /// Timeout recorded with the process (not enforced)
    #[arg(long)]
    pub timeout_hint: Option<u64>,

    /// Bound the final wait to this many seconds
    #[arg(short, long)]
    pub wait_timeout: Option<u64>,

    /// Status polling interval in milliseconds
    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,

    #[command(flatten)]
    pub limits: LimitArgs,

    /// Print the result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Verbosity level enum
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verbosity {
    Quiet,
    Normal,
    Verbose,
    VeryVerbose,
}

impl Args {
    /// Get verbosity level based on flags
    pub fn verbosity(&self) -> Verbosity {
        if self.quiet {
            Verbosity::Quiet
        } else {
            match self.verbose {
                0 => Verbosity::Normal,
                1 => Verbosity::Verbose,
                _ => Verbosity::VeryVerbose,
            }
        }
    }
}

impl Verbosity {
    /// Convert to string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Verbosity::Quiet => "quiet",
            Verbosity::Normal => "normal",
            Verbosity::Verbose => "verbose",
            Verbosity::VeryVerbose => "very_verbose",
        }
    }

    /// Log filter for this level; `None` keeps the configured filter
    pub fn log_filter(&self) -> Option<&'static str> {
        match self {
            Verbosity::Quiet => Some("cmdexec=warn"),
            Verbosity::Normal => None,
            Verbosity::Verbose => Some("cmdexec=debug"),
            Verbosity::VeryVerbose => Some("cmdexec=trace"),
        }
    }
}

impl LimitArgs {
    /// Whether any limit flag was given
    pub fn is_empty(&self) -> bool {
        self.strategy.is_none()
            && self.max_stdout.is_none()
            && self.max_stderr.is_none()
            && self.max_total.is_none()
            && self.first_lines.is_none()
            && self.last_lines.is_none()
            && !self.raw
    }

    /// Overlay the flags on `base`; `None` when no flags and no base
    pub fn apply_to(&self, base: Option<OutputLimits>) -> Option<OutputLimits> {
        if self.is_empty() {
            return base;
        }

        let mut limits = base.unwrap_or_default();
        if let Some(strategy) = &self.strategy {
            limits = limits.with_strategy(TruncateStrategy::parse(strategy));
        }
        if let Some(max) = self.max_stdout {
            limits = limits.with_max_stdout(max);
        }
        if let Some(max) = self.max_stderr {
            limits = limits.with_max_stderr(max);
        }
        if let Some(max) = self.max_total {
            limits = limits.with_max_total(max);
        }
        if let Some(lines) = self.first_lines {
            limits = limits.with_first_lines(lines);
        }
        if let Some(lines) = self.last_lines {
            limits = limits.with_last_lines(lines);
        }
        if self.raw {
            limits = limits.with_preserve_raw(true);
        }
        Some(limits)
    }
}

impl RunArgs {
    pub fn timeout(&self) -> Option<Duration> {
        self.timeout.map(Duration::from_secs)
    }
}

impl SpawnArgs {
    pub fn timeout_hint(&self) -> Option<Duration> {
        self.timeout_hint.map(Duration::from_secs)
    }

    pub fn wait_timeout(&self) -> Option<Duration> {
        self.wait_timeout.map(Duration::from_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_ms.max(10))
    }
}
