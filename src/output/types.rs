//! Output bounding types
//!
//! Limits and captured text for the output filter.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Default marker inserted where text was cut
pub const DEFAULT_TRUNCATE_MESSAGE: &str = "\n... (truncated)";

/// Which part of oversized text to keep
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum TruncateStrategy {
    /// Keep the head
    #[default]
    End,

    /// Keep the tail
    Start,

    /// Keep head and tail
    Middle,

    /// Keep error/warning lines plus first/last windows
    Smart,

    /// Unrecognised name; hard head-cut
    Unknown(String),
}

impl TruncateStrategy {
    /// Parse a strategy name (case-insensitive)
    pub fn parse(name: &str) -> Self {
        match name.trim().to_ascii_lowercase().as_str() {
            "end" => TruncateStrategy::End,
            "start" => TruncateStrategy::Start,
            "middle" => TruncateStrategy::Middle,
            "smart" => TruncateStrategy::Smart,
            _ => TruncateStrategy::Unknown(name.to_string()),
        }
    }

    /// Strategy name as written in configs
    pub fn as_str(&self) -> &str {
        match self {
            TruncateStrategy::End => "end",
            TruncateStrategy::Start => "start",
            TruncateStrategy::Middle => "middle",
            TruncateStrategy::Smart => "smart",
            TruncateStrategy::Unknown(name) => name,
        }
    }
}

impl From<String> for TruncateStrategy {
    fn from(name: String) -> Self {
        TruncateStrategy::parse(&name)
    }
}

impl From<TruncateStrategy> for String {
    fn from(strategy: TruncateStrategy) -> Self {
        strategy.as_str().to_string()
    }
}

impl fmt::Display for TruncateStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Size caps for captured stdout/stderr
///
/// All lengths are character counts on decoded text. A limit of `None` or
/// `Some(0)` disables that cap.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputLimits {
    pub max_stdout_length: Option<usize>,
    pub max_stderr_length: Option<usize>,
    pub max_total_length: Option<usize>,
    pub truncate_strategy: TruncateStrategy,
    pub preserve_first_lines: Option<usize>,
    pub preserve_last_lines: Option<usize>,
    /// Snapshot untouched text into `raw_stdout` / `raw_stderr`
    pub preserve_raw: bool,
    pub truncate_message: String,
}

impl Default for OutputLimits {
    fn default() -> Self {
        Self {
            max_stdout_length: None,
            max_stderr_length: None,
            max_total_length: None,
            truncate_strategy: TruncateStrategy::End,
            preserve_first_lines: None,
            preserve_last_lines: None,
            preserve_raw: false,
            truncate_message: DEFAULT_TRUNCATE_MESSAGE.to_string(),
        }
    }
}

impl OutputLimits {
    /// Limits with every cap disabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Set stdout cap
    pub fn with_max_stdout(mut self, max: usize) -> Self {
        self.max_stdout_length = Some(max);
        self
    }

    /// Set stderr cap
    pub fn with_max_stderr(mut self, max: usize) -> Self {
        self.max_stderr_length = Some(max);
        self
    }

    /// Set combined cap
    pub fn with_max_total(mut self, max: usize) -> Self {
        self.max_total_length = Some(max);
        self
    }

    /// Set truncation strategy
    pub fn with_strategy(mut self, strategy: TruncateStrategy) -> Self {
        self.truncate_strategy = strategy;
        self
    }

    /// Keep the first N lines where the strategy allows it
    pub fn with_first_lines(mut self, lines: usize) -> Self {
        self.preserve_first_lines = Some(lines);
        self
    }

    /// Keep the last N lines where the strategy allows it
    pub fn with_last_lines(mut self, lines: usize) -> Self {
        self.preserve_last_lines = Some(lines);
        self
    }

    /// Keep untouched copies of the text
    pub fn with_preserve_raw(mut self, preserve: bool) -> Self {
        self.preserve_raw = preserve;
        self
    }

    /// Replace the truncation marker
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.truncate_message = message.into();
        self
    }

    pub(crate) fn stdout_cap(&self) -> Option<usize> {
        self.max_stdout_length.filter(|max| *max > 0)
    }

    pub(crate) fn stderr_cap(&self) -> Option<usize> {
        self.max_stderr_length.filter(|max| *max > 0)
    }

    pub(crate) fn total_cap(&self) -> Option<usize> {
        self.max_total_length.filter(|max| *max > 0)
    }
}

/// Captured process text, possibly bounded
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CommandOutput {
    /// Standard output
    pub stdout: String,

    /// Standard error
    pub stderr: String,

    /// Untouched stdout when `preserve_raw` was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stdout: Option<String>,

    /// Untouched stderr when `preserve_raw` was requested
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_stderr: Option<String>,

    /// Whether any stream was cut
    #[serde(default)]
    pub truncated: bool,
}

impl CommandOutput {
    /// Create output from decoded streams
    pub fn new(stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            ..Default::default()
        }
    }

    /// Decode raw bytes lossily
    pub fn from_bytes(stdout: &[u8], stderr: &[u8]) -> Self {
        Self::new(
            String::from_utf8_lossy(stdout).into_owned(),
            String::from_utf8_lossy(stderr).into_owned(),
        )
    }

    /// Combined character count of stdout and stderr
    pub fn total_len(&self) -> usize {
        self.stdout.chars().count() + self.stderr.chars().count()
    }
}
