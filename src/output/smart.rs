//! Line classification for smart truncation
//!
//! A line is "important" when it looks like an error, a warning, part of a
//! stack trace, or a timestamped error record.

use once_cell::sync::Lazy;
use regex::Regex;

static ERROR_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(error|exception|failed|failure)\b").expect("error regex"));

static WARNING_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(warning|warn)\b").expect("warning regex"));

static TRACE_LINE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(stack trace|traceback)\b").expect("trace regex"));

static TIMESTAMPED_ERROR_LINE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)^\d{4}-\d{2}-\d{2}.*\b(error|exception|failed)\b")
        .expect("timestamped error regex")
});

/// Why a line was kept
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LineClass {
    TimestampedError,
    Error,
    Warning,
    StackTrace,
}

/// Classify one line; `None` for ordinary output
pub fn classify_line(line: &str) -> Option<LineClass> {
    if TIMESTAMPED_ERROR_LINE.is_match(line) {
        Some(LineClass::TimestampedError)
    } else if ERROR_LINE.is_match(line) {
        Some(LineClass::Error)
    } else if WARNING_LINE.is_match(line) {
        Some(LineClass::Warning)
    } else if TRACE_LINE.is_match(line) {
        Some(LineClass::StackTrace)
    } else {
        None
    }
}

/// Whether the line should survive smart truncation
pub fn is_important(line: &str) -> bool {
    classify_line(line).is_some()
}
