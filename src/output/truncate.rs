//! Truncation strategies
//!
//! Each strategy cuts text to at most `max_length` characters including the
//! marker. When the budget cannot even hold the marker, the marker alone is
//! returned.

use crate::output::smart::is_important;
use crate::output::types::{OutputLimits, TruncateStrategy};
use tracing::debug;

/// Lines kept at the head by smart truncation when unset
const SMART_DEFAULT_FIRST_LINES: usize = 5;

/// Lines kept at the tail by smart truncation when unset
const SMART_DEFAULT_LAST_LINES: usize = 10;

/// Smallest remainder worth spending on a partial important line
const SMART_MIN_PARTIAL_LINE: usize = 10;

const ELLIPSIS: &str = "...";

/// Number of characters in `text`
pub fn char_len(text: &str) -> usize {
    text.chars().count()
}

/// First `n` characters
pub fn head(text: &str, n: usize) -> &str {
    match text.char_indices().nth(n) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

/// Last `n` characters
pub fn tail(text: &str, n: usize) -> &str {
    if n == 0 {
        return "";
    }
    match text.char_indices().rev().nth(n - 1) {
        Some((idx, _)) => &text[idx..],
        None => text,
    }
}

/// Characters left for content once the marker is placed
fn content_budget(max_length: usize, marker: &str) -> Option<usize> {
    let budget = max_length.checked_sub(char_len(marker));
    if budget.is_none() {
        debug!(max_length, marker_len = char_len(marker), "Budget smaller than marker, emitting marker only");
    }
    budget
}

/// Truncate `text` to `max_length` characters using the configured strategy
///
/// Text already within the limit is returned unchanged.
pub fn truncate_text(text: &str, max_length: usize, limits: &OutputLimits) -> String {
    if char_len(text) <= max_length {
        return text.to_string();
    }

    let marker = limits.truncate_message.as_str();

    match &limits.truncate_strategy {
        TruncateStrategy::End => truncate_end(text, max_length, marker, limits),
        TruncateStrategy::Start => truncate_start(text, max_length, marker, limits),
        TruncateStrategy::Middle => truncate_middle(text, max_length, marker, limits),
        TruncateStrategy::Smart => truncate_smart(text, max_length, marker, limits),
        TruncateStrategy::Unknown(name) => {
            debug!(strategy = %name, "Unknown truncation strategy, cutting head");
            cut_head(text, max_length, marker)
        }
    }
}

fn cut_head(text: &str, max_length: usize, marker: &str) -> String {
    match content_budget(max_length, marker) {
        Some(budget) => format!("{}{}", head(text, budget), marker),
        None => marker.to_string(),
    }
}

fn cut_tail(text: &str, max_length: usize, marker: &str) -> String {
    match content_budget(max_length, marker) {
        Some(budget) => format!("{}{}", marker, tail(text, budget)),
        None => marker.to_string(),
    }
}

/// Keep the beginning
pub fn truncate_end(text: &str, max_length: usize, marker: &str, limits: &OutputLimits) -> String {
    let first = limits.preserve_first_lines.unwrap_or(0);

    if first > 0 {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() > first {
            let preserved = lines[..first].join("\n");
            if char_len(&preserved) + char_len(marker) <= max_length {
                return preserved + marker;
            }
        }
    }

    cut_head(text, max_length, marker)
}

/// Keep the end
pub fn truncate_start(
    text: &str,
    max_length: usize,
    marker: &str,
    limits: &OutputLimits,
) -> String {
    let last = limits.preserve_last_lines.unwrap_or(0);

    if last > 0 {
        let lines: Vec<&str> = text.split('\n').collect();
        if lines.len() > last {
            let preserved = lines[lines.len() - last..].join("\n");
            if char_len(&preserved) + char_len(marker) <= max_length {
                return format!("{}{}", marker, preserved);
            }
        }
    }

    cut_tail(text, max_length, marker)
}

/// Keep both ends
pub fn truncate_middle(
    text: &str,
    max_length: usize,
    marker: &str,
    limits: &OutputLimits,
) -> String {
    let first = limits.preserve_first_lines.unwrap_or(0);
    let last = limits.preserve_last_lines.unwrap_or(0);

    if first > 0 || last > 0 {
        let lines: Vec<&str> = text.split('\n').collect();
        let first_text = lines[..first.min(lines.len())].join("\n");
        let last_text = lines[lines.len() - last.min(lines.len())..].join("\n");

        if char_len(&first_text) + char_len(&last_text) + char_len(marker) <= max_length {
            match (first_text.is_empty(), last_text.is_empty()) {
                (false, false) => return format!("{}{}{}", first_text, marker, last_text),
                (false, true) => return first_text + marker,
                (true, false) => return format!("{}{}", marker, last_text),
                (true, true) => {}
            }
        }
    }

    let Some(available) = content_budget(max_length, marker) else {
        return marker.to_string();
    };
    let head_len = available / 2;

    format!(
        "{}{}{}",
        head(text, head_len),
        marker,
        tail(text, available - head_len)
    )
}

/// Keep error-looking lines plus the head and tail windows
pub fn truncate_smart(
    text: &str,
    max_length: usize,
    marker: &str,
    limits: &OutputLimits,
) -> String {
    let lines: Vec<&str> = text.split('\n').collect();
    let important: Vec<usize> = lines
        .iter()
        .enumerate()
        .filter(|(_, line)| is_important(line))
        .map(|(idx, _)| idx)
        .collect();

    if important.is_empty() {
        return truncate_middle(text, max_length, marker, limits);
    }

    let first = limits.preserve_first_lines.unwrap_or(SMART_DEFAULT_FIRST_LINES);
    let last = limits.preserve_last_lines.unwrap_or(SMART_DEFAULT_LAST_LINES);

    // Union of important lines and both windows, in original order
    let mut keep = vec![false; lines.len()];
    for &idx in &important {
        keep[idx] = true;
    }
    for flag in keep.iter_mut().take(first) {
        *flag = true;
    }
    let tail_start = lines.len().saturating_sub(last);
    for flag in keep.iter_mut().skip(tail_start) {
        *flag = true;
    }

    let preserved = lines
        .iter()
        .zip(&keep)
        .filter(|(_, kept)| **kept)
        .map(|(line, _)| *line)
        .collect::<Vec<_>>()
        .join("\n");
    if char_len(&preserved) + char_len(marker) <= max_length {
        return preserved + marker;
    }

    let important_text = important
        .iter()
        .map(|&idx| lines[idx])
        .collect::<Vec<_>>()
        .join("\n");
    if char_len(&important_text) + char_len(marker) <= max_length {
        return important_text + marker;
    }

    let Some(available) = content_budget(max_length, marker) else {
        return marker.to_string();
    };

    let mut kept: Vec<String> = Vec::new();
    let mut used = 0;
    for &idx in &important {
        let line = lines[idx];
        let needed = char_len(line) + 1;
        if used + needed <= available {
            kept.push(line.to_string());
            used += needed;
        } else {
            let remaining = available - used;
            if remaining > SMART_MIN_PARTIAL_LINE {
                let cut = head(line, remaining - char_len(ELLIPSIS));
                kept.push(format!("{}{}", cut, ELLIPSIS));
            }
            break;
        }
    }

    if kept.is_empty() {
        return truncate_middle(text, max_length, marker, limits);
    }

    kept.join("\n") + marker
}
