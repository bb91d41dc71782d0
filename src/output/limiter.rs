//! Output limit application
//!
//! Applies per-stream caps first, then the combined cap. When the combined
//! cap is exceeded and stderr has content, stderr gets 60% of the budget.

use crate::output::truncate::{char_len, truncate_text};
use crate::output::types::{CommandOutput, OutputLimits};
use tracing::debug;

/// Share of the combined budget given to stderr when it has content
const STDERR_SHARE: f64 = 0.6;

/// Bound captured output according to `limits`
///
/// `None` limits leave the output untouched. Output already within every cap
/// comes back unchanged, so applying the same limits twice is a no-op.
pub fn apply_output_limits(output: CommandOutput, limits: Option<&OutputLimits>) -> CommandOutput {
    let Some(limits) = limits else {
        return output;
    };

    let mut bounded = output;

    if limits.preserve_raw {
        if bounded.raw_stdout.is_none() {
            bounded.raw_stdout = Some(bounded.stdout.clone());
        }
        if bounded.raw_stderr.is_none() {
            bounded.raw_stderr = Some(bounded.stderr.clone());
        }
    }

    if let Some(max) = limits.stdout_cap() {
        if char_len(&bounded.stdout) > max {
            bounded.stdout = truncate_text(&bounded.stdout, max, limits);
            bounded.truncated = true;
        }
    }

    if let Some(max) = limits.stderr_cap() {
        if char_len(&bounded.stderr) > max {
            bounded.stderr = truncate_text(&bounded.stderr, max, limits);
            bounded.truncated = true;
        }
    }

    if let Some(max_total) = limits.total_cap() {
        if bounded.total_len() > max_total {
            let (stdout, stderr) =
                truncate_combined(&bounded.stdout, &bounded.stderr, max_total, limits);
            bounded.stdout = stdout;
            bounded.stderr = stderr;
            bounded.truncated = true;
        }
    }

    bounded
}

/// Split `max_total` between the two streams and truncate each
pub fn truncate_combined(
    stdout: &str,
    stderr: &str,
    max_total: usize,
    limits: &OutputLimits,
) -> (String, String) {
    if char_len(stdout) + char_len(stderr) <= max_total {
        return (stdout.to_string(), stderr.to_string());
    }

    let (stdout_limit, stderr_limit) = if stderr.trim().is_empty() {
        (max_total, 0)
    } else {
        let stderr_limit = (max_total as f64 * STDERR_SHARE) as usize;
        (max_total - stderr_limit, stderr_limit)
    };

    debug!(max_total, stdout_limit, stderr_limit, "Splitting combined output budget");

    let truncate_or_drop = |text: &str, limit: usize| {
        if limit > 0 {
            truncate_text(text, limit, limits)
        } else {
            String::new()
        }
    };

    let mut truncated_stdout = truncate_or_drop(stdout, stdout_limit);
    let truncated_stderr = truncate_or_drop(stderr, stderr_limit);

    // Marker-only clamps can leave the pair above budget; take it out of stdout
    let actual = char_len(&truncated_stdout) + char_len(&truncated_stderr);
    if actual > max_total {
        let reduction = actual - max_total;
        let new_limit = char_len(&truncated_stdout).saturating_sub(reduction);
        truncated_stdout = truncate_or_drop(stdout, new_limit);
    }

    (truncated_stdout, truncated_stderr)
}
