//! Terminal rendering for CLI results
//!
//! Color-coded summaries of execution results and a spinner for polling
//! background commands.

use crate::process::{
    format_duration, AsyncStart, ExecResult, LiveStatus, ProcessStatusReport, WaitOutcome,
};
use colored::*;
use indicatif::{ProgressBar, ProgressStyle};
use std::time::Duration;

/// One-line outcome summary
pub fn summary_line(result: &ExecResult) -> String {
    let pid = result
        .pid()
        .map(|pid| pid.to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = format!("{:.2}s", result.duration().as_secs_f64());

    match result {
        ExecResult::Success(_) => format!(
            "{} pid {} in {}",
            "✓ success".green().bold(),
            pid,
            duration.dimmed()
        ),
        ExecResult::Failure(failure) => format!(
            "{} {} (pid {}, {})",
            "✗ failure:".red().bold(),
            failure.message,
            pid,
            duration.dimmed()
        ),
    }
}

/// Summary followed by captured streams
pub fn render_result(result: &ExecResult) -> String {
    let output = result.output();
    let mut text = summary_line(result);

    if !output.stdout.is_empty() {
        text.push_str(&format!("\n{}\n{}", "── stdout ──".cyan(), output.stdout.trim_end()));
    }
    if !output.stderr.is_empty() {
        text.push_str(&format!("\n{}\n{}", "── stderr ──".yellow(), output.stderr.trim_end()));
    }
    if output.truncated {
        text.push_str(&format!("\n{}", "(output was truncated)".dimmed()));
    }
    text
}

/// Final result of a background command
pub fn render_outcome(outcome: &WaitOutcome) -> String {
    format!(
        "{} {}\n{}",
        "token".dimmed(),
        outcome.token,
        render_result(&outcome.result)
    )
}

/// Acknowledgement of a background start
pub fn render_start(start: &AsyncStart) -> String {
    let mut text = format!(
        "{} token {} pid {}",
        "▶ started".cyan().bold(),
        start.token,
        start.pid
    );
    if let Some(hint) = start.timeout_hint_ms {
        text.push_str(&format!(" {}", format!("(timeout hint {}ms)", hint).dimmed()));
    }
    text
}

/// Spinner message for a status poll
pub fn status_message(report: &ProcessStatusReport) -> String {
    let runtime = format_duration(Duration::from_millis(report.runtime_ms));
    match report.status {
        LiveStatus::Running => {
            let mut message = format!("running pid {} for {}", report.pid, runtime);
            if let Some(metrics) = &report.metrics {
                if let Some(cpu) = metrics.cpu_percent {
                    message.push_str(&format!(" | CPU {:.1}%", cpu));
                }
                if let Some(mb) = metrics.rss_mb() {
                    message.push_str(&format!(" | {:.1}MB", mb));
                }
            }
            message
        }
        LiveStatus::NotRunning => format!(
            "exited (code {}) after {}",
            report
                .exit_code
                .map(|code| code.to_string())
                .unwrap_or_else(|| "?".to_string()),
            runtime
        ),
    }
}

/// Spinner shown while polling a background command
pub fn poll_spinner(command: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    let style = ProgressStyle::default_spinner()
        .template("{spinner:.cyan} {prefix:.bold} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_spinner());
    pb.set_style(style);
    pb.set_prefix(command.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::CommandOutput;
    use crate::process::{FailureKind, ProcessToken, ProcessState};

    #[test]
    fn test_render_success() {
        let result = ExecResult::from_exit(
            42,
            Some(0),
            CommandOutput::new("hello\n", ""),
            Duration::from_millis(1500),
        );
        let text = render_result(&result);
        assert!(text.contains("success"));
        assert!(text.contains("42"));
        assert!(text.contains("hello"));
        assert!(!text.contains("stderr"));
    }

    #[test]
    fn test_render_timeout_failure() {
        let result = ExecResult::failure(
            Some(7),
            FailureKind::Timeout { timeout_ms: 2000 },
            CommandOutput::new("", "partial"),
            Duration::from_secs(2),
        );
        let text = render_result(&result);
        assert!(text.contains("timed out after 2.0 seconds"));
        assert!(text.contains("partial"));
    }

    #[test]
    fn test_status_message() {
        let report = ProcessStatusReport {
            token: ProcessToken::new(),
            status: LiveStatus::NotRunning,
            pid: 9,
            command: "true".to_string(),
            runtime_ms: 61_000,
            exit_code: Some(0),
            metrics: None,
        };
        assert_eq!(status_message(&report), "exited (code 0) after 00:01:01");
    }

    #[test]
    fn test_render_start_and_outcome() {
        let token = ProcessToken::new();
        let start = AsyncStart {
            token,
            pid: 5,
            status: ProcessState::Running,
            timeout_hint_ms: Some(300),
        };
        assert!(render_start(&start).contains(&token.to_string()));

        let outcome = WaitOutcome {
            token,
            status: ProcessState::Completed,
            result: ExecResult::from_exit(5, Some(1), CommandOutput::default(), Duration::ZERO),
        };
        assert!(render_outcome(&outcome).contains("exited with code 1"));
    }
}
