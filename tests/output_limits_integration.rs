//! Integration tests for output bounding

use cmdexec::output::{
    apply_output_limits, truncate_text, CommandOutput, OutputLimits, TruncateStrategy,
    DEFAULT_TRUNCATE_MESSAGE,
};

fn chars(text: &str) -> usize {
    text.chars().count()
}

#[test]
fn test_within_limits_is_unchanged_and_idempotent() {
    let limits = OutputLimits::new()
        .with_max_stdout(100)
        .with_max_stderr(100)
        .with_max_total(150);
    let output = CommandOutput::new("short stdout", "short stderr");

    let once = apply_output_limits(output.clone(), Some(&limits));
    assert_eq!(once, output);
    assert!(!once.truncated);

    let twice = apply_output_limits(once.clone(), Some(&limits));
    assert_eq!(twice, once);
}

#[test]
fn test_smart_keeps_error_line() {
    let text = "line one\nline two\nERROR: x\nline four\nline five";
    let limits = OutputLimits::new().with_strategy(TruncateStrategy::Smart);

    let out = truncate_text(text, 30, &limits);
    assert!(chars(&out) <= 30);
    assert!(out.lines().any(|line| line == "ERROR: x"), "got {:?}", out);
}

#[test]
fn test_smart_keeps_errors_from_long_log() {
    let mut lines: Vec<String> = (0..200).map(|i| format!("step {} ok", i)).collect();
    lines[57] = "Traceback (most recent call last):".to_string();
    lines[120] = "2024-05-01 12:00:00 ERROR connection refused".to_string();
    lines[150] = "warning: deprecated flag".to_string();
    let text = lines.join("\n");

    let limits = OutputLimits::new()
        .with_strategy(TruncateStrategy::Smart)
        .with_first_lines(2)
        .with_last_lines(2);
    let out = truncate_text(&text, 400, &limits);

    assert!(chars(&out) <= 400);
    assert!(out.contains("Traceback"));
    assert!(out.contains("ERROR connection refused"));
    assert!(out.contains("warning: deprecated flag"));
    assert!(out.starts_with("step 0 ok"));
    assert!(out.ends_with(DEFAULT_TRUNCATE_MESSAGE));
}

#[test]
fn test_combined_budget_favours_stderr() {
    let output = CommandOutput::new("o".repeat(200), "e".repeat(200));
    let limits = OutputLimits::new().with_max_total(120);

    let bounded = apply_output_limits(output, Some(&limits));
    assert!(bounded.truncated);
    assert!(chars(&bounded.stderr) >= chars(&bounded.stdout));
    assert!(bounded.total_len() <= 120);
}

#[test]
fn test_combined_budget_all_to_stdout_without_stderr() {
    let output = CommandOutput::new("o".repeat(200), "");
    let limits = OutputLimits::new().with_max_total(120);

    let bounded = apply_output_limits(output, Some(&limits));
    assert_eq!(chars(&bounded.stdout), 120);
    assert!(bounded.stderr.is_empty());
}

#[test]
fn test_strategies_keep_expected_end() {
    let text: String = (0..100).map(|i| format!("row {:03}\n", i)).collect();

    let end = truncate_text(&text, 60, &OutputLimits::new());
    assert!(end.starts_with("row 000"));
    assert!(end.ends_with(DEFAULT_TRUNCATE_MESSAGE));

    let start = truncate_text(
        &text,
        60,
        &OutputLimits::new().with_strategy(TruncateStrategy::Start),
    );
    assert!(start.starts_with(DEFAULT_TRUNCATE_MESSAGE));
    assert!(start.contains("row 099"));

    let middle = truncate_text(
        &text,
        60,
        &OutputLimits::new().with_strategy(TruncateStrategy::Middle),
    );
    assert!(middle.starts_with("row 000"));
    assert!(middle.contains("row 099"));
    assert!(middle.contains(DEFAULT_TRUNCATE_MESSAGE));

    for out in [&end, &start, &middle] {
        assert_eq!(chars(out), 60);
    }
}

#[test]
fn test_budget_below_marker_is_marker_only() {
    let limits = OutputLimits::new().with_max_stdout(5);
    let bounded = apply_output_limits(CommandOutput::new("x".repeat(50), ""), Some(&limits));
    assert_eq!(bounded.stdout, DEFAULT_TRUNCATE_MESSAGE);
}

#[test]
fn test_raw_snapshot_and_custom_marker() {
    let limits = OutputLimits::new()
        .with_max_stdout(20)
        .with_preserve_raw(true)
        .with_message("[cut]");
    let original = "0123456789".repeat(5);

    let bounded = apply_output_limits(CommandOutput::new(original.clone(), ""), Some(&limits));
    assert_eq!(bounded.stdout, format!("{}[cut]", &original[..15]));
    assert_eq!(bounded.raw_stdout.as_deref(), Some(original.as_str()));
    assert_eq!(bounded.raw_stderr.as_deref(), Some(""));
}

#[test]
fn test_multibyte_text_counts_characters() {
    let text = "日本語のテキスト".repeat(20);
    let limits = OutputLimits::new().with_strategy(TruncateStrategy::Middle);

    let out = truncate_text(&text, 40, &limits);
    assert_eq!(chars(&out), 40);
}

#[test]
fn test_limits_deserialize_from_json() {
    let limits: OutputLimits = serde_json::from_str(
        r#"{"max_total_length": 300, "truncate_strategy": "MIDDLE", "preserve_first_lines": 3}"#,
    )
    .unwrap();
    assert_eq!(limits.max_total_length, Some(300));
    assert_eq!(limits.truncate_strategy, TruncateStrategy::Middle);
    assert_eq!(limits.truncate_message, DEFAULT_TRUNCATE_MESSAGE);
}
