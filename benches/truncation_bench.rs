//! Truncation strategy benchmarks

use cmdexec::output::{apply_output_limits, truncate_text, CommandOutput, OutputLimits, TruncateStrategy};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

fn build_log(lines: usize) -> String {
    (0..lines)
        .map(|i| match i % 97 {
            13 => format!("2024-05-01 12:00:{:02} ERROR request {} failed", i % 60, i),
            41 => format!("warning: retrying request {}", i),
            _ => format!("info: processed item {} in {}ms", i, i % 17),
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn bench_strategies(c: &mut Criterion) {
    let log = build_log(20_000);
    let mut group = c.benchmark_group("truncate_text");

    for strategy in [
        TruncateStrategy::End,
        TruncateStrategy::Start,
        TruncateStrategy::Middle,
        TruncateStrategy::Smart,
    ] {
        let limits = OutputLimits::new().with_strategy(strategy.clone());
        group.bench_with_input(
            BenchmarkId::from_parameter(strategy.as_str()),
            &limits,
            |b, limits| b.iter(|| truncate_text(black_box(&log), black_box(4_000), limits)),
        );
    }
    group.finish();
}

fn bench_combined(c: &mut Criterion) {
    let output = CommandOutput::new(build_log(10_000), build_log(2_000));
    let limits = OutputLimits::new()
        .with_max_stdout(20_000)
        .with_max_stderr(10_000)
        .with_max_total(8_000)
        .with_strategy(TruncateStrategy::Smart);

    c.bench_function("apply_output_limits/smart_combined", |b| {
        b.iter(|| apply_output_limits(black_box(output.clone()), Some(&limits)))
    });
}

criterion_group!(benches, bench_strategies, bench_combined);
criterion_main!(benches);
