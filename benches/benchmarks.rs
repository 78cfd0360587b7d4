// benches/benchmarks.rs — Performance benchmarks (criterion)
//
// Hot paths in the plan-observe cycle:
//   1. Classifier — runs on every failed step
//   2. Truncation — runs on every captured command output
//   3. History summary rendering — runs on every planning cycle

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use cloudhand::core::classifier::classify_exec;
use cloudhand::core::truncation::truncate_tail;
use cloudhand::core::types::{ExecResult, Step, StepRecord};
use cloudhand::planner::history_summary;
use cloudhand::session::{Session, SessionKey};

fn failed_result(stderr: &str) -> ExecResult {
    ExecResult {
        exit_code: 1,
        stderr: stderr.into(),
        ..Default::default()
    }
}

fn bench_classifier(c: &mut Criterion) {
    let samples = vec![
        failed_result("fatal: repository 'https://github.com/x/y/' not found"),
        failed_result("curl: (56) Connection reset by peer"),
        failed_result("git@github.com: Permission denied (publickey)."),
        failed_result("bash: cargoo: command not found"),
        failed_result(&"x".repeat(4096)),
    ];

    c.bench_function("classify_exec_mixed", |b| {
        b.iter(|| {
            for s in &samples {
                black_box(classify_exec(black_box(s)));
            }
        })
    });
}

fn bench_truncation(c: &mut Criterion) {
    let log: String = (0..5000)
        .map(|i| format!("[build] compiling unit {i} of 5000 ... ok\n"))
        .collect();

    c.bench_function("truncate_tail_200kb", |b| {
        b.iter(|| black_box(truncate_tail(black_box(&log), 8 * 1024)))
    });
}

fn bench_history_summary(c: &mut Criterion) {
    let mut session = Session::new(SessionKey::new("bench", "bench"), "/home/bench");
    for i in 0..50 {
        let record = StepRecord::with_result(
            Step::ShellCommand {
                command: format!("make target-{i}"),
            },
            if i % 7 == 0 {
                failed_result("make: *** [target] Error 2")
            } else {
                ExecResult::default()
            },
        );
        session.push_record(record, 50);
    }

    c.bench_function("history_summary_50_steps", |b| {
        b.iter(|| black_box(history_summary(black_box(&session))))
    });
}

criterion_group!(
    benches,
    bench_classifier,
    bench_truncation,
    bench_history_summary
);
criterion_main!(benches);
