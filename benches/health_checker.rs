//! 健康检测基准测试
//!
//! 测试结果分类、结果应用、调度索引和状态聚合的性能

use chrono::{Duration as ChronoDuration, Utc};
use criterion::{criterion_group, criterion_main, Criterion};
use service_watchdog::health::aggregator::summarize;
use service_watchdog::health::{
    classify, CheckDefinition, HealthState, ProbeResult, ProbeStatus, ScheduleEntry,
    ScheduleIndex,
};
use std::hint::black_box;
use std::time::Duration;
use uuid::Uuid;

fn sample_definition(index: usize) -> CheckDefinition {
    CheckDefinition::new(
        format!("check-{index}"),
        format!("fabric:/App/Svc{index}"),
        Uuid::nil(),
        "/api/ping",
    )
    .with_warning_status_codes([429])
    .with_error_status_codes([418])
}

/// 结果分类与应用基准测试
fn classification_benchmark(c: &mut Criterion) {
    let definition = sample_definition(0);

    c.bench_function("classify_http_status", |b| {
        b.iter(|| {
            let states = [
                classify(&definition, ProbeStatus::Http(200), Duration::from_millis(50)),
                classify(&definition, ProbeStatus::Http(200), Duration::from_millis(900)),
                classify(&definition, ProbeStatus::Http(429), Duration::from_millis(50)),
                classify(&definition, ProbeStatus::Http(503), Duration::from_millis(50)),
                classify(&definition, ProbeStatus::Timeout, Duration::from_secs(5)),
            ];
            black_box(states)
        });
    });

    c.bench_function("apply_result", |b| {
        let result = ProbeResult::new(
            definition.key(),
            ProbeStatus::Http(503),
            Duration::from_millis(120),
            HealthState::Error,
        );
        b.iter(|| black_box(definition.apply_result(&result)));
    });

    c.bench_function("definition_serialization", |b| {
        b.iter(|| {
            let json = serde_json::to_vec(&definition).unwrap();
            let decoded: CheckDefinition = serde_json::from_slice(&json).unwrap();
            black_box(decoded)
        });
    });
}

/// 调度索引与聚合基准测试
fn schedule_and_aggregate_benchmark(c: &mut Criterion) {
    let definitions: Vec<CheckDefinition> = (0..1000).map(sample_definition).collect();

    c.bench_function("schedule_index_pop_due_1000", |b| {
        let now = Utc::now();
        b.iter(|| {
            let mut index = ScheduleIndex::new();
            for (i, definition) in definitions.iter().enumerate() {
                let due = now + ChronoDuration::milliseconds((i % 100) as i64 - 50);
                index.insert(ScheduleEntry::new(due, definition.key()));
            }
            black_box(index.pop_due(now))
        });
    });

    c.bench_function("summarize_1000", |b| {
        b.iter(|| black_box(summarize(&definitions)));
    });
}

criterion_group!(
    benches,
    classification_benchmark,
    schedule_and_aggregate_benchmark
);
criterion_main!(benches);
