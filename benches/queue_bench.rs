//! Benchmarks for the dispatch scheduler.
//!
//! Benchmarks cover:
//! - Delay queue operations (submit/take/release in due order)
//! - Rate counter admission
//! - Batch materialization at intake
//! - End-to-end throttle-and-deliver over in-memory backends

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use throttled_dispatch::core::throttle::hourly_key;
use throttled_dispatch::core::{
    DispatchJob, Dispatcher, Intake, IntakeSettings, RateCounterStore, RetryPolicy,
    ScheduleRequest, ThrottleSettings, WorkQueue,
};
use throttled_dispatch::infra::{
    InMemoryCounterStore, InMemoryMessageStore, InMemoryWorkQueue, RecordingSink,
};
use throttled_dispatch::util::clock::Clock;
use throttled_dispatch::util::ManualClock;

use tokio::runtime::Runtime;
use uuid::Uuid;

/// 2024-01-01T10:15:00Z
const T0: u64 = 1_704_104_100_000;

// ============================================================================
// Helpers
// ============================================================================

fn build_job(i: u64) -> DispatchJob {
    DispatchJob {
        id: Uuid::new_v4(),
        sender_id: format!("sender-{}", i % 8),
        recipient: format!("user{i}@example.com"),
        subject: "Bench".into(),
        body: "<p>payload</p>".into(),
        hourly_limit: 1_000_000,
        min_delay_seconds: 0,
    }
}

fn build_request(recipients: u64) -> ScheduleRequest {
    ScheduleRequest {
        sender_id: "bench@example.com".into(),
        subject: "Bench".into(),
        body: "<p>payload</p>".into(),
        recipients: (0..recipients).map(|i| format!("user{i}@example.com")).collect(),
        start_time: "2024-01-01T10:15:00Z".into(),
        delay_seconds: Some(0),
        hourly_limit: Some(1_000_000),
    }
}

// ============================================================================
// Queue Benchmarks
// ============================================================================

fn bench_queue_submit_take(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_submit_take");

    for size in [100, 1_000, 10_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let clock = ManualClock::new(T0);
                let q = InMemoryWorkQueue::new(Arc::new(clock), RetryPolicy::default());
                // Submit in reverse due order so every take walks the index.
                for i in 0..size {
                    let due = u128::from(T0) - u128::from(i);
                    q.submit(build_job(i), due).unwrap();
                }
                while let Some(held) = q.try_take().unwrap() {
                    q.complete(&held).unwrap();
                    black_box(held.id);
                }
            });
        });
    }
    group.finish();
}

fn bench_queue_reschedule(c: &mut Criterion) {
    let mut group = c.benchmark_group("queue_reschedule");

    for size in [100, 1_000, 5_000] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.iter(|| {
                let clock = ManualClock::new(T0);
                let q = InMemoryWorkQueue::new(Arc::new(clock), RetryPolicy::default());
                for i in 0..size {
                    q.submit(build_job(i), u128::from(T0)).unwrap();
                }
                // Push everything into the next hour, the hourly-cap path.
                while let Some(held) = q.try_take().unwrap() {
                    q.reschedule(&held, u128::from(T0) + 3_600_000).unwrap();
                }
                black_box(q.len());
            });
        });
    }
    group.finish();
}

// ============================================================================
// Counter Benchmarks
// ============================================================================

fn bench_counter_admission(c: &mut Criterion) {
    let mut group = c.benchmark_group("counter_admission");

    group.bench_function("incr_decr", |b| {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
        let counters = InMemoryCounterStore::new(clock);
        let key = hourly_key("bench@example.com", u128::from(T0));
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let n = counters.incr(&key).await.unwrap();
            counters.decr(&key).await.unwrap();
            black_box(n);
        });
    });

    group.bench_function("lease_cycle", |b| {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
        let counters = InMemoryCounterStore::new(clock);
        b.to_async(Runtime::new().unwrap()).iter(|| async {
            let got = counters
                .try_acquire_lease("lease:bench", "worker", std::time::Duration::from_secs(30))
                .await
                .unwrap();
            counters.release_lease("lease:bench", "worker").await.unwrap();
            black_box(got);
        });
    });
    group.finish();
}

// ============================================================================
// Intake Benchmarks
// ============================================================================

fn bench_intake_materialize(c: &mut Criterion) {
    let mut group = c.benchmark_group("intake_materialize");

    for size in [10, 100, 1_000] {
        let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
        let intake = Intake::new(
            Arc::new(InMemoryMessageStore::new(Arc::clone(&clock))),
            Arc::new(InMemoryWorkQueue::new(
                Arc::clone(&clock),
                RetryPolicy::default(),
            )),
            clock,
            IntakeSettings::default(),
        );
        let request = build_request(size);

        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &request, |b, request| {
            b.iter(|| black_box(intake.materialize(request).unwrap()));
        });
    }
    group.finish();
}

// ============================================================================
// End-to-End Benchmarks
// ============================================================================

fn bench_dispatch_end_to_end(c: &mut Criterion) {
    let mut group = c.benchmark_group("dispatch_end_to_end");

    for size in [10, 100, 500] {
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, &size| {
            b.to_async(Runtime::new().unwrap()).iter(|| async move {
                let clock: Arc<dyn Clock> = Arc::new(ManualClock::new(T0));
                let store = Arc::new(InMemoryMessageStore::new(Arc::clone(&clock)));
                let queue = Arc::new(InMemoryWorkQueue::new(
                    Arc::clone(&clock),
                    RetryPolicy::default(),
                ));
                let counters = Arc::new(InMemoryCounterStore::new(Arc::clone(&clock)));
                let sink = Arc::new(RecordingSink::new(Arc::clone(&clock)));

                let intake = Intake::new(
                    store.clone(),
                    queue.clone(),
                    Arc::clone(&clock),
                    IntakeSettings::default(),
                );
                let dispatcher = Dispatcher::new(
                    store,
                    counters,
                    sink,
                    queue.clone(),
                    clock,
                    ThrottleSettings::default(),
                );

                intake.schedule_batch(&build_request(size)).await.unwrap();
                let mut sent = 0;
                while let Some(held) = queue.try_take().unwrap() {
                    dispatcher.process(held).await;
                    sent += 1;
                }
                black_box(sent);
            });
        });
    }
    group.finish();
}

// ============================================================================
// Benchmark Groups
// ============================================================================

criterion_group!(queue_benches, bench_queue_submit_take, bench_queue_reschedule);

criterion_group!(counter_benches, bench_counter_admission);

criterion_group!(intake_benches, bench_intake_materialize);

criterion_group!(scenario_benches, bench_dispatch_end_to_end);

criterion_main!(queue_benches, counter_benches, intake_benches, scenario_benches);
