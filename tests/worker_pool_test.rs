//! Integration tests for DispatchPool
//!
//! These run real worker threads against the in-memory backends with a
//! manual clock. Outcomes are observed by polling pool stats and the
//! recording sink, since workers run on their own threads.

use std::sync::Arc;
use std::time::{Duration, Instant};

use throttled_dispatch::builders::ServiceBuilder;
use throttled_dispatch::config::{DispatchConfig, WorkerPoolConfig};
use throttled_dispatch::core::throttle::hourly_key;
use throttled_dispatch::core::{
    DispatchPool, Dispatcher, MessageStatus, PoolError, RetryPolicy, ScheduleRequest,
    ThrottleSettings, WorkQueue,
};
use throttled_dispatch::infra::{
    InMemoryCounterStore, InMemoryMessageStore, InMemoryWorkQueue, RecordingSink,
};
use throttled_dispatch::runtime::DispatchService;
use throttled_dispatch::util::{hour_bucket_start, ManualClock};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

const SENDER: &str = "news@example.com";
/// 2024-01-01T10:15:00Z
const T0: u64 = 1_704_104_100_000;
const T0_RFC3339: &str = "2024-01-01T10:15:00Z";
/// 2024-01-01T11:00:00Z
const NEXT_HOUR: u64 = 1_704_106_800_000;
const HOUR_MS: u64 = 3_600_000;

const WAIT_LIMIT: Duration = Duration::from_secs(15);

async fn wait_for(what: &str, mut done: impl FnMut() -> bool) {
    let deadline = Instant::now() + WAIT_LIMIT;
    while !done() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn request(count: usize, hourly_limit: i64) -> ScheduleRequest {
    ScheduleRequest {
        sender_id: SENDER.into(),
        subject: "Weekly digest".into(),
        body: "<p>This week</p>".into(),
        recipients: (0..count).map(|i| format!("reader{i}@example.com")).collect(),
        start_time: T0_RFC3339.into(),
        delay_seconds: Some(0),
        hourly_limit: Some(hourly_limit),
    }
}

async fn start_service(workers: usize, clock: &ManualClock, sink: &RecordingSink) -> DispatchService {
    let mut config = DispatchConfig::default();
    config.pool = WorkerPoolConfig::new()
        .with_worker_count(workers)
        .with_shutdown_timeout(Duration::from_secs(5));
    ServiceBuilder::new(config)
        .with_clock(Arc::new(clock.clone()))
        .with_sink(Arc::new(sink.clone()))
        .build()
        .await
        .unwrap()
}

// ============================================================================
// DELIVERY
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_delivers_batch_across_workers() {
    let clock = ManualClock::new(T0);
    let sink = RecordingSink::new(Arc::new(clock.clone()));
    let service = start_service(4, &clock, &sink).await;

    let receipt = service.schedule(&request(20, 100)).await.unwrap();
    assert_eq!(receipt.count, 20);

    wait_for("all sends", || service.stats().sent == 20).await;

    let stats = service.stats();
    assert_eq!(stats.worker_count, 4);
    assert_eq!(stats.taken, 20);
    assert_eq!(stats.rescheduled, 0);
    assert_eq!(stats.failed, 0);
    assert_eq!(sink.delivered_from(SENDER).len(), 20);

    let per_sender = service.sender_stats(SENDER).await.unwrap();
    assert_eq!(per_sender.sent, 20);
    assert_eq!(per_sender.pending, 0);
    assert!(service.queue().is_empty());

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_hourly_cap_holds_under_concurrency() {
    let clock = ManualClock::new(T0);
    let sink = RecordingSink::new(Arc::new(clock.clone()));
    let service = start_service(4, &clock, &sink).await;

    service.schedule(&request(12, 4)).await.unwrap();

    // Every entry is seen once in the first hour; only the cap gets through.
    wait_for("first hour", || {
        let s = service.stats();
        s.sent + s.rescheduled == 12 && s.active == 0
    })
    .await;
    assert_eq!(service.stats().sent, 4);
    assert_eq!(sink.delivered().len(), 4);

    let first_bucket = hourly_key(SENDER, hour_bucket_start(u128::from(T0)));
    assert_eq!(service.counters().get(&first_bucket).await.unwrap(), Some(4));

    let held_back = service.history(SENDER, 100).await.unwrap();
    let rescheduled: Vec<_> = held_back
        .iter()
        .filter(|m| m.status == MessageStatus::Rescheduled)
        .collect();
    assert_eq!(rescheduled.len(), 8);
    assert!(rescheduled
        .iter()
        .all(|m| m.scheduled_at == u128::from(NEXT_HOUR)));

    clock.set_ms(NEXT_HOUR);
    wait_for("second hour", || service.stats().sent == 8).await;
    wait_for("second hour settled", || {
        let s = service.stats();
        s.rescheduled == 12 && s.active == 0
    })
    .await;
    assert_eq!(sink.delivered().len(), 8);

    clock.set_ms(NEXT_HOUR + HOUR_MS);
    wait_for("third hour", || service.stats().sent == 12).await;

    let per_sender = service.sender_stats(SENDER).await.unwrap();
    assert_eq!(per_sender.sent, 12);
    assert_eq!(per_sender.pending, 0);

    // No hour ever saw more than the cap.
    let mut per_hour = std::collections::HashMap::<u128, usize>::new();
    for delivery in sink.delivered() {
        *per_hour.entry(hour_bucket_start(delivery.at_ms)).or_default() += 1;
    }
    assert_eq!(per_hour.len(), 3);
    assert!(per_hour.values().all(|n| *n == 4));

    service.shutdown();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_failed_delivery_waits_for_retry() {
    let clock = ManualClock::new(T0);
    let sink = RecordingSink::new(Arc::new(clock.clone()));
    sink.fail_always(Some("mailbox unavailable".into()));
    let service = start_service(2, &clock, &sink).await;

    service.schedule(&request(1, 100)).await.unwrap();
    wait_for("failed attempt", || service.stats().failed == 1).await;

    let message = service.history(SENDER, 1).await.unwrap().remove(0);
    assert_eq!(message.status, MessageStatus::Failed);
    assert!(message
        .error
        .as_deref()
        .is_some_and(|e| e.contains("mailbox unavailable")));

    let entry = service.queue().entry(&message.id).unwrap();
    assert_eq!(entry.attempts, 1);
    assert!(entry.due_ms > u128::from(T0));

    // Transport recovers before the retry falls due.
    sink.fail_always(None);
    clock.set_ms(u64::try_from(entry.due_ms).unwrap());
    wait_for("retry delivered", || service.stats().sent == 1).await;

    let message = service.store().get(message.id).await.unwrap().unwrap();
    assert_eq!(message.status, MessageStatus::Sent);
    assert!(!service.queue().contains(&message.id));

    service.shutdown();
}

// ============================================================================
// LIFECYCLE
// ============================================================================

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_graceful_shutdown() {
    let clock = ManualClock::new(T0);
    let sink = RecordingSink::new(Arc::new(clock.clone()));
    let service = start_service(3, &clock, &sink).await;
    assert!(service.is_running());

    let started = Instant::now();
    service.shutdown();
    assert!(started.elapsed() < Duration::from_secs(5));
    assert!(!service.is_running());

    // Idempotent.
    service.shutdown();

    // The queue is closed, so intake refuses new work.
    assert!(service.schedule(&request(1, 100)).await.is_err());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_rejects_invalid_config() {
    let clock = ManualClock::new(T0);
    let shared_clock = Arc::new(clock.clone());
    let store = Arc::new(InMemoryMessageStore::new(shared_clock.clone()));
    let counters = Arc::new(InMemoryCounterStore::new(shared_clock.clone()));
    let queue: Arc<dyn WorkQueue> = Arc::new(InMemoryWorkQueue::new(
        shared_clock.clone(),
        RetryPolicy::default(),
    ));
    let sink = RecordingSink::new(shared_clock.clone());
    let dispatcher = Dispatcher::new(
        store,
        counters,
        Arc::new(sink),
        Arc::clone(&queue),
        shared_clock,
        ThrottleSettings::default(),
    );

    let result = DispatchPool::new(WorkerPoolConfig::new().with_worker_count(0), dispatcher, queue);
    assert!(matches!(result, Err(PoolError::InvalidConfig(_))));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_pool_idle_workers_pick_up_late_submissions() {
    let clock = ManualClock::new(T0);
    let sink = RecordingSink::new(Arc::new(clock.clone()));
    let service = start_service(2, &clock, &sink).await;

    // Let the workers park on an empty queue first.
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(service.stats().taken, 0);

    service.schedule(&request(3, 100)).await.unwrap();
    wait_for("late batch", || service.stats().sent == 3).await;

    service.shutdown();
}
