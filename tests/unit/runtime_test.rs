//! Tests for the API surface

use std::sync::Arc;

use throttled_dispatch::builders::ServiceBuilder;
use throttled_dispatch::config::DispatchConfig;
use throttled_dispatch::core::ScheduleRequest;
use throttled_dispatch::core::MessageId;
use throttled_dispatch::runtime::{health, history, schedule, star, stats, HistoryQuery, StarRequest};
use throttled_dispatch::util::ManualClock;

fn request(recipients: Vec<String>) -> ScheduleRequest {
    ScheduleRequest {
        sender_id: "ops@example.com".into(),
        subject: "s".into(),
        body: "b".into(),
        recipients,
        start_time: "2024-01-01T12:00:00Z".into(),
        delay_seconds: None,
        hourly_limit: None,
    }
}

#[tokio::test]
async fn test_schedule_response_shape() {
    let service = ServiceBuilder::new(DispatchConfig::default())
        .with_clock(Arc::new(ManualClock::new(0)))
        .without_workers()
        .build()
        .await
        .unwrap();

    let response = schedule(&service, &request(vec!["a@example.com".into()]))
        .await
        .unwrap();
    assert!(response.success);
    assert_eq!(response.count, 1);
    assert_eq!(response.message, "Scheduled 1 emails.");

    let error = schedule(&service, &request(Vec::new())).await.unwrap_err();
    assert_eq!(error.error, "Validation Error");
    assert!(error.details.unwrap().contains("recipients"));
}

#[tokio::test]
async fn test_health_reflects_pool_state() {
    let mut config = DispatchConfig::default();
    config.pool.worker_count = 2;
    let service = ServiceBuilder::new(config)
        .with_clock(Arc::new(ManualClock::new(0)))
        .build()
        .await
        .unwrap();

    let before = health(&service);
    assert!(before.ok);
    assert_eq!(before.workers, 2);

    service.shutdown();
    assert!(!health(&service).ok);
}

#[tokio::test]
async fn test_history_star_and_stats() {
    let service = ServiceBuilder::new(DispatchConfig::default())
        .with_clock(Arc::new(ManualClock::new(0)))
        .without_workers()
        .build()
        .await
        .unwrap();

    let recipients = (0..3).map(|i| format!("r{i}@example.com")).collect();
    schedule(&service, &request(recipients)).await.unwrap();

    let counts = stats(&service, "ops@example.com").await.unwrap();
    assert_eq!(counts.pending, 3);
    assert_eq!(counts.sent, 0);

    let all = history(&service, "ops@example.com", HistoryQuery::default())
        .await
        .unwrap();
    assert_eq!(all.len(), 3);
    let limited = history(&service, "ops@example.com", HistoryQuery { limit: Some(1) })
        .await
        .unwrap();
    assert_eq!(limited.len(), 1);

    let starred = star(&service, all[0].id, StarRequest { is_starred: true })
        .await
        .unwrap();
    assert!(starred.is_starred);
    assert_eq!(starred.status, all[0].status);

    let missing = star(&service, MessageId::nil(), StarRequest { is_starred: true })
        .await
        .unwrap_err();
    assert!(missing.error.contains("not found"));
}
