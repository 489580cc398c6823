//! Tests for builder modules

use std::sync::Arc;

use throttled_dispatch::builders::ServiceBuilder;
use throttled_dispatch::config::{DispatchConfig, QueueBackendConfig, StoreBackendConfig};
use throttled_dispatch::core::{MessageStatus, ScheduleRequest};
use throttled_dispatch::util::ManualClock;

fn request(recipients: &[&str]) -> ScheduleRequest {
    ScheduleRequest {
        sender_id: "ops@example.com".into(),
        subject: "Quarterly update".into(),
        body: "<p>hello</p>".into(),
        recipients: recipients.iter().map(|r| (*r).to_string()).collect(),
        start_time: "2024-01-01T12:00:00Z".into(),
        delay_seconds: Some(0),
        hourly_limit: Some(10),
    }
}

#[tokio::test]
async fn test_builder_rejects_invalid_config() {
    let mut config = DispatchConfig::default();
    config.intake.chunk_size = 0;

    let err = ServiceBuilder::new(config).build().await.err().unwrap();
    assert!(format!("{err:#}").contains("chunk_size"));
}

#[tokio::test]
async fn test_builder_without_workers() {
    let clock = ManualClock::new(1_704_103_200_000);
    let service = ServiceBuilder::new(DispatchConfig::default())
        .with_clock(Arc::new(clock))
        .without_workers()
        .build()
        .await
        .unwrap();

    assert!(!service.is_running());
    assert_eq!(service.stats().worker_count, 0);

    let receipt = service
        .schedule(&request(&["a@example.com", "b@example.com"]))
        .await
        .unwrap();
    assert_eq!(receipt.count, 2);
    assert_eq!(service.queue().len(), 2);
    service.shutdown();
}

#[tokio::test]
async fn test_file_backends_recover_on_rebuild() {
    let dir = tempfile::tempdir().unwrap();
    let config = DispatchConfig {
        queue: QueueBackendConfig::File {
            path: dir.path().join("queue.jsonl"),
        },
        store: StoreBackendConfig::File {
            path: dir.path().join("messages.jsonl"),
        },
        ..DispatchConfig::default()
    };
    let clock = ManualClock::new(1_704_103_200_000);

    let ids: Vec<_> = {
        let service = ServiceBuilder::new(config.clone())
            .with_clock(Arc::new(clock.clone()))
            .without_workers()
            .build()
            .await
            .unwrap();
        service
            .schedule(&request(&["a@example.com", "b@example.com"]))
            .await
            .unwrap();
        service
            .history("ops@example.com", 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect()
    };

    // Lose the queue journal; the store still has both records.
    std::fs::remove_file(dir.path().join("queue.jsonl")).unwrap();

    let service = ServiceBuilder::new(config)
        .with_clock(Arc::new(clock))
        .without_workers()
        .build()
        .await
        .unwrap();
    for id in &ids {
        assert!(service.queue().contains(id));
        let stored = service.store().get(*id).await.unwrap().unwrap();
        assert_eq!(stored.status, MessageStatus::Pending);
    }
}
