//! Tests for configuration validation

use throttled_dispatch::config::{
    DispatchConfig, QueueBackendConfig, StoreBackendConfig, WorkerPoolConfig,
};
use throttled_dispatch::core::{RetryPolicy, ThrottleSettings};

#[test]
fn test_worker_pool_config_validation() {
    assert!(WorkerPoolConfig::new().validate().is_ok());
    assert!(WorkerPoolConfig::new().with_worker_count(0).validate().is_err());
    assert!(WorkerPoolConfig::new()
        .with_thread_stack_size(1024)
        .validate()
        .is_err());
}

#[test]
fn test_dispatch_config_from_json() {
    let json = r#"{
        "pool": { "worker_count": 3 },
        "queue": { "file": { "path": "/tmp/dispatch/queue.jsonl" } },
        "store": "in_memory",
        "retry": { "max_attempts": 4 },
        "throttle": { "lease_ttl_ms": 5000 }
    }"#;

    let cfg = DispatchConfig::from_json_str(json).unwrap();
    assert_eq!(cfg.pool.worker_count, 3);
    assert_eq!(
        cfg.queue,
        QueueBackendConfig::File {
            path: "/tmp/dispatch/queue.jsonl".into()
        }
    );
    assert_eq!(cfg.store, StoreBackendConfig::InMemory);

    let policy = RetryPolicy::from(cfg.retry);
    assert_eq!(policy.max_attempts, 4);
    assert_eq!(policy.base_delay_ms, 1_000);

    let throttle = ThrottleSettings::from(cfg.throttle);
    assert_eq!(throttle.lease_ttl.as_millis(), 5_000);
    assert_eq!(throttle.counter_expiry().as_secs(), 4_200);
}

#[test]
fn test_dispatch_config_empty_json_is_default() {
    let cfg = DispatchConfig::from_json_str("{}").unwrap();
    assert_eq!(cfg, DispatchConfig::default());
}

#[test]
fn test_dispatch_config_rejects_invalid() {
    let err = DispatchConfig::from_json_str(r#"{"retry": {"max_attempts": 0}}"#).unwrap_err();
    assert!(err.contains("max_attempts"), "{err}");

    let err = DispatchConfig::from_json_str(
        r#"{"retry": {"base_delay_ms": 5000, "max_delay_ms": 1000}}"#,
    )
    .unwrap_err();
    assert!(err.contains("max_delay_ms"), "{err}");

    let err = DispatchConfig::from_json_str(r#"{"pool": {"worker_count": 0}}"#).unwrap_err();
    assert!(err.starts_with("pool invalid"), "{err}");

    assert!(DispatchConfig::from_json_str("not json")
        .unwrap_err()
        .starts_with("parse error"));
}
