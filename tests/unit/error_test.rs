//! Tests for error types

use throttled_dispatch::core::{DeliveryError, DispatchError, QueueError, ValidationError};
use uuid::Uuid;

#[test]
fn test_validation_error_names_constraint() {
    let err = DispatchError::from(ValidationError::NonPositiveHourlyLimit(0));
    assert_eq!(
        format!("{}", err),
        "validation failed: hourly limit must be >= 1, got 0"
    );
}

#[test]
fn test_delivery_error_passthrough() {
    let err = DispatchError::from(DeliveryError::new("mailbox unavailable"));
    assert_eq!(format!("{}", err), "delivery failed: mailbox unavailable");
}

#[test]
fn test_queue_error() {
    let id = Uuid::nil();
    let err = DispatchError::from(QueueError::Duplicate(id));
    assert_eq!(
        format!("{}", err),
        format!("queue error: entry {id} already queued")
    );
    assert_eq!(format!("{}", QueueError::Closed), "queue closed");
}

#[test]
fn test_not_found_error() {
    let id = Uuid::nil();
    let err = DispatchError::NotFound(id);
    assert_eq!(format!("{}", err), format!("message not found: {id}"));
}

#[test]
fn test_store_error() {
    let err = DispatchError::Store("connection failed".to_string());
    assert_eq!(format!("{}", err), "store error: connection failed");
}
