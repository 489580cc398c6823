//! Tests for audit sink

use throttled_dispatch::core::{build_audit_event, AuditSink, InMemoryAuditSink, MessageStatus};
use uuid::Uuid;

#[test]
fn test_in_memory_audit_sink() {
    let mut sink = InMemoryAuditSink::new(10);
    let id = Uuid::new_v4();

    sink.record(build_audit_event(
        id,
        "ops@example.com",
        MessageStatus::Pending,
        1_000,
        None,
    ));
    assert_eq!(sink.events().len(), 1);

    let events = sink.events();
    assert_eq!(events[0].message_id, id);
    assert_eq!(events[0].sender, "ops@example.com");
    assert_eq!(events[0].status, MessageStatus::Pending);
}

#[test]
fn test_audit_sink_overflow() {
    let mut sink = InMemoryAuditSink::new(2);
    let ids: Vec<Uuid> = (0..3).map(|_| Uuid::new_v4()).collect();

    for id in &ids {
        sink.record(build_audit_event(*id, "s@example.com", MessageStatus::Sent, 0, None));
    }

    let events = sink.events();
    assert_eq!(events.len(), 2);
    assert_eq!(events[0].message_id, ids[1]); // First one popped
    assert_eq!(events[1].message_id, ids[2]);
}

#[test]
fn test_reader_sees_events_after_sink_is_moved() {
    let sink = InMemoryAuditSink::new(16);
    let reader = sink.reader();
    let shared = throttled_dispatch::core::audit::shared(sink);
    let id = Uuid::new_v4();

    shared.lock().record(build_audit_event(
        id,
        "s@example.com",
        MessageStatus::Processing,
        5,
        None,
    ));
    shared.lock().record(build_audit_event(
        id,
        "s@example.com",
        MessageStatus::Rescheduled,
        6,
        Some("hourly limit reached".into()),
    ));

    assert_eq!(
        reader.path_of(id),
        vec![MessageStatus::Processing, MessageStatus::Rescheduled]
    );
    assert_eq!(
        reader.events()[1].detail.as_deref(),
        Some("hourly limit reached")
    );
}
