//! Status-transition audit trail.
//!
//! Every lifecycle transition the intake or a worker performs can be mirrored
//! into an [`AuditSink`]. The in-memory sink keeps a bounded window and is
//! what tests use to check status paths.

use std::collections::VecDeque;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::core::message::{MessageId, MessageStatus};

/// Audit event structure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEvent {
    /// Related message identifier.
    pub message_id: MessageId,
    /// Sender identity.
    pub sender: String,
    /// Status entered.
    pub status: MessageStatus,
    /// Timestamp milliseconds.
    pub created_at_ms: u128,
    /// Additional context (reschedule reason, failure text).
    pub detail: Option<String>,
}

/// Audit sink abstraction.
pub trait AuditSink: Send {
    /// Record an audit event.
    fn record(&mut self, event: AuditEvent);
}

/// Shared handle to an audit sink, as held by intake and workers.
pub type SharedAudit = Arc<Mutex<Box<dyn AuditSink>>>;

/// Wrap a sink for sharing.
pub fn shared(sink: impl AuditSink + 'static) -> SharedAudit {
    Arc::new(Mutex::new(Box::new(sink)))
}

/// In-memory audit sink for testing and dev.
#[derive(Debug)]
pub struct InMemoryAuditSink {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
    max_events: usize,
}

impl InMemoryAuditSink {
    /// Create a new in-memory sink with a bounded buffer.
    #[must_use]
    pub fn new(max_events: usize) -> Self {
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(max_events.min(1024)))),
            max_events,
        }
    }

    /// A reader sharing this sink's buffer, usable after the sink itself has
    /// been boxed into a [`SharedAudit`].
    #[must_use]
    pub fn reader(&self) -> AuditReader {
        AuditReader {
            events: Arc::clone(&self.events),
        }
    }

    /// Retrieve a snapshot of stored events.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl AuditSink for InMemoryAuditSink {
    fn record(&mut self, event: AuditEvent) {
        let mut events = self.events.lock();
        if events.len() >= self.max_events {
            events.pop_front();
        }
        events.push_back(event);
    }
}

/// Read-only view over an [`InMemoryAuditSink`].
#[derive(Debug, Clone)]
pub struct AuditReader {
    events: Arc<Mutex<VecDeque<AuditEvent>>>,
}

impl AuditReader {
    /// All retained events in arrival order.
    #[must_use]
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }

    /// Status path recorded for one message.
    #[must_use]
    pub fn path_of(&self, id: MessageId) -> Vec<MessageStatus> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.message_id == id)
            .map(|e| e.status)
            .collect()
    }
}

/// Helper to build an audit event from context.
pub fn build_audit_event(
    message_id: MessageId,
    sender: impl Into<String>,
    status: MessageStatus,
    created_at_ms: u128,
    detail: Option<String>,
) -> AuditEvent {
    AuditEvent {
        message_id,
        sender: sender.into(),
        status,
        created_at_ms,
        detail,
    }
}

/// Record into an optional shared sink.
pub(crate) fn record(audit: Option<&SharedAudit>, event: AuditEvent) {
    if let Some(sink) = audit {
        sink.lock().record(event);
    }
}
