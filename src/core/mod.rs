//! Core dispatch abstractions: message model, external seams, intake,
//! the throttle-and-deliver protocol, and the worker pool.

pub mod audit;
pub mod dispatch;
pub mod error;
pub mod intake;
pub mod message;
pub mod queue;
pub mod recovery;
pub mod reporting;
pub mod sink;
pub mod store;
pub mod throttle;
pub mod worker_pool;

pub use audit::{
    build_audit_event, AuditEvent, AuditReader, AuditSink, InMemoryAuditSink, SharedAudit,
};
pub use dispatch::{DispatchOutcome, Dispatcher, RescheduleReason};
pub use error::{AppResult, DeliveryError, DispatchError, QueueError, ValidationError};
pub use intake::{Intake, IntakeSettings, ScheduleReceipt, ScheduleRequest};
pub use message::{DispatchJob, Message, MessageId, MessagePatch, MessageStatus};
pub use queue::{EntryState, FailOutcome, HeldEntry, QueueEntry, RetryPolicy, WorkQueue};
pub use recovery::{reconcile, RecoveryReport};
pub use reporting::{
    history, sender_stats, set_starred, toggle_starred, SenderStats, DEFAULT_HISTORY_LIMIT,
};
pub use sink::{DeliveryReceipt, DeliverySink, Envelope};
pub use store::MessageStore;
pub use throttle::{RateCounterStore, ThrottleSettings};
pub use worker_pool::{DispatchPool, PoolError, PoolStats};
