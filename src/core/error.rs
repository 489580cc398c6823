//! Error types for dispatch operations.

use thiserror::Error;

use crate::core::message::{MessageId, MessageStatus};

/// Errors produced by dispatch components.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// Batch request rejected before any state was created.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// No message exists with the given id.
    #[error("message not found: {0}")]
    NotFound(MessageId),
    /// The store refused a status change that is not a valid lifecycle step.
    #[error("invalid status transition for {id}: {from} -> {to}")]
    InvalidTransition {
        /// Message identifier.
        id: MessageId,
        /// Status currently recorded.
        from: MessageStatus,
        /// Status that was requested.
        to: MessageStatus,
    },
    /// Work queue failure.
    #[error("queue error: {0}")]
    Queue(#[from] QueueError),
    /// Durable message store failure.
    #[error("store error: {0}")]
    Store(String),
    /// Rate counter store failure.
    #[error("counter store error: {0}")]
    Counter(String),
    /// Delivery sink reported a failure.
    #[error("delivery failed: {0}")]
    Delivery(#[from] DeliveryError),
}

/// A violated constraint on a schedule request.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Recipient list was empty.
    #[error("recipients must contain at least one address")]
    EmptyRecipients,
    /// A recipient address is not a well-formed email address.
    #[error("recipient #{index} is not a valid address: {address:?}")]
    InvalidRecipient {
        /// Position in the recipient list.
        index: usize,
        /// Offending value.
        address: String,
    },
    /// Sender identity is not a well-formed email address.
    #[error("sender is not a valid address: {0:?}")]
    InvalidSender(String),
    /// Subject was empty.
    #[error("subject must not be empty")]
    EmptySubject,
    /// Body was empty.
    #[error("body must not be empty")]
    EmptyBody,
    /// Start time is not an RFC 3339 timestamp.
    #[error("start time is malformed: {0:?}")]
    MalformedStartTime(String),
    /// Per-recipient delay was negative.
    #[error("delay seconds must be >= 0, got {0}")]
    NegativeDelay(i64),
    /// Hourly limit was below one.
    #[error("hourly limit must be >= 1, got {0}")]
    NonPositiveHourlyLimit(i64),
}

/// Errors raised by work queue backends.
#[derive(Debug, Error)]
pub enum QueueError {
    /// An entry with this id is already waiting or held.
    #[error("entry {0} already queued")]
    Duplicate(MessageId),
    /// The caller no longer holds custody of the entry.
    #[error("entry {0} is not held by the caller")]
    NotHeld(MessageId),
    /// The queue no longer accepts submissions or hands out work.
    #[error("queue closed")]
    Closed,
    /// Persistence journal failure.
    #[error("journal error: {0}")]
    Journal(String),
}

/// Failure reported by a delivery sink.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{reason}")]
pub struct DeliveryError {
    /// Human-readable failure description.
    pub reason: String,
}

impl DeliveryError {
    /// Build a delivery error from any displayable reason.
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
