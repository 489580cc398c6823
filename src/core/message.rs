//! Message records, lifecycle states, and the typed queue payload.

use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Globally unique message identifier; also the identity of its queue entry.
pub type MessageId = Uuid;

/// Lifecycle state of a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum MessageStatus {
    /// Persisted and waiting for its due time.
    Pending,
    /// Held by a worker.
    Processing,
    /// Delivered.
    Sent,
    /// Last attempt failed; the queue's retry policy decides what happens next.
    Failed,
    /// Postponed by a throttle and waiting for its new due time.
    Rescheduled,
}

impl MessageStatus {
    /// Statuses counted as outstanding work.
    pub const OUTSTANDING: [Self; 3] = [Self::Pending, Self::Rescheduled, Self::Processing];

    /// Whether moving from `self` to `next` is a valid lifecycle step.
    ///
    /// Self-transitions are accepted so status writes are idempotent, except
    /// that nothing leaves `Sent`.
    #[must_use]
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Sent, Self::Sent) => true,
            (Self::Sent, _) => false,
            (Self::Pending | Self::Rescheduled | Self::Failed, Self::Processing) => true,
            (Self::Processing, Self::Processing | Self::Sent | Self::Failed | Self::Rescheduled) => {
                true
            }
            (a, b) => a as u8 == b as u8,
        }
    }

    /// Audit action label for entering this state.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Processing => "processing",
            Self::Sent => "sent",
            Self::Failed => "failed",
            Self::Rescheduled => "rescheduled",
        }
    }
}

impl fmt::Display for MessageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One outbound message as recorded in the durable store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    /// Immutable identifier.
    pub id: MessageId,
    /// Throttling key.
    pub sender_id: String,
    /// Destination address.
    pub recipient: String,
    /// Subject line, passed through unchanged.
    pub subject: String,
    /// Body, passed through unchanged.
    pub body: String,
    /// Due time (ms since epoch).
    pub scheduled_at: u128,
    /// Current lifecycle state.
    pub status: MessageStatus,
    /// Delivery time, once sent.
    pub sent_at: Option<u128>,
    /// Time of the last failed attempt.
    pub failed_at: Option<u128>,
    /// Description of the last failure.
    pub error: Option<String>,
    /// Hourly cap for the sender, copied from the batch.
    pub hourly_limit: u32,
    /// Minimum spacing between sends for the sender, copied from the batch.
    pub min_delay_seconds: u64,
    /// User-facing flag with no scheduling effect.
    pub is_starred: bool,
    /// Creation time.
    pub created_at: u128,
    /// Time of the last store write.
    pub updated_at: u128,
}

impl Message {
    /// Typed queue payload for this message.
    #[must_use]
    pub fn job(&self) -> DispatchJob {
        DispatchJob {
            id: self.id,
            sender_id: self.sender_id.clone(),
            recipient: self.recipient.clone(),
            subject: self.subject.clone(),
            body: self.body.clone(),
            hourly_limit: self.hourly_limit,
            min_delay_seconds: self.min_delay_seconds,
        }
    }
}

/// Payload carried by a work queue entry.
///
/// Fields are fixed at intake so the worker sees exactly what was persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DispatchJob {
    /// Message identifier.
    pub id: MessageId,
    /// Throttling key.
    pub sender_id: String,
    /// Destination address.
    pub recipient: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: String,
    /// Hourly cap for the sender.
    pub hourly_limit: u32,
    /// Minimum spacing between sends, in seconds.
    pub min_delay_seconds: u64,
}

impl DispatchJob {
    /// Spacing requirement in milliseconds.
    #[must_use]
    pub const fn min_delay_ms(&self) -> u128 {
        self.min_delay_seconds as u128 * 1000
    }
}

/// Partial update applied to a stored message. `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MessagePatch {
    /// New lifecycle state.
    pub status: Option<MessageStatus>,
    /// New due time.
    pub scheduled_at: Option<u128>,
    /// Delivery time.
    pub sent_at: Option<u128>,
    /// Failure time.
    pub failed_at: Option<u128>,
    /// Failure description.
    pub error: Option<String>,
    /// Star flag.
    pub is_starred: Option<bool>,
}

impl MessagePatch {
    /// Enter `Processing`.
    #[must_use]
    pub fn processing() -> Self {
        Self {
            status: Some(MessageStatus::Processing),
            ..Self::default()
        }
    }

    /// Enter `Sent` at `sent_at`.
    #[must_use]
    pub fn sent(sent_at: u128) -> Self {
        Self {
            status: Some(MessageStatus::Sent),
            sent_at: Some(sent_at),
            ..Self::default()
        }
    }

    /// Enter `Rescheduled` with a new due time.
    #[must_use]
    pub fn rescheduled(scheduled_at: u128) -> Self {
        Self {
            status: Some(MessageStatus::Rescheduled),
            scheduled_at: Some(scheduled_at),
            ..Self::default()
        }
    }

    /// Enter `Failed` with a reason.
    #[must_use]
    pub fn failed(error: impl Into<String>, failed_at: u128) -> Self {
        Self {
            status: Some(MessageStatus::Failed),
            failed_at: Some(failed_at),
            error: Some(error.into()),
            ..Self::default()
        }
    }

    /// Set the star flag only.
    #[must_use]
    pub fn starred(value: bool) -> Self {
        Self {
            is_starred: Some(value),
            ..Self::default()
        }
    }

    /// Whether the patch touches scheduling state, as opposed to the star
    /// flag alone.
    #[must_use]
    pub const fn is_lifecycle(&self) -> bool {
        self.status.is_some()
            || self.scheduled_at.is_some()
            || self.sent_at.is_some()
            || self.failed_at.is_some()
            || self.error.is_some()
    }

    /// Apply this patch to `message`. Lifecycle patches stamp `updated_at`;
    /// a star-only patch leaves it alone so stale detection is unaffected.
    pub fn apply_to(&self, message: &mut Message, now_ms: u128) {
        if let Some(status) = self.status {
            message.status = status;
        }
        if let Some(at) = self.scheduled_at {
            message.scheduled_at = at;
        }
        if let Some(at) = self.sent_at {
            message.sent_at = Some(at);
        }
        if let Some(at) = self.failed_at {
            message.failed_at = Some(at);
        }
        if let Some(error) = &self.error {
            message.error = Some(error.clone());
        }
        if let Some(starred) = self.is_starred {
            message.is_starred = starred;
        }
        if self.is_lifecycle() {
            message.updated_at = now_ms;
        }
    }
}
