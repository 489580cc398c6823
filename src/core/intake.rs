//! Scheduling intake: validate a batch request, fan it out into one message
//! per recipient, persist the records, then hand each to the work queue.

use std::sync::Arc;

use chrono::DateTime;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::core::audit::{self, build_audit_event, SharedAudit};
use crate::core::message::{Message, MessageId, MessageStatus};
use crate::core::{DispatchError, MessageStore, ValidationError, WorkQueue};
use crate::util::clock::Clock;

/// Default hourly cap when a request omits it.
pub const DEFAULT_HOURLY_LIMIT: i64 = 100;

/// Batch schedule request as received from the request layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleRequest {
    /// Sender identity; must be an email address.
    pub sender_id: String,
    /// Subject line.
    pub subject: String,
    /// Body.
    pub body: String,
    /// Recipient addresses, in send order.
    pub recipients: Vec<String>,
    /// RFC 3339 start time.
    pub start_time: String,
    /// Seconds between consecutive recipients; also the sender's minimum spacing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay_seconds: Option<i64>,
    /// Hourly cap for the sender.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hourly_limit: Option<i64>,
}

/// A request that passed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedBatch {
    /// Start time in ms since epoch.
    pub start_ms: u128,
    /// Per-recipient delay in seconds.
    pub delay_seconds: u64,
    /// Hourly cap.
    pub hourly_limit: u32,
}

impl ScheduleRequest {
    /// Check every constraint with the built-in defaults for omitted fields.
    pub fn validate(&self) -> Result<ValidatedBatch, ValidationError> {
        self.validate_with(&IntakeSettings::default())
    }

    /// Check every constraint, reporting the first one violated. Omitted
    /// delay and limit fall back to `settings`.
    pub fn validate_with(&self, settings: &IntakeSettings) -> Result<ValidatedBatch, ValidationError> {
        if !is_valid_address(&self.sender_id) {
            return Err(ValidationError::InvalidSender(self.sender_id.clone()));
        }
        if self.subject.is_empty() {
            return Err(ValidationError::EmptySubject);
        }
        if self.body.is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        if self.recipients.is_empty() {
            return Err(ValidationError::EmptyRecipients);
        }
        if let Some((index, address)) = self
            .recipients
            .iter()
            .enumerate()
            .find(|(_, r)| !is_valid_address(r))
        {
            return Err(ValidationError::InvalidRecipient {
                index,
                address: address.clone(),
            });
        }
        let start_ms = DateTime::parse_from_rfc3339(&self.start_time)
            .ok()
            .and_then(|t| u128::try_from(t.timestamp_millis()).ok())
            .ok_or_else(|| ValidationError::MalformedStartTime(self.start_time.clone()))?;
        let delay = self.delay_seconds.unwrap_or(settings.default_delay_seconds);
        let delay_seconds =
            u64::try_from(delay).map_err(|_| ValidationError::NegativeDelay(delay))?;
        let limit = self.hourly_limit.unwrap_or(settings.default_hourly_limit);
        let hourly_limit = u32::try_from(limit)
            .ok()
            .filter(|l| *l >= 1)
            .ok_or(ValidationError::NonPositiveHourlyLimit(limit))?;
        Ok(ValidatedBatch {
            start_ms,
            delay_seconds,
            hourly_limit,
        })
    }
}

/// Minimal well-formedness check: `local@domain.tld`, no whitespace.
#[must_use]
pub fn is_valid_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
        && domain
            .split_once('.')
            .is_some_and(|(host, tld)| !host.is_empty() && !tld.is_empty() && !tld.ends_with('.'))
}

/// Due time of the recipient at `index`: `start + index * delay`.
#[must_use]
pub fn due_time(start_ms: u128, index: usize, delay_seconds: u64) -> u128 {
    start_ms + index as u128 * u128::from(delay_seconds) * 1000
}

/// Result of a successful batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleReceipt {
    /// Number of messages scheduled.
    pub count: usize,
}

/// Intake tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IntakeSettings {
    /// Records per store write.
    pub chunk_size: usize,
    /// Hourly cap applied when a request omits one.
    pub default_hourly_limit: i64,
    /// Per-recipient delay applied when a request omits one.
    pub default_delay_seconds: i64,
}

impl Default for IntakeSettings {
    fn default() -> Self {
        Self {
            chunk_size: 1_000,
            default_hourly_limit: DEFAULT_HOURLY_LIMIT,
            default_delay_seconds: 0,
        }
    }
}

/// Scheduling intake.
#[derive(Clone)]
pub struct Intake {
    store: Arc<dyn MessageStore>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    settings: IntakeSettings,
    audit: Option<SharedAudit>,
}

impl Intake {
    /// Create an intake over the given store and queue.
    pub fn new(
        store: Arc<dyn MessageStore>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        settings: IntakeSettings,
    ) -> Self {
        Self {
            store,
            queue,
            clock,
            settings,
            audit: None,
        }
    }

    /// Attach an audit sink.
    #[must_use]
    pub fn with_audit(mut self, audit: SharedAudit) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Materialize one message per recipient without persisting anything.
    pub fn materialize(&self, request: &ScheduleRequest) -> Result<Vec<Message>, ValidationError> {
        let batch = request.validate_with(&self.settings)?;
        let now = self.clock.now_ms();
        Ok(request
            .recipients
            .iter()
            .enumerate()
            .map(|(index, recipient)| Message {
                id: Uuid::new_v4(),
                sender_id: request.sender_id.clone(),
                recipient: recipient.clone(),
                subject: request.subject.clone(),
                body: request.body.clone(),
                scheduled_at: due_time(batch.start_ms, index, batch.delay_seconds),
                status: MessageStatus::Pending,
                sent_at: None,
                failed_at: None,
                error: None,
                hourly_limit: batch.hourly_limit,
                min_delay_seconds: batch.delay_seconds,
                is_starred: false,
                created_at: now,
                updated_at: now,
            })
            .collect())
    }

    /// Validate, persist, and enqueue a batch.
    ///
    /// Every record is persisted before the batch is enqueued in a single
    /// all-or-nothing queue write. If any step fails, the records written so
    /// far are discarded before the error is returned, so a rejected request
    /// leaves nothing behind for a retry to duplicate.
    pub async fn schedule_batch(
        &self,
        request: &ScheduleRequest,
    ) -> Result<ScheduleReceipt, DispatchError> {
        let messages = self.materialize(request)?;

        let mut written_ids = Vec::with_capacity(messages.len());
        for chunk in messages.chunks(self.settings.chunk_size.max(1)) {
            if let Err(err) = self.store.create_batch(chunk).await {
                self.discard(&written_ids, &request.sender_id).await;
                return Err(err);
            }
            written_ids.extend(chunk.iter().map(|m| m.id));
            debug!(written = chunk.len(), sender = %request.sender_id, "persisted message chunk");
        }

        let now = self.clock.now_ms();
        let jobs = messages
            .iter()
            .map(|m| (m.job(), now + m.scheduled_at.saturating_sub(now)))
            .collect();
        if let Err(err) = self.queue.submit_batch(jobs) {
            self.discard(&written_ids, &request.sender_id).await;
            return Err(err.into());
        }

        for message in &messages {
            audit::record(
                self.audit.as_ref(),
                build_audit_event(
                    message.id,
                    &message.sender_id,
                    MessageStatus::Pending,
                    now,
                    None,
                ),
            );
        }

        info!(
            count = messages.len(),
            sender = %request.sender_id,
            "scheduled batch"
        );
        Ok(ScheduleReceipt {
            count: messages.len(),
        })
    }

    async fn discard(&self, ids: &[MessageId], sender_id: &str) {
        if ids.is_empty() {
            return;
        }
        match self.store.discard(ids).await {
            Ok(discarded) => warn!(discarded, sender = %sender_id, "rolled back failed batch"),
            Err(err) => error!(
                error = %err,
                sender = %sender_id,
                count = ids.len(),
                "failed to roll back batch records"
            ),
        }
    }
}
