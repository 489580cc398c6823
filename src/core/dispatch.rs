//! Throttle-and-deliver protocol, run by a worker for each held entry.
//!
//! ```text
//! take() ─► PROCESSING ─► hourly admission ─┬─ over cap ─► undo, RESCHEDULED @ next hour
//!                                            ▼
//!                                   spacing lease + marker ─┬─ too early / busy ─► undo, RESCHEDULED
//!                                            ▼
//!                                         deliver ─┬─ ok ─► marker, SENT, complete
//!                                                  └─ err ─► FAILED, queue retry policy
//! ```
//!
//! The hourly bucket is the wall-clock hour, not a rolling window, so a burst
//! straddling a boundary can admit up to twice the cap in a short span.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::core::audit::{self, build_audit_event, SharedAudit};
use crate::core::message::{MessagePatch, MessageStatus};
use crate::core::sink::Envelope;
use crate::core::throttle::{hourly_key, last_sent_key, lease_key};
use crate::core::{
    DeliverySink, DispatchError, FailOutcome, HeldEntry, MessageStore, RateCounterStore,
    ThrottleSettings, WorkQueue,
};
use crate::util::clock::{hour_bucket_start, next_hour_start, Clock};

/// Why an entry was moved to a later due time.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RescheduleReason {
    /// The sender's hourly cap is used up for the current bucket.
    HourlyLimit,
    /// The sender's last send was too recent.
    Spacing,
    /// Another worker is sending for the same sender.
    SenderBusy,
}

impl fmt::Display for RescheduleReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HourlyLimit => write!(f, "hourly limit reached"),
            Self::Spacing => write!(f, "minimum spacing not elapsed"),
            Self::SenderBusy => write!(f, "sender busy"),
        }
    }
}

/// Terminal result of one protocol run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Delivered and completed.
    Sent {
        /// Delivery time.
        sent_at: u128,
    },
    /// Returned to the queue with a later due time.
    Rescheduled {
        /// New due time.
        due_ms: u128,
        /// Throttle that triggered it.
        reason: RescheduleReason,
    },
    /// Attempt failed and was handed to the queue's retry policy.
    Failed {
        /// Failure description recorded on the message.
        error: String,
        /// Queue decision, if the queue accepted the release.
        retry: Option<FailOutcome>,
    },
}

/// Runs the throttle-and-deliver protocol against shared collaborators.
#[derive(Clone)]
pub struct Dispatcher {
    store: Arc<dyn MessageStore>,
    counters: Arc<dyn RateCounterStore>,
    sink: Arc<dyn DeliverySink>,
    queue: Arc<dyn WorkQueue>,
    clock: Arc<dyn Clock>,
    settings: ThrottleSettings,
    audit: Option<SharedAudit>,
}

impl Dispatcher {
    /// Create a dispatcher.
    pub fn new(
        store: Arc<dyn MessageStore>,
        counters: Arc<dyn RateCounterStore>,
        sink: Arc<dyn DeliverySink>,
        queue: Arc<dyn WorkQueue>,
        clock: Arc<dyn Clock>,
        settings: ThrottleSettings,
    ) -> Self {
        Self {
            store,
            counters,
            sink,
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

    /// Process one held entry to a terminal outcome. Custody is always
    /// released, except when the queue itself rejects the release.
    pub async fn process(&self, held: HeldEntry) -> DispatchOutcome {
        debug!(message_id = %held.id, attempts = held.attempts, "processing entry");

        if let Err(err) = self.store.update(held.id, MessagePatch::processing()).await {
            return self.fail(&held, &err).await;
        }
        self.audit(&held, MessageStatus::Processing, None);

        match self.run(&held).await {
            Ok(outcome) => outcome,
            Err(err) => self.fail(&held, &err).await,
        }
    }

    async fn run(&self, held: &HeldEntry) -> Result<DispatchOutcome, DispatchError> {
        let job = &held.job;
        let now = self.clock.now_ms();
        let bucket = hour_bucket_start(now);
        let rate_key = hourly_key(&job.sender_id, bucket);

        let count = self.counters.incr(&rate_key).await?;
        if count == 1 {
            self.counters
                .expire(&rate_key, self.settings.counter_expiry())
                .await?;
        }
        if count > i64::from(job.hourly_limit) {
            self.undo_admission(&rate_key).await;
            let due = next_hour_start(now);
            warn!(
                sender = %job.sender_id,
                message_id = %held.id,
                count,
                limit = job.hourly_limit,
                "hourly limit hit, rescheduling to next hour"
            );
            return self
                .reschedule(held, due, RescheduleReason::HourlyLimit)
                .await;
        }

        let min_delay_ms = job.min_delay_ms();
        if min_delay_ms == 0 {
            return self.check_spacing_and_send(held, &rate_key, 0).await;
        }

        let lease = lease_key(&job.sender_id);
        let owner = held.id.to_string();
        let acquired = self
            .counters
            .try_acquire_lease(&lease, &owner, self.settings.lease_ttl)
            .await?;
        if !acquired {
            self.undo_admission(&rate_key).await;
            let due = self.clock.now_ms() + min_delay_ms;
            debug!(sender = %job.sender_id, message_id = %held.id, "sender busy, rescheduling");
            return self.reschedule(held, due, RescheduleReason::SenderBusy).await;
        }

        let result = self
            .check_spacing_and_send(held, &rate_key, min_delay_ms)
            .await;
        if let Err(err) = self.counters.release_lease(&lease, &owner).await {
            warn!(sender = %job.sender_id, error = %err, "failed to release spacing lease");
        }
        result
    }

    async fn check_spacing_and_send(
        &self,
        held: &HeldEntry,
        rate_key: &str,
        min_delay_ms: u128,
    ) -> Result<DispatchOutcome, DispatchError> {
        let job = &held.job;
        let marker_key = last_sent_key(&job.sender_id);

        let now = self.clock.now_ms();
        if let Some(last_sent) = self.counters.get(&marker_key).await? {
            let last_sent = u128::try_from(last_sent).unwrap_or_default();
            let elapsed = now.saturating_sub(last_sent);
            if elapsed < min_delay_ms {
                self.undo_admission(rate_key).await;
                let wait = min_delay_ms - elapsed;
                let due = now + wait;
                debug!(
                    sender = %job.sender_id,
                    message_id = %held.id,
                    wait_ms = %wait,
                    "minimum spacing enforced"
                );
                return self.reschedule(held, due, RescheduleReason::Spacing).await;
            }
        }

        let receipt = self.sink.deliver(&Envelope::from(job)).await?;

        let sent_at = self.clock.now_ms();
        let marker = i64::try_from(sent_at).unwrap_or(i64::MAX);
        self.counters.set(&marker_key, marker).await?;
        self.store
            .update(held.id, MessagePatch::sent(sent_at))
            .await?;
        self.queue.complete(held)?;
        self.audit(held, MessageStatus::Sent, Some(receipt.message_ref.clone()));

        info!(
            message_id = %held.id,
            sender = %job.sender_id,
            message_ref = %receipt.message_ref,
            "message sent"
        );
        Ok(DispatchOutcome::Sent { sent_at })
    }

    /// Roll back a provisional admission. A failed rollback leaves the bucket
    /// over-counted, which can only delay sends, so it is logged and ignored.
    async fn undo_admission(&self, rate_key: &str) {
        if let Err(err) = self.counters.decr(rate_key).await {
            warn!(key = rate_key, error = %err, "failed to roll back hourly admission");
        }
    }

    async fn reschedule(
        &self,
        held: &HeldEntry,
        due_ms: u128,
        reason: RescheduleReason,
    ) -> Result<DispatchOutcome, DispatchError> {
        // Write the status before releasing custody: once the entry is back
        // in the queue another worker may take it, and this write must not
        // land on top of that worker's. A failed write leaves PROCESSING,
        // which the next take overwrites.
        if let Err(err) = self
            .store
            .update(held.id, MessagePatch::rescheduled(due_ms))
            .await
        {
            warn!(message_id = %held.id, error = %err, "failed to record reschedule");
        }
        self.queue.reschedule(held, due_ms)?;
        self.audit(held, MessageStatus::Rescheduled, Some(reason.to_string()));
        Ok(DispatchOutcome::Rescheduled { due_ms, reason })
    }

    async fn fail(&self, held: &HeldEntry, err: &DispatchError) -> DispatchOutcome {
        let reason = err.to_string();
        let now = self.clock.now_ms();
        error!(message_id = %held.id, sender = %held.job.sender_id, error = %reason, "dispatch attempt failed");

        if let Err(store_err) = self
            .store
            .update(held.id, MessagePatch::failed(reason.clone(), now))
            .await
        {
            error!(message_id = %held.id, error = %store_err, "failed to record failure");
        }
        self.audit(held, MessageStatus::Failed, Some(reason.clone()));

        let retry = match self.queue.fail(held, &reason) {
            Ok(outcome) => {
                if let FailOutcome::Exhausted { attempts } = outcome {
                    warn!(message_id = %held.id, attempts, "retries exhausted");
                }
                Some(outcome)
            }
            Err(queue_err) => {
                error!(message_id = %held.id, error = %queue_err, "queue rejected failure release");
                None
            }
        };
        DispatchOutcome::Failed {
            error: reason,
            retry,
        }
    }

    fn audit(&self, held: &HeldEntry, status: MessageStatus, detail: Option<String>) {
        audit::record(
            self.audit.as_ref(),
            build_audit_event(
                held.id,
                &held.job.sender_id,
                status,
                self.clock.now_ms(),
                detail,
            ),
        );
    }
}
