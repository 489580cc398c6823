//! Store/queue reconciliation.
//!
//! Intake persists every record before enqueueing, and a worker writes the
//! store before releasing custody, so a crash between the two leaves a record
//! that is outstanding in the store but has no live queue entry. The sweep
//! finds those records and re-submits them.

use tracing::{debug, info};

use crate::core::message::MessageStatus;
use crate::core::{DispatchError, MessageStore, WorkQueue};
use crate::util::clock::Clock;

/// What a reconciliation pass did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Records given a fresh queue entry.
    pub requeued: usize,
    /// Outstanding records left alone (still live in the queue, or a
    /// `PROCESSING` record too recent to be considered stuck).
    pub skipped: usize,
}

/// Re-enqueue outstanding records that have no live queue entry.
///
/// `PENDING` and `RESCHEDULED` records qualify as soon as their entry is
/// missing. `PROCESSING` records qualify only once their last store write is
/// older than `stale_after_ms`, so an in-flight attempt on another process is
/// not duplicated. Re-submitted entries are due at their recorded
/// `scheduled_at`, or immediately if that has passed.
///
/// # Errors
///
/// Returns the first store or queue error; records handled before it stay
/// requeued.
pub async fn reconcile(
    store: &dyn MessageStore,
    queue: &dyn WorkQueue,
    clock: &dyn Clock,
    stale_after_ms: u128,
) -> Result<RecoveryReport, DispatchError> {
    let outstanding = store.query_by_statuses(&MessageStatus::OUTSTANDING).await?;
    let now = clock.now_ms();
    let mut report = RecoveryReport::default();

    for message in outstanding {
        if queue.contains(&message.id) {
            report.skipped += 1;
            continue;
        }
        if message.status == MessageStatus::Processing
            && now.saturating_sub(message.updated_at) < stale_after_ms
        {
            debug!(message_id = %message.id, "processing record not yet stale");
            report.skipped += 1;
            continue;
        }

        let due = message.scheduled_at.max(now);
        queue.submit(message.job(), due)?;
        debug!(
            message_id = %message.id,
            status = %message.status,
            due_ms = %due,
            "requeued orphaned record"
        );
        report.requeued += 1;
    }

    info!(
        requeued = report.requeued,
        skipped = report.skipped,
        "reconciliation complete"
    );
    Ok(report)
}
