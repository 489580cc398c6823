//! Time-ordered work queue abstraction.
//!
//! An entry is keyed by its [`MessageId`] and is never handed to a worker
//! before its due time. Custody is exclusive: while a worker holds an entry
//! no other worker can observe it, and the holder releases it through exactly
//! one of [`WorkQueue::reschedule`], [`WorkQueue::complete`] or
//! [`WorkQueue::fail`].

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::core::message::{DispatchJob, MessageId};
use crate::core::QueueError;

/// Where an entry currently sits in the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryState {
    /// Not yet due, or due and waiting for a worker.
    Waiting,
    /// In a worker's custody.
    Held,
    /// Retries exhausted; kept for inspection.
    Dead {
        /// Reason given for the final failure.
        reason: String,
    },
}

/// A queue entry as stored by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Entry identity (same as the message id).
    pub id: MessageId,
    /// Typed payload.
    pub job: DispatchJob,
    /// Earliest instant the entry may be taken (ms since epoch).
    pub due_ms: u128,
    /// Failed attempts so far.
    pub attempts: u32,
    /// Current position in the entry lifecycle.
    pub state: EntryState,
}

impl QueueEntry {
    /// A fresh waiting entry.
    #[must_use]
    pub const fn new(job: DispatchJob, due_ms: u128) -> Self {
        Self {
            id: job.id,
            job,
            due_ms,
            attempts: 0,
            state: EntryState::Waiting,
        }
    }

    /// Whether the entry is waiting or held.
    #[must_use]
    pub const fn is_live(&self) -> bool {
        matches!(self.state, EntryState::Waiting | EntryState::Held)
    }
}

/// An entry in a worker's custody.
///
/// The custody token ties queue operations to this particular take; once the
/// entry has been released, further operations with the same handle fail
/// with [`QueueError::NotHeld`].
#[derive(Debug)]
pub struct HeldEntry {
    /// Entry identity.
    pub id: MessageId,
    /// Typed payload.
    pub job: DispatchJob,
    /// Due time the entry was taken at.
    pub due_ms: u128,
    /// Failed attempts before this one.
    pub attempts: u32,
    custody: u64,
}

impl HeldEntry {
    /// Build a handle; only queue backends mint custody tokens.
    #[must_use]
    pub(crate) const fn new(job: DispatchJob, due_ms: u128, attempts: u32, custody: u64) -> Self {
        Self {
            id: job.id,
            job,
            due_ms,
            attempts,
            custody,
        }
    }

    /// Custody token for this take.
    #[must_use]
    pub const fn custody(&self) -> u64 {
        self.custody
    }
}

/// Result of handing a failed attempt back to the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailOutcome {
    /// Entry will be retried.
    Retrying {
        /// Failed attempts including this one.
        attempt: u32,
        /// When the retry becomes due.
        next_due_ms: u128,
    },
    /// No attempts left; the entry is now a dead letter.
    Exhausted {
        /// Total failed attempts.
        attempts: u32,
    },
}

/// Bounded exponential backoff applied by [`WorkQueue::fail`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay after the first failure.
    pub base_delay_ms: u64,
    /// Upper bound on any single delay.
    pub max_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 1_000,
            max_delay_ms: 60_000,
        }
    }
}

impl RetryPolicy {
    /// Backoff before retrying after `attempt` failures (1-based).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> u64 {
        let base = self.base_delay_ms.max(1);
        let max = self.max_delay_ms.max(base);
        let pow = 2u64.saturating_pow(attempt.saturating_sub(1));
        base.saturating_mul(pow).min(max)
    }

    /// Decide what happens after the `attempt`-th failure at `now_ms`.
    #[must_use]
    pub fn after_failure(&self, attempt: u32, now_ms: u128) -> FailOutcome {
        if attempt >= self.max_attempts {
            FailOutcome::Exhausted { attempts: attempt }
        } else {
            FailOutcome::Retrying {
                attempt,
                next_due_ms: now_ms + u128::from(self.delay_for(attempt)),
            }
        }
    }
}

/// Queue backend abstraction.
#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Schedule one future attempt for each `(job, due_ms)`. All-or-nothing:
    /// a duplicate id or a journal failure leaves the queue unchanged.
    fn submit_batch(&self, jobs: Vec<(DispatchJob, u128)>) -> Result<(), QueueError>;

    /// Schedule one future attempt for `job` at `due_ms`.
    fn submit(&self, job: DispatchJob, due_ms: u128) -> Result<(), QueueError> {
        self.submit_batch(vec![(job, due_ms)])
    }

    /// Take a due entry if one exists, without waiting.
    fn try_take(&self) -> Result<Option<HeldEntry>, QueueError>;

    /// Wait until an entry is due and take it. Returns `None` once the queue
    /// is closed.
    async fn take(&self) -> Result<Option<HeldEntry>, QueueError>;

    /// Return a held entry to the waiting state with a new due time,
    /// preserving identity and attempt count.
    fn reschedule(&self, held: &HeldEntry, due_ms: u128) -> Result<(), QueueError>;

    /// Release a held entry after success; the entry is removed.
    fn complete(&self, held: &HeldEntry) -> Result<(), QueueError>;

    /// Release a held entry after a failed attempt and apply the retry policy.
    fn fail(&self, held: &HeldEntry, reason: &str) -> Result<FailOutcome, QueueError>;

    /// Whether a waiting or held entry exists for `id`.
    fn contains(&self, id: &MessageId) -> bool;

    /// Snapshot of the entry for `id`, including dead letters.
    fn entry(&self, id: &MessageId) -> Option<QueueEntry>;

    /// Number of live (waiting or held) entries.
    fn len(&self) -> usize;

    /// Whether there are no live entries.
    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Entries whose retries are exhausted.
    fn dead_letters(&self) -> Vec<QueueEntry>;

    /// Stop handing out work and accepting submissions. Held entries can
    /// still be released.
    fn close(&self);
}
