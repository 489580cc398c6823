//! Due-time ordered queue with exclusive custody and retry bookkeeping.
//!
//! Entries live in a map keyed by message id; waiting entries are also
//! indexed in a `BTreeSet` ordered by `(due_ms, seq)` so the earliest due
//! entry is found in O(log n) and entries due at the same instant come out
//! in the order they were queued. Mutations are appended to a
//! [`QueueJournal`] as [`JournalOp`]s, and the journal is compacted back to
//! one record per entry once the ops outgrow the live set. Takes are not
//! journaled: an entry held at crash time replays as waiting. The in-memory
//! variant uses [`NullJournal`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, error, warn};

use crate::core::{
    DispatchJob, EntryState, FailOutcome, HeldEntry, MessageId, QueueEntry, QueueError,
    RetryPolicy, WorkQueue,
};
use crate::util::clock::Clock;

/// Longest a parked `take()` sleeps before re-reading the clock. Keeps
/// injected clocks that jump forward from stranding idle workers.
const MAX_PARK: Duration = Duration::from_secs(1);

/// Journal ops below which compaction never runs.
const COMPACT_MIN_OPS: usize = 1_024;

/// One journaled mutation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JournalOp {
    /// Insert or replace the entry.
    Put {
        /// Entry as it stands after the mutation.
        entry: QueueEntry,
    },
    /// Drop the entry.
    Remove {
        /// Entry identity.
        id: MessageId,
    },
}

impl JournalOp {
    /// Fold a sequence of ops into the entries it leaves behind.
    pub fn replay(ops: impl IntoIterator<Item = Self>) -> Vec<QueueEntry> {
        let mut entries = HashMap::new();
        for op in ops {
            match op {
                Self::Put { entry } => {
                    entries.insert(entry.id, entry);
                }
                Self::Remove { id } => {
                    entries.remove(&id);
                }
            }
        }
        entries.into_values().collect()
    }
}

/// Persistence hook for queue state.
pub trait QueueJournal: Send + Sync {
    /// Entries recorded by a previous run.
    fn load(&self) -> Result<Vec<QueueEntry>, QueueError>;

    /// Record `ops` after everything already journaled. Either all of them
    /// land or the call fails.
    fn append(&self, ops: &[JournalOp]) -> Result<(), QueueError>;

    /// Replace the journal with exactly `entries`.
    fn compact(&self, entries: &[&QueueEntry]) -> Result<(), QueueError>;
}

/// Journal that records nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NullJournal;

impl QueueJournal for NullJournal {
    fn load(&self) -> Result<Vec<QueueEntry>, QueueError> {
        Ok(Vec::new())
    }

    fn append(&self, _ops: &[JournalOp]) -> Result<(), QueueError> {
        Ok(())
    }

    fn compact(&self, _entries: &[&QueueEntry]) -> Result<(), QueueError> {
        Ok(())
    }
}

#[derive(Default)]
struct QueueState {
    entries: HashMap<MessageId, QueueEntry>,
    waiting: BTreeSet<(u128, u64, MessageId)>,
    waiting_seq: HashMap<MessageId, u64>,
    custody: HashMap<MessageId, u64>,
    next_custody: u64,
    next_seq: u64,
    /// Ops in the journal since it was last compacted.
    journal_ops: usize,
    /// A failed append may have left a partial record; rewrite before the
    /// next append.
    journal_dirty: bool,
}

impl QueueState {
    fn check_held(&self, held: &HeldEntry) -> Result<(), QueueError> {
        match self.custody.get(&held.id) {
            Some(token) if *token == held.custody() => Ok(()),
            _ => Err(QueueError::NotHeld(held.id)),
        }
    }

    fn insert_waiting(&mut self, entry: QueueEntry) {
        self.index_waiting(entry.id, entry.due_ms);
        self.entries.insert(entry.id, entry);
    }

    fn index_waiting(&mut self, id: MessageId, due_ms: u128) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.waiting.insert((due_ms, seq, id));
        self.waiting_seq.insert(id, seq);
    }

    fn unindex_waiting(&mut self, id: MessageId, due_ms: u128) {
        if let Some(seq) = self.waiting_seq.remove(&id) {
            self.waiting.remove(&(due_ms, seq, id));
        }
    }

    fn next_due(&self) -> Option<u128> {
        self.waiting.first().map(|(due, _, _)| *due)
    }

    fn put_op(&self, id: MessageId) -> Option<JournalOp> {
        self.entries
            .get(&id)
            .map(|entry| JournalOp::Put { entry: entry.clone() })
    }

    fn snapshot(&self) -> Vec<&QueueEntry> {
        let mut entries: Vec<&QueueEntry> = self.entries.values().collect();
        entries.sort_by_key(|e| (e.due_ms, e.id));
        entries
    }
}

/// Delay queue over a pluggable journal.
pub struct DelayQueue<J: QueueJournal> {
    state: Mutex<QueueState>,
    notify: Notify,
    clock: Arc<dyn Clock>,
    policy: RetryPolicy,
    journal: J,
    closed: AtomicBool,
}

/// Queue that lives only in process memory.
pub type InMemoryWorkQueue = DelayQueue<NullJournal>;

impl DelayQueue<NullJournal> {
    /// Create an empty in-memory queue.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>, policy: RetryPolicy) -> Self {
        Self::from_parts(clock, policy, NullJournal, Vec::new())
    }
}

impl<J: QueueJournal> DelayQueue<J> {
    /// Create a queue restored from `journal`. Entries that were held when
    /// the journal was last written are returned to waiting.
    pub fn with_journal(
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        journal: J,
    ) -> Result<Self, QueueError> {
        let restored = journal.load()?;
        let queue = Self::from_parts(clock, policy, journal, restored);
        {
            let mut state = queue.state.lock();
            queue.journal.compact(&state.snapshot())?;
            state.journal_ops = state.entries.len();
        }
        Ok(queue)
    }

    fn from_parts(
        clock: Arc<dyn Clock>,
        policy: RetryPolicy,
        journal: J,
        mut restored: Vec<QueueEntry>,
    ) -> Self {
        let mut state = QueueState::default();
        restored.sort_by_key(|e| (e.due_ms, e.id));
        for mut entry in restored {
            match entry.state {
                EntryState::Dead { .. } => {
                    state.entries.insert(entry.id, entry);
                }
                EntryState::Waiting | EntryState::Held => {
                    entry.state = EntryState::Waiting;
                    state.insert_waiting(entry);
                }
            }
        }
        Self {
            state: Mutex::new(state),
            notify: Notify::new(),
            clock,
            policy,
            journal,
            closed: AtomicBool::new(false),
        }
    }

    /// Retry policy applied by `fail`.
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// The journal this queue writes to.
    #[must_use]
    pub const fn journal(&self) -> &J {
        &self.journal
    }

    /// Earliest due time among waiting entries.
    #[must_use]
    pub fn next_due(&self) -> Option<u128> {
        self.state.lock().next_due()
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    fn compact(&self, state: &mut QueueState) -> Result<(), QueueError> {
        self.journal.compact(&state.snapshot())?;
        state.journal_ops = state.entries.len();
        state.journal_dirty = false;
        Ok(())
    }

    /// Journal `ops`, which describe a mutation already applied to `state`.
    fn record(&self, state: &mut QueueState, ops: &[JournalOp]) -> Result<(), QueueError> {
        if state.journal_dirty {
            return self.compact(state);
        }
        if let Err(err) = self.journal.append(ops) {
            state.journal_dirty = true;
            return Err(err);
        }
        state.journal_ops += ops.len();
        if state.journal_ops >= COMPACT_MIN_OPS.max(2 * state.entries.len()) {
            if let Err(err) = self.compact(state) {
                warn!(error = %err, "queue journal compaction failed");
            }
        }
        Ok(())
    }

    /// Journal a release. The in-memory state stays authoritative and the
    /// next write rewrites the journal, so a failure is logged.
    fn record_logged(&self, state: &mut QueueState, ops: &[JournalOp]) {
        if let Err(err) = self.record(state, ops) {
            error!(error = %err, "failed to journal queue state");
        }
    }
}

#[async_trait]
impl<J: QueueJournal> WorkQueue for DelayQueue<J> {
    fn submit_batch(&self, jobs: Vec<(DispatchJob, u128)>) -> Result<(), QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed);
        }
        if jobs.is_empty() {
            return Ok(());
        }
        let count = jobs.len();
        {
            let mut state = self.state.lock();
            let mut seen = HashSet::with_capacity(count);
            for (job, _) in &jobs {
                let live = state.entries.get(&job.id).is_some_and(QueueEntry::is_live);
                if live || !seen.insert(job.id) {
                    return Err(QueueError::Duplicate(job.id));
                }
            }

            let mut replaced = Vec::new();
            let mut ops = Vec::with_capacity(count);
            for (job, due_ms) in jobs {
                let entry = QueueEntry::new(job, due_ms);
                ops.push(JournalOp::Put {
                    entry: entry.clone(),
                });
                if let Some(previous) = state.entries.remove(&entry.id) {
                    replaced.push(previous);
                }
                state.insert_waiting(entry);
            }

            if let Err(err) = self.record(&mut state, &ops) {
                for op in &ops {
                    if let JournalOp::Put { entry } = op {
                        state.unindex_waiting(entry.id, entry.due_ms);
                        state.entries.remove(&entry.id);
                    }
                }
                for previous in replaced {
                    state.entries.insert(previous.id, previous);
                }
                return Err(err);
            }
        }
        debug!(count, "entries submitted");
        self.notify.notify_waiters();
        Ok(())
    }

    fn try_take(&self) -> Result<Option<HeldEntry>, QueueError> {
        if self.is_closed() {
            return Ok(None);
        }
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let Some(&(due, _, id)) = state.waiting.first() else {
            return Ok(None);
        };
        if due > now {
            return Ok(None);
        }
        state.unindex_waiting(id, due);
        let token = state.next_custody;
        state.next_custody += 1;
        state.custody.insert(id, token);
        let Some(entry) = state.entries.get_mut(&id) else {
            state.custody.remove(&id);
            return Err(QueueError::Journal(format!("index references missing entry {id}")));
        };
        entry.state = EntryState::Held;
        Ok(Some(HeldEntry::new(
            entry.job.clone(),
            entry.due_ms,
            entry.attempts,
            token,
        )))
    }

    async fn take(&self) -> Result<Option<HeldEntry>, QueueError> {
        loop {
            if self.is_closed() {
                return Ok(None);
            }

            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(held) = self.try_take()? {
                return Ok(Some(held));
            }
            if self.is_closed() {
                return Ok(None);
            }

            let now = self.clock.now_ms();
            let park = self.next_due().map_or(MAX_PARK, |due| {
                let wait = u64::try_from(due.saturating_sub(now)).unwrap_or(u64::MAX);
                Duration::from_millis(wait).min(MAX_PARK)
            });

            tokio::select! {
                () = &mut notified => {}
                () = tokio::time::sleep(park) => {}
            }
        }
    }

    fn reschedule(&self, held: &HeldEntry, due_ms: u128) -> Result<(), QueueError> {
        {
            let mut state = self.state.lock();
            state.check_held(held)?;
            state.custody.remove(&held.id);
            if let Some(entry) = state.entries.get_mut(&held.id) {
                entry.state = EntryState::Waiting;
                entry.due_ms = due_ms;
            }
            state.index_waiting(held.id, due_ms);
            let ops: Vec<JournalOp> = state.put_op(held.id).into_iter().collect();
            self.record_logged(&mut state, &ops);
        }
        self.notify.notify_waiters();
        Ok(())
    }

    fn complete(&self, held: &HeldEntry) -> Result<(), QueueError> {
        let mut state = self.state.lock();
        state.check_held(held)?;
        state.custody.remove(&held.id);
        state.entries.remove(&held.id);
        self.record_logged(&mut state, &[JournalOp::Remove { id: held.id }]);
        Ok(())
    }

    fn fail(&self, held: &HeldEntry, reason: &str) -> Result<FailOutcome, QueueError> {
        let now = self.clock.now_ms();
        let outcome = {
            let mut state = self.state.lock();
            state.check_held(held)?;
            state.custody.remove(&held.id);
            let Some(entry) = state.entries.get_mut(&held.id) else {
                return Err(QueueError::NotHeld(held.id));
            };
            entry.attempts += 1;
            let outcome = self.policy.after_failure(entry.attempts, now);
            match outcome {
                FailOutcome::Retrying { next_due_ms, .. } => {
                    entry.state = EntryState::Waiting;
                    entry.due_ms = next_due_ms;
                    state.index_waiting(held.id, next_due_ms);
                }
                FailOutcome::Exhausted { .. } => {
                    entry.state = EntryState::Dead {
                        reason: reason.to_string(),
                    };
                }
            }
            let ops: Vec<JournalOp> = state.put_op(held.id).into_iter().collect();
            self.record_logged(&mut state, &ops);
            outcome
        };
        if matches!(outcome, FailOutcome::Retrying { .. }) {
            self.notify.notify_waiters();
        }
        Ok(outcome)
    }

    fn contains(&self, id: &MessageId) -> bool {
        self.state
            .lock()
            .entries
            .get(id)
            .is_some_and(QueueEntry::is_live)
    }

    fn entry(&self, id: &MessageId) -> Option<QueueEntry> {
        self.state.lock().entries.get(id).cloned()
    }

    fn len(&self) -> usize {
        self.state
            .lock()
            .entries
            .values()
            .filter(|e| e.is_live())
            .count()
    }

    fn dead_letters(&self) -> Vec<QueueEntry> {
        let state = self.state.lock();
        let mut dead: Vec<QueueEntry> = state
            .entries
            .values()
            .filter(|e| matches!(e.state, EntryState::Dead { .. }))
            .cloned()
            .collect();
        dead.sort_by_key(|e| (e.due_ms, e.id));
        dead
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
        self.notify.notify_waiters();
    }
}
