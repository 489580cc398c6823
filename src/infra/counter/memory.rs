//! In-process rate counter store.
//!
//! Each operation runs under one mutex, which gives the same per-key
//! atomicity a networked counter service provides. Expiry is lazy: a key is
//! treated as absent once the clock passes its deadline. Mutating calls also
//! sweep out expired keys and lapsed leases at most once per
//! [`SWEEP_INTERVAL_MS`], so keys nobody touches again do not pile up.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::core::{DispatchError, RateCounterStore};
use crate::util::clock::Clock;

/// Minimum clock time between two sweeps.
pub const SWEEP_INTERVAL_MS: u128 = 60_000;

#[derive(Debug, Clone)]
struct Slot {
    value: i64,
    expires_at: Option<u128>,
}

#[derive(Debug, Clone)]
struct Lease {
    owner: String,
    expires_at: u128,
}

#[derive(Debug, Default)]
struct CounterState {
    slots: HashMap<String, Slot>,
    leases: HashMap<String, Lease>,
    next_sweep_at: u128,
}

impl CounterState {
    fn sweep(&mut self, now: u128) {
        if now < self.next_sweep_at {
            return;
        }
        self.slots
            .retain(|_, slot| slot.expires_at.is_none_or(|deadline| deadline > now));
        self.leases.retain(|_, lease| lease.expires_at > now);
        self.next_sweep_at = now + SWEEP_INTERVAL_MS;
    }

    fn live_slot(&mut self, key: &str, now: u128) -> Option<&mut Slot> {
        if self
            .slots
            .get(key)
            .and_then(|s| s.expires_at)
            .is_some_and(|deadline| deadline <= now)
        {
            self.slots.remove(key);
        }
        self.slots.get_mut(key)
    }

    fn add(&mut self, key: &str, delta: i64, now: u128) -> i64 {
        self.sweep(now);
        if let Some(slot) = self.live_slot(key, now) {
            slot.value += delta;
            return slot.value;
        }
        self.slots.insert(
            key.to_string(),
            Slot {
                value: delta,
                expires_at: None,
            },
        );
        delta
    }
}

/// Counter store held in process memory; shared by every worker of a
/// single process.
pub struct InMemoryCounterStore {
    state: Mutex<CounterState>,
    clock: Arc<dyn Clock>,
}

impl InMemoryCounterStore {
    /// Create an empty store whose expiries follow `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            state: Mutex::new(CounterState::default()),
            clock,
        }
    }

    /// Number of keys that have not expired.
    #[must_use]
    pub fn live_keys(&self) -> usize {
        let now = self.clock.now_ms();
        self.state
            .lock()
            .slots
            .values()
            .filter(|s| s.expires_at.is_none_or(|deadline| deadline > now))
            .count()
    }

    /// Remaining time-to-live of `key`, if it has one.
    #[must_use]
    pub fn ttl(&self, key: &str) -> Option<Duration> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        let deadline = state.live_slot(key, now)?.expires_at?;
        let remaining = u64::try_from(deadline.saturating_sub(now)).unwrap_or(u64::MAX);
        Some(Duration::from_millis(remaining))
    }
}

#[async_trait]
impl RateCounterStore for InMemoryCounterStore {
    async fn incr(&self, key: &str) -> Result<i64, DispatchError> {
        let now = self.clock.now_ms();
        Ok(self.state.lock().add(key, 1, now))
    }

    async fn decr(&self, key: &str) -> Result<i64, DispatchError> {
        let now = self.clock.now_ms();
        Ok(self.state.lock().add(key, -1, now))
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DispatchError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.sweep(now);
        Ok(state.live_slot(key, now).is_some_and(|slot| {
            slot.expires_at = Some(now + ttl.as_millis());
            true
        }))
    }

    async fn get(&self, key: &str) -> Result<Option<i64>, DispatchError> {
        let now = self.clock.now_ms();
        Ok(self.state.lock().live_slot(key, now).map(|s| s.value))
    }

    async fn set(&self, key: &str, value: i64) -> Result<(), DispatchError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.sweep(now);
        state.slots.insert(
            key.to_string(),
            Slot {
                value,
                expires_at: None,
            },
        );
        Ok(())
    }

    async fn try_acquire_lease(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, DispatchError> {
        let now = self.clock.now_ms();
        let mut state = self.state.lock();
        state.sweep(now);
        let available = state
            .leases
            .get(key)
            .is_none_or(|lease| lease.expires_at <= now || lease.owner == owner);
        if available {
            state.leases.insert(
                key.to_string(),
                Lease {
                    owner: owner.to_string(),
                    expires_at: now + ttl.as_millis(),
                },
            );
        }
        Ok(available)
    }

    async fn release_lease(&self, key: &str, owner: &str) -> Result<bool, DispatchError> {
        let mut state = self.state.lock();
        if state.leases.get(key).is_some_and(|lease| lease.owner == owner) {
            state.leases.remove(key);
            return Ok(true);
        }
        Ok(false)
    }
}
