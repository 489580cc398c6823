//! Shared rate-counter store abstraction and throttle key layout.
//!
//! Counters and markers are the only state mutated by several workers for
//! the same key, so every mutation goes through a single atomic primitive of
//! the store. Implementations must keep that atomicity across every caller
//! sharing the store, including other processes for networked backends.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::DispatchError;

const RATE_LIMIT_PREFIX: &str = "rate:limit:";
const LAST_SENT_PREFIX: &str = "rate:last_sent:";
const LEASE_PREFIX: &str = "rate:lease:";

/// Key of the hourly counter for `sender` in the bucket starting at `bucket_start_ms`.
#[must_use]
pub fn hourly_key(sender: &str, bucket_start_ms: u128) -> String {
    format!("{RATE_LIMIT_PREFIX}{sender}:{bucket_start_ms}")
}

/// Key of the last-sent marker for `sender`.
#[must_use]
pub fn last_sent_key(sender: &str) -> String {
    format!("{LAST_SENT_PREFIX}{sender}")
}

/// Key of the per-sender spacing lease.
#[must_use]
pub fn lease_key(sender: &str) -> String {
    format!("{LEASE_PREFIX}{sender}")
}

/// Timing knobs for the throttle protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleSettings {
    /// Extra lifetime given to an hourly counter beyond the bucket itself.
    pub expiry_buffer: Duration,
    /// Time-to-live of a spacing lease, bounding how long a crashed worker
    /// can block a sender.
    pub lease_ttl: Duration,
}

impl Default for ThrottleSettings {
    fn default() -> Self {
        Self {
            expiry_buffer: Duration::from_secs(600),
            lease_ttl: Duration::from_secs(30),
        }
    }
}

impl ThrottleSettings {
    /// Expiry applied on a bucket's first increment: one hour plus the buffer.
    #[must_use]
    pub fn counter_expiry(&self) -> Duration {
        Duration::from_secs(3_600) + self.expiry_buffer
    }
}

/// Atomically mutable key/value/counter service shared by all workers.
#[async_trait]
pub trait RateCounterStore: Send + Sync {
    /// Increment `key` (creating it at zero) and return the new value.
    async fn incr(&self, key: &str) -> Result<i64, DispatchError>;

    /// Decrement `key` and return the new value.
    async fn decr(&self, key: &str) -> Result<i64, DispatchError>;

    /// Set a time-to-live on an existing key. Returns `false` if absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, DispatchError>;

    /// Read a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<i64>, DispatchError>;

    /// Overwrite a value, clearing any expiry.
    async fn set(&self, key: &str, value: i64) -> Result<(), DispatchError>;

    /// Take `key` for `owner` if nobody holds it. The lease lapses after `ttl`.
    async fn try_acquire_lease(
        &self,
        key: &str,
        owner: &str,
        ttl: Duration,
    ) -> Result<bool, DispatchError>;

    /// Release `key` only if `owner` still holds it.
    async fn release_lease(&self, key: &str, owner: &str) -> Result<bool, DispatchError>;
}
