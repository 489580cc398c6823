//! The assembled dispatch service.
//!
//! Owns every collaborator as an explicitly constructed handle: the store,
//! the queue, the counter store, the intake and the worker pool. Use
//! [`crate::builders::ServiceBuilder`] to create one.

use std::sync::Arc;

use tracing::info;

use crate::config::DispatchConfig;
use crate::core::{
    self, DispatchError, DispatchPool, Intake, Message, MessageId, MessageStore, PoolStats,
    RateCounterStore, RecoveryReport, ScheduleReceipt, ScheduleRequest, SenderStats, WorkQueue,
};
use crate::util::clock::Clock;

/// Running dispatch service.
pub struct DispatchService {
    pub(crate) config: DispatchConfig,
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) queue: Arc<dyn WorkQueue>,
    pub(crate) counters: Arc<dyn RateCounterStore>,
    pub(crate) clock: Arc<dyn Clock>,
    pub(crate) intake: Intake,
    pub(crate) pool: Option<DispatchPool>,
}

impl DispatchService {
    /// Configuration the service was built from.
    #[must_use]
    pub const fn config(&self) -> &DispatchConfig {
        &self.config
    }

    /// Scheduling intake.
    #[must_use]
    pub const fn intake(&self) -> &Intake {
        &self.intake
    }

    /// Message store handle.
    #[must_use]
    pub fn store(&self) -> Arc<dyn MessageStore> {
        Arc::clone(&self.store)
    }

    /// Work queue handle.
    #[must_use]
    pub fn queue(&self) -> Arc<dyn WorkQueue> {
        Arc::clone(&self.queue)
    }

    /// Rate counter store handle.
    #[must_use]
    pub fn counters(&self) -> Arc<dyn RateCounterStore> {
        Arc::clone(&self.counters)
    }

    /// Clock shared by every component.
    #[must_use]
    pub fn clock(&self) -> Arc<dyn Clock> {
        Arc::clone(&self.clock)
    }

    /// Validate, persist and enqueue a batch.
    pub async fn schedule(&self, request: &ScheduleRequest) -> Result<ScheduleReceipt, DispatchError> {
        self.intake.schedule_batch(request).await
    }

    /// Pool statistics; all zero when the service runs without workers.
    #[must_use]
    pub fn stats(&self) -> PoolStats {
        self.pool.as_ref().map(DispatchPool::stats).unwrap_or_default()
    }

    /// Whether workers are running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.pool.as_ref().is_some_and(|p| !p.is_shut_down())
    }

    /// Per-sender status counts.
    pub async fn sender_stats(&self, sender_id: &str) -> Result<SenderStats, DispatchError> {
        core::sender_stats(self.store.as_ref(), sender_id).await
    }

    /// A sender's messages, newest first.
    pub async fn history(&self, sender_id: &str, limit: usize) -> Result<Vec<Message>, DispatchError> {
        core::history(self.store.as_ref(), sender_id, limit).await
    }

    /// Set the starred flag.
    pub async fn set_starred(&self, id: MessageId, starred: bool) -> Result<Message, DispatchError> {
        core::set_starred(self.store.as_ref(), id, starred).await
    }

    /// Flip the starred flag.
    pub async fn toggle_starred(&self, id: MessageId) -> Result<Message, DispatchError> {
        core::toggle_starred(self.store.as_ref(), id).await
    }

    /// Re-enqueue outstanding records that lost their queue entry.
    pub async fn recover(&self) -> Result<RecoveryReport, DispatchError> {
        let stale_after = u128::from(self.config.recovery.stale_after_ms);
        core::reconcile(
            self.store.as_ref(),
            self.queue.as_ref(),
            self.clock.as_ref(),
            stale_after,
        )
        .await
    }

    /// Drain and stop: no new takes or submissions, in-flight entries
    /// finish, workers are joined with the configured timeout.
    pub fn shutdown(&self) {
        match &self.pool {
            Some(pool) => pool.shutdown(),
            None => self.queue.close(),
        }
        info!(queued = self.queue.len(), "dispatch service stopped");
    }
}
