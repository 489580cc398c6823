//! Durable message store abstraction.
//!
//! The store is the system of record for message status. Lifecycle fields of
//! a given message are written only by the worker holding its queue entry, so
//! implementations need per-record consistency but no cross-record locking.
//! The star flag can be flipped by anyone, hence the dedicated
//! [`MessageStore::toggle_starred`].

use async_trait::async_trait;

use crate::core::message::{Message, MessageId, MessagePatch, MessageStatus};
use crate::core::DispatchError;

/// Key-indexed record store with a status field.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Persist new records. Returns the number written.
    async fn create_batch(&self, messages: &[Message]) -> Result<usize, DispatchError>;

    /// Apply a partial update and return the updated record.
    ///
    /// Fails with [`DispatchError::InvalidTransition`] if the patch changes
    /// status along a path the lifecycle does not allow.
    async fn update(&self, id: MessageId, patch: MessagePatch) -> Result<Message, DispatchError>;

    /// Flip the star flag in a single write and return the updated record.
    async fn toggle_starred(&self, id: MessageId) -> Result<Message, DispatchError>;

    /// Remove records that are still `PENDING`, returning how many went.
    /// Intake uses this to take back a batch it could not enqueue.
    async fn discard(&self, ids: &[MessageId]) -> Result<usize, DispatchError>;

    /// Fetch a single record.
    async fn get(&self, id: MessageId) -> Result<Option<Message>, DispatchError>;

    /// Records for a sender, newest first, at most `limit`.
    async fn query_by_sender(
        &self,
        sender_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DispatchError>;

    /// Count a sender's records whose status is in `statuses`.
    async fn count_by_sender_and_statuses(
        &self,
        sender_id: &str,
        statuses: &[MessageStatus],
    ) -> Result<usize, DispatchError>;

    /// All records whose status is in `statuses`, oldest first.
    async fn query_by_statuses(
        &self,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>, DispatchError>;
}
