//! Read-side operations over the message store: per-sender counts, history,
//! and the starred flag.

use serde::{Deserialize, Serialize};

use crate::core::message::{Message, MessageId, MessagePatch, MessageStatus};
use crate::core::{DispatchError, MessageStore};

/// History length used when the caller does not ask for one.
pub const DEFAULT_HISTORY_LIMIT: usize = 100;

/// Per-sender status counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SenderStats {
    /// `PENDING`, `RESCHEDULED` or `PROCESSING`.
    pub pending: usize,
    /// `SENT`.
    pub sent: usize,
    /// `FAILED`.
    pub failed: usize,
}

/// Count a sender's messages by coarse status.
///
/// # Errors
///
/// Propagates store errors.
pub async fn sender_stats(
    store: &dyn MessageStore,
    sender_id: &str,
) -> Result<SenderStats, DispatchError> {
    let pending = store
        .count_by_sender_and_statuses(sender_id, &MessageStatus::OUTSTANDING)
        .await?;
    let sent = store
        .count_by_sender_and_statuses(sender_id, &[MessageStatus::Sent])
        .await?;
    let failed = store
        .count_by_sender_and_statuses(sender_id, &[MessageStatus::Failed])
        .await?;
    Ok(SenderStats {
        pending,
        sent,
        failed,
    })
}

/// A sender's messages, newest first.
///
/// # Errors
///
/// Propagates store errors.
pub async fn history(
    store: &dyn MessageStore,
    sender_id: &str,
    limit: usize,
) -> Result<Vec<Message>, DispatchError> {
    store.query_by_sender(sender_id, limit).await
}

/// Set the starred flag. Setting the current value again is a no-op write.
///
/// # Errors
///
/// [`DispatchError::NotFound`] if no record has `id`.
pub async fn set_starred(
    store: &dyn MessageStore,
    id: MessageId,
    starred: bool,
) -> Result<Message, DispatchError> {
    if store.get(id).await?.is_none() {
        return Err(DispatchError::NotFound(id));
    }
    store.update(id, MessagePatch::starred(starred)).await
}

/// Flip the starred flag and return the updated record. The read and the
/// write happen under one store lock, so concurrent toggles never cancel
/// out a flip.
///
/// # Errors
///
/// [`DispatchError::NotFound`] if no record has `id`.
pub async fn toggle_starred(
    store: &dyn MessageStore,
    id: MessageId,
) -> Result<Message, DispatchError> {
    store.toggle_starred(id).await
}
