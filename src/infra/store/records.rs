//! Indexed record set shared by the store backends.

use std::collections::{HashMap, HashSet};

use crate::core::{DispatchError, Message, MessageId, MessagePatch, MessageStatus};

/// Records keyed by id, plus insertion order for stable listing.
#[derive(Debug, Default)]
pub(crate) struct Records {
    by_id: HashMap<MessageId, Message>,
    order: Vec<MessageId>,
}

impl Records {
    /// Reject the whole batch if any id is already present or repeated.
    pub fn check_new(&self, messages: &[Message]) -> Result<(), DispatchError> {
        let mut seen = HashSet::with_capacity(messages.len());
        for message in messages {
            if self.by_id.contains_key(&message.id) || !seen.insert(message.id) {
                return Err(DispatchError::Store(format!(
                    "duplicate message id {}",
                    message.id
                )));
            }
        }
        Ok(())
    }

    pub fn insert(&mut self, message: Message) {
        if self.by_id.insert(message.id, message.clone()).is_none() {
            self.order.push(message.id);
        }
    }

    /// The record `patch` would produce, checked against the lifecycle.
    pub fn patched(
        &self,
        id: MessageId,
        patch: &MessagePatch,
        now_ms: u128,
    ) -> Result<Message, DispatchError> {
        let current = self.by_id.get(&id).ok_or(DispatchError::NotFound(id))?;
        if let Some(next) = patch.status {
            if !current.status.can_transition_to(next) {
                return Err(DispatchError::InvalidTransition {
                    id,
                    from: current.status,
                    to: next,
                });
            }
        }
        let mut updated = current.clone();
        patch.apply_to(&mut updated, now_ms);
        Ok(updated)
    }

    /// The star-flipping patch for `id` and the record it produces.
    pub fn toggled(
        &self,
        id: MessageId,
        now_ms: u128,
    ) -> Result<(MessagePatch, Message), DispatchError> {
        let current = self.by_id.get(&id).ok_or(DispatchError::NotFound(id))?;
        let patch = MessagePatch::starred(!current.is_starred);
        let updated = self.patched(id, &patch, now_ms)?;
        Ok((patch, updated))
    }

    /// Subset of `ids` whose records are still `PENDING`.
    pub fn discardable(&self, ids: &[MessageId]) -> Vec<MessageId> {
        ids.iter()
            .filter(|id| {
                self.by_id
                    .get(id)
                    .is_some_and(|m| m.status == MessageStatus::Pending)
            })
            .copied()
            .collect()
    }

    pub fn remove(&mut self, ids: &[MessageId]) {
        let gone: HashSet<MessageId> = ids
            .iter()
            .filter(|id| self.by_id.remove(id).is_some())
            .copied()
            .collect();
        if !gone.is_empty() {
            self.order.retain(|id| !gone.contains(id));
        }
    }

    /// Apply without the lifecycle check; used when replaying a log.
    pub fn apply_unchecked(&mut self, id: MessageId, patch: &MessagePatch, now_ms: u128) {
        if let Some(message) = self.by_id.get_mut(&id) {
            patch.apply_to(message, now_ms);
        }
    }

    pub fn get(&self, id: &MessageId) -> Option<&Message> {
        self.by_id.get(id)
    }

    pub fn newest_for_sender(&self, sender_id: &str, limit: usize) -> Vec<Message> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.by_id.get(id))
            .filter(|m| m.sender_id == sender_id)
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn count_for_sender(&self, sender_id: &str, statuses: &[MessageStatus]) -> usize {
        self.by_id
            .values()
            .filter(|m| m.sender_id == sender_id && statuses.contains(&m.status))
            .count()
    }

    pub fn oldest_with_statuses(&self, statuses: &[MessageStatus]) -> Vec<Message> {
        self.order
            .iter()
            .filter_map(|id| self.by_id.get(id))
            .filter(|m| statuses.contains(&m.status))
            .cloned()
            .collect()
    }
}
