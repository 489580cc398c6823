//! In-memory message store for development and tests.

use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::core::{DispatchError, Message, MessageId, MessagePatch, MessageStatus, MessageStore};
use crate::util::clock::Clock;

use super::records::Records;

/// Message store held entirely in process memory.
pub struct InMemoryMessageStore {
    records: RwLock<Records>,
    clock: Arc<dyn Clock>,
}

impl InMemoryMessageStore {
    /// Create an empty store stamping `updated_at` from `clock`.
    #[must_use]
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            records: RwLock::new(Records::default()),
            clock,
        }
    }
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_batch(&self, messages: &[Message]) -> Result<usize, DispatchError> {
        let mut records = self.records.write();
        records.check_new(messages)?;
        for message in messages {
            records.insert(message.clone());
        }
        Ok(messages.len())
    }

    async fn update(&self, id: MessageId, patch: MessagePatch) -> Result<Message, DispatchError> {
        let now = self.clock.now_ms();
        let mut records = self.records.write();
        let updated = records.patched(id, &patch, now)?;
        records.insert(updated.clone());
        Ok(updated)
    }

    async fn toggle_starred(&self, id: MessageId) -> Result<Message, DispatchError> {
        let now = self.clock.now_ms();
        let mut records = self.records.write();
        let (_, updated) = records.toggled(id, now)?;
        records.insert(updated.clone());
        Ok(updated)
    }

    async fn discard(&self, ids: &[MessageId]) -> Result<usize, DispatchError> {
        let mut records = self.records.write();
        let doomed = records.discardable(ids);
        records.remove(&doomed);
        Ok(doomed.len())
    }

    async fn get(&self, id: MessageId) -> Result<Option<Message>, DispatchError> {
        Ok(self.records.read().get(&id).cloned())
    }

    async fn query_by_sender(
        &self,
        sender_id: &str,
        limit: usize,
    ) -> Result<Vec<Message>, DispatchError> {
        Ok(self.records.read().newest_for_sender(sender_id, limit))
    }

    async fn count_by_sender_and_statuses(
        &self,
        sender_id: &str,
        statuses: &[MessageStatus],
    ) -> Result<usize, DispatchError> {
        Ok(self.records.read().count_for_sender(sender_id, statuses))
    }

    async fn query_by_statuses(
        &self,
        statuses: &[MessageStatus],
    ) -> Result<Vec<Message>, DispatchError> {
        Ok(self.records.read().oldest_with_statuses(statuses))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::clock::ManualClock;
    use uuid::Uuid;

    fn message(sender: &str, created_at: u128) -> Message {
        Message {
            id: Uuid::new_v4(),
            sender_id: sender.into(),
            recipient: "r@example.com".into(),
            subject: "s".into(),
            body: "b".into(),
            scheduled_at: created_at,
            status: MessageStatus::Pending,
            sent_at: None,
            failed_at: None,
            error: None,
            hourly_limit: 10,
            min_delay_seconds: 0,
            is_starred: false,
            created_at,
            updated_at: created_at,
        }
    }

    fn store() -> (InMemoryMessageStore, ManualClock) {
        let clock = ManualClock::new(5_000);
        (InMemoryMessageStore::new(Arc::new(clock.clone())), clock)
    }

    #[tokio::test]
    async fn test_update_stamps_and_guards_transitions() {
        let (store, clock) = store();
        let m = message("ops@example.com", 1_000);
        store.create_batch(std::slice::from_ref(&m)).await.unwrap();

        let err = store.update(m.id, MessagePatch::sent(2_000)).await.unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));

        clock.set_ms(6_000);
        let updated = store.update(m.id, MessagePatch::processing()).await.unwrap();
        assert_eq!(updated.status, MessageStatus::Processing);
        assert_eq!(updated.updated_at, 6_000);

        store.update(m.id, MessagePatch::sent(6_500)).await.unwrap();
        let err = store
            .update(m.id, MessagePatch::failed("late", 7_000))
            .await
            .unwrap_err();
        assert!(matches!(err, DispatchError::InvalidTransition { .. }));
        assert_eq!(
            store.get(m.id).await.unwrap().unwrap().status,
            MessageStatus::Sent
        );
    }

    #[tokio::test]
    async fn test_duplicate_batch_is_rejected_whole() {
        let (store, _clock) = store();
        let a = message("ops@example.com", 1_000);
        let b = message("ops@example.com", 1_000);
        store.create_batch(std::slice::from_ref(&a)).await.unwrap();

        assert!(store.create_batch(&[b.clone(), a]).await.is_err());
        assert!(store.get(b.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_queries() {
        let (store, _clock) = store();
        let first = message("ops@example.com", 1_000);
        let second = message("ops@example.com", 2_000);
        let other = message("other@example.com", 3_000);
        store
            .create_batch(&[first.clone(), second.clone(), other])
            .await
            .unwrap();
        store.update(first.id, MessagePatch::processing()).await.unwrap();

        let history = store.query_by_sender("ops@example.com", 10).await.unwrap();
        assert_eq!(
            history.iter().map(|m| m.id).collect::<Vec<_>>(),
            vec![second.id, first.id]
        );
        assert_eq!(store.query_by_sender("ops@example.com", 1).await.unwrap().len(), 1);

        assert_eq!(
            store
                .count_by_sender_and_statuses("ops@example.com", &MessageStatus::OUTSTANDING)
                .await
                .unwrap(),
            2
        );
        let processing = store
            .query_by_statuses(&[MessageStatus::Processing])
            .await
            .unwrap();
        assert_eq!(processing.len(), 1);
        assert_eq!(processing[0].id, first.id);
    }

    #[tokio::test]
    async fn test_update_missing_is_not_found() {
        let (store, _clock) = store();
        let id = Uuid::new_v4();
        assert!(matches!(
            store.update(id, MessagePatch::starred(true)).await,
            Err(DispatchError::NotFound(missing)) if missing == id
        ));
    }

    #[tokio::test]
    async fn test_star_write_keeps_updated_at() {
        let (store, clock) = store();
        let m = message("ops@example.com", 1_000);
        store.create_batch(std::slice::from_ref(&m)).await.unwrap();

        clock.set_ms(9_000);
        let starred = store.update(m.id, MessagePatch::starred(true)).await.unwrap();
        assert!(starred.is_starred);
        assert_eq!(starred.updated_at, 1_000);

        let toggled = store.toggle_starred(m.id).await.unwrap();
        assert!(!toggled.is_starred);
        assert_eq!(toggled.updated_at, 1_000);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_toggles_never_lose_a_flip() {
        let (store, _clock) = store();
        let store = Arc::new(store);
        let m = message("ops@example.com", 1_000);
        store.create_batch(std::slice::from_ref(&m)).await.unwrap();

        let toggles = (0..64).map(|_| {
            let store = Arc::clone(&store);
            tokio::spawn(async move { store.toggle_starred(m.id).await.unwrap() })
        });
        let results = futures::future::join_all(toggles).await;
        let now_starred = results
            .into_iter()
            .map(|r| r.unwrap().is_starred)
            .filter(|s| *s)
            .count();

        // Each toggle observes a distinct state, so half of them set the flag.
        assert_eq!(now_starred, 32);
        assert!(!store.get(m.id).await.unwrap().unwrap().is_starred);
    }

    #[tokio::test]
    async fn test_discard_removes_only_pending() {
        let (store, _clock) = store();
        let pending = message("ops@example.com", 1_000);
        let taken = message("ops@example.com", 1_000);
        store
            .create_batch(&[pending.clone(), taken.clone()])
            .await
            .unwrap();
        store.update(taken.id, MessagePatch::processing()).await.unwrap();

        let gone = store
            .discard(&[pending.id, taken.id, Uuid::new_v4()])
            .await
            .unwrap();
        assert_eq!(gone, 1);
        assert!(store.get(pending.id).await.unwrap().is_none());
        assert!(store.get(taken.id).await.unwrap().is_some());
        assert_eq!(store.query_by_sender("ops@example.com", 10).await.unwrap().len(), 1);
    }
}
