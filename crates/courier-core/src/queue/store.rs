//! Queue storage port.
//!
//! Defines the durable key-ordered-list interface the queue engine persists
//! through. One implementation instance backs one named queue. The
//! in-memory adapter satisfies the same contract without surviving a
//! restart; SQLite lives in courier-infra.

use std::collections::VecDeque;
use std::sync::Arc;

use courier_types::error::RepositoryError;
use courier_types::queue::{QueueItem, QueueKey};
use dashmap::DashMap;
use uuid::Uuid;

/// Durable storage for one named queue.
///
/// Uses RPITIT (native async fn in traits, Rust 2024 edition).
pub trait QueueStore: Send + Sync + 'static {
    /// Load every persisted item. Items of the same key come back in
    /// enqueue order.
    fn load_all(
        &self,
    ) -> impl std::future::Future<Output = Result<Vec<QueueItem>, RepositoryError>> + Send;

    /// Append an item to the tail of its key's list.
    fn append(
        &self,
        item: &QueueItem,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Remove a processed item. Returns `true` if it existed.
    fn remove(
        &self,
        key: &QueueKey,
        id: &Uuid,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Persist the failed-attempt count of an item.
    fn record_attempt(
        &self,
        key: &QueueKey,
        id: &Uuid,
        attempts: u32,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Drop every item of one key. Returns how many were removed.
    fn clear(
        &self,
        key: &QueueKey,
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;

    /// Drop every item of every key. Returns how many were removed.
    fn clear_all(
        &self,
    ) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}

/// In-memory queue store. Clones share the same lists, which lets tests
/// reopen an engine over the "same disk".
#[derive(Debug, Clone, Default)]
pub struct MemoryQueueStore {
    lanes: Arc<DashMap<QueueKey, VecDeque<QueueItem>>>,
}

impl MemoryQueueStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored items across all keys.
    pub fn len(&self) -> usize {
        self.lanes.iter().map(|lane| lane.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl QueueStore for MemoryQueueStore {
    async fn load_all(&self) -> Result<Vec<QueueItem>, RepositoryError> {
        let mut items: Vec<QueueItem> = self
            .lanes
            .iter()
            .flat_map(|lane| lane.value().iter().cloned().collect::<Vec<_>>())
            .collect();
        // Stable sort keeps per-key order while making the snapshot deterministic.
        items.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(items)
    }

    async fn append(&self, item: &QueueItem) -> Result<(), RepositoryError> {
        self.lanes
            .entry(item.key.clone())
            .or_default()
            .push_back(item.clone());
        Ok(())
    }

    async fn remove(&self, key: &QueueKey, id: &Uuid) -> Result<bool, RepositoryError> {
        let Some(mut lane) = self.lanes.get_mut(key) else {
            return Ok(false);
        };
        let before = lane.len();
        lane.retain(|item| item.id != *id);
        let removed = lane.len() != before;
        let now_empty = lane.is_empty();
        drop(lane);
        if now_empty {
            self.lanes.remove_if(key, |_, lane| lane.is_empty());
        }
        Ok(removed)
    }

    async fn record_attempt(
        &self,
        key: &QueueKey,
        id: &Uuid,
        attempts: u32,
    ) -> Result<(), RepositoryError> {
        if let Some(mut lane) = self.lanes.get_mut(key) {
            if let Some(item) = lane.iter_mut().find(|item| item.id == *id) {
                item.attempts = attempts;
            }
        }
        Ok(())
    }

    async fn clear(&self, key: &QueueKey) -> Result<usize, RepositoryError> {
        Ok(self
            .lanes
            .remove(key)
            .map(|(_, lane)| lane.len())
            .unwrap_or(0))
    }

    async fn clear_all(&self) -> Result<usize, RepositoryError> {
        let removed = self.len();
        self.lanes.clear();
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn append_then_load_preserves_order_per_key() {
        let store = MemoryQueueStore::new();
        let a1 = QueueItem::new("a".into(), json!(1));
        let b1 = QueueItem::new("b".into(), json!(1));
        let a2 = QueueItem::new("a".into(), json!(2));
        store.append(&a1).await.unwrap();
        store.append(&b1).await.unwrap();
        store.append(&a2).await.unwrap();

        let items = store.load_all().await.unwrap();
        let a_payloads: Vec<_> = items
            .iter()
            .filter(|i| i.key.as_str() == "a")
            .map(|i| i.payload.clone())
            .collect();
        assert_eq!(a_payloads, vec![json!(1), json!(2)]);
        assert_eq!(items.len(), 3);
    }

    #[tokio::test]
    async fn remove_drops_only_the_given_item() {
        let store = MemoryQueueStore::new();
        let first = QueueItem::new("a".into(), json!(1));
        let second = QueueItem::new("a".into(), json!(2));
        store.append(&first).await.unwrap();
        store.append(&second).await.unwrap();

        assert!(store.remove(&first.key, &first.id).await.unwrap());
        assert!(!store.remove(&first.key, &first.id).await.unwrap());
        assert_eq!(store.load_all().await.unwrap(), vec![second]);
    }

    #[tokio::test]
    async fn record_attempt_updates_count() {
        let store = MemoryQueueStore::new();
        let item = QueueItem::new("a".into(), json!(1));
        store.append(&item).await.unwrap();
        store.record_attempt(&item.key, &item.id, 4).await.unwrap();
        assert_eq!(store.load_all().await.unwrap()[0].attempts, 4);
    }

    #[tokio::test]
    async fn clear_scopes_to_key() {
        let store = MemoryQueueStore::new();
        store.append(&QueueItem::new("a".into(), json!(1))).await.unwrap();
        store.append(&QueueItem::new("a".into(), json!(2))).await.unwrap();
        store.append(&QueueItem::new("b".into(), json!(3))).await.unwrap();

        assert_eq!(store.clear(&"a".into()).await.unwrap(), 2);
        assert_eq!(store.len(), 1);
        assert_eq!(store.clear_all().await.unwrap(), 1);
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn clones_share_state() {
        let store = MemoryQueueStore::new();
        let reopened = store.clone();
        store.append(&QueueItem::new("a".into(), json!(1))).await.unwrap();
        assert_eq!(reopened.load_all().await.unwrap().len(), 1);
    }
}
