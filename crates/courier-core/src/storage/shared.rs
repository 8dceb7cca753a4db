//! Shared storage port and in-memory implementation.
//!
//! Uses RPITIT (return-position `impl Trait` in traits) for async methods.

use std::sync::Arc;

use courier_types::error::RepositoryError;
use dashmap::DashMap;
use serde_json::Value;

/// Key/value store for state that is not owned by any single user.
pub trait SharedStore: Send + Sync + 'static {
    fn get(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<Option<Value>, RepositoryError>> + Send;

    fn set(
        &self,
        key: &str,
        value: &Value,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn delete(
        &self,
        key: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// Every key, sorted.
    fn keys(&self) -> impl std::future::Future<Output = Result<Vec<String>, RepositoryError>> + Send;

    fn clear(&self) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}

#[derive(Debug, Clone, Default)]
pub struct MemorySharedStore {
    entries: Arc<DashMap<String, Value>>,
}

impl MemorySharedStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SharedStore for MemorySharedStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        Ok(self.entries.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), RepositoryError> {
        self.entries.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        Ok(self.entries.remove(key).is_some())
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        let mut keys: Vec<String> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.sort();
        Ok(keys)
    }

    async fn clear(&self) -> Result<usize, RepositoryError> {
        let count = self.entries.len();
        self.entries.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn set_get_delete() {
        let store = MemorySharedStore::new();
        store.set("greeting", &json!({"text": "hi"})).await.unwrap();
        store.set("count", &json!(3)).await.unwrap();

        assert_eq!(store.get("count").await.unwrap(), Some(json!(3)));
        assert_eq!(store.keys().await.unwrap(), vec!["count", "greeting"]);
        assert!(store.delete("count").await.unwrap());
        assert!(!store.delete("count").await.unwrap());
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.get("greeting").await.unwrap().is_none());
    }
}
