//! User repository trait definition and in-memory implementation.
//!
//! Uses RPITIT (return-position `impl Trait` in traits) for async methods.
//! History is written through `append_history` only, so concurrent send and
//! receive workers for the same user never overwrite each other's entries.

use std::sync::Arc;

use courier_types::error::RepositoryError;
use courier_types::user::{HistoryEntry, User};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;

/// Storage port for users and their history.
pub trait UserRepository: Send + Sync + 'static {
    /// The user with its full history, if it exists.
    fn get(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Option<User>, RepositoryError>> + Send;

    /// Insert a new user. Fails with `Conflict` if the id is taken.
    fn create(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    /// Upsert profile, custom state and timestamps. History is left untouched.
    fn save(
        &self,
        user: &User,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn append_history(
        &self,
        id: &str,
        entry: &HistoryEntry,
    ) -> impl std::future::Future<Output = Result<(), RepositoryError>> + Send;

    fn history(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<Vec<HistoryEntry>, RepositoryError>> + Send;

    /// Delete the user and its history. Returns whether it existed.
    fn delete(
        &self,
        id: &str,
    ) -> impl std::future::Future<Output = Result<bool, RepositoryError>> + Send;

    /// All users without their history, ordered by id.
    fn list(&self) -> impl std::future::Future<Output = Result<Vec<User>, RepositoryError>> + Send;

    /// Delete every user. Returns how many were removed.
    fn clear(&self) -> impl std::future::Future<Output = Result<usize, RepositoryError>> + Send;
}

/// Non-persistent [`UserRepository`]. Clones share the same users.
#[derive(Debug, Clone, Default)]
pub struct MemoryUserRepository {
    users: Arc<DashMap<String, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

impl UserRepository for MemoryUserRepository {
    async fn get(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        Ok(self.users.get(id).map(|u| u.clone()))
    }

    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(_) => Err(RepositoryError::Conflict(format!(
                "user '{}' already exists",
                user.id
            ))),
            Entry::Vacant(slot) => {
                slot.insert(user.clone());
                Ok(())
            }
        }
    }

    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        match self.users.entry(user.id.clone()) {
            Entry::Occupied(mut slot) => {
                let existing = slot.get_mut();
                existing.profile = user.profile.clone();
                existing.custom_state = user.custom_state.clone();
                existing.updated_at = user.updated_at;
            }
            Entry::Vacant(slot) => {
                let mut fresh = user.clone();
                fresh.history.clear();
                slot.insert(fresh);
            }
        }
        Ok(())
    }

    async fn append_history(&self, id: &str, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let mut user = self.users.get_mut(id).ok_or(RepositoryError::NotFound)?;
        user.history.push(entry.clone());
        Ok(())
    }

    async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
        Ok(self
            .users
            .get(id)
            .map(|u| u.history.clone())
            .unwrap_or_default())
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        Ok(self.users.remove(id).is_some())
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let mut users: Vec<User> = self
            .users
            .iter()
            .map(|u| User {
                history: Vec::new(),
                ..u.value().clone()
            })
            .collect();
        users.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(users)
    }

    async fn clear(&self) -> Result<usize, RepositoryError> {
        let count = self.users.len();
        self.users.clear();
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[tokio::test]
    async fn history_is_isolated_per_user() {
        let repo = MemoryUserRepository::new();
        repo.create(&User::new("alice")).await.unwrap();
        repo.create(&User::new("bob")).await.unwrap();

        repo.append_history("alice", &HistoryEntry::outbound(json!({"n": 1})))
            .await
            .unwrap();

        assert_eq!(repo.history("alice").await.unwrap().len(), 1);
        assert!(repo.history("bob").await.unwrap().is_empty());
        assert!(repo.history("nobody").await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn save_keeps_existing_history() {
        let repo = MemoryUserRepository::new();
        let mut user = User::new("alice");
        repo.create(&user).await.unwrap();
        repo.append_history("alice", &HistoryEntry::outbound(json!({})))
            .await
            .unwrap();

        user.profile = json!({"name": "Alice"});
        repo.save(&user).await.unwrap();

        let stored = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(stored.profile["name"], "Alice");
        assert_eq!(stored.history.len(), 1);
    }

    #[tokio::test]
    async fn create_conflicts_and_append_requires_user() {
        let repo = MemoryUserRepository::new();
        repo.create(&User::new("alice")).await.unwrap();
        assert!(matches!(
            repo.create(&User::new("alice")).await,
            Err(RepositoryError::Conflict(_))
        ));
        assert!(matches!(
            repo.append_history("bob", &HistoryEntry::outbound(json!({}))).await,
            Err(RepositoryError::NotFound)
        ));
    }

    #[tokio::test]
    async fn list_is_sorted_and_clear_counts() {
        let repo = MemoryUserRepository::new();
        for id in ["carol", "alice", "bob"] {
            repo.create(&User::new(id)).await.unwrap();
        }
        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["alice", "bob", "carol"]);
        assert_eq!(repo.clear().await.unwrap(), 3);
        assert!(repo.list().await.unwrap().is_empty());
    }
}
