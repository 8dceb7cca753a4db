//! User lifecycle on top of a [`UserRepository`], announcing changes on the
//! event bus.

use std::sync::Arc;

use chrono::Utc;
use courier_types::error::RepositoryError;
use courier_types::event::BotEvent;
use courier_types::user::{HistoryEntry, User};
use tracing::{debug, info};

use super::repository::UserRepository;
use crate::event::EventBus;

pub struct UserService<U> {
    repo: Arc<U>,
    events: EventBus,
}

impl<U> Clone for UserService<U> {
    fn clone(&self) -> Self {
        Self {
            repo: Arc::clone(&self.repo),
            events: self.events.clone(),
        }
    }
}

impl<U: UserRepository> UserService<U> {
    pub fn new(repo: Arc<U>, events: EventBus) -> Self {
        Self { repo, events }
    }

    pub async fn get(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        self.repo.get(id).await
    }

    /// Load `id`, creating an empty user on first contact.
    pub async fn get_or_create(&self, id: &str) -> Result<User, RepositoryError> {
        if let Some(user) = self.repo.get(id).await? {
            return Ok(user);
        }

        let user = User::new(id);
        match self.repo.create(&user).await {
            Ok(()) => {
                info!(user_id = id, "created user");
                self.events.publish(BotEvent::UserCreated {
                    user_id: id.to_string(),
                });
                Ok(user)
            }
            // Lost a creation race; the other writer's record wins.
            Err(RepositoryError::Conflict(_)) => {
                self.repo.get(id).await?.ok_or(RepositoryError::NotFound)
            }
            Err(e) => Err(e),
        }
    }

    /// Persist profile and custom state changes.
    pub async fn save(&self, user: &mut User) -> Result<(), RepositoryError> {
        user.updated_at = Utc::now();
        self.repo.save(user).await?;
        debug!(user_id = %user.id, "saved user");
        self.events.publish(BotEvent::UserUpdated {
            user_id: user.id.clone(),
        });
        Ok(())
    }

    pub async fn append_history(&self, id: &str, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        self.repo.append_history(id, entry).await
    }

    /// History of `id`, oldest first. Empty for unknown users.
    pub async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
        self.repo.history(id).await
    }

    pub async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        self.repo.list().await
    }

    /// Remove `id` and its history.
    ///
    /// Callers must make sure no send or receive for the user is in flight;
    /// `BotRuntime::delete_user` clears both lanes first.
    pub async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let existed = self.repo.delete(id).await?;
        if existed {
            info!(user_id = id, "deleted user");
            self.events.publish(BotEvent::UserDeleted {
                user_id: id.to_string(),
            });
        }
        Ok(existed)
    }

    pub async fn clear(&self) -> Result<usize, RepositoryError> {
        let removed = self.repo.clear().await?;
        info!(removed, "cleared all users");
        self.events.publish(BotEvent::UsersCleared);
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::user::MemoryUserRepository;

    fn service() -> (UserService<MemoryUserRepository>, EventBus) {
        let events = EventBus::new(16);
        (
            UserService::new(Arc::new(MemoryUserRepository::new()), events.clone()),
            events,
        )
    }

    #[tokio::test]
    async fn get_or_create_emits_create_once() {
        let (users, events) = service();
        let mut rx = events.subscribe();

        users.get_or_create("ted").await.unwrap();
        users.get_or_create("ted").await.unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "user:create");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn save_emits_update_and_persists_profile() {
        let (users, events) = service();
        let mut user = users.get_or_create("ted").await.unwrap();
        let mut rx = events.subscribe();

        user.profile = json!({"first_name": "Ted"});
        users.save(&mut user).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().name(), "user:update");
        let stored = users.get("ted").await.unwrap().unwrap();
        assert_eq!(stored.profile["first_name"], "Ted");
    }

    #[tokio::test]
    async fn delete_and_clear_emit_events() {
        let (users, events) = service();
        users.get_or_create("ted").await.unwrap();
        users.get_or_create("bill").await.unwrap();
        let mut rx = events.subscribe();

        assert!(users.delete("ted").await.unwrap());
        assert!(!users.delete("ted").await.unwrap());
        assert_eq!(users.clear().await.unwrap(), 1);

        assert_eq!(rx.recv().await.unwrap().name(), "user:delete");
        assert_eq!(rx.recv().await.unwrap().name(), "user:clear");
        assert!(users.history("ted").await.unwrap().is_empty());
    }
}
