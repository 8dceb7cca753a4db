//! SQLite user repository.
//!
//! Users and their history live in separate tables; history rows cascade
//! on user deletion and are ordered by the autoincrement `seq`.

use courier_core::user::UserRepository;
use courier_types::error::RepositoryError;
use courier_types::user::{Direction, HistoryEntry, User};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, to_json};

/// SQLite-backed [`UserRepository`].
#[derive(Clone)]
pub struct SqliteUserRepository {
    pool: DatabasePool,
}

impl SqliteUserRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

// ---------------------------------------------------------------------------
// Private Row types for SQLite-to-domain mapping
// ---------------------------------------------------------------------------

struct UserRow {
    id: String,
    profile: String,
    custom_state: String,
    created_at: String,
    updated_at: String,
}

impl UserRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            id: row.try_get("id")?,
            profile: row.try_get("profile")?,
            custom_state: row.try_get("custom_state")?,
            created_at: row.try_get("created_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_user(self) -> Result<User, RepositoryError> {
        Ok(User {
            id: self.id,
            profile: parse_json(&self.profile)?,
            custom_state: parse_json(&self.custom_state)?,
            history: Vec::new(),
            created_at: parse_datetime(&self.created_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

struct HistoryRow {
    direction: String,
    wrapper: String,
    link: Option<String>,
    recorded_at: String,
}

impl HistoryRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            direction: row.try_get("direction")?,
            wrapper: row.try_get("wrapper")?,
            link: row.try_get("link")?,
            recorded_at: row.try_get("recorded_at")?,
        })
    }

    fn into_entry(self) -> Result<HistoryEntry, RepositoryError> {
        let direction: Direction = self
            .direction
            .parse()
            .map_err(RepositoryError::Query)?;
        Ok(HistoryEntry {
            direction,
            wrapper: parse_json(&self.wrapper)?,
            link: self.link,
            recorded_at: parse_datetime(&self.recorded_at)?,
        })
    }
}

fn query_err(e: sqlx::Error) -> RepositoryError {
    RepositoryError::Query(e.to_string())
}

impl UserRepository for SqliteUserRepository {
    async fn get(&self, id: &str) -> Result<Option<User>, RepositoryError> {
        let row = sqlx::query(
            "SELECT id, profile, custom_state, created_at, updated_at FROM users WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.pool.reader)
        .await
        .map_err(query_err)?;

        let Some(row) = row else {
            return Ok(None);
        };
        let mut user = UserRow::from_row(&row).map_err(query_err)?.into_user()?;
        user.history = self.history(id).await?;
        Ok(Some(user))
    }

    async fn create(&self, user: &User) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO users (id, profile, custom_state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(&user.id)
        .bind(to_json(&user.profile)?)
        .bind(to_json(&user.custom_state)?)
        .bind(format_datetime(&user.created_at))
        .bind(format_datetime(&user.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("user '{}' already exists", user.id)),
            ),
            Err(e) => Err(query_err(e)),
        }
    }

    async fn save(&self, user: &User) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO users (id, profile, custom_state, created_at, updated_at)
               VALUES (?, ?, ?, ?, ?)
               ON CONFLICT (id) DO UPDATE SET
                   profile = excluded.profile,
                   custom_state = excluded.custom_state,
                   updated_at = excluded.updated_at"#,
        )
        .bind(&user.id)
        .bind(to_json(&user.profile)?)
        .bind(to_json(&user.custom_state)?)
        .bind(format_datetime(&user.created_at))
        .bind(format_datetime(&user.updated_at))
        .execute(&self.pool.writer)
        .await
        .map_err(query_err)?;

        Ok(())
    }

    async fn append_history(&self, id: &str, entry: &HistoryEntry) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO user_history (user_id, direction, wrapper, link, recorded_at)
               VALUES (?, ?, ?, ?, ?)"#,
        )
        .bind(id)
        .bind(entry.direction.to_string())
        .bind(to_json(&entry.wrapper)?)
        .bind(entry.link.as_deref())
        .bind(format_datetime(&entry.recorded_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("FOREIGN KEY") => {
                Err(RepositoryError::NotFound)
            }
            Err(e) => Err(query_err(e)),
        }
    }

    async fn history(&self, id: &str) -> Result<Vec<HistoryEntry>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT direction, wrapper, link, recorded_at FROM user_history WHERE user_id = ? ORDER BY seq",
        )
        .bind(id)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| HistoryRow::from_row(row).map_err(query_err)?.into_entry())
            .collect()
    }

    async fn delete(&self, id: &str) -> Result<bool, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query("DELETE FROM user_history WHERE user_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let result = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<User>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT id, profile, custom_state, created_at, updated_at FROM users ORDER BY id",
        )
        .fetch_all(&self.pool.reader)
        .await
        .map_err(query_err)?;

        rows.iter()
            .map(|row| UserRow::from_row(row).map_err(query_err)?.into_user())
            .collect()
    }

    async fn clear(&self) -> Result<usize, RepositoryError> {
        let mut tx = self.pool.writer.begin().await.map_err(query_err)?;

        sqlx::query("DELETE FROM user_history")
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;
        let result = sqlx::query("DELETE FROM users")
            .execute(&mut *tx)
            .await
            .map_err(query_err)?;

        tx.commit().await.map_err(query_err)?;
        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sqlite::test_pool;

    #[tokio::test]
    async fn create_get_and_conflict() {
        let repo = SqliteUserRepository::new(test_pool().await);
        repo.create(&User::new("alice")).await.unwrap();

        let user = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(user.id, "alice");
        assert_eq!(user.profile, json!({}));
        assert!(repo.get("bob").await.unwrap().is_none());

        let err = repo.create(&User::new("alice")).await.unwrap_err();
        assert!(matches!(err, RepositoryError::Conflict(_)));
    }

    #[tokio::test]
    async fn history_appends_in_order_and_is_per_user() {
        let repo = SqliteUserRepository::new(test_pool().await);
        repo.create(&User::new("alice")).await.unwrap();
        repo.create(&User::new("bob")).await.unwrap();

        repo.append_history("alice", &HistoryEntry::outbound(json!({"link": "m1"})))
            .await
            .unwrap();
        repo.append_history(
            "alice",
            &HistoryEntry::inbound(json!({"text": "hey"}), Some("m2".to_string())),
        )
        .await
        .unwrap();

        let history = repo.history("alice").await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].direction, Direction::Outbound);
        assert_eq!(history[0].link.as_deref(), Some("m1"));
        assert_eq!(history[1].direction, Direction::Inbound);
        assert!(repo.history("bob").await.unwrap().is_empty());

        let user = repo.get("alice").await.unwrap().unwrap();
        assert!(user.has_inbound("m2"));
    }

    #[tokio::test]
    async fn append_for_unknown_user_is_not_found() {
        let repo = SqliteUserRepository::new(test_pool().await);
        let err = repo
            .append_history("ghost", &HistoryEntry::outbound(json!({})))
            .await
            .unwrap_err();
        assert!(matches!(err, RepositoryError::NotFound));
    }

    #[tokio::test]
    async fn save_updates_profile_and_keeps_history() {
        let repo = SqliteUserRepository::new(test_pool().await);
        let mut user = User::new("alice");
        repo.create(&user).await.unwrap();
        repo.append_history("alice", &HistoryEntry::outbound(json!({})))
            .await
            .unwrap();

        user.profile = json!({"name": "Alice"});
        user.custom_state = json!({"step": 2});
        repo.save(&user).await.unwrap();

        let stored = repo.get("alice").await.unwrap().unwrap();
        assert_eq!(stored.profile["name"], "Alice");
        assert_eq!(stored.custom_state["step"], 2);
        assert_eq!(stored.history.len(), 1);
    }

    #[tokio::test]
    async fn delete_and_clear_remove_history() {
        let repo = SqliteUserRepository::new(test_pool().await);
        for id in ["alice", "bob", "carol"] {
            repo.create(&User::new(id)).await.unwrap();
            repo.append_history(id, &HistoryEntry::outbound(json!({})))
                .await
                .unwrap();
        }

        assert!(repo.delete("alice").await.unwrap());
        assert!(!repo.delete("alice").await.unwrap());
        assert!(repo.history("alice").await.unwrap().is_empty());

        let ids: Vec<String> = repo.list().await.unwrap().into_iter().map(|u| u.id).collect();
        assert_eq!(ids, vec!["bob", "carol"]);

        assert_eq!(repo.clear().await.unwrap(), 2);
        assert!(repo.history("bob").await.unwrap().is_empty());
        assert!(repo.list().await.unwrap().is_empty());
    }
}
