//! SQLite shared key/value store.
//!
//! Values are stored as JSON text and deserialized on read.

use chrono::Utc;
use courier_core::storage::SharedStore;
use courier_types::error::RepositoryError;
use serde_json::Value;
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_json, to_json};

/// SQLite-backed [`SharedStore`].
#[derive(Clone)]
pub struct SqliteSharedStore {
    pool: DatabasePool,
}

impl SqliteSharedStore {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

impl SharedStore for SqliteSharedStore {
    async fn get(&self, key: &str) -> Result<Option<Value>, RepositoryError> {
        let row = sqlx::query("SELECT value FROM shared_kv WHERE key = ?")
            .bind(key)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        match row {
            Some(row) => {
                let value: String = row
                    .try_get("value")
                    .map_err(|e| RepositoryError::Query(e.to_string()))?;
                Ok(Some(parse_json(&value)?))
            }
            None => Ok(None),
        }
    }

    async fn set(&self, key: &str, value: &Value) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO shared_kv (key, value, updated_at) VALUES (?, ?, ?)
               ON CONFLICT (key) DO UPDATE SET value = excluded.value, updated_at = excluded.updated_at"#,
        )
        .bind(key)
        .bind(to_json(value)?)
        .bind(format_datetime(&Utc::now()))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM shared_kv WHERE key = ?")
            .bind(key)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn keys(&self) -> Result<Vec<String>, RepositoryError> {
        let rows: Vec<(String,)> = sqlx::query_as("SELECT key FROM shared_kv ORDER BY key")
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(rows.into_iter().map(|(key,)| key).collect())
    }

    async fn clear(&self) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM shared_kv")
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::sqlite::test_pool;

    #[tokio::test]
    async fn set_overwrites_and_keys_are_sorted() {
        let store = SqliteSharedStore::new(test_pool().await);
        store.set("b", &json!(1)).await.unwrap();
        store.set("a", &json!({"x": true})).await.unwrap();
        store.set("b", &json!(2)).await.unwrap();

        assert_eq!(store.get("b").await.unwrap(), Some(json!(2)));
        assert_eq!(store.keys().await.unwrap(), vec!["a", "b"]);
        assert!(store.delete("a").await.unwrap());
        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.get("b").await.unwrap().is_none());
    }
}
