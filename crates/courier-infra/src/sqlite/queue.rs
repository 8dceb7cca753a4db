//! SQLite queue store.
//!
//! One table holds all three queues; rows are partitioned by the `queue`
//! column and ordered by the autoincrement `seq`, which preserves append
//! order within every lane across restarts.

use courier_core::queue::QueueStore;
use courier_types::error::RepositoryError;
use courier_types::queue::{QueueItem, QueueItemState, QueueKey};
use sqlx::Row;
use uuid::Uuid;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime, parse_json, to_json};

/// SQLite-backed [`QueueStore`] for one named queue.
#[derive(Clone)]
pub struct SqliteQueueStore {
    pool: DatabasePool,
    queue: String,
}

impl SqliteQueueStore {
    pub fn new(pool: DatabasePool, queue: impl Into<String>) -> Self {
        Self {
            pool,
            queue: queue.into(),
        }
    }

    pub fn queue(&self) -> &str {
        &self.queue
    }
}

struct QueueRow {
    queue_key: String,
    id: String,
    payload: String,
    attempts: i64,
    enqueued_at: String,
}

impl QueueRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            queue_key: row.try_get("queue_key")?,
            id: row.try_get("id")?,
            payload: row.try_get("payload")?,
            attempts: row.try_get("attempts")?,
            enqueued_at: row.try_get("enqueued_at")?,
        })
    }

    fn into_item(self) -> Result<QueueItem, RepositoryError> {
        let id = Uuid::parse_str(&self.id)
            .map_err(|e| RepositoryError::Query(format!("invalid item id: {e}")))?;
        Ok(QueueItem {
            id,
            key: QueueKey::new(self.queue_key),
            payload: parse_json(&self.payload)?,
            attempts: u32::try_from(self.attempts).unwrap_or(0),
            enqueued_at: parse_datetime(&self.enqueued_at)?,
            state: QueueItemState::Pending,
        })
    }
}

impl QueueStore for SqliteQueueStore {
    async fn load_all(&self) -> Result<Vec<QueueItem>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT queue_key, id, payload, attempts, enqueued_at FROM queue_items WHERE queue = ? ORDER BY seq",
        )
        .bind(&self.queue)
        .fetch_all(&self.pool.reader)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                QueueRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_item()
            })
            .collect()
    }

    async fn append(&self, item: &QueueItem) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"INSERT INTO queue_items (queue, queue_key, id, payload, attempts, enqueued_at)
               VALUES (?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&self.queue)
        .bind(item.key.as_str())
        .bind(item.id.to_string())
        .bind(to_json(&item.payload)?)
        .bind(i64::from(item.attempts))
        .bind(format_datetime(&item.enqueued_at))
        .execute(&self.pool.writer)
        .await
        .map_err(|e| match e {
            sqlx::Error::Database(ref db_err) if db_err.message().contains("UNIQUE") => {
                RepositoryError::Conflict(format!("queue item {} already exists", item.id))
            }
            other => RepositoryError::Query(other.to_string()),
        })?;

        Ok(())
    }

    async fn remove(&self, key: &QueueKey, id: &Uuid) -> Result<bool, RepositoryError> {
        let result =
            sqlx::query("DELETE FROM queue_items WHERE queue = ? AND queue_key = ? AND id = ?")
                .bind(&self.queue)
                .bind(key.as_str())
                .bind(id.to_string())
                .execute(&self.pool.writer)
                .await
                .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn record_attempt(
        &self,
        key: &QueueKey,
        id: &Uuid,
        attempts: u32,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            "UPDATE queue_items SET attempts = ? WHERE queue = ? AND queue_key = ? AND id = ?",
        )
        .bind(i64::from(attempts))
        .bind(&self.queue)
        .bind(key.as_str())
        .bind(id.to_string())
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(())
    }

    async fn clear(&self, key: &QueueKey) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM queue_items WHERE queue = ? AND queue_key = ?")
            .bind(&self.queue)
            .bind(key.as_str())
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }

    async fn clear_all(&self) -> Result<usize, RepositoryError> {
        let result = sqlx::query("DELETE FROM queue_items WHERE queue = ?")
            .bind(&self.queue)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() as usize)
    }
}
