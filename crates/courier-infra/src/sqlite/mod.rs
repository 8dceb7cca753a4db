//! SQLite storage layer.
//!
//! Repository implementations backed by SQLite with WAL mode and split
//! read/write connection pools.

pub mod pool;
pub mod queue;
pub mod seal;
pub mod shared;
pub mod user;

use chrono::{DateTime, Utc};
use courier_core::runtime::{QueueKind, RuntimeStores};
use courier_types::error::RepositoryError;

pub use pool::DatabasePool;
pub use queue::SqliteQueueStore;
pub use seal::SqliteSealRepository;
pub use shared::SqliteSharedStore;
pub use user::SqliteUserRepository;

/// Storage for a whole runtime backed by one database.
pub type SqliteStores =
    RuntimeStores<SqliteUserRepository, SqliteSealRepository, SqliteSharedStore, SqliteQueueStore>;

pub fn sqlite_stores(pool: &DatabasePool) -> SqliteStores {
    RuntimeStores {
        users: SqliteUserRepository::new(pool.clone()),
        seals: SqliteSealRepository::new(pool.clone()),
        shared: SqliteSharedStore::new(pool.clone()),
        send_queue: SqliteQueueStore::new(pool.clone(), QueueKind::Send.name()),
        receive_queue: SqliteQueueStore::new(pool.clone(), QueueKind::Receive.name()),
        seal_queue: SqliteQueueStore::new(pool.clone(), QueueKind::Seal.name()),
    }
}

pub(crate) fn parse_datetime(s: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Query(format!("invalid datetime: {e}")))
}

pub(crate) fn format_datetime(dt: &DateTime<Utc>) -> String {
    dt.to_rfc3339()
}

pub(crate) fn parse_json(s: &str) -> Result<serde_json::Value, RepositoryError> {
    serde_json::from_str(s).map_err(|e| RepositoryError::Query(format!("invalid JSON value: {e}")))
}

pub(crate) fn to_json(value: &serde_json::Value) -> Result<String, RepositoryError> {
    serde_json::to_string(value)
        .map_err(|e| RepositoryError::Query(format!("failed to serialize value: {e}")))
}

#[cfg(test)]
pub(crate) async fn test_pool() -> DatabasePool {
    let dir = tempfile::tempdir().unwrap();
    let db_path = dir.path().join("test.db");
    let url = format!("sqlite://{}?mode=rwc", db_path.display());
    // Leak tempdir so it lives for the test
    std::mem::forget(dir);
    DatabasePool::new(&url).await.unwrap()
}
