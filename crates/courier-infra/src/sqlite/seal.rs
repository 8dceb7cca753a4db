//! SQLite seal repository.

use courier_core::seal::SealRepository;
use courier_types::error::RepositoryError;
use courier_types::seal::{Seal, SealStatus};
use sqlx::Row;

use super::pool::DatabasePool;
use super::{format_datetime, parse_datetime};

/// SQLite-backed [`SealRepository`].
#[derive(Clone)]
pub struct SqliteSealRepository {
    pool: DatabasePool,
}

impl SqliteSealRepository {
    pub fn new(pool: DatabasePool) -> Self {
        Self { pool }
    }
}

struct SealRow {
    link: String,
    status: String,
    tx_id: Option<String>,
    confirmations: i64,
    hooks_pending: bool,
    requested_at: String,
    updated_at: String,
}

impl SealRow {
    fn from_row(row: &sqlx::sqlite::SqliteRow) -> Result<Self, sqlx::Error> {
        Ok(Self {
            link: row.try_get("link")?,
            status: row.try_get("status")?,
            tx_id: row.try_get("tx_id")?,
            confirmations: row.try_get("confirmations")?,
            hooks_pending: row.try_get("hooks_pending")?,
            requested_at: row.try_get("requested_at")?,
            updated_at: row.try_get("updated_at")?,
        })
    }

    fn into_seal(self) -> Result<Seal, RepositoryError> {
        let status: SealStatus = self
            .status
            .parse()
            .map_err(RepositoryError::Query)?;
        Ok(Seal {
            link: self.link,
            status,
            tx_id: self.tx_id,
            confirmations: u32::try_from(self.confirmations).unwrap_or(0),
            hooks_pending: self.hooks_pending,
            requested_at: parse_datetime(&self.requested_at)?,
            updated_at: parse_datetime(&self.updated_at)?,
        })
    }
}

const SELECT_SEAL: &str =
    "SELECT link, status, tx_id, confirmations, hooks_pending, requested_at, updated_at FROM seals";

impl SealRepository for SqliteSealRepository {
    async fn get(&self, link: &str) -> Result<Option<Seal>, RepositoryError> {
        let row = sqlx::query(&format!("{SELECT_SEAL} WHERE link = ?"))
            .bind(link)
            .fetch_optional(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        row.map(|row| {
            SealRow::from_row(&row)
                .map_err(|e| RepositoryError::Query(e.to_string()))?
                .into_seal()
        })
        .transpose()
    }

    async fn insert(&self, seal: &Seal) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"INSERT INTO seals (link, status, tx_id, confirmations, hooks_pending, requested_at, updated_at)
               VALUES (?, ?, ?, ?, ?, ?, ?)"#,
        )
        .bind(&seal.link)
        .bind(seal.status.to_string())
        .bind(seal.tx_id.as_deref())
        .bind(i64::from(seal.confirmations))
        .bind(seal.hooks_pending)
        .bind(format_datetime(&seal.requested_at))
        .bind(format_datetime(&seal.updated_at))
        .execute(&self.pool.writer)
        .await;

        match result {
            Ok(_) => Ok(()),
            Err(sqlx::Error::Database(db_err)) if db_err.message().contains("UNIQUE") => Err(
                RepositoryError::Conflict(format!("seal for link '{}' already exists", seal.link)),
            ),
            Err(e) => Err(RepositoryError::Query(e.to_string())),
        }
    }

    async fn update(&self, seal: &Seal) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"UPDATE seals
               SET status = ?, tx_id = ?, confirmations = ?, hooks_pending = ?,
                   requested_at = ?, updated_at = ?
               WHERE link = ?"#,
        )
        .bind(seal.status.to_string())
        .bind(seal.tx_id.as_deref())
        .bind(i64::from(seal.confirmations))
        .bind(seal.hooks_pending)
        .bind(format_datetime(&seal.requested_at))
        .bind(format_datetime(&seal.updated_at))
        .bind(&seal.link)
        .execute(&self.pool.writer)
        .await
        .map_err(|e| RepositoryError::Query(e.to_string()))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn remove(&self, link: &str) -> Result<bool, RepositoryError> {
        let result = sqlx::query("DELETE FROM seals WHERE link = ?")
            .bind(link)
            .execute(&self.pool.writer)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn list(&self) -> Result<Vec<Seal>, RepositoryError> {
        let rows = sqlx::query(&format!("{SELECT_SEAL} ORDER BY requested_at, link"))
            .fetch_all(&self.pool.reader)
            .await
            .map_err(|e| RepositoryError::Query(e.to_string()))?;

        rows.iter()
            .map(|row| {
                SealRow::from_row(row)
                    .map_err(|e| RepositoryError::Query(e.to_string()))?
                    .into_seal()
            })
            .collect()
    }
}
