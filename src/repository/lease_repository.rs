use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use sqlx::SqlitePool;

use crate::error::{AppError, Result};

/// Named, expiring leases giving background tasks a single-writer guarantee
/// across processes sharing the database.
#[async_trait]
pub trait LeaseRepository: Send + Sync {
    /// Takes the lease if it is free, expired, or already held by `holder`.
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool>;
    async fn release(&self, name: &str, holder: &str) -> Result<()>;
}

pub struct SqliteLeaseRepository {
    pool: SqlitePool,
}

impl SqliteLeaseRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LeaseRepository for SqliteLeaseRepository {
    async fn try_acquire(&self, name: &str, holder: &str, ttl: Duration, now: DateTime<Utc>) -> Result<bool> {
        let result = sqlx::query(
            r#"
            INSERT INTO scheduler_leases (name, holder, expires_at)
            VALUES (?, ?, ?)
            ON CONFLICT (name) DO UPDATE
            SET holder = excluded.holder,
                expires_at = excluded.expires_at
            WHERE scheduler_leases.expires_at < ?
               OR scheduler_leases.holder = excluded.holder
            "#
        )
        .bind(name)
        .bind(holder)
        .bind((now + ttl).naive_utc())
        .bind(now.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, name: &str, holder: &str) -> Result<()> {
        sqlx::query("DELETE FROM scheduler_leases WHERE name = ? AND holder = ?")
            .bind(name)
            .bind(holder)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
