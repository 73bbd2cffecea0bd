use async_trait::async_trait;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};

/// Read-only view into the scheduling domain: which lessons depend on a payment.
#[async_trait]
pub trait LessonScheduleRepository: Send + Sync {
    async fn count_scheduled_for_payment(&self, payment_id: Uuid) -> Result<i64>;
}

pub struct SqliteLessonScheduleRepository {
    pool: SqlitePool,
}

impl SqliteLessonScheduleRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl LessonScheduleRepository for SqliteLessonScheduleRepository {
    async fn count_scheduled_for_payment(&self, payment_id: Uuid) -> Result<i64> {
        let count: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM scheduled_lessons WHERE payment_id = ? AND status = 'scheduled'"
        )
        .bind(payment_id.to_string())
        .fetch_one(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(count)
    }
}
