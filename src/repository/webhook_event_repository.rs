use async_trait::async_trait;
use sqlx::SqlitePool;

use crate::{
    domain::{WebhookEvent, WebhookEventKey},
    error::{AppError, Result},
    repository::WebhookEventRepository,
};

pub struct SqliteWebhookEventRepository {
    pool: SqlitePool,
}

impl SqliteWebhookEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WebhookEventRepository for SqliteWebhookEventRepository {
    async fn insert_if_absent(&self, event: WebhookEvent) -> Result<bool> {
        // The UNIQUE natural key makes the claim atomic across concurrent deliveries.
        let result = sqlx::query(
            r#"
            INSERT INTO webhook_events (
                id, event_type, provider_event_id, payment_reference, payload, received_at
            ) VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (event_type, provider_event_id, payment_reference) DO NOTHING
            "#
        )
        .bind(event.id.to_string())
        .bind(&event.event_type)
        .bind(&event.provider_event_id)
        .bind(&event.payment_reference)
        .bind(&event.payload)
        .bind(event.received_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(result.rows_affected() == 1)
    }

    async fn release(&self, key: &WebhookEventKey) -> Result<()> {
        sqlx::query(
            r#"
            DELETE FROM webhook_events
            WHERE event_type = ? AND provider_event_id = ? AND payment_reference = ?
            "#
        )
        .bind(&key.event_type)
        .bind(&key.provider_event_id)
        .bind(&key.payment_reference)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }
}
