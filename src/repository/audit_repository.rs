use async_trait::async_trait;
use chrono::NaiveDateTime;
use sqlx::{SqlitePool, FromRow};

use crate::{
    domain::AuditEntry,
    error::{AppError, Result},
    repository::{parse_uuid, to_utc, AuditRepository},
};

#[derive(FromRow)]
struct AuditRow {
    id: String,
    actor_id: Option<String>,
    action: String,
    entity_type: String,
    entity_id: String,
    metadata: String,
    created_at: NaiveDateTime,
}

/// Append-only; the table itself rejects UPDATE and DELETE via triggers.
pub struct SqliteAuditRepository {
    pool: SqlitePool,
}

impl SqliteAuditRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    fn row_to_entry(row: AuditRow) -> Result<AuditEntry> {
        Ok(AuditEntry {
            id: parse_uuid(&row.id)?,
            actor_id: row.actor_id.as_deref().map(parse_uuid).transpose()?,
            action: row.action,
            entity_type: row.entity_type,
            entity_id: row.entity_id,
            metadata: serde_json::from_str(&row.metadata)
                .map_err(|e| AppError::Database(e.to_string()))?,
            created_at: to_utc(row.created_at),
        })
    }
}

#[async_trait]
impl AuditRepository for SqliteAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO audit_logs (id, actor_id, action, entity_type, entity_id, metadata, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#
        )
        .bind(entry.id.to_string())
        .bind(entry.actor_id.map(|id| id.to_string()))
        .bind(&entry.action)
        .bind(&entry.entity_type)
        .bind(&entry.entity_id)
        .bind(entry.metadata.to_string())
        .bind(entry.created_at.naive_utc())
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        Ok(())
    }

    async fn list(&self, limit: i64, offset: i64) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor_id, action, entity_type, entity_id, metadata, created_at
            FROM audit_logs
            ORDER BY created_at DESC
            LIMIT ? OFFSET ?
            "#
        )
        .bind(limit)
        .bind(offset)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_entry)
            .collect()
    }

    async fn list_for_entity(&self, entity_type: &str, entity_id: &str) -> Result<Vec<AuditEntry>> {
        let rows = sqlx::query_as::<_, AuditRow>(
            r#"
            SELECT id, actor_id, action, entity_type, entity_id, metadata, created_at
            FROM audit_logs
            WHERE entity_type = ? AND entity_id = ?
            ORDER BY created_at ASC
            "#
        )
        .bind(entity_type)
        .bind(entity_id)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(e.to_string()))?;

        rows.into_iter()
            .map(Self::row_to_entry)
            .collect()
    }
}
