mod common;

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use common::{test_pool, TestApp};
use serde_json::json;
use uuid::Uuid;
use studioledger::{
    domain::{actions, AuditEntry},
    error::{AppError, Result},
    repository::AuditRepository,
    service::{AuditService, AuditWrite},
};

/// Fails the first `failures` appends, then accepts everything.
struct FlakyAuditRepository {
    failures: usize,
    calls: AtomicUsize,
    stored: std::sync::Mutex<Vec<AuditEntry>>,
}

impl FlakyAuditRepository {
    fn new(failures: usize) -> Self {
        Self { failures, calls: AtomicUsize::new(0), stored: std::sync::Mutex::new(Vec::new()) }
    }
}

#[async_trait]
impl AuditRepository for FlakyAuditRepository {
    async fn append(&self, entry: &AuditEntry) -> Result<()> {
        if self.calls.fetch_add(1, Ordering::SeqCst) < self.failures {
            return Err(AppError::Database("disk I/O error".to_string()));
        }
        self.stored.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn list(&self, _limit: i64, _offset: i64) -> Result<Vec<AuditEntry>> {
        Ok(self.stored.lock().unwrap().clone())
    }

    async fn list_for_entity(&self, _entity_type: &str, _entity_id: &str) -> Result<Vec<AuditEntry>> {
        Ok(self.stored.lock().unwrap().clone())
    }
}

#[tokio::test]
async fn entries_are_persisted_with_actor_and_metadata() -> anyhow::Result<()> {
    let app = TestApp::new().await?;
    let actor = Uuid::new_v4();
    let entity = Uuid::new_v4();

    let write = app
        .ctx
        .audit_service
        .record(Some(actor), actions::PAYMENT_MARKED_PAID, "payment", entity, json!({ "reason": "cash" }))
        .await;
    assert_eq!(write, AuditWrite::Persisted);

    let entries = app.ctx.audit_service.list(10, 0).await?;
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].actor_id, Some(actor));
    assert_eq!(entries[0].entity_id, entity.to_string());
    assert_eq!(entries[0].metadata["reason"], "cash");

    Ok(())
}

#[tokio::test]
async fn stored_entries_cannot_be_rewritten() -> anyhow::Result<()> {
    let pool = test_pool().await?;
    let entry = AuditEntry::new(None, actions::PLAN_CHANGED, "professor", Uuid::new_v4(), json!({}));
    let repo = studioledger::repository::SqliteAuditRepository::new(pool.clone());
    repo.append(&entry).await?;

    let update = sqlx::query("UPDATE audit_logs SET action = 'tampered'").execute(&pool).await;
    assert!(update.is_err());
    let delete = sqlx::query("DELETE FROM audit_logs").execute(&pool).await;
    assert!(delete.is_err());

    Ok(())
}

#[tokio::test]
async fn failed_write_is_queued_and_retried() -> anyhow::Result<()> {
    let repo = Arc::new(FlakyAuditRepository::new(2));
    let audit = AuditService::new(repo.clone());

    let write = audit
        .record(None, actions::PLAN_CHANGED, "professor", Uuid::new_v4(), json!({ "new_plan": "free" }))
        .await;
    assert_eq!(write, AuditWrite::QueuedForRetry);
    assert_eq!(audit.pending_retries(), 1);

    let worker = audit.spawn_retry_worker().await;
    assert!(worker.is_some());
    assert!(audit.spawn_retry_worker().await.is_none());

    // First retry after 1s fails, second after a further 2s succeeds.
    let deadline = tokio::time::Instant::now() + Duration::from_secs(10);
    while audit.pending_retries() > 0 && tokio::time::Instant::now() < deadline {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }

    assert_eq!(audit.pending_retries(), 0);
    assert_eq!(repo.stored.lock().unwrap().len(), 1);

    Ok(())
}
