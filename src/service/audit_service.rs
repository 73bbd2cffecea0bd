use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::{
    domain::AuditEntry,
    repository::AuditRepository,
};

const MAX_RETRY_ATTEMPTS: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditWrite {
    Persisted,
    /// The store rejected the write; the entry waits in the retry queue.
    QueuedForRetry,
}

/// Append-only audit emitter. A failed write never undoes the caller's mutation;
/// it is logged at error level and handed to the retry worker.
pub struct AuditService {
    repo: Arc<dyn AuditRepository>,
    retry_tx: mpsc::UnboundedSender<AuditEntry>,
    retry_rx: Mutex<Option<mpsc::UnboundedReceiver<AuditEntry>>>,
    pending: Arc<AtomicUsize>,
}

impl AuditService {
    pub fn new(repo: Arc<dyn AuditRepository>) -> Self {
        let (retry_tx, retry_rx) = mpsc::unbounded_channel();
        Self {
            repo,
            retry_tx,
            retry_rx: Mutex::new(Some(retry_rx)),
            pending: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub async fn record(
        &self,
        actor_id: Option<Uuid>,
        action: &str,
        entity_type: &str,
        entity_id: impl ToString,
        metadata: serde_json::Value,
    ) -> AuditWrite {
        let entry = AuditEntry::new(actor_id, action, entity_type, entity_id, metadata);

        match self.repo.append(&entry).await {
            Ok(()) => AuditWrite::Persisted,
            Err(e) => {
                tracing::error!(
                    audit_id = %entry.id,
                    action = %entry.action,
                    entity_type = %entry.entity_type,
                    entity_id = %entry.entity_id,
                    error = %e,
                    "Audit log write failed, queued for retry"
                );
                self.pending.fetch_add(1, Ordering::SeqCst);
                if let Err(mpsc::error::SendError(entry)) = self.retry_tx.send(entry) {
                    self.pending.fetch_sub(1, Ordering::SeqCst);
                    tracing::error!(
                        entry = %serde_json::to_string(&entry).unwrap_or_default(),
                        "Audit retry queue closed, entry could not be persisted"
                    );
                }
                AuditWrite::QueuedForRetry
            }
        }
    }

    /// Entries waiting in the retry queue.
    pub fn pending_retries(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    pub async fn list(&self, limit: i64, offset: i64) -> crate::error::Result<Vec<AuditEntry>> {
        self.repo.list(limit, offset).await
    }

    pub async fn list_for_entity(
        &self,
        entity_type: &str,
        entity_id: &str,
    ) -> crate::error::Result<Vec<AuditEntry>> {
        self.repo.list_for_entity(entity_type, entity_id).await
    }

    /// Starts the retry worker. Only the first call spawns a task.
    pub async fn spawn_retry_worker(&self) -> Option<JoinHandle<()>> {
        let mut rx = self.retry_rx.lock().await.take()?;
        let repo = self.repo.clone();
        let pending = self.pending.clone();

        Some(tokio::spawn(async move {
            while let Some(entry) = rx.recv().await {
                let mut delay = Duration::from_secs(1);
                let mut persisted = false;

                for attempt in 1..=MAX_RETRY_ATTEMPTS {
                    tokio::time::sleep(delay).await;
                    match repo.append(&entry).await {
                        Ok(()) => {
                            tracing::info!(audit_id = %entry.id, attempt, "Audit entry persisted on retry");
                            persisted = true;
                            break;
                        }
                        Err(e) => {
                            tracing::warn!(audit_id = %entry.id, attempt, error = %e, "Audit retry failed");
                            delay *= 2;
                        }
                    }
                }

                if !persisted {
                    tracing::error!(
                        entry = %serde_json::to_string(&entry).unwrap_or_default(),
                        "Audit entry dropped after exhausting retries"
                    );
                }
                pending.fetch_sub(1, Ordering::SeqCst);
            }
        }))
    }
}
