use std::sync::Arc;
use chrono::Utc;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{signature, PaymentGateway},
    repository::{PaymentRepository, WebhookEventRepository},
    service::PaymentService,
};

/// Inbound gateway notifications: signature check, dedup ledger, then resolution.
pub struct WebhookService {
    ledger: Arc<dyn WebhookEventRepository>,
    payment_repo: Arc<dyn PaymentRepository>,
    payments: Arc<PaymentService>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    webhook_secret: Option<String>,
}

impl WebhookService {
    pub fn new(
        ledger: Arc<dyn WebhookEventRepository>,
        payment_repo: Arc<dyn PaymentRepository>,
        payments: Arc<PaymentService>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            ledger,
            payment_repo,
            payments,
            gateway,
            webhook_secret,
        }
    }

    /// Rejects the delivery when a secret is configured and the `x-signature`
    /// header does not match. Without a secret every delivery passes.
    pub fn verify_signature(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<()> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return Ok(());
        };

        let Some(header) = signature_header else {
            tracing::warn!(request_id = ?request_id, "Webhook signature missing");
            return Err(AppError::Unauthorized);
        };

        let data_id = serde_json::from_slice::<GatewayNotification>(body)
            .ok()
            .and_then(|n| n.data)
            .and_then(|d| d.id);

        if signature::verify(secret, header, request_id, data_id.as_deref()) {
            Ok(())
        } else {
            tracing::warn!(request_id = ?request_id, "Webhook signature mismatch");
            Err(AppError::Unauthorized)
        }
    }

    /// Claims the delivery in the ledger. Nothing downstream runs for a key that
    /// is already recorded.
    pub async fn ingest(&self, body: &[u8]) -> Result<IngestOutcome> {
        let notification: GatewayNotification = match serde_json::from_slice(body) {
            Ok(n) => n,
            Err(e) => return Ok(IngestOutcome::Malformed(format!("Invalid JSON: {}", e))),
        };

        let Some(data) = notification.data else {
            return Ok(IngestOutcome::Malformed("Missing data object".to_string()));
        };
        let Some(gateway_payment_id) = data.id.filter(|id| !id.is_empty()) else {
            return Ok(IngestOutcome::Malformed("Missing payment reference".to_string()));
        };

        let key = WebhookEventKey {
            event_type: notification
                .action
                .or(notification.topic)
                .unwrap_or_else(|| "payment".to_string()),
            provider_event_id: notification
                .id
                .unwrap_or_else(|| hex::encode(Sha256::digest(body))),
            payment_reference: gateway_payment_id.clone(),
        };

        let claimed = self
            .ledger
            .insert_if_absent(WebhookEvent {
                id: Uuid::new_v4(),
                event_type: key.event_type.clone(),
                provider_event_id: key.provider_event_id.clone(),
                payment_reference: key.payment_reference.clone(),
                payload: String::from_utf8_lossy(body).into_owned(),
                received_at: Utc::now(),
            })
            .await?;

        if !claimed {
            return Ok(IngestOutcome::AlreadyProcessed);
        }

        Ok(IngestOutcome::Forward(ResolvedEventInput {
            key,
            gateway_payment_id,
        }))
    }

    /// Full webhook pipeline. An error means the ledger claim was released and
    /// the gateway should redeliver.
    pub async fn handle(
        &self,
        body: &[u8],
        signature_header: Option<&str>,
        request_id: Option<&str>,
    ) -> Result<WebhookDisposition> {
        self.verify_signature(body, signature_header, request_id)?;

        let input = match self.ingest(body).await? {
            IngestOutcome::AlreadyProcessed => {
                tracing::debug!("Duplicate webhook delivery acknowledged");
                return Ok(WebhookDisposition::Duplicate);
            }
            IngestOutcome::Malformed(reason) => {
                tracing::warn!(reason = %reason, "Malformed webhook acknowledged without processing");
                return Ok(WebhookDisposition::Malformed { reason });
            }
            IngestOutcome::Forward(input) => input,
        };

        match self.resolve(&input).await {
            Ok(disposition) => Ok(disposition),
            Err(e) => {
                tracing::error!(
                    gateway_payment_id = %input.gateway_payment_id,
                    retryable = e.is_retryable(),
                    error = %e,
                    "Webhook processing failed, releasing ledger entry"
                );
                if let Err(release_err) = self.ledger.release(&input.key).await {
                    tracing::error!(error = %release_err, "Failed to release webhook ledger entry");
                }
                Err(e)
            }
        }
    }

    /// The notification is only a pointer: status and the charge it belongs to
    /// are read back from the gateway.
    async fn resolve(&self, input: &ResolvedEventInput) -> Result<WebhookDisposition> {
        let gateway = self.gateway.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("Payment gateway is not configured".to_string())
        })?;

        let remote = match gateway.fetch_payment(&input.gateway_payment_id).await {
            Ok(remote) => remote,
            Err(AppError::NotFound(_)) => {
                tracing::warn!(
                    gateway_payment_id = %input.gateway_payment_id,
                    "Gateway does not know the notified payment"
                );
                return Ok(WebhookDisposition::UnmatchedPayment {
                    gateway_payment_id: input.gateway_payment_id.clone(),
                });
            }
            Err(e) => return Err(e),
        };
        let external_reference = remote.external_reference;

        let Some(payment) = self
            .find_payment(external_reference.as_deref(), &input.gateway_payment_id)
            .await?
        else {
            tracing::warn!(
                gateway_payment_id = %input.gateway_payment_id,
                external_reference = ?external_reference,
                "Webhook references no known payment"
            );
            return Ok(WebhookDisposition::UnmatchedPayment {
                gateway_payment_id: input.gateway_payment_id.clone(),
            });
        };

        let outcome = self
            .payments
            .apply_gateway_status(&payment, &remote.status, Some(&remote.id))
            .await?;

        Ok(WebhookDisposition::Processed {
            payment_id: payment.id,
            outcome,
        })
    }

    async fn find_payment(
        &self,
        external_reference: Option<&str>,
        gateway_payment_id: &str,
    ) -> Result<Option<Payment>> {
        if let Some(id) = external_reference.and_then(|r| Uuid::parse_str(r).ok()) {
            if let Some(payment) = self.payment_repo.find_by_id(id).await? {
                return Ok(Some(payment));
            }
        }
        self.payment_repo.find_by_gateway_id(gateway_payment_id).await
    }
}
