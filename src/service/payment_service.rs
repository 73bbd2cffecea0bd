use std::sync::Arc;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use uuid::Uuid;
use validator::Validate;

use crate::{
    domain::*,
    error::{AppError, Result},
    payments::{CheckoutRequest, PaymentGateway},
    repository::{LessonScheduleRepository, PaymentRepository},
    service::{AuditService, GracePeriodService, PlanService},
};

#[derive(Debug, Clone)]
pub struct ResolverSettings {
    pub baseline_plan: String,
    pub default_grace_days: i64,
    pub checkout_success_url: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReprocessResult {
    pub payment_id: Uuid,
    pub old_status: PaymentStatus,
    pub new_status: PaymentStatus,
    pub resolution: ResolutionOutcome,
}

/// Precedence-aware state machine over payment status.
///
/// Gateway signals and operator actions both land here. A manual settlement can
/// only be overridden by a terminal gateway signal (cancelled, refunded,
/// charged back).
pub struct PaymentService {
    payment_repo: Arc<dyn PaymentRepository>,
    lesson_repo: Arc<dyn LessonScheduleRepository>,
    plan_service: Arc<PlanService>,
    grace_service: Arc<GracePeriodService>,
    audit: Arc<AuditService>,
    gateway: Option<Arc<dyn PaymentGateway>>,
    settings: ResolverSettings,
}

impl PaymentService {
    pub fn new(
        payment_repo: Arc<dyn PaymentRepository>,
        lesson_repo: Arc<dyn LessonScheduleRepository>,
        plan_service: Arc<PlanService>,
        grace_service: Arc<GracePeriodService>,
        audit: Arc<AuditService>,
        gateway: Option<Arc<dyn PaymentGateway>>,
        settings: ResolverSettings,
    ) -> Self {
        Self {
            payment_repo,
            lesson_repo,
            plan_service,
            grace_service,
            audit,
            gateway,
            settings,
        }
    }

    pub async fn get_payment(&self, id: Uuid) -> Result<Payment> {
        self.payment_repo.find_by_id(id).await?
            .ok_or_else(|| AppError::NotFound("Payment not found".to_string()))
    }

    pub async fn list_for_professor(&self, professor_id: Uuid) -> Result<Vec<Payment>> {
        self.payment_repo.list_by_professor(professor_id).await
    }

    fn gateway(&self) -> Result<&Arc<dyn PaymentGateway>> {
        self.gateway.as_ref().ok_or_else(|| {
            AppError::ServiceUnavailable("Payment gateway is not configured".to_string())
        })
    }

    /// Schedules a charge. The gateway checkout is created first, outside any
    /// write, so a gateway failure leaves no record behind.
    pub async fn create_charge(&self, request: CreateChargeRequest, actor_id: Option<Uuid>) -> Result<Payment> {
        request.validate()?;

        let professor = self.plan_service.get_professor(request.professor_id).await?;
        if let Some(plan_name) = &request.plan_name {
            self.plan_service.get_plan(plan_name).await?;
        }

        let id = Uuid::new_v4();
        let checkout = self
            .gateway()?
            .create_checkout(CheckoutRequest {
                external_reference: id.to_string(),
                title: request.description.clone(),
                amount_cents: request.amount_cents,
                success_url: self.settings.checkout_success_url.clone(),
            })
            .await?;

        let now = Utc::now();
        let payment = self
            .payment_repo
            .create(Payment {
                id,
                professor_id: professor.id,
                student_id: request.student_id,
                amount_cents: request.amount_cents,
                description: request.description,
                due_date: request.due_date,
                paid_at: None,
                status: PaymentStatus::Pendente,
                precedence: Precedence::Automatic,
                eligible_to_schedule: false,
                gateway_payment_id: None,
                checkout_url: Some(checkout.checkout_url),
                plan_name: request.plan_name,
                manual_reason: None,
                manual_actor: None,
                manual_at: None,
                created_at: now,
                updated_at: now,
            })
            .await?;

        self.audit
            .record(
                actor_id,
                actions::PAYMENT_CREATED,
                "payment",
                payment.id,
                json!({
                    "professor_id": payment.professor_id,
                    "amount_cents": payment.amount_cents,
                    "plan_name": payment.plan_name,
                    "preference_id": checkout.preference_id,
                }),
            )
            .await;

        Ok(payment)
    }

    /// Runs a raw gateway status through the precedence rules.
    pub async fn apply_gateway_status(
        &self,
        payment: &Payment,
        raw_status: &str,
        gateway_payment_id: Option<&str>,
    ) -> Result<ResolutionOutcome> {
        let Some(signal) = GatewaySignal::parse(raw_status) else {
            tracing::debug!(
                payment_id = %payment.id,
                raw_status,
                "Gateway status has no mapping, ignoring"
            );
            return Ok(ResolutionOutcome::IgnoredSignal {
                raw_status: raw_status.to_string(),
            });
        };

        let guard_manual = !signal.overrides_manual();
        if guard_manual && payment.precedence == Precedence::Manual {
            return Ok(self.skipped(payment, signal));
        }

        let transition = signal.transition();
        let applied = self
            .payment_repo
            .apply_transition(payment.id, transition, guard_manual, gateway_payment_id, Utc::now())
            .await?;

        if !applied {
            // A manual settlement landed between our read and the guarded write.
            let current = self.get_payment(payment.id).await?;
            return Ok(self.skipped(&current, signal));
        }

        let old_status = payment.status;
        let new_status = transition.status;

        tracing::info!(
            payment_id = %payment.id,
            signal = signal.as_str(),
            old_status = old_status.as_str(),
            new_status = new_status.as_str(),
            "Payment status resolved"
        );

        self.audit
            .record(
                None,
                actions::PAYMENT_RESOLVED,
                "payment",
                payment.id,
                json!({
                    "signal": signal.as_str(),
                    "old_status": old_status,
                    "new_status": new_status,
                    "old_precedence": payment.precedence,
                    "gateway_payment_id": gateway_payment_id,
                }),
            )
            .await;

        if old_status != new_status {
            self.apply_plan_consequences(payment, signal).await;
        }

        Ok(ResolutionOutcome::Applied { old_status, new_status })
    }

    fn skipped(&self, payment: &Payment, signal: GatewaySignal) -> ResolutionOutcome {
        tracing::warn!(
            payment_id = %payment.id,
            signal = signal.as_str(),
            "Gateway update skipped: payment was settled manually"
        );
        ResolutionOutcome::SkippedDueToManualOverride {
            status: payment.status,
        }
    }

    /// Cascades a resolved plan charge onto the professor's subscription.
    /// Failures are logged rather than propagated: the payment write already stands.
    async fn apply_plan_consequences(&self, payment: &Payment, signal: GatewaySignal) {
        let Some(plan_name) = payment.plan_name.as_deref() else {
            return;
        };

        let options = PlanChangeOptions {
            automatic: true,
            payment_id: Some(payment.id),
            actor_id: None,
        };

        let result = match signal {
            GatewaySignal::Approved => {
                let changed = self
                    .plan_service
                    .change_plan(payment.professor_id, plan_name, options)
                    .await
                    .map(|_| ());
                match changed {
                    Ok(()) => self.grace_service.clear_grace_period(payment.professor_id).await.map(|_| ()),
                    Err(e) => Err(e),
                }
            }
            GatewaySignal::Cancelled => self.open_renewal_grace(payment, plan_name).await,
            GatewaySignal::Refunded | GatewaySignal::ChargedBack => self
                .plan_service
                .change_plan(payment.professor_id, &self.settings.baseline_plan, options)
                .await
                .map(|_| ()),
            GatewaySignal::Pending | GatewaySignal::InProcess => Ok(()),
        };

        if let Err(e) = result {
            tracing::error!(
                payment_id = %payment.id,
                professor_id = %payment.professor_id,
                plan = plan_name,
                signal = signal.as_str(),
                error = %e,
                "Failed to apply plan consequences of payment"
            );
        }
    }

    /// A cancelled charge only threatens the plan it was meant to renew; an
    /// abandoned upgrade leaves the current plan alone.
    async fn open_renewal_grace(&self, payment: &Payment, plan_name: &str) -> Result<()> {
        let professor = self.plan_service.get_professor(payment.professor_id).await?;
        if professor.plan_name != plan_name {
            tracing::debug!(
                payment_id = %payment.id,
                professor_id = %professor.id,
                current_plan = %professor.plan_name,
                charged_plan = plan_name,
                "Cancelled charge was not a renewal, no grace period"
            );
            return Ok(());
        }

        self.grace_service
            .apply_grace_period(payment.professor_id, self.settings.default_grace_days, None)
            .await
            .map(|_| ())
    }

    /// Operator settlement. Refused when the payment is already `pago`.
    pub async fn mark_as_paid_manually(
        &self,
        payment_id: Uuid,
        reason: &str,
        actor_id: Uuid,
        explicit_date: Option<DateTime<Utc>>,
    ) -> Result<Payment> {
        let payment = self.get_payment(payment_id).await?;

        if payment.status == PaymentStatus::Pago {
            return Err(AppError::Conflict("Payment is already settled".to_string()));
        }

        let now = Utc::now();
        let paid_at = explicit_date.unwrap_or(now);

        if !self
            .payment_repo
            .mark_paid_manually(payment_id, reason, actor_id, paid_at, now)
            .await?
        {
            return Err(AppError::Conflict("Payment is already settled".to_string()));
        }

        tracing::info!(payment_id = %payment_id, actor_id = %actor_id, "Payment marked as paid manually");

        self.audit
            .record(
                Some(actor_id),
                actions::PAYMENT_MARKED_PAID,
                "payment",
                payment_id,
                json!({
                    "reason": reason,
                    "old_status": payment.status,
                    "paid_at": paid_at,
                }),
            )
            .await;

        // An operator settling a plan charge is an operator plan decision. The
        // settlement stands even if the plan cannot be applied.
        if let Some(plan_name) = payment.plan_name.as_deref() {
            let options = PlanChangeOptions {
                automatic: false,
                payment_id: Some(payment_id),
                actor_id: Some(actor_id),
            };
            let result = match self
                .plan_service
                .change_plan(payment.professor_id, plan_name, options)
                .await
            {
                Ok(_) => self.grace_service.clear_grace_period(payment.professor_id).await.map(|_| ()),
                Err(e) => Err(e),
            };

            if let Err(e) = result {
                tracing::error!(
                    payment_id = %payment_id,
                    professor_id = %payment.professor_id,
                    plan = plan_name,
                    error = %e,
                    "Manual settlement recorded but the plan change failed"
                );
            }
        }

        self.get_payment(payment_id).await
    }

    /// Soft cancel before settlement.
    pub async fn cancel_payment(&self, payment_id: Uuid, reason: &str, actor_id: Uuid) -> Result<Payment> {
        let payment = self.get_payment(payment_id).await?;

        if payment.status == PaymentStatus::Pago {
            return Err(AppError::Conflict("Cannot cancel a settled payment".to_string()));
        }

        let lessons = self.lesson_repo.count_scheduled_for_payment(payment_id).await?;
        if lessons > 0 {
            return Err(AppError::Conflict(format!(
                "Cannot cancel payment: {} scheduled lessons depend on it",
                lessons
            )));
        }

        if !self.payment_repo.cancel(payment_id, reason, actor_id, Utc::now()).await? {
            return Err(AppError::Conflict("Cannot cancel a settled payment".to_string()));
        }

        self.audit
            .record(
                Some(actor_id),
                actions::PAYMENT_CANCELLED,
                "payment",
                payment_id,
                json!({ "reason": reason, "old_status": payment.status }),
            )
            .await;

        self.get_payment(payment_id).await
    }

    /// Re-fetches the authoritative status from the gateway and resolves it.
    pub async fn reprocess(&self, payment_id: Uuid) -> Result<ReprocessResult> {
        let payment = self.get_payment(payment_id).await?;
        let gateway = self.gateway()?;

        let remote = match payment.gateway_payment_id.as_deref() {
            Some(gateway_id) => gateway.fetch_payment(gateway_id).await?,
            None => gateway
                .search_by_external_reference(&payment.id.to_string())
                .await?
                .into_iter()
                .next()
                .ok_or_else(|| {
                    AppError::NotFound("Gateway has no payment for this charge yet".to_string())
                })?,
        };

        let resolution = self
            .apply_gateway_status(&payment, &remote.status, Some(&remote.id))
            .await?;
        let current = self.get_payment(payment_id).await?;

        Ok(ReprocessResult {
            payment_id,
            old_status: payment.status,
            new_status: current.status,
            resolution,
        })
    }
}
