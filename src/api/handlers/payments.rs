use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentActor, state::AppState},
    domain::{
        CancelPaymentRequest, CreateChargeRequest, MarkAsPaidRequest, Payment, PaymentStatus,
        Precedence,
    },
    error::Result,
    service::ReprocessResult,
};

/// Payment as read by clients; `status` is the effective status, so overdue
/// charges show as `atrasado`.
#[derive(Debug, Serialize)]
pub struct PaymentDto {
    pub id: Uuid,
    pub professor_id: Uuid,
    pub student_id: Option<Uuid>,
    pub amount_cents: i64,
    pub description: String,
    pub due_date: DateTime<Utc>,
    pub paid_at: Option<DateTime<Utc>>,
    pub status: PaymentStatus,
    pub precedence: Precedence,
    pub eligible_to_schedule: bool,
    pub gateway_payment_id: Option<String>,
    pub checkout_url: Option<String>,
    pub plan_name: Option<String>,
    pub manual_reason: Option<String>,
    pub manual_actor: Option<Uuid>,
    pub manual_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Payment> for PaymentDto {
    fn from(payment: Payment) -> Self {
        Self {
            status: payment.effective_status(Utc::now()),
            id: payment.id,
            professor_id: payment.professor_id,
            student_id: payment.student_id,
            amount_cents: payment.amount_cents,
            description: payment.description,
            due_date: payment.due_date,
            paid_at: payment.paid_at,
            precedence: payment.precedence,
            eligible_to_schedule: payment.eligible_to_schedule,
            gateway_payment_id: payment.gateway_payment_id,
            checkout_url: payment.checkout_url,
            plan_name: payment.plan_name,
            manual_reason: payment.manual_reason,
            manual_actor: payment.manual_actor,
            manual_at: payment.manual_at,
            created_at: payment.created_at,
            updated_at: payment.updated_at,
        }
    }
}

pub async fn create(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Json(request): Json<CreateChargeRequest>,
) -> Result<(StatusCode, Json<PaymentDto>)> {
    let payment = state.service_context.payment_service
        .create_charge(request, Some(actor.id))
        .await?;

    Ok((StatusCode::CREATED, Json(payment.into())))
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<PaymentDto>> {
    let payment = state.service_context.payment_service.get_payment(id).await?;
    Ok(Json(payment.into()))
}

pub async fn reprocess(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReprocessResult>> {
    let result = state.service_context.payment_service.reprocess(id).await?;
    Ok(Json(result))
}

pub async fn mark_paid(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
    Json(request): Json<MarkAsPaidRequest>,
) -> Result<Json<PaymentDto>> {
    request.validate()?;

    let payment = state.service_context.payment_service
        .mark_as_paid_manually(id, &request.reason, actor.id, request.paid_at)
        .await?;

    Ok(Json(payment.into()))
}

pub async fn cancel(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
    Json(request): Json<CancelPaymentRequest>,
) -> Result<Json<PaymentDto>> {
    request.validate()?;

    let payment = state.service_context.payment_service
        .cancel_payment(id, &request.reason, actor.id)
        .await?;

    Ok(Json(payment.into()))
}
