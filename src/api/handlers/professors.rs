use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Serialize;
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::{middleware::auth::CurrentActor, state::AppState},
    domain::{
        ChangePlanRequest, EnrollStudentRequest, Enrollment, GracePeriodRequest,
        PlanChangeOptions, PlanChangeOutcome, Professor,
    },
    error::Result,
};

use super::payments::PaymentDto;

#[derive(Debug, Serialize)]
pub struct EnrollmentListResponse {
    pub enrollments: Vec<Enrollment>,
    pub active: usize,
    pub suspended: usize,
}

#[derive(Debug, Serialize)]
pub struct ReactivateResponse {
    pub reactivated: Vec<Uuid>,
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Professor>> {
    let professor = state.service_context.plan_service.get_professor(id).await?;
    Ok(Json(professor))
}

pub async fn list_payments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Vec<PaymentDto>>> {
    let payments = state.service_context.payment_service.list_for_professor(id).await?;
    Ok(Json(payments.into_iter().map(Into::into).collect()))
}

pub async fn change_plan(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChangePlanRequest>,
) -> Result<Json<PlanChangeOutcome>> {
    request.validate()?;

    let outcome = state.service_context.plan_service
        .change_plan(
            id,
            &request.plan,
            PlanChangeOptions {
                automatic: request.automatic,
                payment_id: request.payment_id,
                actor_id: Some(actor.id),
            },
        )
        .await?;

    Ok(Json(outcome))
}

pub async fn clear_plan_override(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Professor>> {
    let professor = state.service_context.plan_service
        .clear_manual_override(id, Some(actor.id))
        .await?;
    Ok(Json(professor))
}

pub async fn apply_grace_period(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
    Json(request): Json<GracePeriodRequest>,
) -> Result<Json<Professor>> {
    request.validate()?;

    let professor = state.service_context.grace_period_service
        .apply_grace_period(id, request.days, Some(actor.id))
        .await?;
    Ok(Json(professor))
}

pub async fn list_enrollments(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<EnrollmentListResponse>> {
    state.service_context.plan_service.get_professor(id).await?;
    let enrollments = state.service_context.capacity_service.list_enrollments(id).await?;

    let active = enrollments.iter().filter(|e| e.active).count();
    let suspended = enrollments.len() - active;

    Ok(Json(EnrollmentListResponse { enrollments, active, suspended }))
}

pub async fn enroll(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
    Json(request): Json<EnrollStudentRequest>,
) -> Result<(StatusCode, Json<Enrollment>)> {
    request.validate()?;

    let enrollment = state.service_context.capacity_service
        .enroll(id, request.student_name, Some(actor.id))
        .await?;
    Ok((StatusCode::CREATED, Json(enrollment)))
}

/// Fills any free slots with students suspended by a downgrade.
pub async fn reactivate(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<ReactivateResponse>> {
    state.service_context.plan_service.get_professor(id).await?;
    let reactivated = state.service_context.capacity_service.reactivate(id).await?;
    Ok(Json(ReactivateResponse { reactivated }))
}
