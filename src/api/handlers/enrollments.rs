use axum::{
    extract::{Path, State},
    Extension, Json,
};
use uuid::Uuid;

use crate::{
    api::{middleware::auth::CurrentActor, state::AppState},
    domain::Enrollment,
    error::Result,
};

pub async fn reactivate(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Enrollment>> {
    let enrollment = state.service_context.capacity_service
        .reactivate_one(id, Some(actor.id))
        .await?;
    Ok(Json(enrollment))
}

pub async fn suspend(
    State(state): State<AppState>,
    Extension(actor): Extension<CurrentActor>,
    Path(id): Path<Uuid>,
) -> Result<Json<Enrollment>> {
    let enrollment = state.service_context.capacity_service
        .suspend_one(id, Some(actor.id))
        .await?;
    Ok(Json(enrollment))
}
