use axum::{
    extract::{Path, State},
    Json,
};

use crate::{
    api::state::AppState,
    domain::Plan,
    error::Result,
};

pub async fn list(State(state): State<AppState>) -> Result<Json<Vec<Plan>>> {
    let plans = state.service_context.plan_service.list_plans().await?;
    Ok(Json(plans))
}

pub async fn get(
    State(state): State<AppState>,
    Path(name): Path<String>,
) -> Result<Json<Plan>> {
    let plan = state.service_context.plan_service.get_plan(&name).await?;
    Ok(Json(plan))
}
