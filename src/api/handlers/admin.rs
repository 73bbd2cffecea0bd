use axum::{
    extract::{Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use crate::{
    api::state::AppState,
    domain::AuditEntry,
    error::Result,
    service::SweepReport,
};

#[derive(Debug, Deserialize)]
pub struct AuditLogParams {
    #[serde(default = "default_limit")]
    limit: i64,
    #[serde(default)]
    offset: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Debug, Serialize)]
pub struct AuditLogResponse {
    pub entries: Vec<AuditEntry>,
    /// Entries whose write failed and are still waiting to be persisted.
    pub pending_retries: usize,
}

#[derive(Debug, Serialize)]
pub struct GraceSweepResponse {
    /// False when another instance holds the sweep lease.
    pub ran: bool,
    pub report: Option<SweepReport>,
}

pub async fn audit_log(
    State(state): State<AppState>,
    Query(params): Query<AuditLogParams>,
) -> Result<Json<AuditLogResponse>> {
    let audit = &state.service_context.audit_service;
    let entries = audit.list(params.limit.clamp(1, 500), params.offset.max(0)).await?;

    Ok(Json(AuditLogResponse {
        entries,
        pending_retries: audit.pending_retries(),
    }))
}

pub async fn grace_sweep(State(state): State<AppState>) -> Result<Json<GraceSweepResponse>> {
    let report = state.service_context.grace_period_service
        .run_exclusive_sweep()
        .await?;

    Ok(Json(GraceSweepResponse {
        ran: report.is_some(),
        report,
    }))
}
