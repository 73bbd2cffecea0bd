use axum::{
    body::Bytes,
    extract::State,
    http::HeaderMap,
    Json,
};

use crate::{
    api::state::AppState,
    domain::WebhookDisposition,
    error::Result,
};

/// Acknowledges with 200 whenever the delivery was handled, including duplicates,
/// malformed bodies and unmatched payments. Errors (bad signature, transient
/// gateway failure) make the gateway redeliver.
pub async fn gateway_notification(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<WebhookDisposition>> {
    let signature = headers.get("x-signature").and_then(|v| v.to_str().ok());
    let request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok());

    let disposition = state
        .service_context
        .webhook_service
        .handle(&body, signature, request_id)
        .await?;

    Ok(Json(disposition))
}
