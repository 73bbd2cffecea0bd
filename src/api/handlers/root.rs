use axum::{http::StatusCode, Json, response::IntoResponse};
use serde_json::json;

pub async fn root() -> impl IntoResponse {
    Json(json!({
        "name": "Studioledger API",
        "version": env!("CARGO_PKG_VERSION"),
        "description": "Payment reconciliation and plan enforcement for independent teachers",
        "status": "operational",
        "endpoints": {
            "health": "/health",
            "webhooks": "/webhooks/gateway",
            "api": "/api",
            "admin": "/admin"
        }
    }))
}

pub async fn health_check() -> impl IntoResponse {
    (StatusCode::OK, Json(json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339()
    })))
}
