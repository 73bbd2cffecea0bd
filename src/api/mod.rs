pub mod handlers;
pub mod middleware;
pub mod state;

use axum::{
    Router,
    routing::{delete, get, post},
};
use tower_http::{
    cors::CorsLayer,
    trace::TraceLayer,
};
use std::sync::Arc;

use crate::{
    config::Settings,
    service::ServiceContext,
};
use state::AppState;

pub fn create_app(service_context: Arc<ServiceContext>, settings: Arc<Settings>) -> Router {
    let app_state = AppState::new(service_context, settings);

    Router::new()
        // Root and health endpoints
        .route("/", get(handlers::root::root))
        .route("/health", get(handlers::root::health_check))

        // Gateway notifications (signature-checked, no operator auth)
        .route("/webhooks/gateway", post(handlers::webhooks::gateway_notification))

        // Operator API
        .nest("/api", api_routes(app_state.clone()))

        // Admin routes
        .nest("/admin", admin_routes(app_state.clone()))

        .with_state(app_state)

        // Middleware
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

fn api_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .nest("/payments", payment_routes())
        .nest("/plans", plan_routes())
        .nest("/professors", professor_routes())
        .nest("/enrollments", enrollment_routes())
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_operator,
        ))
}

fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(handlers::payments::create))
        .route("/:id", get(handlers::payments::get))
        .route("/:id/reprocess", post(handlers::payments::reprocess))
        .route("/:id/mark-paid", post(handlers::payments::mark_paid))
        .route("/:id/cancel", post(handlers::payments::cancel))
}

fn plan_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(handlers::plans::list))
        .route("/:name", get(handlers::plans::get))
}

fn professor_routes() -> Router<AppState> {
    Router::new()
        .route("/:id", get(handlers::professors::get))
        .route("/:id/payments", get(handlers::professors::list_payments))
        .route("/:id/plan", post(handlers::professors::change_plan))
        .route("/:id/plan-override", delete(handlers::professors::clear_plan_override))
        .route("/:id/grace-period", post(handlers::professors::apply_grace_period))
        .route("/:id/enrollments", get(handlers::professors::list_enrollments))
        .route("/:id/enrollments", post(handlers::professors::enroll))
        .route("/:id/reactivate", post(handlers::professors::reactivate))
}

fn enrollment_routes() -> Router<AppState> {
    Router::new()
        .route("/:id/reactivate", post(handlers::enrollments::reactivate))
        .route("/:id/suspend", post(handlers::enrollments::suspend))
}

fn admin_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/audit-log", get(handlers::admin::audit_log))
        .route("/grace-sweep", post(handlers::admin::grace_sweep))
        .route_layer(axum::middleware::from_fn_with_state(
            state,
            middleware::auth::require_operator,
        ))
}
