use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;
use uuid::Uuid;

use crate::{
    api::state::AppState,
    error::AppError,
};

pub const ACTOR_HEADER: &str = "x-actor-id";

/// Operator identified by the `X-Actor-Id` header; recorded on audit entries.
#[derive(Clone, Copy, Debug)]
pub struct CurrentActor {
    pub id: Uuid,
}

pub async fn require_operator(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let headers = request.headers();

    let token = headers
        .get(AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .ok_or(AppError::Unauthorized)?;

    let expected = state.settings.auth.operator_token.as_bytes();
    if !bool::from(token.as_bytes().ct_eq(expected)) {
        return Err(AppError::Unauthorized);
    }

    let actor_id = headers
        .get(ACTOR_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing X-Actor-Id header".to_string()))
        .and_then(|v| {
            Uuid::parse_str(v.trim())
                .map_err(|_| AppError::BadRequest("X-Actor-Id must be a UUID".to_string()))
        })?;

    request.extensions_mut().insert(CurrentActor { id: actor_id });

    Ok(next.run(request).await)
}
