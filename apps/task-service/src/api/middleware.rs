use axum::{
    extract::{Request, State},
    http::{StatusCode, header},
    middleware::Next,
    response::Response,
};
use tracing::warn;

use core_lib::auth;

use crate::AppState;

/// Middleware authenticating requests with a bearer token. The principal is
/// attached to request extensions; the trigger user of every published
/// event is derived from it, never from the body.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let token = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(auth::bearer_token);

    let Some(token) = token else {
        return Err(StatusCode::UNAUTHORIZED);
    };

    match auth::verify_token(token, state.config.jwt_secret.as_bytes()) {
        Ok(principal) => {
            req.extensions_mut().insert(principal);
            Ok(next.run(req).await)
        }
        Err(e) => {
            warn!("Rejected request: {}", e);
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
