use std::sync::Arc;

use axum::body::Body;
use axum::extract::State;
use axum::http::{Request, header};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};

use crate::error::ServerError;
use crate::state::AppState;

/// Require `Authorization: Bearer <SLOPPY_ADMIN_TOKEN>` when a token is set.
///
/// The token is read from the current config snapshot, so rotating it in
/// the env file applies after the next reload.
pub async fn admin_auth(
    State(state): State<Arc<AppState>>,
    req: Request<Body>,
    next: Next,
) -> Response {
    let config = state.config.current();
    if let Some(expected) = &config.admin_token {
        let provided = req
            .headers()
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "));
        if provided != Some(expected.expose()) {
            return ServerError::Unauthorized.into_response();
        }
    }
    next.run(req).await
}
