//! Unified server error type.
//!
//! Every handler returns `Result<T, ServerError>`, which implements
//! [`axum::response::IntoResponse`] so errors become a JSON body of the form
//! `{"error": "..."}` with a matching status code.
//!
//! Store failures are logged with full detail but only a generic message is
//! returned, so SQL and file paths never reach clients.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::json;
use sloppy_core::config::ConfigError;
use sloppy_core::queue::QueueError;
use sloppy_core::{PipelineError, StoreError};
use thiserror::Error;
use tracing::error;

#[derive(Debug, Error)]
pub enum ServerError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("bad request: {0}")]
    BadRequest(String),

    /// The request conflicts with the script's current state or owner.
    #[error("conflict: {0}")]
    Conflict(String),

    #[error("unauthorised")]
    Unauthorized,

    #[error("service unavailable: {0}")]
    Unavailable(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let (status, client_message) = match &self {
            ServerError::NotFound(m) => (StatusCode::NOT_FOUND, m.clone()),
            ServerError::BadRequest(m) => (StatusCode::BAD_REQUEST, m.clone()),
            ServerError::Conflict(m) => (StatusCode::CONFLICT, m.clone()),
            ServerError::Unauthorized => (StatusCode::UNAUTHORIZED, "unauthorised".to_owned()),
            ServerError::Unavailable(m) => (StatusCode::SERVICE_UNAVAILABLE, m.clone()),

            ServerError::Store(e) => {
                error!(error = %e, "store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
            ServerError::Internal(m) => {
                error!(message = %m, "internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal server error".to_owned(),
                )
            }
        };
        (status, Json(json!({ "error": client_message }))).into_response()
    }
}

impl From<StoreError> for ServerError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(_) => ServerError::NotFound(e.to_string()),
            StoreError::DuplicateKey(_) | StoreError::InvalidState { .. } | StoreError::Busy { .. } => {
                ServerError::Conflict(e.to_string())
            }
            other => ServerError::Store(other),
        }
    }
}

impl From<PipelineError> for ServerError {
    fn from(e: PipelineError) -> Self {
        match e {
            PipelineError::NotFound(_) => ServerError::NotFound(e.to_string()),
            PipelineError::InvalidInput(_) => ServerError::BadRequest(e.to_string()),
            PipelineError::Duplicate { .. }
            | PipelineError::InvalidState { .. }
            | PipelineError::IllegalTransition { .. }
            | PipelineError::Busy { .. } => ServerError::Conflict(e.to_string()),
            PipelineError::Queue(QueueError::QueueFull { .. }) => {
                ServerError::Unavailable(e.to_string())
            }
            PipelineError::Queue(other) => ServerError::Internal(other.to_string()),
            PipelineError::Store(store) => ServerError::from(store),
        }
    }
}

impl From<ConfigError> for ServerError {
    fn from(e: ConfigError) -> Self {
        match e {
            ConfigError::UnknownCredential(_) | ConfigError::InvalidValue => {
                ServerError::BadRequest(e.to_string())
            }
            ConfigError::ReadOnly => ServerError::Conflict(e.to_string()),
            other => ServerError::Internal(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sloppy_core::ScriptState;

    #[test]
    fn pipeline_errors_map_to_status_codes() {
        let cases = [
            (PipelineError::NotFound("x".into()), StatusCode::NOT_FOUND),
            (PipelineError::InvalidInput("empty".into()), StatusCode::BAD_REQUEST),
            (
                PipelineError::InvalidState {
                    id: "x".into(),
                    expected: ScriptState::Generated,
                    actual: ScriptState::Generating,
                },
                StatusCode::CONFLICT,
            ),
            (
                PipelineError::Queue(QueueError::QueueFull { capacity: 1 }),
                StatusCode::SERVICE_UNAVAILABLE,
            ),
        ];
        for (err, status) in cases {
            assert_eq!(ServerError::from(err).into_response().status(), status);
        }
    }

    #[test]
    fn store_failures_are_hidden() {
        let err = ServerError::from(StoreError::Corrupt {
            id: "x".into(),
            message: "state 9".into(),
        });
        assert_eq!(err.into_response().status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
