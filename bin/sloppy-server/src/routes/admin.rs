//! Administrative endpoints nested under `/admin`.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router, middleware};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::middleware::auth;
use crate::schemas::admin::{
    CredentialStatus, ReleaseResponse, ReloadResponse, UpdateCredentialRequest,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_credentials, update_credential, reload_config, release_script),
    components(schemas(
        CredentialStatus,
        UpdateCredentialRequest,
        ReloadResponse,
        ReleaseResponse
    ))
)]
pub struct AdminApi;

pub fn router(state: Arc<AppState>) -> Router<Arc<AppState>> {
    Router::new()
        .route("/credentials", get(get_credentials).put(update_credential))
        .route("/config/reload", post(reload_config))
        .route("/scripts/{id}/release", post(release_script))
        .route_layer(middleware::from_fn_with_state(state, auth::admin_auth))
}

/// Which provider credentials are configured. Values are never returned.
#[utoipa::path(
    get,
    path = "/admin/credentials",
    tag = "admin",
    responses(
        (status = 200, description = "Credential presence", body = [CredentialStatus]),
        (status = 401, description = "Missing or wrong admin token"),
    )
)]
pub async fn get_credentials(State(state): State<Arc<AppState>>) -> Json<Vec<CredentialStatus>> {
    let config = state.config.current();
    Json(
        config
            .credentials()
            .into_iter()
            .map(|(name, configured)| CredentialStatus {
                name: name.to_owned(),
                configured,
            })
            .collect(),
    )
}

/// Write one provider credential into the env file and reload.
///
/// Only the provider keys are accepted; the value is never echoed.
#[utoipa::path(
    put,
    path = "/admin/credentials",
    tag = "admin",
    request_body = UpdateCredentialRequest,
    responses(
        (status = 200, description = "Credential stored", body = CredentialStatus),
        (status = 400, description = "Unknown key or unusable value"),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 409, description = "No env file is configured"),
    )
)]
pub async fn update_credential(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UpdateCredentialRequest>,
) -> Result<Json<CredentialStatus>, ServerError> {
    let config = Arc::clone(&state.config);
    let name = req.name.clone();
    tokio::task::spawn_blocking(move || config.set_credential(&req.name, &req.value))
        .await
        .map_err(|e| ServerError::Internal(e.to_string()))??;
    Ok(Json(CredentialStatus {
        name,
        configured: true,
    }))
}

/// Re-read the env file and process environment now.
#[utoipa::path(
    post,
    path = "/admin/config/reload",
    tag = "admin",
    responses(
        (status = 200, description = "Configuration reloaded", body = ReloadResponse),
        (status = 401, description = "Missing or wrong admin token"),
    )
)]
pub async fn reload_config(
    State(state): State<Arc<AppState>>,
) -> Result<Json<ReloadResponse>, ServerError> {
    state
        .config
        .reload()
        .map_err(|e| ServerError::Internal(e.to_string()))?;
    info!("configuration reloaded on request");
    Ok(Json(ReloadResponse { reloaded: true }))
}

/// Clear the active-task marker a failed run left on a script.
#[utoipa::path(
    post,
    path = "/admin/scripts/{id}/release",
    tag = "admin",
    params(("id" = String, Path, description = "Script id")),
    responses(
        (status = 200, description = "Marker state after release", body = ReleaseResponse),
        (status = 401, description = "Missing or wrong admin token"),
        (status = 404, description = "Script not found"),
    )
)]
pub async fn release_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ReleaseResponse>, ServerError> {
    let released = state.pipeline.release_script(&id).await?;
    Ok(Json(ReleaseResponse { released }))
}
