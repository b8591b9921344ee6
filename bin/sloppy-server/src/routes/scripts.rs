//! Script repository endpoints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::get;
use axum::{Json, Router};
use sloppy_core::{Script, ScriptPatch, ScriptState, ScriptStore};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::script::{
    CreateScriptRequest, CreatedResponse, DeletedResponse, ScriptResponse, UpdateScriptRequest,
    UpdatedResponse, parse_state,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        list_scripts,
        create_script,
        get_script,
        update_script,
        delete_script,
        list_by_state,
        studio_scripts
    ),
    components(schemas(
        ScriptResponse,
        CreateScriptRequest,
        CreatedResponse,
        UpdateScriptRequest,
        UpdatedResponse,
        DeletedResponse
    ))
)]
pub struct ScriptsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/scripts", get(list_scripts).post(create_script))
        .route("/scripts/studio-scripts", get(studio_scripts))
        .route("/scripts/state/{state}", get(list_by_state))
        .route(
            "/scripts/{id}",
            get(get_script).put(update_script).delete(delete_script),
        )
}

fn to_responses(scripts: Vec<Script>) -> Json<Vec<ScriptResponse>> {
    Json(scripts.into_iter().map(ScriptResponse::from).collect())
}

#[utoipa::path(
    get,
    path = "/scripts",
    tag = "scripts",
    responses(
        (status = 200, description = "All scripts, newest first", body = [ScriptResponse]),
    )
)]
pub async fn list_scripts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScriptResponse>>, ServerError> {
    Ok(to_responses(state.store().list_all().await?))
}

#[utoipa::path(
    post,
    path = "/scripts",
    tag = "scripts",
    request_body = CreateScriptRequest,
    responses(
        (status = 200, description = "Script stored", body = CreatedResponse),
        (status = 400, description = "Missing id or prompt"),
        (status = 409, description = "Duplicate id"),
    )
)]
pub async fn create_script(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateScriptRequest>,
) -> Result<Json<CreatedResponse>, ServerError> {
    let script = Script::try_from(req)?;
    let id = state.store().create(script).await?;
    info!(script_id = %id, "script created");
    Ok(Json(CreatedResponse { id }))
}

#[utoipa::path(
    get,
    path = "/scripts/{id}",
    tag = "scripts",
    params(("id" = String, Path, description = "Script id")),
    responses(
        (status = 200, description = "Script found", body = ScriptResponse),
        (status = 404, description = "Script not found"),
    )
)]
pub async fn get_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<ScriptResponse>, ServerError> {
    let script = state
        .store()
        .get(&id)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("script {id} not found")))?;
    Ok(Json(script.into()))
}

/// Partial update; a `state` change must follow a legal edge.
#[utoipa::path(
    put,
    path = "/scripts/{id}",
    tag = "scripts",
    params(("id" = String, Path, description = "Script id")),
    request_body = UpdateScriptRequest,
    responses(
        (status = 200, description = "Whether any field changed", body = UpdatedResponse),
        (status = 400, description = "Empty body or unknown state"),
        (status = 404, description = "Script not found"),
        (status = 409, description = "Illegal state change"),
    )
)]
pub async fn update_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateScriptRequest>,
) -> Result<Json<UpdatedResponse>, ServerError> {
    let patch = ScriptPatch::try_from(req)?;
    let updated = state.pipeline.update_script(&id, &patch).await?;
    Ok(Json(UpdatedResponse { updated }))
}

#[utoipa::path(
    delete,
    path = "/scripts/{id}",
    tag = "scripts",
    params(("id" = String, Path, description = "Script id")),
    responses(
        (status = 200, description = "Script deleted", body = DeletedResponse),
        (status = 404, description = "Script not found"),
    )
)]
pub async fn delete_script(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<DeletedResponse>, ServerError> {
    if !state.store().delete(&id).await? {
        return Err(ServerError::NotFound(format!("script {id} not found")));
    }
    info!(script_id = %id, "script deleted");
    Ok(Json(DeletedResponse { deleted: true }))
}

#[utoipa::path(
    get,
    path = "/scripts/state/{state}",
    tag = "scripts",
    params(("state" = String, Path, description = "Ordinal (`2`) or name (`GENERATED`)")),
    responses(
        (status = 200, description = "Scripts in that state", body = [ScriptResponse]),
        (status = 400, description = "Unknown state"),
    )
)]
pub async fn list_by_state(
    State(state): State<Arc<AppState>>,
    Path(raw): Path<String>,
) -> Result<Json<Vec<ScriptResponse>>, ServerError> {
    let wanted = parse_state(&raw)?;
    Ok(to_responses(state.store().list_by_state(wanted).await?))
}

/// Every script that has not been uploaded yet.
#[utoipa::path(
    get,
    path = "/scripts/studio-scripts",
    tag = "scripts",
    responses(
        (status = 200, description = "Scripts still in progress", body = [ScriptResponse]),
    )
)]
pub async fn studio_scripts(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScriptResponse>>, ServerError> {
    Ok(to_responses(
        state.store().list_not_in_state(ScriptState::Uploaded).await?,
    ))
}

#[cfg(test)]
mod tests {
    use axum::http::{Method, StatusCode};
    use serde_json::json;
    use sloppy_core::config::Config;

    use crate::routes::build;
    use crate::routes::testing::call;
    use crate::state::testing::app_state;

    async fn app() -> axum::Router {
        build(app_state(Config::default()).await)
    }

    #[tokio::test]
    async fn create_get_and_duplicate() {
        let app = app().await;
        let body = json!({ "id": "R1", "user_prompt": "rivers", "state": "generated", "script": "[S1] a" });
        let (status, created) = call(&app, Method::POST, "/scripts", Some(body.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(created["id"], "R1");

        let (status, _) = call(&app, Method::POST, "/scripts", Some(body)).await;
        assert_eq!(status, StatusCode::CONFLICT);

        let (status, script) = call(&app, Method::GET, "/scripts/R1", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(script["state"], 2);
        assert_eq!(script["state_name"], "GENERATED");

        let (status, _) = call(&app, Method::GET, "/scripts/R9", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn partial_update_reports_changes() {
        let app = app().await;
        call(
            &app,
            Method::POST,
            "/scripts",
            Some(json!({ "id": "R2", "user_prompt": "p" })),
        )
        .await;

        let (status, _) = call(&app, Method::PUT, "/scripts/R2", Some(json!({}))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let patch = json!({ "tiktok_url": "https://example.test/v/1" });
        let (status, body) = call(&app, Method::PUT, "/scripts/R2", Some(patch.clone())).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], true);
        let (_, body) = call(&app, Method::PUT, "/scripts/R2", Some(patch.clone())).await;
        assert_eq!(body["updated"], false);

        let (status, _) = call(&app, Method::PUT, "/scripts/R404", Some(patch)).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn state_edits_follow_the_lifecycle() {
        let app = app().await;
        call(
            &app,
            Method::POST,
            "/scripts",
            Some(json!({ "id": "R3", "user_prompt": "p", "state": 1 })),
        )
        .await;

        let (status, _) = call(&app, Method::PUT, "/scripts/R3", Some(json!({ "state": 6 }))).await;
        assert_eq!(status, StatusCode::CONFLICT);
        let (status, body) = call(
            &app,
            Method::PUT,
            "/scripts/R3",
            Some(json!({ "state": "GENERATED" })),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["updated"], true);
    }

    #[tokio::test]
    async fn listings_by_state_and_studio() {
        let app = app().await;
        for (id, state) in [("A", 2), ("B", 4), ("C", 6)] {
            call(
                &app,
                Method::POST,
                "/scripts",
                Some(json!({ "id": id, "user_prompt": "p", "state": state })),
            )
            .await;
        }

        let (_, by_ordinal) = call(&app, Method::GET, "/scripts/state/2", None).await;
        let (_, by_name) = call(&app, Method::GET, "/scripts/state/generated", None).await;
        assert_eq!(by_ordinal, by_name);
        assert_eq!(by_name.as_array().unwrap().len(), 1);

        let (status, _) = call(&app, Method::GET, "/scripts/state/9", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let (_, studio) = call(&app, Method::GET, "/scripts/studio-scripts", None).await;
        let ids: Vec<&str> = studio
            .as_array()
            .unwrap()
            .iter()
            .map(|s| s["id"].as_str().unwrap())
            .collect();
        assert_eq!(ids.len(), 2);
        assert!(!ids.contains(&"C"));

        let (_, all) = call(&app, Method::GET, "/scripts", None).await;
        assert_eq!(all.as_array().unwrap().len(), 3);
    }

    #[tokio::test]
    async fn delete_then_missing() {
        let app = app().await;
        call(
            &app,
            Method::POST,
            "/scripts",
            Some(json!({ "id": "R4", "user_prompt": "p" })),
        )
        .await;
        let (status, body) = call(&app, Method::DELETE, "/scripts/R4", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["deleted"], true);
        let (status, _) = call(&app, Method::DELETE, "/scripts/R4", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
