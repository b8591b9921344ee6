//! Task dispatch and status endpoints.
//!
//! Each `POST` validates the script's preconditions, claims it and queues
//! the job before answering; the outcome is applied later by the core's
//! result handler and announced on the realtime channel.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::Value;
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::task::{
    GenerateScriptRequest, GenerateScriptResponse, GenerateVideoRequest, TaskAccepted,
    TaskStatusResponse, UploadRequest,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(generate_script, generate_video, upload_tiktok, task_status),
    components(schemas(
        GenerateScriptRequest,
        GenerateScriptResponse,
        GenerateVideoRequest,
        UploadRequest,
        TaskAccepted,
        TaskStatusResponse
    ))
)]
pub struct TasksApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/tasks/generate-script", post(generate_script))
        .route("/tasks/generate-video", post(generate_video))
        .route("/tasks/upload-tiktok", post(upload_tiktok))
        .route("/tasks/{id}/status", get(task_status))
}

#[utoipa::path(
    post,
    path = "/tasks/generate-script",
    tag = "tasks",
    request_body = GenerateScriptRequest,
    responses(
        (status = 200, description = "Generation queued", body = GenerateScriptResponse),
        (status = 400, description = "Empty topic"),
        (status = 503, description = "Task queue full"),
    )
)]
pub async fn generate_script(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateScriptRequest>,
) -> Result<Json<GenerateScriptResponse>, ServerError> {
    let dispatch = state.pipeline.submit_generation(&req.topic).await?;
    info!(task_id = %dispatch.task_id, "generate-script accepted");
    Ok(Json(GenerateScriptResponse {
        task_id: dispatch.task_id,
        topic: dispatch.script.user_prompt,
    }))
}

#[utoipa::path(
    post,
    path = "/tasks/generate-video",
    tag = "tasks",
    request_body = GenerateVideoRequest,
    responses(
        (status = 200, description = "Production queued", body = TaskAccepted),
        (status = 400, description = "Script has no dialogue"),
        (status = 404, description = "Script not found"),
        (status = 409, description = "Script not GENERATED or busy"),
        (status = 503, description = "Task queue full"),
    )
)]
pub async fn generate_video(
    State(state): State<Arc<AppState>>,
    Json(req): Json<GenerateVideoRequest>,
) -> Result<Json<TaskAccepted>, ServerError> {
    let dispatch = state
        .pipeline
        .submit_production(
            &req.script_id,
            req.script.as_deref(),
            req.settings.unwrap_or(Value::Null),
        )
        .await?;
    Ok(Json(TaskAccepted {
        task_id: dispatch.task_id,
        script_id: req.script_id,
    }))
}

#[utoipa::path(
    post,
    path = "/tasks/upload-tiktok",
    tag = "tasks",
    request_body = UploadRequest,
    responses(
        (status = 200, description = "Upload queued", body = TaskAccepted),
        (status = 400, description = "No video to upload"),
        (status = 404, description = "Script not found"),
        (status = 409, description = "Script not PRODUCED or busy"),
        (status = 503, description = "Task queue full"),
    )
)]
pub async fn upload_tiktok(
    State(state): State<Arc<AppState>>,
    Json(req): Json<UploadRequest>,
) -> Result<Json<TaskAccepted>, ServerError> {
    let dispatch = state
        .pipeline
        .submit_upload(
            &req.script_id,
            req.video_path.as_deref(),
            req.metadata.unwrap_or(Value::Null),
        )
        .await?;
    Ok(Json(TaskAccepted {
        task_id: dispatch.task_id,
        script_id: req.script_id,
    }))
}

/// Unknown ids report `pending`.
#[utoipa::path(
    get,
    path = "/tasks/{id}/status",
    tag = "tasks",
    params(
        ("id" = String, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Current task status", body = TaskStatusResponse),
    )
)]
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<TaskStatusResponse> {
    let status = state.pipeline.task_status(&id).await;
    Json(TaskStatusResponse::new(id, status))
}
