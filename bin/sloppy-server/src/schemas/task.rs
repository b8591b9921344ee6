use serde::{Deserialize, Serialize};
use serde_json::Value;
use sloppy_core::queue::TaskStatus;
use utoipa::ToSchema;

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateScriptRequest {
    /// Subject the two hosts will debate.
    pub topic: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct GenerateScriptResponse {
    /// Also the id of the created script.
    pub task_id: String,
    pub topic: String,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct GenerateVideoRequest {
    pub script_id: String,
    /// Narration text overriding the stored script when non-empty.
    #[serde(default)]
    pub script: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub settings: Option<Value>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UploadRequest {
    pub script_id: String,
    /// Defaults to the script's `video_file`.
    #[serde(default)]
    pub video_path: Option<String>,
    #[serde(default)]
    #[schema(value_type = Option<Object>)]
    pub metadata: Option<Value>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskAccepted {
    pub task_id: String,
    pub script_id: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskStatusResponse {
    pub task_id: String,
    /// `pending`, `started`, `success` or `failure`.
    pub status: String,
    /// `null` until the task succeeds.
    #[schema(value_type = Option<Object>)]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskStatusResponse {
    pub fn new(task_id: String, status: TaskStatus) -> Self {
        let label = status.label().to_owned();
        let (result, error) = match status {
            TaskStatus::Succeeded { output } => (serde_json::to_value(output).ok(), None),
            TaskStatus::Failed { error } => (None, Some(error)),
            TaskStatus::Pending | TaskStatus::Started => (None, None),
        };
        Self {
            task_id,
            status: label,
            result,
            error,
        }
    }
}
