use std::time::Duration;

use serde::Serialize;
use serde_json::Value;
use strum::{AsRefStr, Display};
use thiserror::Error;

use crate::providers::ProviderError;

/// Identifier of a queued unit of work.
pub type TaskId = String;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr)]
#[strum(serialize_all = "kebab-case")]
pub enum TaskKind {
    GenerateScript,
    GenerateVideo,
    Upload,
}

/// A unit of work and its arguments.
#[derive(Debug, Clone, PartialEq)]
pub enum Job {
    GenerateScript {
        topic: String,
    },
    GenerateVideo {
        script_id: String,
        script: String,
        settings: Value,
    },
    Upload {
        script_id: String,
        video_path: String,
        metadata: Value,
    },
}

impl Job {
    pub fn kind(&self) -> TaskKind {
        match self {
            Job::GenerateScript { .. } => TaskKind::GenerateScript,
            Job::GenerateVideo { .. } => TaskKind::GenerateVideo,
            Job::Upload { .. } => TaskKind::Upload,
        }
    }
}

/// Result payload of a successful job.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum TaskOutput {
    GeneratedScript {
        script: String,
        cost: f64,
    },
    ProducedVideo {
        audio_file: String,
        video_file: String,
        video_cost: f64,
    },
    UploadReceipt {
        url: Option<String>,
    },
}

/// Lifecycle of a queued task as seen by the result store.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskStatus {
    /// Accepted but not yet picked up, or not known to this queue.
    Pending,
    Started,
    Succeeded { output: TaskOutput },
    Failed { error: String },
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Succeeded { .. } | TaskStatus::Failed { .. })
    }

    /// Wire name: `pending`, `started`, `success` or `failure`.
    pub fn label(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Started => "started",
            TaskStatus::Succeeded { .. } => "success",
            TaskStatus::Failed { .. } => "failure",
        }
    }
}

#[derive(Debug, Clone, Error)]
pub enum QueueError {
    #[error("task queue full (capacity {capacity})")]
    QueueFull { capacity: usize },

    #[error("task queue is shut down")]
    Closed,

    #[error("task {0} already submitted")]
    DuplicateTask(TaskId),
}

/// Why waiting on a task did not yield an output.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TaskFailure {
    #[error("{0}")]
    Failed(String),

    #[error("Timeout: task did not finish within {}s", .0.as_secs())]
    Timeout(Duration),

    #[error("task result was lost")]
    Lost,
}

/// Error raised inside a worker while running a job.
#[derive(Debug, Error)]
pub(crate) enum JobError {
    #[error("ProviderFailure: {0}")]
    Provider(#[from] ProviderError),

    #[error("ProviderFailure: worker panicked: {0}")]
    Panicked(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_labels_and_terminality() {
        assert_eq!(TaskStatus::Pending.label(), "pending");
        assert!(!TaskStatus::Started.is_terminal());
        let failed = TaskStatus::Failed { error: "x".into() };
        assert_eq!(failed.label(), "failure");
        assert!(failed.is_terminal());
    }

    #[test]
    fn outputs_serialize_flat() {
        let output = TaskOutput::GeneratedScript {
            script: "[S1] a".into(),
            cost: 0.12,
        };
        assert_eq!(
            serde_json::to_value(&output).unwrap(),
            json!({ "script": "[S1] a", "cost": 0.12 })
        );
    }

    #[test]
    fn provider_errors_are_prefixed() {
        let err = JobError::from(ProviderError::MissingCredential("HF_TOKEN"));
        assert_eq!(err.to_string(), "ProviderFailure: HF_TOKEN missing");
        assert_eq!(TaskKind::GenerateVideo.to_string(), "generate-video");
    }
}
