use thiserror::Error;

use crate::queue::QueueError;
use crate::script::ScriptState;
use crate::store::StoreError;

/// Errors returned by [`crate::pipeline::Pipeline`] operations.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("script {0} not found")]
    NotFound(String),

    #[error("script {id} already exists")]
    Duplicate { id: String },

    #[error("script {id} is {actual}, expected {expected}")]
    InvalidState {
        id: String,
        expected: ScriptState,
        actual: ScriptState,
    },

    #[error("script {id} cannot move from {from} to {to}")]
    IllegalTransition {
        id: String,
        from: ScriptState,
        to: ScriptState,
    },

    #[error("script {id} is busy with task {task_id}")]
    Busy { id: String, task_id: String },

    #[error("{0}")]
    InvalidInput(String),

    #[error(transparent)]
    Queue(#[from] QueueError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for PipelineError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(id) => PipelineError::NotFound(id),
            StoreError::DuplicateKey(id) => PipelineError::Duplicate { id },
            StoreError::InvalidState {
                id,
                expected,
                actual,
            } => PipelineError::InvalidState {
                id,
                expected,
                actual,
            },
            StoreError::Busy { id, active_task_id } => PipelineError::Busy {
                id,
                task_id: active_task_id,
            },
            other => PipelineError::Store(other),
        }
    }
}
