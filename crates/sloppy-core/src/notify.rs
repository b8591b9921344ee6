//! Task-outcome notifications.
//!
//! [`NotificationPublisher`] is what result handlers call. It never fails:
//! transport errors are logged and dropped, since the record in the store is
//! already final by the time a notification goes out.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use strum::Display;
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum UpdateKind {
    Completed,
    Failed,
}

/// One `task_update` event.
///
/// Serialises as `{task_id, type, error?}`. `script_id` only drives room
/// addressing and is not part of the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskUpdate {
    pub task_id: String,
    #[serde(skip)]
    pub script_id: String,
    #[serde(rename = "type")]
    pub kind: UpdateKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TaskUpdate {
    pub fn completed(task_id: impl Into<String>, script_id: impl Into<String>) -> Self {
        Self {
            task_id: task_id.into(),
            script_id: script_id.into(),
            kind: UpdateKind::Completed,
            error: None,
        }
    }

    pub fn failed(
        task_id: impl Into<String>,
        script_id: impl Into<String>,
        error: impl Into<String>,
    ) -> Self {
        Self {
            task_id: task_id.into(),
            script_id: script_id.into(),
            kind: UpdateKind::Failed,
            error: Some(error.into()),
        }
    }

    /// Rooms this update is delivered to: the task's own room, plus the
    /// owning script's room when the two differ.
    pub fn rooms(&self) -> Vec<String> {
        let mut rooms = vec![room_name(&self.task_id)];
        if !self.script_id.is_empty() && self.script_id != self.task_id {
            rooms.push(room_name(&self.script_id));
        }
        rooms
    }
}

pub fn room_name(id: &str) -> String {
    format!("task_{id}")
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification channel closed")]
    Closed,

    #[error("notification transport failed: {0}")]
    Transport(String),
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn publish(&self, update: TaskUpdate) -> Result<(), NotifyError>;
}

/// In-process fan-out hub backed by a tokio broadcast channel.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    tx: broadcast::Sender<TaskUpdate>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TaskUpdate> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    async fn publish(&self, update: TaskUpdate) -> Result<(), NotifyError> {
        // No subscriber connected is not a failure.
        if let Err(broadcast::error::SendError(update)) = self.tx.send(update) {
            debug!(task_id = %update.task_id, "no realtime subscribers");
        }
        Ok(())
    }
}

/// Best-effort publisher used by result handlers.
#[derive(Clone)]
pub struct NotificationPublisher {
    notifier: Arc<dyn Notifier>,
}

impl NotificationPublisher {
    pub fn new(notifier: Arc<dyn Notifier>) -> Self {
        Self { notifier }
    }

    pub async fn publish_completed(&self, task_id: &str, script_id: &str) {
        self.send(TaskUpdate::completed(task_id, script_id)).await;
    }

    pub async fn publish_failed(&self, task_id: &str, script_id: &str, error: &str) {
        self.send(TaskUpdate::failed(task_id, script_id, error)).await;
    }

    async fn send(&self, update: TaskUpdate) {
        let task_id = update.task_id.clone();
        let kind = update.kind;
        match self.notifier.publish(update).await {
            Ok(()) => debug!(task_id = %task_id, %kind, "task update published"),
            Err(e) => warn!(task_id = %task_id, %kind, error = %e, "failed to publish task update"),
        }
    }
}

impl std::fmt::Debug for NotificationPublisher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationPublisher").finish_non_exhaustive()
    }
}
