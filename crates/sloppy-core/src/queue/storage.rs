use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{RwLock, watch};
use tokio::time::Instant;
use tracing::debug;

use super::types::{QueueError, TaskId, TaskStatus};

struct Slot {
    tx: watch::Sender<TaskStatus>,
    finished_at: Option<Instant>,
}

impl Slot {
    fn expired(&self, now: Instant, retention: Duration) -> bool {
        self.finished_at
            .is_some_and(|at| now.saturating_duration_since(at) >= retention)
    }
}

/// Per-task status slots shared by the queue front end and its workers.
///
/// Each slot is a `watch` channel so waiters are woken on every transition
/// instead of polling. Finished slots are kept for `retention` and then
/// evicted, after which the id reads as `Pending` like any unknown id.
#[derive(Clone)]
pub struct ResultStorage {
    inner: Arc<RwLock<HashMap<TaskId, Slot>>>,
    retention: Duration,
}

impl std::fmt::Debug for ResultStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResultStorage")
            .field("retention", &self.retention)
            .finish_non_exhaustive()
    }
}

impl ResultStorage {
    pub fn new(retention: Duration) -> Self {
        Self {
            inner: Arc::default(),
            retention,
        }
    }

    /// Insert a `Pending` slot and return a receiver observing it.
    ///
    /// Expired slots are swept first, so the map only holds live tasks and
    /// results still inside their retention window.
    pub async fn register(&self, task_id: &str) -> Result<watch::Receiver<TaskStatus>, QueueError> {
        let mut guard = self.inner.write().await;
        let now = Instant::now();
        let before = guard.len();
        guard.retain(|_, slot| !slot.expired(now, self.retention));
        if guard.len() < before {
            debug!(evicted = before - guard.len(), "expired task results evicted");
        }

        if guard.contains_key(task_id) {
            return Err(QueueError::DuplicateTask(task_id.to_owned()));
        }
        let (tx, rx) = watch::channel(TaskStatus::Pending);
        guard.insert(
            task_id.to_owned(),
            Slot {
                tx,
                finished_at: None,
            },
        );
        Ok(rx)
    }

    pub async fn remove(&self, task_id: &str) {
        self.inner.write().await.remove(task_id);
    }

    pub async fn set_status(&self, task_id: &str, status: TaskStatus) {
        let mut guard = self.inner.write().await;
        if let Some(slot) = guard.get_mut(task_id) {
            if status.is_terminal() {
                slot.finished_at = Some(Instant::now());
            }
            slot.tx.send_replace(status);
        }
    }

    /// Current status. Unknown and expired ids report `Pending`.
    pub async fn status(&self, task_id: &str) -> TaskStatus {
        let now = Instant::now();
        self.inner
            .read()
            .await
            .get(task_id)
            .filter(|slot| !slot.expired(now, self.retention))
            .map(|slot| slot.tx.borrow().clone())
            .unwrap_or(TaskStatus::Pending)
    }

    /// Number of slots currently held, expired ones included until the
    /// next sweep.
    pub async fn slot_count(&self) -> usize {
        self.inner.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::TaskOutput;

    fn done() -> TaskStatus {
        TaskStatus::Succeeded {
            output: TaskOutput::UploadReceipt { url: None },
        }
    }

    #[tokio::test]
    async fn finished_slot_expires_after_retention() {
        let storage = ResultStorage::new(Duration::from_millis(30));
        let rx = storage.register("t1").await.unwrap();
        storage.set_status("t1", done()).await;
        assert_eq!(storage.status("t1").await.label(), "success");

        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(storage.status("t1").await, TaskStatus::Pending);

        // The next registration sweeps it out of the map.
        storage.register("t2").await.unwrap();
        assert_eq!(storage.slot_count().await, 1);

        // A receiver taken before eviction still sees the final status.
        assert!(rx.borrow().is_terminal());
    }

    #[tokio::test]
    async fn running_slots_are_never_evicted() {
        let storage = ResultStorage::new(Duration::ZERO);
        storage.register("live").await.unwrap();
        storage.set_status("live", TaskStatus::Started).await;
        storage.register("other").await.unwrap();
        assert_eq!(storage.status("live").await, TaskStatus::Started);
        assert_eq!(storage.slot_count().await, 2);
    }
}
