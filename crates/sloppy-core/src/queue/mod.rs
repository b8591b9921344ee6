//! In-process task queue.
//!
//! Submissions go onto a bounded multi-consumer channel drained by a fixed
//! pool of workers. Every task has a status slot in [`ResultStorage`] that
//! callers can read directly or wait on through a [`TaskHandle`].
//!
//! ```rust,ignore
//! let queue = TaskQueue::start(providers, QueueSettings::default());
//! let handle = queue.submit(Job::GenerateScript { topic: "tides".into() })?;
//! let output = handle.wait(Some(Duration::from_secs(300))).await?;
//! ```

mod storage;
mod types;
mod worker;

use std::time::Duration;

use tokio::sync::watch;
use tracing::info;
use uuid::Uuid;

use crate::config::Config;
use crate::providers::Providers;

pub use storage::ResultStorage;
pub use types::{Job, QueueError, TaskFailure, TaskId, TaskKind, TaskOutput, TaskStatus};

pub(crate) struct Envelope {
    task_id: TaskId,
    job: Job,
}

#[derive(Debug, Clone, Copy)]
pub struct QueueSettings {
    pub workers: usize,
    pub capacity: usize,
    pub min_dialogue_lines: usize,
    /// How long a finished task's status stays readable.
    pub result_retention: Duration,
}

impl QueueSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            workers: config.queue_workers,
            capacity: config.queue_capacity,
            min_dialogue_lines: config.min_dialogue_lines,
            result_retention: config.result_ttl,
        }
    }
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

#[derive(Clone, Debug)]
pub struct TaskQueue {
    tx: flume::Sender<Envelope>,
    storage: ResultStorage,
    capacity: usize,
}

impl TaskQueue {
    /// Spawn the worker pool and return a handle for submitting work.
    ///
    /// Must be called from within a tokio runtime.
    pub fn start(providers: Providers, settings: QueueSettings) -> Self {
        let capacity = settings.capacity.max(1);
        let (tx, rx) = flume::bounded::<Envelope>(capacity);
        let storage = ResultStorage::new(settings.result_retention);

        for worker in 0..settings.workers.max(1) {
            tokio::spawn(worker::run(
                worker,
                rx.clone(),
                storage.clone(),
                providers.clone(),
                settings.min_dialogue_lines,
            ));
        }
        info!(workers = settings.workers.max(1), capacity, "task queue started");

        Self {
            tx,
            storage,
            capacity,
        }
    }

    /// Queue `job` under a freshly generated id.
    pub async fn submit(&self, job: Job) -> Result<TaskHandle, QueueError> {
        self.submit_with_id(Uuid::new_v4().to_string(), job).await
    }

    /// Queue `job` under a caller-chosen id. Returns as soon as the job is
    /// on the channel.
    pub async fn submit_with_id(
        &self,
        task_id: impl Into<TaskId>,
        job: Job,
    ) -> Result<TaskHandle, QueueError> {
        let task_id = task_id.into();
        let rx = self.storage.register(&task_id).await?;

        let envelope = Envelope {
            task_id: task_id.clone(),
            job,
        };
        if let Err(e) = self.tx.try_send(envelope) {
            self.storage.remove(&task_id).await;
            return Err(match e {
                flume::TrySendError::Full(_) => QueueError::QueueFull {
                    capacity: self.capacity,
                },
                flume::TrySendError::Disconnected(_) => QueueError::Closed,
            });
        }
        Ok(TaskHandle { task_id, rx })
    }

    pub async fn status(&self, task_id: &str) -> TaskStatus {
        self.storage.status(task_id).await
    }
}

/// Caller-side view of one submitted task.
#[derive(Debug)]
pub struct TaskHandle {
    task_id: TaskId,
    rx: watch::Receiver<TaskStatus>,
}

impl TaskHandle {
    pub fn id(&self) -> &str {
        &self.task_id
    }

    /// Wait for the task to finish, optionally bounded by `timeout`.
    pub async fn wait(mut self, timeout: Option<Duration>) -> Result<TaskOutput, TaskFailure> {
        let finished = match timeout {
            Some(limit) => {
                match tokio::time::timeout(limit, self.rx.wait_for(TaskStatus::is_terminal)).await
                {
                    Ok(result) => result.map(|status| TaskStatus::clone(&status)),
                    Err(_) => return Err(TaskFailure::Timeout(limit)),
                }
            }
            None => self
                .rx
                .wait_for(TaskStatus::is_terminal)
                .await
                .map(|status| TaskStatus::clone(&status)),
        };

        match finished.map_err(|_| TaskFailure::Lost)? {
            TaskStatus::Succeeded { output } => Ok(output),
            TaskStatus::Failed { error } => Err(TaskFailure::Failed(error)),
            TaskStatus::Pending | TaskStatus::Started => Err(TaskFailure::Lost),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use serde_json::Value;
    use tokio::sync::Notify;

    use super::*;
    use crate::providers::{
        AudioSynthesizer, GeneratedScript, ProviderError, RenderedVideo, ScriptGenerator,
        StubPublisher, SynthesizedAudio, VideoRenderer,
    };

    struct Writer {
        text: String,
    }

    #[async_trait]
    impl ScriptGenerator for Writer {
        async fn generate_script(&self, topic: &str) -> Result<GeneratedScript, ProviderError> {
            if topic == "panic" {
                panic!("agent crashed");
            }
            Ok(GeneratedScript {
                text: self.text.clone(),
                cost: 0.12,
            })
        }
    }

    /// Holds every synthesis call until released.
    struct GatedAudio(Arc<Notify>);

    #[async_trait]
    impl AudioSynthesizer for GatedAudio {
        async fn synthesize_audio(&self, _text: &str) -> Result<SynthesizedAudio, ProviderError> {
            self.0.notified().await;
            Err(ProviderError::MissingCredential("HF_TOKEN"))
        }
    }

    struct Renderer;

    #[async_trait]
    impl VideoRenderer for Renderer {
        async fn render_video(&self, _: &str, _: &Value) -> Result<RenderedVideo, ProviderError> {
            Ok(RenderedVideo {
                path: "/videos/out.mp4".into(),
                cost: 0.5,
            })
        }
    }

    fn providers(text: &str, gate: Arc<Notify>) -> Providers {
        Providers {
            generator: Arc::new(Writer {
                text: text.to_owned(),
            }),
            audio: Arc::new(GatedAudio(gate)),
            video: Arc::new(Renderer),
            publisher: Arc::new(StubPublisher),
        }
    }

    fn debate() -> String {
        (0..4)
            .map(|i| if i % 2 == 0 { "[S1] yes" } else { "[S2] no" })
            .collect::<Vec<_>>()
            .join("\n")
    }

    fn settings(workers: usize, capacity: usize) -> QueueSettings {
        QueueSettings {
            workers,
            capacity,
            min_dialogue_lines: 4,
            result_retention: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn generation_succeeds_and_status_is_recorded() {
        let queue = TaskQueue::start(providers(&debate(), Arc::new(Notify::new())), settings(2, 8));
        let handle = queue
            .submit_with_id("T1", Job::GenerateScript { topic: "tides".into() })
            .await
            .unwrap();
        assert_eq!(handle.id(), "T1");

        let output = handle.wait(Some(Duration::from_secs(5))).await.unwrap();
        assert_eq!(
            output,
            TaskOutput::GeneratedScript {
                script: debate(),
                cost: 0.12
            }
        );
        assert_eq!(queue.status("T1").await.label(), "success");
    }

    #[tokio::test]
    async fn unknown_task_reports_pending() {
        let queue = TaskQueue::start(providers("", Arc::new(Notify::new())), settings(1, 1));
        assert_eq!(queue.status("never-submitted").await, TaskStatus::Pending);
    }

    #[tokio::test]
    async fn short_dialogue_fails_as_provider_failure() {
        let queue = TaskQueue::start(
            providers("[S1] only\n[S2] two", Arc::new(Notify::new())),
            settings(1, 4),
        );
        let handle = queue
            .submit(Job::GenerateScript { topic: "x".into() })
            .await
            .unwrap();
        let err = handle.wait(None).await.unwrap_err();
        match err {
            TaskFailure::Failed(message) => {
                assert!(message.starts_with("ProviderFailure: malformed payload"), "{message}")
            }
            other => panic!("unexpected failure {other:?}"),
        }
    }

    #[tokio::test]
    async fn panicking_provider_is_contained() {
        let queue = TaskQueue::start(providers(&debate(), Arc::new(Notify::new())), settings(1, 4));
        let crashed = queue
            .submit(Job::GenerateScript { topic: "panic".into() })
            .await
            .unwrap();
        assert!(matches!(
            crashed.wait(None).await,
            Err(TaskFailure::Failed(m)) if m.contains("panicked")
        ));

        // The same worker keeps serving.
        let next = queue
            .submit(Job::GenerateScript { topic: "fine".into() })
            .await
            .unwrap();
        assert!(next.wait(Some(Duration::from_secs(5))).await.is_ok());
    }

    #[tokio::test]
    async fn wait_times_out_and_full_queue_is_reported() {
        let gate = Arc::new(Notify::new());
        let queue = TaskQueue::start(providers(&debate(), gate.clone()), settings(1, 1));
        let video = |id: &str| Job::GenerateVideo {
            script_id: id.into(),
            script: debate(),
            settings: Value::Null,
        };

        let running = queue.submit(video("a")).await.unwrap();
        let running_id = running.id().to_owned();
        // Let the single worker pick up the first job so the slot frees.
        while queue.status(&running_id).await != TaskStatus::Started {
            tokio::task::yield_now().await;
        }
        let _queued = queue.submit(video("b")).await.unwrap();
        let err = queue.submit(video("c")).await.unwrap_err();
        assert!(matches!(err, QueueError::QueueFull { capacity: 1 }));

        let err = running
            .wait(Some(Duration::from_millis(20)))
            .await
            .unwrap_err();
        assert!(matches!(err, TaskFailure::Timeout(_)));

        gate.notify_waiters();
    }

    #[tokio::test]
    async fn duplicate_ids_are_refused() {
        let queue = TaskQueue::start(providers(&debate(), Arc::new(Notify::new())), settings(1, 4));
        queue
            .submit_with_id("same", Job::GenerateScript { topic: "a".into() })
            .await
            .unwrap();
        let err = queue
            .submit_with_id("same", Job::GenerateScript { topic: "b".into() })
            .await
            .unwrap_err();
        assert!(matches!(err, QueueError::DuplicateTask(id) if id == "same"));
    }

    #[tokio::test]
    async fn finished_results_expire_to_pending() {
        let queue = TaskQueue::start(
            providers(&debate(), Arc::new(Notify::new())),
            QueueSettings {
                result_retention: Duration::from_millis(200),
                ..settings(2, 8)
            },
        );
        for i in 0..20 {
            queue
                .submit_with_id(format!("g{i}"), Job::GenerateScript { topic: "t".into() })
                .await
                .unwrap()
                .wait(Some(Duration::from_secs(5)))
                .await
                .unwrap();
        }
        assert_eq!(queue.status("g19").await.label(), "success");

        tokio::time::sleep(Duration::from_millis(300)).await;
        assert_eq!(queue.status("g0").await, TaskStatus::Pending);
        assert_eq!(queue.status("g19").await, TaskStatus::Pending);

        queue
            .submit_with_id("next", Job::GenerateScript { topic: "t".into() })
            .await
            .unwrap();
        assert_eq!(queue.storage.slot_count().await, 1);
    }
}
