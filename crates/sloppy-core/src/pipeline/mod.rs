//! Script pipeline orchestration.
//!
//! [`Pipeline`] validates preconditions, claims the script, queues the job
//! and spawns a result handler that applies the outcome once the job
//! finishes. Result handlers share a semaphore so at most
//! `handler_concurrency` of them are applying outcomes at once.

mod handler;


use std::sync::Arc;

use serde_json::Value;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use uuid::Uuid;

use crate::config::ConfigProvider;
use crate::error::PipelineError;
use crate::lease::ActiveTaskLease;
use crate::notify::NotificationPublisher;
use crate::queue::{Job, QueueError, TaskId, TaskQueue, TaskStatus};
use crate::script::{Script, ScriptPatch, ScriptState, Transition};
use crate::store::ScriptStore;

/// A dispatched task and the handler that will apply its outcome.
#[derive(Debug)]
pub struct Dispatch {
    pub task_id: TaskId,
    /// The script as it stood right after dispatch.
    pub script: Script,
    handler: JoinHandle<()>,
}

impl Dispatch {
    /// Wait until the outcome has been written and published.
    pub async fn settled(self) {
        if let Err(e) = self.handler.await {
            warn!(task_id = %self.task_id, error = %e, "result handler aborted");
        }
    }
}

pub struct Pipeline<S: ScriptStore> {
    store: Arc<S>,
    queue: TaskQueue,
    notifier: NotificationPublisher,
    config: Arc<ConfigProvider>,
    handlers: Arc<Semaphore>,
}

impl<S: ScriptStore> Clone for Pipeline<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            queue: self.queue.clone(),
            notifier: self.notifier.clone(),
            config: Arc::clone(&self.config),
            handlers: Arc::clone(&self.handlers),
        }
    }
}

impl<S: ScriptStore> Pipeline<S> {
    pub fn new(
        store: Arc<S>,
        queue: TaskQueue,
        notifier: NotificationPublisher,
        config: Arc<ConfigProvider>,
    ) -> Self {
        let permits = config.current().handler_concurrency.max(1);
        Self {
            store,
            queue,
            notifier,
            config,
            handlers: Arc::new(Semaphore::new(permits)),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    pub async fn task_status(&self, task_id: &str) -> TaskStatus {
        self.queue.status(task_id).await
    }

    /// Create a `GENERATING` script for `topic` and queue its generation.
    ///
    /// The new script's id is the task id.
    pub async fn submit_generation(&self, topic: &str) -> Result<Dispatch, PipelineError> {
        let topic = topic.trim();
        if topic.is_empty() {
            return Err(PipelineError::InvalidInput("topic must not be empty".into()));
        }

        let task_id = Uuid::new_v4().to_string();
        let script = Script::new(&task_id, topic).with_active_task(&task_id);
        self.store.create(script.clone()).await?;
        let lease = ActiveTaskLease::adopt(Arc::clone(&self.store), &task_id, &task_id);

        let job = Job::GenerateScript {
            topic: topic.to_owned(),
        };
        let handle = match self.queue.submit_with_id(&task_id, job).await {
            Ok(handle) => handle,
            Err(e) => {
                lease.retain();
                self.discard(&task_id).await;
                return Err(e.into());
            }
        };
        info!(task_id = %task_id, topic, "script generation dispatched");

        let handler = tokio::spawn(handler::generation(self.clone(), lease, handle));
        Ok(Dispatch {
            task_id,
            script,
            handler,
        })
    }

    /// Queue audio and video production for a `GENERATED` script.
    ///
    /// `script_override`, when non-empty, replaces the stored text as the
    /// narration source.
    pub async fn submit_production(
        &self,
        script_id: &str,
        script_override: Option<&str>,
        settings: Value,
    ) -> Result<Dispatch, PipelineError> {
        let current = self.require(script_id).await?;
        expect_state(&current, ScriptState::Generated)?;
        if !current.has_script_text() {
            return Err(PipelineError::InvalidInput(format!(
                "script {script_id} has no dialogue to produce"
            )));
        }

        let narration = script_override
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_owned)
            .or(current.script)
            .unwrap_or_default();

        let task_id = Uuid::new_v4().to_string();
        let (lease, script) = ActiveTaskLease::acquire(
            Arc::clone(&self.store),
            script_id,
            Transition::BeginProduction,
            &task_id,
        )
        .await?;

        let job = Job::GenerateVideo {
            script_id: script_id.to_owned(),
            script: narration,
            settings,
        };
        let handle = match self.queue.submit_with_id(&task_id, job).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon(lease, Transition::FailProduction, &e).await;
                return Err(e.into());
            }
        };
        info!(task_id = %task_id, script_id, "video production dispatched");

        let handler = tokio::spawn(handler::production(self.clone(), lease, handle));
        Ok(Dispatch {
            task_id,
            script,
            handler,
        })
    }

    /// Queue publication of a `PRODUCED` script's video.
    ///
    /// `video_path` defaults to the script's `video_file`.
    pub async fn submit_upload(
        &self,
        script_id: &str,
        video_path: Option<&str>,
        metadata: Value,
    ) -> Result<Dispatch, PipelineError> {
        let current = self.require(script_id).await?;
        expect_state(&current, ScriptState::Produced)?;
        let video_path = video_path
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .map(str::to_owned)
            .or(current.video_file)
            .ok_or_else(|| {
                PipelineError::InvalidInput(format!("script {script_id} has no video to upload"))
            })?;

        let task_id = Uuid::new_v4().to_string();
        let (lease, script) = ActiveTaskLease::acquire(
            Arc::clone(&self.store),
            script_id,
            Transition::BeginUpload,
            &task_id,
        )
        .await?;

        let job = Job::Upload {
            script_id: script_id.to_owned(),
            video_path,
            metadata,
        };
        let handle = match self.queue.submit_with_id(&task_id, job).await {
            Ok(handle) => handle,
            Err(e) => {
                self.abandon(lease, Transition::FailUpload, &e).await;
                return Err(e.into());
            }
        };
        info!(task_id = %task_id, script_id, "upload dispatched");

        let handler = tokio::spawn(handler::upload(self.clone(), lease, handle));
        Ok(Dispatch {
            task_id,
            script,
            handler,
        })
    }

    /// Administrative partial update.
    ///
    /// A `state` change is only accepted along a legal edge from the current
    /// state and is applied conditionally on that state. Returns whether any
    /// field changed.
    pub async fn update_script(&self, id: &str, patch: &ScriptPatch) -> Result<bool, PipelineError> {
        if patch.is_empty() {
            return Err(PipelineError::InvalidInput("no fields to update".into()));
        }

        let Some(next) = patch.state else {
            let updated = self.store.update(id, patch).await?;
            if !updated && self.store.get(id).await?.is_none() {
                return Err(PipelineError::NotFound(id.to_owned()));
            }
            return Ok(updated);
        };

        let current = self.require(id).await?;
        if !current.state.can_transition_to(next) {
            return Err(PipelineError::IllegalTransition {
                id: id.to_owned(),
                from: current.state,
                to: next,
            });
        }
        Ok(self.store.update_in_state(id, current.state, patch).await?)
    }

    /// Clear the active-task marker left on a script, typically after a
    /// failed generation kept its claim. Returns whether a marker was held.
    pub async fn release_script(&self, id: &str) -> Result<bool, PipelineError> {
        let released = self.store.clear_active_task(id).await?;
        if !released {
            self.require(id).await?;
        }
        info!(script_id = id, released, "active-task marker release requested");
        Ok(released)
    }

    async fn require(&self, id: &str) -> Result<Script, PipelineError> {
        self.store
            .get(id)
            .await?
            .ok_or_else(|| PipelineError::NotFound(id.to_owned()))
    }

    /// Undo a claim whose job never made it onto the queue.
    async fn abandon(&self, lease: ActiveTaskLease<S>, revert: Transition, cause: &QueueError) {
        warn!(script_id = %lease.script_id(), error = %cause, "dispatch failed; reverting claim");
        if let Err(e) = lease.complete(revert, &ScriptPatch::default()).await {
            warn!(error = %e, "failed to revert claim after dispatch failure");
        }
    }

    async fn discard(&self, id: &str) {
        if let Err(e) = self.store.delete(id).await {
            warn!(script_id = id, error = %e, "failed to remove undispatched script");
        }
    }
}

fn expect_state(script: &Script, expected: ScriptState) -> Result<(), PipelineError> {
    if script.state == expected {
        Ok(())
    } else {
        Err(PipelineError::InvalidState {
            id: script.id.clone(),
            expected,
            actual: script.state,
        })
    }
}
