//! Result handlers: one per dispatched task.
//!
//! Each waits for its task, writes the outcome through the lease and then
//! publishes. The notification always goes out after the write and its
//! failure never undoes the write.

use tracing::{error, info, warn};

use super::Pipeline;
use crate::lease::ActiveTaskLease;
use crate::queue::{TaskFailure, TaskHandle, TaskOutput};
use crate::script::{ScriptPatch, Transition};
use crate::store::ScriptStore;

pub(super) async fn generation<S: ScriptStore>(
    pipeline: Pipeline<S>,
    lease: ActiveTaskLease<S>,
    handle: TaskHandle,
) {
    let Ok(_permit) = pipeline.handlers.clone().acquire_owned().await else {
        return;
    };
    let task_id = handle.id().to_owned();
    let script_id = lease.script_id().to_owned();
    let config = pipeline.config.current();

    let failure = match handle.wait(Some(config.generation_timeout)).await {
        Ok(TaskOutput::GeneratedScript { script, cost }) => {
            let patch = ScriptPatch::generated(script, cost);
            match lease.complete(Transition::FinishGeneration, &patch).await {
                Ok(_) => {
                    info!(task_id = %task_id, cost, "script generated");
                    pipeline.notifier.publish_completed(&task_id, &script_id).await;
                    return;
                }
                Err(e) => {
                    error!(task_id = %task_id, error = %e, "failed to store generated script");
                    pipeline
                        .notifier
                        .publish_failed(&task_id, &script_id, &e.to_string())
                        .await;
                    return;
                }
            }
        }
        Ok(other) => TaskFailure::Failed(format!("unexpected generation output: {other:?}")),
        Err(failure) => failure,
    };

    // The record stays GENERATING with no text.
    warn!(task_id = %task_id, error = %failure, "script generation failed");
    if config.release_guard_on_generation_failure {
        if let Err(e) = lease.release().await {
            error!(task_id = %task_id, error = %e, "failed to release generation marker");
        }
    } else {
        lease.retain();
    }
    pipeline
        .notifier
        .publish_failed(&task_id, &script_id, &failure.to_string())
        .await;
}

pub(super) async fn production<S: ScriptStore>(
    pipeline: Pipeline<S>,
    lease: ActiveTaskLease<S>,
    handle: TaskHandle,
) {
    let Ok(_permit) = pipeline.handlers.clone().acquire_owned().await else {
        return;
    };
    let task_id = handle.id().to_owned();
    let script_id = lease.script_id().to_owned();

    let outcome = match handle.wait(None).await {
        Ok(TaskOutput::ProducedVideo {
            audio_file,
            video_file,
            video_cost,
        }) => Ok(ScriptPatch::produced(audio_file, video_file, video_cost)),
        Ok(other) => Err(TaskFailure::Failed(format!(
            "unexpected production output: {other:?}"
        ))),
        Err(failure) => Err(failure),
    };

    finish(
        &pipeline,
        lease,
        &task_id,
        &script_id,
        outcome,
        Transition::FinishProduction,
        Transition::FailProduction,
    )
    .await;
}

pub(super) async fn upload<S: ScriptStore>(
    pipeline: Pipeline<S>,
    lease: ActiveTaskLease<S>,
    handle: TaskHandle,
) {
    let Ok(_permit) = pipeline.handlers.clone().acquire_owned().await else {
        return;
    };
    let task_id = handle.id().to_owned();
    let script_id = lease.script_id().to_owned();

    let outcome = match handle.wait(None).await {
        Ok(TaskOutput::UploadReceipt { url }) => Ok(ScriptPatch::uploaded(url)),
        Ok(other) => Err(TaskFailure::Failed(format!(
            "unexpected upload output: {other:?}"
        ))),
        Err(failure) => Err(failure),
    };

    finish(
        &pipeline,
        lease,
        &task_id,
        &script_id,
        outcome,
        Transition::FinishUpload,
        Transition::FailUpload,
    )
    .await;
}

/// Apply `on_success` with the patch, or `on_failure` (a one-stage revert),
/// then publish.
async fn finish<S: ScriptStore>(
    pipeline: &Pipeline<S>,
    lease: ActiveTaskLease<S>,
    task_id: &str,
    script_id: &str,
    outcome: Result<ScriptPatch, TaskFailure>,
    on_success: Transition,
    on_failure: Transition,
) {
    match outcome {
        Ok(patch) => match lease.complete(on_success, &patch).await {
            Ok(script) => {
                info!(task_id, script_id, state = %script.state, "task completed");
                pipeline.notifier.publish_completed(task_id, script_id).await;
            }
            Err(e) => {
                error!(task_id, script_id, error = %e, "failed to store task result");
                pipeline
                    .notifier
                    .publish_failed(task_id, script_id, &e.to_string())
                    .await;
            }
        },
        Err(failure) => {
            warn!(task_id, script_id, error = %failure, "task failed; reverting");
            match lease.complete(on_failure, &ScriptPatch::default()).await {
                Ok(script) => info!(task_id, script_id, state = %script.state, "script reverted"),
                Err(e) => error!(task_id, script_id, error = %e, "failed to revert script"),
            }
            pipeline
                .notifier
                .publish_failed(task_id, script_id, &failure.to_string())
                .await;
        }
    }
}
