use tracing::{debug, info, warn};

use super::storage::ResultStorage;
use super::types::{Job, JobError, TaskOutput, TaskStatus};
use super::Envelope;
use crate::dialogue::Dialogue;
use crate::providers::{ProviderError, Providers};

/// Pull jobs off the shared channel until every sender is gone.
pub(super) async fn run(
    worker: usize,
    rx: flume::Receiver<Envelope>,
    storage: ResultStorage,
    providers: Providers,
    min_dialogue_lines: usize,
) {
    debug!(worker, "queue worker started");
    while let Ok(Envelope { task_id, job }) = rx.recv_async().await {
        let kind = job.kind();
        storage.set_status(&task_id, TaskStatus::Started).await;
        debug!(worker, task_id = %task_id, kind = %kind, "task started");

        // Run on its own task so a panicking provider only fails this job.
        let execution = tokio::spawn(execute(job, providers.clone(), min_dialogue_lines));
        let outcome = match execution.await {
            Ok(result) => result,
            Err(join) => Err(JobError::Panicked(join.to_string())),
        };

        let status = match outcome {
            Ok(output) => {
                info!(task_id = %task_id, kind = %kind, "task succeeded");
                TaskStatus::Succeeded { output }
            }
            Err(e) => {
                warn!(task_id = %task_id, kind = %kind, error = %e, "task failed");
                TaskStatus::Failed {
                    error: e.to_string(),
                }
            }
        };
        storage.set_status(&task_id, status).await;
    }
    debug!(worker, "queue worker stopped");
}

async fn execute(
    job: Job,
    providers: Providers,
    min_dialogue_lines: usize,
) -> Result<TaskOutput, JobError> {
    match job {
        Job::GenerateScript { topic } => {
            let generated = providers.generator.generate_script(&topic).await?;
            let dialogue = Dialogue::parse(&generated.text, min_dialogue_lines)
                .map_err(|e| ProviderError::Malformed(e.to_string()))?;
            Ok(TaskOutput::GeneratedScript {
                script: dialogue.to_string(),
                cost: generated.cost,
            })
        }
        Job::GenerateVideo {
            script_id,
            script,
            settings,
        } => {
            let audio = providers.audio.synthesize_audio(&script).await?;
            debug!(script_id = %script_id, audio_url = %audio.url, "audio synthesized");
            let video = providers.video.render_video(&audio.url, &settings).await?;
            Ok(TaskOutput::ProducedVideo {
                audio_file: audio.url,
                video_file: video.path,
                video_cost: audio.cost + video.cost,
            })
        }
        Job::Upload {
            script_id,
            video_path,
            metadata,
        } => {
            let receipt = providers.publisher.publish(&video_path, &metadata).await?;
            debug!(script_id = %script_id, url = ?receipt.url, "upload finished");
            Ok(TaskOutput::UploadReceipt { url: receipt.url })
        }
    }
}
