pub mod broker;
pub mod export;
pub mod options;
pub mod profiles;
pub mod queue;
pub mod stage;

pub use broker::{TaskBroker, TaskEnvelope};
pub use queue::{QueueError, StageTask, TaskQueue};
pub use stage::{retry_backoff, run_stage, StageContext, StageOutcome};

use crate::domain::Stage;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};
use uuid::Uuid;

/// Drains one worker's receiver, running stages to completion and
/// re-enqueueing the next stage (or a retry of the same stage) through the
/// broker, the way the upstream Celery chain re-dispatches the next task in
/// `tasks.py`.
pub async fn run_worker(
    ctx: Arc<StageContext>,
    broker: Arc<TaskBroker>,
    mut receiver: mpsc::Receiver<TaskEnvelope>,
) {
    while let Some(envelope) = receiver.recv().await {
        let job_id = envelope.task.job_id;
        let stage = envelope.task.stage;
        info!(%job_id, ?stage, seq = envelope.seq, "running stage");

        match run_stage(&ctx, job_id, stage).await {
            StageOutcome::Advance(next) => {
                if let Err(e) = broker
                    .enqueue(StageTask { job_id, stage: next, attempt: 0 })
                    .await
                {
                    error!(%job_id, error = %e, "failed to enqueue next stage");
                }
            }
            StageOutcome::JobFinished => {
                info!(%job_id, "job finished");
            }
            StageOutcome::Retry { error_code, error_message } => {
                warn!(%job_id, ?stage, error_code, error_message, "stage failed, retrying");
                let backoff = retry_backoff(envelope.task.attempt);
                tokio::time::sleep(backoff).await;
                if let Err(e) = broker
                    .enqueue(StageTask { job_id, stage, attempt: envelope.task.attempt + 1 })
                    .await
                {
                    error!(%job_id, error = %e, "failed to re-enqueue stage for retry");
                }
            }
            StageOutcome::Terminal { error_code, error_message } => {
                warn!(%job_id, ?stage, error_code, error_message, "stage failed terminally");
            }
        }
    }
}

/// Enqueues the first stage of a freshly admitted job.
pub async fn enqueue_admission(broker: &TaskBroker, job_id: Uuid) -> Result<u64, QueueError> {
    broker
        .enqueue(StageTask { job_id, stage: Stage::Scanning, attempt: 0 })
        .await
}
