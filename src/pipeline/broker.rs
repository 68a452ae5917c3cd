//! Round-robin task dispatch from the admission/orchestrator path to the
//! worker pool, adapted from `queue::broker::TaskBroker`: persist first,
//! distribute second, so a crashed worker never loses a stage transition.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::{mpsc, RwLock};
use tracing::{debug, warn};

use super::queue::{QueueError, StageTask, TaskQueue};

#[derive(Debug, Clone)]
pub struct TaskEnvelope {
    pub seq: u64,
    pub task: StageTask,
}

pub struct TaskBroker {
    queue: Arc<RwLock<TaskQueue>>,
    worker_channels: Vec<mpsc::Sender<TaskEnvelope>>,
    next_worker: AtomicUsize,
}

impl TaskBroker {
    pub fn new(
        queue: Arc<RwLock<TaskQueue>>,
        num_workers: usize,
        channel_size: usize,
    ) -> (Self, Vec<mpsc::Receiver<TaskEnvelope>>) {
        let mut worker_channels = Vec::with_capacity(num_workers);
        let mut worker_receivers = Vec::with_capacity(num_workers);
        for _ in 0..num_workers {
            let (tx, rx) = mpsc::channel(channel_size);
            worker_channels.push(tx);
            worker_receivers.push(rx);
        }
        (
            Self { queue, worker_channels, next_worker: AtomicUsize::new(0) },
            worker_receivers,
        )
    }

    pub async fn enqueue(&self, task: StageTask) -> Result<u64, QueueError> {
        let seq = {
            let queue = self.queue.write().await;
            queue.enqueue(&task)?
        };
        let envelope = TaskEnvelope { seq, task };
        let worker_idx = self.next_worker.fetch_add(1, Ordering::Relaxed) % self.worker_channels.len();
        if self.worker_channels[worker_idx].send(envelope).await.is_err() {
            warn!(seq, worker_idx, "worker channel closed, task remains durable in the queue");
        } else {
            debug!(seq, worker_idx, "task dispatched to worker");
        }
        Ok(seq)
    }

    pub fn num_workers(&self) -> usize {
        self.worker_channels.len()
    }

    pub fn health_check(&self) -> bool {
        self.worker_channels.iter().all(|ch| !ch.is_closed())
    }
}
