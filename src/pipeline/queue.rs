//! Embedded durable task queue, generalized from the upstream
//! `queue::store::FjallQueue` (which persisted a protobuf `DownloadTask`
//! per resource download) to persist one [`StageTask`] per pipeline stage
//! transition. Task envelopes are JSON rather than protobuf: nothing in
//! this workspace crosses a process or language boundary, so there is no
//! wire-format need `serde_json` doesn't already cover for the store.

use fjall::{Config, Keyspace, PartitionCreateOptions, PartitionHandle};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use uuid::Uuid;

use crate::domain::Stage;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("Fjall error: {0}")]
    Fjall(#[from] fjall::Error),
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("task not found: seq={0}")]
    TaskNotFound(u64),
}

pub type Result<T> = std::result::Result<T, QueueError>;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTask {
    pub job_id: Uuid,
    pub stage: Stage,
    pub attempt: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeadLetterTask {
    pub task: StageTask,
    pub failure_code: String,
    pub failure_message: String,
}

pub struct TaskQueue {
    keyspace: Keyspace,
    tasks: PartitionHandle,
    metadata: PartitionHandle,
    dlq: PartitionHandle,
    seq_counter: Arc<AtomicU64>,
}

impl TaskQueue {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        info!(path = %path.as_ref().display(), "opening pipeline task queue");
        let keyspace = Config::new(path).open()?;
        let tasks = keyspace.open_partition("tasks", PartitionCreateOptions::default())?;
        let metadata = keyspace.open_partition("metadata", PartitionCreateOptions::default())?;
        let dlq = keyspace.open_partition("dlq", PartitionCreateOptions::default())?;

        let current_seq = metadata
            .get(b"next_seq")?
            .map(|bytes| u64::from_be_bytes(bytes.as_ref().try_into().unwrap_or([0u8; 8])))
            .unwrap_or(0);

        Ok(Self {
            keyspace,
            tasks,
            metadata,
            dlq,
            seq_counter: Arc::new(AtomicU64::new(current_seq)),
        })
    }

    pub fn enqueue(&self, task: &StageTask) -> Result<u64> {
        let seq = self.seq_counter.fetch_add(1, Ordering::SeqCst);
        self.tasks.insert(seq.to_be_bytes(), serde_json::to_vec(task)?)?;
        self.metadata.insert(b"next_seq", (seq + 1).to_be_bytes())?;
        debug!(seq, job_id = %task.job_id, stage = ?task.stage, "task enqueued");
        Ok(seq)
    }

    pub fn get_task(&self, seq: u64) -> Result<Option<StageTask>> {
        match self.tasks.get(seq.to_be_bytes())? {
            Some(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn move_to_dlq(&self, seq: u64, failure_code: String, failure_message: String) -> Result<()> {
        let task = self.get_task(seq)?.ok_or(QueueError::TaskNotFound(seq))?;
        let entry = DeadLetterTask { task, failure_code, failure_message };
        self.dlq.insert(seq.to_be_bytes(), serde_json::to_vec(&entry)?)?;
        Ok(())
    }

    pub fn current_seq(&self) -> u64 {
        self.seq_counter.load(Ordering::SeqCst)
    }

    pub fn flush(&self) -> Result<()> {
        self.keyspace.persist(fjall::PersistMode::SyncAll)?;
        Ok(())
    }

    pub fn health_check(&self) -> Result<()> {
        let _ = self.metadata.get(b"next_seq")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn task() -> StageTask {
        StageTask { job_id: Uuid::new_v4(), stage: Stage::Scanning, attempt: 1 }
    }

    #[test]
    fn enqueue_assigns_sequential_ids() {
        let dir = TempDir::new().unwrap();
        let queue = TaskQueue::open(dir.path()).unwrap();
        assert_eq!(queue.enqueue(&task()).unwrap(), 0);
        assert_eq!(queue.enqueue(&task()).unwrap(), 1);
    }

    #[test]
    fn dlq_entries_retain_the_original_task() {
        let dir = TempDir::new().unwrap();
        let queue = TaskQueue::open(dir.path()).unwrap();
        let t = task();
        let seq = queue.enqueue(&t).unwrap();
        queue
            .move_to_dlq(seq, "SCAN_TIMEOUT".into(), "scanner unreachable".into())
            .unwrap();
        let entry = queue.dlq.get(seq.to_be_bytes()).unwrap().unwrap();
        let dlq: DeadLetterTask = serde_json::from_slice(&entry).unwrap();
        assert_eq!(dlq.task.job_id, t.job_id);
        assert_eq!(dlq.failure_code, "SCAN_TIMEOUT");
    }

    #[test]
    fn sequence_survives_reopen() {
        let dir = TempDir::new().unwrap();
        {
            let queue = TaskQueue::open(dir.path()).unwrap();
            queue.enqueue(&task()).unwrap();
        }
        let queue = TaskQueue::open(dir.path()).unwrap();
        assert_eq!(queue.current_seq(), 1);
    }
}
