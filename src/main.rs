mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use cli::{Cli, Commands};
use docrefinery::config::Config;
use docrefinery::docling::{ConversionLimits, MockConversionEngine};
use docrefinery::domain::JobStatus;
use docrefinery::pipeline::{run_worker, StageContext, StageTask, TaskBroker, TaskQueue};
use docrefinery::scanner::TcpLineScanner;
use docrefinery::storage::StorageClient;
use docrefinery::store::{reaper, DocStore};
use tokio::sync::RwLock;
use tracing::{info, warn};

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[tokio::main]
async fn main() -> Result<(), AnyError> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve => {
            let config = Config::load().map_err(|e| format!("failed to load config: {e}"))?;
            let address = config.server.bind_addr;
            let data_root = config.server.data_root.clone();
            docrefinery::api::run(address, data_root).await?;
        }
        Commands::Worker => run_worker_pool().await?,
        Commands::Reap(args) => run_reaper(args.r#loop, args.interval_secs).await?,
    }

    Ok(())
}

/// Four worker channels: one per pipeline stage is a reasonable default
/// without a dedicated concurrency knob in config yet.
const WORKER_POOL_SIZE: usize = 4;
const WORKER_CHANNEL_CAPACITY: usize = 100;

async fn run_worker_pool() -> Result<(), AnyError> {
    let config = Config::load().map_err(|e| format!("failed to load config: {e}"))?;
    let data_root = &config.server.data_root;

    let store = Arc::new(DocStore::open(data_root.join("store"))?);
    let storage = Arc::new(StorageClient::local(data_root));

    let queue = Arc::new(RwLock::new(TaskQueue::open(data_root.join("queue"))?));
    let (broker, receivers) = TaskBroker::new(queue, WORKER_POOL_SIZE, WORKER_CHANNEL_CAPACITY);
    let broker = Arc::new(broker);

    let scanner = Arc::new(TcpLineScanner::new(
        config.scanner.addr.clone(),
        Duration::from_secs(config.scanner.timeout_secs),
    ));
    let engine = Arc::new(MockConversionEngine);
    let ctx = Arc::new(StageContext {
        store: store.clone(),
        storage,
        scanner,
        engine,
        conversion_limits: ConversionLimits {
            max_num_pages: config.docling.max_num_pages,
            max_file_size_bytes: config.docling.max_file_size_bytes.as_u64(),
        },
    });

    recover_in_flight_jobs(&store, &broker).await;

    info!(workers = WORKER_POOL_SIZE, "starting pipeline worker pool");
    let handles: Vec<_> = receivers
        .into_iter()
        .map(|rx| tokio::spawn(run_worker(ctx.clone(), broker.clone(), rx)))
        .collect();

    for handle in handles {
        handle.await?;
    }
    Ok(())
}

/// Replays jobs left in `Queued`/`Running` state into the freshly built
/// broker. The durable queue itself has no delivered/undelivered marker,
/// so recovery walks job status rather than raw queue rows — a process
/// that crashed mid-stage simply re-runs that stage from the top.
async fn recover_in_flight_jobs(store: &DocStore, broker: &TaskBroker) {
    let jobs = match store.all_jobs() {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "failed to enumerate jobs for recovery");
            return;
        }
    };
    let mut recovered = 0;
    for job in jobs {
        if matches!(job.status, JobStatus::Queued | JobStatus::Running) {
            let task = StageTask { job_id: job.id, stage: job.stage, attempt: job.attempt };
            if broker.enqueue(task).await.is_ok() {
                recovered += 1;
            }
        }
    }
    if recovered > 0 {
        info!(recovered, "requeued in-flight jobs on worker startup");
    }
}

async fn run_reaper(loop_forever: bool, interval_secs: u64) -> Result<(), AnyError> {
    let config = Config::load().map_err(|e| format!("failed to load config: {e}"))?;
    let store = DocStore::open(config.server.data_root.join("store"))?;
    let storage = StorageClient::local(&config.server.data_root);

    loop {
        let stats = reaper::reap_once(&store, &storage).await?;
        info!(?stats, "reap pass complete");
        if !loop_forever {
            break;
        }
        tokio::time::sleep(Duration::from_secs(interval_secs)).await;
    }
    Ok(())
}
