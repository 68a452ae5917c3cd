use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, patch, post};
use axum::Router;
use tokio::net::TcpListener;
use tokio::sync::RwLock;
use tower_http::decompression::RequestDecompressionLayer;
use tracing::info;

use super::{artifacts, documents, internal, jobs, state::AppState, webhooks};
use crate::config::Config;
use crate::docling::MockConversionEngine;
use crate::pipeline::{TaskBroker, TaskQueue};
use crate::scanner::TcpLineScanner;
use crate::storage::StorageClient;
use crate::store::DocStore;

type AnyError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Admission-only broker: the HTTP process persists every enqueued stage
/// task into the durable queue but never drains it itself, mirroring the
/// upstream split between the Django web process and the Celery worker
/// process. A single worker channel is created and immediately dropped so
/// `TaskBroker::enqueue`'s round-robin distribution still has a modulus to
/// work with.
fn admission_broker(queue_path: &std::path::Path) -> Result<Arc<TaskBroker>, AnyError> {
    let queue = Arc::new(RwLock::new(TaskQueue::open(queue_path)?));
    let (broker, _receivers) = TaskBroker::new(queue, 1, 64);
    Ok(Arc::new(broker))
}

pub async fn run(address: SocketAddr, data_root: std::path::PathBuf) -> Result<(), AnyError> {
    info!("loading configuration");
    let config = Config::load().map_err(|e| format!("failed to load config: {e}"))?;

    let store_path = data_root.join("store");
    info!(path = %store_path.display(), "opening document store");
    let store = DocStore::open(&store_path)?;

    let storage = StorageClient::local(&data_root);

    let queue_path = data_root.join("queue");
    let broker = admission_broker(&queue_path)?;

    let scanner = Arc::new(TcpLineScanner::new(
        config.scanner.addr.clone(),
        Duration::from_secs(config.scanner.timeout_secs),
    ));
    let engine = Arc::new(MockConversionEngine);

    let state = AppState::new(config, store, storage, broker, scanner, engine);

    let webhook_client = crate::webhooks::DeliveryClient::default();
    tokio::spawn(crate::webhooks::run_delivery_worker(
        state.store.clone(),
        webhook_client,
        Duration::from_secs(15),
    ));

    let app = build_router(state);

    let listener = TcpListener::bind(address).await?;
    info!(%address, "DocRefinery API listening");

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

/// Exposed for integration tests that need a real `Router` without going
/// through [`run`]'s config loading and socket binding.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/documents", post(documents::upload_document).get(documents::list_documents))
        .route("/v1/documents/{id}", get(documents::get_document))
        .route("/v1/documents/{id}/compare", post(documents::compare_document))
        .route("/v1/jobs", get(jobs::list_jobs))
        .route("/v1/jobs/{id}", get(jobs::get_job))
        .route("/v1/jobs/{id}/cancel", post(jobs::cancel_job))
        .route("/v1/jobs/{id}/retry", post(jobs::retry_job))
        .route("/v1/artifacts", get(artifacts::list_artifacts))
        .route("/v1/artifacts/{id}", get(artifacts::get_artifact))
        .route(
            "/v1/webhooks",
            get(webhooks::list_webhooks).post(webhooks::create_webhook),
        )
        .route(
            "/v1/webhooks/{id}",
            patch(webhooks::update_webhook).delete(webhooks::delete_webhook),
        )
        .route("/healthz", get(internal::healthz))
        .route("/readyz", get(internal::readyz))
        .route("/metrics", get(internal::metrics))
        .with_state(state)
        .layer(RequestDecompressionLayer::new())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        let mut sigterm = signal(SignalKind::terminate()).expect("failed to install signal handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
