use std::sync::Arc;
use std::time::Duration;

use crate::auth::ratelimit::SlidingWindowLimiter;
use crate::config::Config;
use crate::docling::ConversionEngine;
use crate::observability::Metrics;
use crate::pipeline::TaskBroker;
use crate::scanner::MalwareScanner;
use crate::storage::StorageClient;
use crate::store::DocStore;

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<DocStore>,
    pub storage: Arc<StorageClient>,
    pub broker: Arc<TaskBroker>,
    pub scanner: Arc<dyn MalwareScanner>,
    pub engine: Arc<dyn ConversionEngine>,
    pub metrics: Arc<Metrics>,
    pub rate_limiter: Arc<SlidingWindowLimiter>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: DocStore,
        storage: StorageClient,
        broker: Arc<TaskBroker>,
        scanner: Arc<dyn MalwareScanner>,
        engine: Arc<dyn ConversionEngine>,
    ) -> Self {
        let rate_limiter = SlidingWindowLimiter::new(
            config.server.api.rate_limit_per_minute,
            Duration::from_secs(60),
        );
        Self {
            config: Arc::new(config),
            store: Arc::new(store),
            storage: Arc::new(storage),
            broker,
            scanner,
            engine,
            metrics: Arc::new(Metrics::new()),
            rate_limiter: Arc::new(rate_limiter),
        }
    }
}
