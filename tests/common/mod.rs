//! Shared harness for the integration suites: a real axum `Router` wired to
//! an isolated on-disk store/queue/blob tree, a `FakeScanner`, and the
//! deterministic `MockConversionEngine`, the same collaborators `run_stage`
//! uses in its own unit tests.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use docrefinery::auth::fingerprint::generate_key;
use docrefinery::config::{ApiLimits, AuthConfig, Config, DoclingConfig, RetentionConfig, ScannerConfig, ServerConfig, TelemetryConfig, WebhookConfig};
use docrefinery::domain::{ApiKey, Scope, Tenant};
use docrefinery::pipeline::TaskBroker;
use docrefinery::scanner::{FakeScanner, MalwareScanner};
use docrefinery::storage::StorageClient;
use docrefinery::store::DocStore;
use tempfile::TempDir;
use tokio::sync::RwLock;

pub const KEY_SECRET: &str = "test-key-secret";

pub fn test_config() -> Config {
    Config {
        server: ServerConfig {
            bind_addr: "127.0.0.1:0".parse::<SocketAddr>().unwrap(),
            data_root: std::env::temp_dir(),
            api: ApiLimits { max_upload_bytes: docrefinery::humanize::ByteSize(1024 * 1024), rate_limit_per_minute: 1000 },
        },
        auth: AuthConfig { key_secret: KEY_SECRET.to_string(), internal_token: "internal-test-token".to_string() },
        retention: RetentionConfig::default(),
        scanner: ScannerConfig::default(),
        docling: DoclingConfig::default(),
        webhooks: WebhookConfig { host_allowlist: vec!["example.com".to_string()], ..WebhookConfig::default() },
        telemetry: TelemetryConfig::default(),
    }
}

pub struct TestApp {
    pub router: Router,
    pub store: Arc<DocStore>,
    pub storage: Arc<StorageClient>,
    pub tenant: Tenant,
    /// Raw bearer secret for the default key; send as `Api-Key <raw_key>`.
    pub raw_key: String,
}

/// Builds a router with every scope granted to the default tenant's key, an
/// always-clean scanner, and the deterministic conversion engine. Good
/// enough for API-surface tests; `with_scanner` below swaps the scanner for
/// pipeline-level tests that need an infected verdict.
pub async fn build_app() -> (TestApp, TempDir) {
    build_app_with_scanner(Arc::new(FakeScanner::clean())).await
}

pub async fn build_app_with_scanner(scanner: Arc<dyn MalwareScanner>) -> (TestApp, TempDir) {
    let dir = TempDir::new().expect("tempdir");
    let config = test_config();

    let store = DocStore::open(dir.path().join("store")).expect("open store");
    let storage = StorageClient::local(dir.path().join("blobs"));

    let queue = Arc::new(RwLock::new(
        docrefinery::pipeline::TaskQueue::open(dir.path().join("queue")).expect("open queue"),
    ));
    let (broker, _receivers) = TaskBroker::new(queue, 1, 16);
    let broker = Arc::new(broker);

    let engine = Arc::new(docrefinery::docling::MockConversionEngine);

    let tenant = Tenant::new("acme", "Acme Corp");
    store.put_tenant(&tenant).expect("put tenant");

    let generated = generate_key(KEY_SECRET.as_bytes());
    let api_key = ApiKey {
        id: uuid::Uuid::new_v4(),
        tenant_id: tenant.id,
        prefix: generated.prefix,
        fingerprint: generated.fingerprint,
        scopes: vec![
            Scope::DocumentsRead,
            Scope::DocumentsWrite,
            Scope::JobsRead,
            Scope::JobsWrite,
            Scope::ArtifactsRead,
            Scope::WebhooksManage,
        ],
        allowed_upload_mime_types: docrefinery::domain::default_upload_mime_types(),
        is_active: true,
        created_at: docrefinery::domain::now(),
        last_used_at: None,
    };
    store.put_api_key(&api_key).expect("put api key");

    let state = docrefinery::api::state::AppState::new(config, store, storage, broker, scanner, engine);
    let router_state = state.clone();
    let router = docrefinery::api::build_router(router_state);

    (
        TestApp { router, store: state.store.clone(), storage: state.storage.clone(), tenant, raw_key: generated.raw },
        dir,
    )
}

/// Registers a second tenant and API key against an already-built app's
/// store, for tests that need two tenants sharing one router/store.
pub fn add_tenant_key(app: &TestApp, slug: &str) -> (Tenant, String) {
    let tenant = Tenant::new(slug, slug);
    app.store.put_tenant(&tenant).expect("put tenant");

    let generated = generate_key(KEY_SECRET.as_bytes());
    let api_key = ApiKey {
        id: uuid::Uuid::new_v4(),
        tenant_id: tenant.id,
        prefix: generated.prefix,
        fingerprint: generated.fingerprint,
        scopes: vec![
            Scope::DocumentsRead,
            Scope::DocumentsWrite,
            Scope::JobsRead,
            Scope::JobsWrite,
            Scope::ArtifactsRead,
            Scope::WebhooksManage,
        ],
        allowed_upload_mime_types: docrefinery::domain::default_upload_mime_types(),
        is_active: true,
        created_at: docrefinery::domain::now(),
        last_used_at: None,
    };
    app.store.put_api_key(&api_key).expect("put api key");
    (tenant, generated.raw)
}

pub fn auth_header(raw_key: &str) -> String {
    format!("Api-Key {raw_key}")
}

/// Minimal single-page PDF-shaped payload; `MockConversionEngine` only
/// cares about byte length, and no test here asserts real PDF structure.
pub fn sample_pdf_bytes() -> Vec<u8> {
    let mut bytes = b"%PDF-1.4\n".to_vec();
    bytes.extend(std::iter::repeat(b'A').take(8192));
    bytes
}

/// Hand-builds a `multipart/form-data` body: axum's `Multipart` extractor
/// only needs a valid boundary and part headers, so there's no need to pull
/// in a client-side multipart builder just for tests.
pub fn build_multipart_body(fields: &[(&str, &str)], file_name: &str, file_bytes: &[u8]) -> (String, Vec<u8>) {
    let boundary = "docrefinery-test-boundary".to_string();
    let mut body = Vec::new();
    for (name, value) in fields {
        body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
        body.extend_from_slice(format!("Content-Disposition: form-data; name=\"{name}\"\r\n\r\n").as_bytes());
        body.extend_from_slice(value.as_bytes());
        body.extend_from_slice(b"\r\n");
    }
    body.extend_from_slice(format!("--{boundary}\r\n").as_bytes());
    body.extend_from_slice(
        format!("Content-Disposition: form-data; name=\"file\"; filename=\"{file_name}\"\r\nContent-Type: application/pdf\r\n\r\n").as_bytes(),
    );
    body.extend_from_slice(file_bytes);
    body.extend_from_slice(b"\r\n");
    body.extend_from_slice(format!("--{boundary}--\r\n").as_bytes());
    (boundary, body)
}
