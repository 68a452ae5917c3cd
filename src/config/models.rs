use crate::humanize::ByteSize;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub retention: RetentionConfig,
    #[serde(default)]
    pub scanner: ScannerConfig,
    #[serde(default)]
    pub docling: DoclingConfig,
    #[serde(default)]
    pub webhooks: WebhookConfig,
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind_addr")]
    pub bind_addr: SocketAddr,
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
    #[serde(default)]
    pub api: ApiLimits,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self { bind_addr: default_bind_addr(), data_root: default_data_root(), api: ApiLimits::default() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ApiLimits {
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: ByteSize,
    #[serde(default = "default_rate_limit_per_minute")]
    pub rate_limit_per_minute: usize,
}

impl Default for ApiLimits {
    fn default() -> Self {
        Self {
            max_upload_bytes: default_max_upload_bytes(),
            rate_limit_per_minute: default_rate_limit_per_minute(),
        }
    }
}

fn default_bind_addr() -> SocketAddr {
    "0.0.0.0:8080".parse().unwrap()
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data/docrefinery")
}

fn default_max_upload_bytes() -> ByteSize {
    ByteSize(100 * 1024 * 1024) // 100 MB
}

fn default_rate_limit_per_minute() -> usize {
    120
}

/// Secrets (the HMAC pepper used for key fingerprinting) are never loaded
/// from the TOML file, only from the environment, the same split the
/// upstream config draws for S3 credentials.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    #[serde(skip)]
    pub key_secret: String,
    #[serde(skip)]
    pub internal_token: String,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self { key_secret: String::new(), internal_token: String::new() }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RetentionConfig {
    #[serde(default = "default_document_ttl_days")]
    pub document_ttl_days: u32,
    #[serde(default = "default_artifact_ttl_days")]
    pub artifact_ttl_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self { document_ttl_days: default_document_ttl_days(), artifact_ttl_days: default_artifact_ttl_days() }
    }
}

fn default_document_ttl_days() -> u32 {
    30
}

fn default_artifact_ttl_days() -> u32 {
    90
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ScannerConfig {
    #[serde(default = "default_scanner_addr")]
    pub addr: String,
    #[serde(default = "default_scanner_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for ScannerConfig {
    fn default() -> Self {
        Self { addr: default_scanner_addr(), timeout_secs: default_scanner_timeout_secs() }
    }
}

fn default_scanner_addr() -> String {
    "127.0.0.1:3310".to_string()
}

fn default_scanner_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DoclingConfig {
    #[serde(default = "default_max_num_pages")]
    pub max_num_pages: u32,
    #[serde(default = "default_max_conversion_bytes")]
    pub max_file_size_bytes: ByteSize,
}

impl Default for DoclingConfig {
    fn default() -> Self {
        Self { max_num_pages: default_max_num_pages(), max_file_size_bytes: default_max_conversion_bytes() }
    }
}

fn default_max_num_pages() -> u32 {
    500
}

fn default_max_conversion_bytes() -> ByteSize {
    ByteSize(200 * 1024 * 1024)
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct WebhookConfig {
    #[serde(default = "default_webhook_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_webhook_initial_backoff_secs")]
    pub initial_backoff_secs: u64,
    #[serde(default)]
    pub host_allowlist: Vec<String>,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_webhook_max_attempts(),
            initial_backoff_secs: default_webhook_initial_backoff_secs(),
            host_allowlist: Vec::new(),
        }
    }
}

fn default_webhook_max_attempts() -> u32 {
    6
}

fn default_webhook_initial_backoff_secs() -> u64 {
    30
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct TelemetryConfig {
    #[serde(default = "default_metrics_addr")]
    pub metrics_addr: SocketAddr,
    pub otlp_endpoint: Option<String>,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self { metrics_addr: default_metrics_addr(), otlp_endpoint: None }
    }
}

fn default_metrics_addr() -> SocketAddr {
    "0.0.0.0:9090".parse().unwrap()
}
