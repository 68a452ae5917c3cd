//! Core record types shared by the store, the pipeline, and the API layer.
//!
//! Field names and lifecycle states mirror `documents/models.py` and
//! `authn/models.py` in the system this crate replaces: `Tenant`, `ApiKey`,
//! `Document`, `IngestionJob`, `Artifact`, `WebhookEndpoint`, and
//! `WebhookDelivery`.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

fn now_rfc3339() -> String {
    time::OffsetDateTime::now_utc()
        .format(&time::format_description::well_known::Rfc3339)
        .expect("Rfc3339 formatting never fails for a valid OffsetDateTime")
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: Uuid,
    pub slug: String,
    pub display_name: String,
    pub is_active: bool,
    pub created_at: String,
}

impl Tenant {
    pub fn new(slug: impl Into<String>, display_name: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            slug: slug.into(),
            display_name: display_name.into(),
            is_active: true,
            created_at: now_rfc3339(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApiKey {
    pub id: Uuid,
    pub tenant_id: Uuid,
    /// First 8 characters of the raw key, kept for operator-facing display only.
    pub prefix: String,
    /// `hex(hmac_sha256(server_secret, raw_key))`, never the raw key itself.
    pub fingerprint: String,
    pub scopes: Vec<Scope>,
    #[serde(default = "default_upload_mime_types")]
    pub allowed_upload_mime_types: Vec<String>,
    pub is_active: bool,
    pub created_at: String,
    pub last_used_at: Option<String>,
}

pub fn default_upload_mime_types() -> Vec<String> {
    vec![
        "application/pdf".to_string(),
        "application/x-pdf".to_string(),
    ]
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    DocumentsRead,
    DocumentsWrite,
    JobsRead,
    JobsWrite,
    ArtifactsRead,
    WebhooksManage,
    Internal,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentStatus {
    Uploaded,
    Clean,
    Infected,
    Deleted,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Document {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub original_filename: String,
    pub mime_type: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub status: DocumentStatus,
    pub storage_key: String,
    pub created_at: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
    Quarantined,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Succeeded => "succeeded",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Quarantined => "quarantined",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Scanning,
    Converting,
    Exporting,
    Finalizing,
}

impl Stage {
    pub fn next(self) -> Option<Stage> {
        match self {
            Stage::Scanning => Some(Stage::Converting),
            Stage::Converting => Some(Stage::Exporting),
            Stage::Exporting => Some(Stage::Finalizing),
            Stage::Finalizing => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Scanning => "scanning",
            Stage::Converting => "converting",
            Stage::Exporting => "exporting",
            Stage::Finalizing => "finalizing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageTiming {
    pub stage: Stage,
    pub started_at: String,
    pub finished_at: Option<String>,
    pub error_code: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionJob {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub document_id: Uuid,
    pub status: JobStatus,
    pub stage: Stage,
    pub profile: String,
    pub options: serde_json::Value,
    pub attempt: u32,
    pub max_attempts: u32,
    pub compare_group_id: Option<Uuid>,
    /// Caller-supplied correlation id, echoed back on job list filters and
    /// the webhook payload; has no uniqueness constraint of its own.
    pub external_uuid: Option<Uuid>,
    pub stage_history: Vec<StageTiming>,
    pub error_code: Option<String>,
    pub error_message: Option<String>,
    #[serde(default)]
    pub error_details: Option<serde_json::Value>,
    /// Equal to `created_at` today; kept distinct because admission and
    /// enqueueing could diverge once the broker gains backpressure.
    pub queued_at: String,
    pub started_at: Option<String>,
    pub finished_at: Option<String>,
    pub created_at: String,
    pub updated_at: String,
    pub cancel_requested: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ArtifactKind {
    DoclingJson,
    Markdown,
    Text,
    Doctags,
    ChunksJson,
    FiguresZip,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artifact {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub job_id: Uuid,
    pub kind: ArtifactKind,
    pub storage_key: String,
    pub size_bytes: u64,
    pub sha256: String,
    pub created_at: String,
    pub expires_at: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookEndpoint {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub url: String,
    pub secret: String,
    pub subscribed_events: Vec<String>,
    pub is_enabled: bool,
    pub created_at: String,
    #[serde(default)]
    pub last_success_at: Option<String>,
    #[serde(default)]
    pub last_failure_at: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeliveryStatus {
    Pending,
    Retrying,
    Delivered,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookDelivery {
    pub id: Uuid,
    pub tenant_id: Uuid,
    pub endpoint_id: Uuid,
    pub job_id: Uuid,
    pub event: String,
    pub payload: serde_json::Value,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub next_attempt_at: String,
    pub last_response_code: Option<u16>,
    pub last_error: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Headers accepted on resource-style requests; kept as a `BTreeMap` the way
/// the admission handler needs a deterministic iteration order for logging.
pub type HeaderMap = BTreeMap<String, String>;

pub fn now() -> String {
    now_rfc3339()
}
