//! `POST/GET /v1/documents`, grounded on `original_source/documents/views.py`'s
//! upload action: streamed hashing into quarantine, duplicate-by-sha256
//! rejection, and profile-merged ingestion enrollment.

use axum::extract::{Multipart, Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::authenticate;
use crate::api::state::AppState;
use crate::domain::{Document, DocumentStatus, IngestionJob, JobStatus, Scope, Stage};
use crate::pipeline::{enqueue_admission, options::merge_options};
use crate::storage::{StreamWriteError, StreamingWriter};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

#[derive(Debug, Serialize)]
pub struct DocumentResponse {
    #[serde(flatten)]
    pub document: Document,
    pub job_id: Option<Uuid>,
}

pub async fn upload_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Result<Json<DocumentResponse>, ApiError> {
    let key = authenticate(&state, &headers, Scope::DocumentsWrite).await?;

    let mut file_bytes_field = None;
    let mut ingest = false;
    let mut options_json = Value::Object(Default::default());
    let mut profile: Option<String> = None;
    let mut declared_mime = "application/pdf".to_string();
    let mut original_filename = "upload.pdf".to_string();
    let mut external_uuid: Option<Uuid> = None;

    while let Some(field) = multipart.next_field().await.map_err(|e| ApiError::BadRequest(e.to_string()))? {
        match field.name().unwrap_or("") {
            "file" => {
                declared_mime = field.content_type().unwrap_or("application/pdf").to_string();
                original_filename = field.file_name().unwrap_or("upload.pdf").to_string();
                file_bytes_field = Some(field);
            }
            "ingest" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                ingest = text == "true" || text == "1";
            }
            "options_json" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                options_json = serde_json::from_str(&text)
                    .map_err(|e| ApiError::InvalidOptions(e.to_string()))?;
            }
            "profile" => {
                profile = Some(field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?);
            }
            "external_uuid" => {
                let text = field.text().await.map_err(|e| ApiError::BadRequest(e.to_string()))?;
                external_uuid = Some(
                    text.parse()
                        .map_err(|_| ApiError::BadRequest("external_uuid must be a uuid".into()))?,
                );
            }
            _ => {}
        }
    }

    let field = file_bytes_field.ok_or_else(|| ApiError::BadRequest("missing file part".into()))?;

    if !key.allowed_upload_mime_types.iter().any(|m| m == &declared_mime) {
        return Err(ApiError::UnsupportedMediaType(declared_mime));
    }

    let doc_id = Uuid::new_v4();
    let max_bytes = state.config.server.api.max_upload_bytes.as_u64();
    let storage_key = format!("quarantine/{}/{}.pdf", key.tenant_id, doc_id);
    let final_path = state.storage.local_path(&storage_key);

    let mut writer = StreamingWriter::create(final_path, max_bytes)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let mut field = field;
    loop {
        let chunk = match field.chunk().await {
            Ok(Some(c)) => c,
            Ok(None) => break,
            Err(e) => {
                writer.abort().await;
                return Err(ApiError::BadRequest(e.to_string()));
            }
        };
        if let Err(e) = writer.write_chunk(&chunk).await {
            writer.abort().await;
            return match e {
                StreamWriteError::TooLarge(limit) => Err(ApiError::FileTooLarge(limit)),
                StreamWriteError::Io(io) => Err(ApiError::Internal(io.to_string())),
            };
        }
    }

    let (sha256, size_bytes) = writer.finish().await.map_err(|e| ApiError::Internal(e.to_string()))?;

    if let Some(_existing) = state.store.find_document_by_sha256(key.tenant_id, &sha256)? {
        let _ = state.storage.delete_local(&storage_key).await;
        return Err(ApiError::DuplicateDocument);
    }

    let document = Document {
        id: doc_id,
        tenant_id: key.tenant_id,
        original_filename,
        mime_type: declared_mime,
        size_bytes,
        sha256,
        status: DocumentStatus::Uploaded,
        storage_key,
        created_at: crate::domain::now(),
        expires_at: None,
    };

    if let Err(e) = state.store.put_document(&document) {
        let _ = state.storage.delete_local(&document.storage_key).await;
        return Err(ApiError::Internal(e.to_string()));
    }

    let mut job_id = None;
    if ingest {
        match enroll_job(&state, &document, profile.as_deref(), &options_json, external_uuid).await {
            Ok(id) => job_id = Some(id),
            Err(e) => {
                let _ = state.storage.delete_local(&document.storage_key).await;
                let _ = state.store.delete_document(&document);
                return Err(e);
            }
        }
    }

    state.metrics.job_accepted();
    Ok(Json(DocumentResponse { document, job_id }))
}

async fn enroll_job(
    state: &AppState,
    document: &Document,
    profile: Option<&str>,
    caller_options: &Value,
    external_uuid: Option<Uuid>,
) -> Result<Uuid, ApiError> {
    let system_default = serde_json::json!({});
    let tenant_default = serde_json::json!({});
    let key_default = serde_json::json!({});
    let merged = merge_options(&system_default, &tenant_default, &key_default, caller_options, profile);
    validate_options_schema(&merged)?;

    let now = crate::domain::now();
    let job = IngestionJob {
        id: Uuid::new_v4(),
        tenant_id: document.tenant_id,
        document_id: document.id,
        status: JobStatus::Queued,
        stage: Stage::Scanning,
        profile: profile.unwrap_or("fast_text").to_string(),
        options: merged,
        attempt: 0,
        max_attempts: DEFAULT_MAX_ATTEMPTS,
        compare_group_id: None,
        external_uuid,
        stage_history: Vec::new(),
        error_code: None,
        error_message: None,
        error_details: None,
        queued_at: now.clone(),
        started_at: None,
        finished_at: None,
        created_at: now.clone(),
        updated_at: now,
        cancel_requested: false,
    };
    state.store.put_job(&job)?;
    enqueue_admission(&state.broker, job.id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;
    state.metrics.task_published();
    Ok(job.id)
}

/// Options schema from spec.md §6: `max_num_pages`/`max_file_size`
/// non-negative integers, `exports` a list of non-json artifact kinds,
/// `ocr` a bool, `ocr_languages` a list of strings.
fn validate_options_schema(options: &Value) -> Result<(), ApiError> {
    let Value::Object(map) = options else {
        return Err(ApiError::InvalidOptions("options must be an object".into()));
    };
    if let Some(v) = map.get("max_num_pages") {
        if !v.is_u64() {
            return Err(ApiError::InvalidOptions("max_num_pages must be a non-negative integer".into()));
        }
    }
    if let Some(v) = map.get("max_file_size") {
        if !v.is_u64() {
            return Err(ApiError::InvalidOptions("max_file_size must be a non-negative integer".into()));
        }
    }
    if let Some(v) = map.get("exports") {
        let Value::Array(items) = v else {
            return Err(ApiError::InvalidOptions("exports must be a list".into()));
        };
        for item in items {
            let Some(name) = item.as_str() else {
                return Err(ApiError::InvalidOptions("exports entries must be strings".into()));
            };
            if name == "docling_json" || parse_artifact_kind(name).is_none() {
                return Err(ApiError::InvalidOptions(format!("unknown export kind '{name}'")));
            }
        }
    }
    if let Some(v) = map.get("ocr") {
        if !v.is_boolean() {
            return Err(ApiError::InvalidOptions("ocr must be a boolean".into()));
        }
    }
    if let Some(v) = map.get("ocr_languages") {
        let Value::Array(items) = v else {
            return Err(ApiError::InvalidOptions("ocr_languages must be a list".into()));
        };
        if !items.iter().all(|i| i.is_string()) {
            return Err(ApiError::InvalidOptions("ocr_languages entries must be strings".into()));
        }
    }
    Ok(())
}

fn parse_artifact_kind(name: &str) -> Option<crate::domain::ArtifactKind> {
    use crate::domain::ArtifactKind::*;
    Some(match name {
        "markdown" => Markdown,
        "text" => Text,
        "doctags" => Doctags,
        "chunks_json" => ChunksJson,
        "figures_zip" => FiguresZip,
        _ => return None,
    })
}

pub async fn list_documents(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Document>>, ApiError> {
    let key = authenticate(&state, &headers, Scope::DocumentsRead).await?;
    Ok(Json(state.store.list_documents_for_tenant(key.tenant_id)?))
}

pub async fn get_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<Document>, ApiError> {
    let key = authenticate(&state, &headers, Scope::DocumentsRead).await?;
    let document = state.store.get_document(id)?.ok_or(ApiError::NotFound)?;
    if document.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }
    Ok(Json(document))
}

#[derive(Debug, Deserialize)]
pub struct CompareRequest {
    pub profiles: Vec<String>,
    #[serde(default)]
    pub options_json: Value,
}

#[derive(Debug, Serialize)]
pub struct CompareResponse {
    pub comparison_id: Uuid,
    pub job_ids: Vec<Uuid>,
}

pub async fn compare_document(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<CompareRequest>,
) -> Result<Json<CompareResponse>, ApiError> {
    let key = authenticate(&state, &headers, Scope::DocumentsWrite).await?;
    let document = state.store.get_document(id)?.ok_or(ApiError::NotFound)?;
    if document.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }

    if !state.storage.exists(&document.storage_key).await.unwrap_or(false) {
        return Err(ApiError::MissingSourceFile);
    }

    let comparison_id = Uuid::new_v4();
    let mut job_ids = Vec::with_capacity(request.profiles.len());
    for profile in &request.profiles {
        let merged = merge_options(
            &serde_json::json!({}),
            &serde_json::json!({}),
            &serde_json::json!({}),
            &request.options_json,
            Some(profile.as_str()),
        );
        validate_options_schema(&merged)?;

        let now = crate::domain::now();
        let job = IngestionJob {
            id: Uuid::new_v4(),
            tenant_id: document.tenant_id,
            document_id: document.id,
            status: JobStatus::Queued,
            stage: Stage::Scanning,
            profile: profile.clone(),
            options: merged,
            attempt: 0,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            compare_group_id: Some(comparison_id),
            external_uuid: None,
            stage_history: Vec::new(),
            error_code: None,
            error_message: None,
            error_details: None,
            queued_at: now.clone(),
            started_at: None,
            finished_at: None,
            created_at: now.clone(),
            updated_at: now,
            cancel_requested: false,
        };
        state.store.put_job(&job)?;
        enqueue_admission(&state.broker, job.id)
            .await
            .map_err(|e| ApiError::Internal(e.to_string()))?;
        job_ids.push(job.id);
    }

    Ok(Json(CompareResponse { comparison_id, job_ids }))
}
