//! `GET/POST /v1/jobs*`, grounded on `documents/views.py`'s job list/cancel/
//! retry actions: filters degrade to an empty result rather than a 400 so a
//! stale filter value never surfaces as a client error.

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::authenticate;
use crate::api::state::AppState;
use crate::domain::{IngestionJob, JobStatus, Scope, Stage};
use crate::pipeline::enqueue_admission;

#[derive(Debug, Deserialize, Default)]
pub struct JobFilters {
    pub status: Option<String>,
    pub stage: Option<String>,
    pub document_id: Option<String>,
    pub external_uuid: Option<String>,
    pub comparison_id: Option<String>,
    pub created_after: Option<String>,
    pub created_before: Option<String>,
    pub updated_after: Option<String>,
}

pub async fn list_jobs(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(filters): Query<JobFilters>,
) -> Result<Json<Vec<IngestionJob>>, ApiError> {
    let key = authenticate(&state, &headers, Scope::JobsRead).await?;
    let jobs = state.store.list_jobs_for_tenant(key.tenant_id)?;

    let status = filters.status.as_deref().and_then(parse_status);
    let stage = filters.stage.as_deref().and_then(parse_stage);
    let document_id: Option<Uuid> = filters.document_id.as_deref().and_then(|s| s.parse().ok());
    let comparison_id: Option<Uuid> = filters.comparison_id.as_deref().and_then(|s| s.parse().ok());
    let external_uuid: Option<Uuid> = filters.external_uuid.as_deref().and_then(|s| s.parse().ok());

    let filtered = jobs
        .into_iter()
        .filter(|j| filters.status.is_none() || status == Some(j.status))
        .filter(|j| filters.stage.is_none() || stage == Some(j.stage))
        .filter(|j| filters.document_id.is_none() || document_id == Some(j.document_id))
        .filter(|j| filters.comparison_id.is_none() || comparison_id == j.compare_group_id)
        .filter(|j| filters.external_uuid.is_none() || external_uuid == j.external_uuid)
        .filter(|j| {
            filters
                .created_after
                .as_deref()
                .is_none_or(|bound| j.created_at.as_str() > bound)
        })
        .filter(|j| {
            filters
                .created_before
                .as_deref()
                .is_none_or(|bound| j.created_at.as_str() < bound)
        })
        .filter(|j| {
            filters
                .updated_after
                .as_deref()
                .is_none_or(|bound| j.updated_at.as_str() > bound)
        })
        .collect();

    Ok(Json(filtered))
}

fn parse_status(raw: &str) -> Option<JobStatus> {
    Some(match raw {
        "queued" => JobStatus::Queued,
        "running" => JobStatus::Running,
        "succeeded" => JobStatus::Succeeded,
        "failed" => JobStatus::Failed,
        "cancelled" => JobStatus::Cancelled,
        "quarantined" => JobStatus::Quarantined,
        _ => return None,
    })
}

fn parse_stage(raw: &str) -> Option<Stage> {
    Some(match raw {
        "scanning" => Stage::Scanning,
        "converting" => Stage::Converting,
        "exporting" => Stage::Exporting,
        "finalizing" => Stage::Finalizing,
        _ => return None,
    })
}

pub async fn get_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestionJob>, ApiError> {
    let key = authenticate(&state, &headers, Scope::JobsRead).await?;
    let job = state.store.get_job(id)?.ok_or(ApiError::NotFound)?;
    if job.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }
    Ok(Json(job))
}

pub async fn cancel_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestionJob>, ApiError> {
    let key = authenticate(&state, &headers, Scope::JobsRead).await?;
    let mut job = state.store.get_job(id)?.ok_or(ApiError::NotFound)?;
    if job.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }
    if !matches!(job.status, JobStatus::Queued | JobStatus::Running) {
        return Err(ApiError::NotCancelable);
    }
    let previous = (job.status, job.stage);
    job.cancel_requested = true;
    job.status = JobStatus::Cancelled;
    job.updated_at = crate::domain::now();
    job.finished_at = Some(job.updated_at.clone());
    state.store.put_job(&job)?;
    crate::webhooks::notify_job_updated(&state.store, &job, previous.0, previous.1).await;
    Ok(Json(job))
}

pub async fn retry_job(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Json<IngestionJob>, ApiError> {
    let key = authenticate(&state, &headers, Scope::JobsRead).await?;
    let mut job = state.store.get_job(id)?.ok_or(ApiError::NotFound)?;
    if job.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }
    if !matches!(job.status, JobStatus::Failed | JobStatus::Quarantined) {
        return Err(ApiError::NotRetryable);
    }
    if job.attempt >= job.max_attempts {
        return Err(ApiError::RetryLimit);
    }

    for artifact in state.store.list_artifacts_for_job(job.id)? {
        let _ = state.storage.delete_local(&artifact.storage_key).await;
        state.store.delete_artifact(&artifact)?;
    }

    let previous = (job.status, job.stage);
    job.status = JobStatus::Queued;
    job.stage = Stage::Scanning;
    job.attempt += 1;
    job.cancel_requested = false;
    job.error_code = None;
    job.error_message = None;
    job.error_details = None;
    job.started_at = None;
    job.finished_at = None;
    job.stage_history.clear();
    job.updated_at = crate::domain::now();
    state.store.put_job(&job)?;
    crate::webhooks::notify_job_updated(&state.store, &job, previous.0, previous.1).await;

    enqueue_admission(&state.broker, job.id)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    Ok(Json(job))
}
