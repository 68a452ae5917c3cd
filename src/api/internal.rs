//! Operator surface: `/healthz`, `/readyz`, `/metrics`. Gated by
//! `X-Internal-Token` rather than an API key, grounded on `core/views.py`'s
//! split between liveness and dependency readiness.

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use serde_json::json;

use crate::api::state::AppState;
use crate::auth::{check_internal_token, INTERNAL_TOKEN_HEADER};
use crate::domain::JobStatus;
use crate::observability::{ComponentHealth, ReadinessReport};

fn authorize(state: &AppState, headers: &HeaderMap) -> Result<(), StatusCode> {
    let token = headers
        .get(INTERNAL_TOKEN_HEADER)
        .and_then(|v| v.to_str().ok());
    if check_internal_token(token, &state.config.auth.internal_token) {
        Ok(())
    } else {
        Err(StatusCode::UNAUTHORIZED)
    }
}

pub async fn healthz(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, StatusCode> {
    authorize(&state, &headers)?;
    Ok(Json(json!({ "status": "up" })))
}

pub async fn readyz(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<(StatusCode, Json<serde_json::Value>), StatusCode> {
    authorize(&state, &headers)?;

    let store_health = match state.store.all_documents() {
        Ok(_) => ComponentHealth::Up,
        Err(e) => ComponentHealth::Down(e.to_string()),
    };
    let queue_health = if state.broker.health_check() {
        ComponentHealth::Up
    } else {
        ComponentHealth::Down("worker channel closed".to_string())
    };

    let report = ReadinessReport { store: store_health.clone(), queue: queue_health.clone() };
    let status = if report.is_ready() { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };

    Ok((
        status,
        Json(json!({
            "ready": report.is_ready(),
            "store": format!("{:?}", store_health),
            "queue": format!("{:?}", queue_health),
        })),
    ))
}

pub async fn metrics(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<String, StatusCode> {
    authorize(&state, &headers)?;

    let documents = state.store.all_documents().map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
    let mut tenants: Vec<_> = documents.into_iter().map(|d| d.tenant_id).collect();
    tenants.sort();
    tenants.dedup();

    let mut succeeded = 0u64;
    let mut failed = 0u64;
    let mut running = 0u64;
    let mut queued = 0u64;
    let mut cancelled = 0u64;
    let mut quarantined = 0u64;
    for tenant_id in tenants {
        let jobs = state
            .store
            .list_jobs_for_tenant(tenant_id)
            .map_err(|_| StatusCode::INTERNAL_SERVER_ERROR)?;
        for job in jobs {
            match job.status {
                JobStatus::Succeeded => succeeded += 1,
                JobStatus::Failed => failed += 1,
                JobStatus::Running => running += 1,
                JobStatus::Queued => queued += 1,
                JobStatus::Cancelled => cancelled += 1,
                JobStatus::Quarantined => quarantined += 1,
            }
        }
    }

    Ok(state.metrics.render_prometheus(&[
        ("succeeded", succeeded),
        ("failed", failed),
        ("running", running),
        ("queued", queued),
        ("cancelled", cancelled),
        ("quarantined", quarantined),
    ]))
}
