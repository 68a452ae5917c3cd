//! `GET /v1/artifacts*`, grounded on `documents/views.py`'s artifact
//! download action: tenant-scoped lookup, opaque 404 across tenants, raw
//! bytes back to the caller.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::Json;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::authenticate;
use crate::api::state::AppState;
use crate::domain::{Artifact, Scope};

pub async fn list_artifacts(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<Artifact>>, ApiError> {
    let key = authenticate(&state, &headers, Scope::ArtifactsRead).await?;
    let artifacts = state
        .store
        .all_artifacts()?
        .into_iter()
        .filter(|a| a.tenant_id == key.tenant_id)
        .collect();
    Ok(Json(artifacts))
}

pub async fn get_artifact(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<Response, ApiError> {
    let key = authenticate(&state, &headers, Scope::ArtifactsRead).await?;
    let artifact = state.store.get_artifact(id)?.ok_or(ApiError::NotFound)?;
    if artifact.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }

    let bytes = state
        .storage
        .read_local(&artifact.storage_key)
        .await
        .map_err(|e| ApiError::Internal(e.to_string()))?;

    let content_type = match artifact.kind {
        crate::domain::ArtifactKind::DoclingJson | crate::domain::ArtifactKind::ChunksJson => {
            "application/json"
        }
        crate::domain::ArtifactKind::Markdown => "text/markdown",
        crate::domain::ArtifactKind::Text | crate::domain::ArtifactKind::Doctags => "text/plain",
        crate::domain::ArtifactKind::FiguresZip => "application/zip",
    };

    Ok((
        [(axum::http::header::CONTENT_TYPE, content_type)],
        bytes,
    )
        .into_response())
}
