//! `/v1/webhooks*` CRUD, grounded on `documents/views.py`'s webhook endpoint
//! viewset. Read and write are collapsed onto a single `webhooks:manage`
//! scope rather than split `webhooks:read`/`webhooks:write` scopes, a
//! deliberate simplification recorded in the design ledger.

use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;
use uuid::Uuid;

use crate::api::error::ApiError;
use crate::api::middleware::authenticate;
use crate::api::state::AppState;
use crate::auth::validate_webhook_url_shape;
use crate::domain::{Scope, WebhookEndpoint};

#[derive(Debug, Deserialize)]
pub struct CreateWebhookRequest {
    pub url: String,
    #[serde(default)]
    pub subscribed_events: Vec<String>,
    pub secret: String,
}

#[derive(Debug, Deserialize)]
pub struct UpdateWebhookRequest {
    pub url: Option<String>,
    pub subscribed_events: Option<Vec<String>>,
    pub secret: Option<String>,
    pub is_enabled: Option<bool>,
}

pub async fn list_webhooks(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> Result<Json<Vec<WebhookEndpoint>>, ApiError> {
    let key = authenticate(&state, &headers, Scope::WebhooksManage).await?;
    Ok(Json(state.store.list_webhook_endpoints_for_tenant(key.tenant_id)?))
}

pub async fn create_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(request): Json<CreateWebhookRequest>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    let key = authenticate(&state, &headers, Scope::WebhooksManage).await?;

    let parsed = url::Url::parse(&request.url)
        .map_err(|e| ApiError::BadRequest(format!("invalid webhook url: {e}")))?;
    validate_webhook_url_shape(&parsed, &state.config.webhooks.host_allowlist)?;

    let endpoint = WebhookEndpoint {
        id: Uuid::new_v4(),
        tenant_id: key.tenant_id,
        url: request.url,
        secret: request.secret,
        subscribed_events: request.subscribed_events,
        is_enabled: true,
        created_at: crate::domain::now(),
        last_success_at: None,
        last_failure_at: None,
    };
    state.store.put_webhook_endpoint(&endpoint)?;
    Ok(Json(endpoint))
}

pub async fn update_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
    Json(request): Json<UpdateWebhookRequest>,
) -> Result<Json<WebhookEndpoint>, ApiError> {
    let key = authenticate(&state, &headers, Scope::WebhooksManage).await?;
    let mut endpoint = state.store.get_webhook_endpoint(id)?.ok_or(ApiError::NotFound)?;
    if endpoint.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }

    if let Some(url) = request.url {
        let parsed = url::Url::parse(&url)
            .map_err(|e| ApiError::BadRequest(format!("invalid webhook url: {e}")))?;
        validate_webhook_url_shape(&parsed, &state.config.webhooks.host_allowlist)?;
        endpoint.url = url;
    }
    if let Some(events) = request.subscribed_events {
        endpoint.subscribed_events = events;
    }
    if let Some(secret) = request.secret {
        endpoint.secret = secret;
    }
    if let Some(enabled) = request.is_enabled {
        endpoint.is_enabled = enabled;
    }

    state.store.put_webhook_endpoint(&endpoint)?;
    Ok(Json(endpoint))
}

pub async fn delete_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(id): Path<Uuid>,
) -> Result<axum::http::StatusCode, ApiError> {
    let key = authenticate(&state, &headers, Scope::WebhooksManage).await?;
    let endpoint = state.store.get_webhook_endpoint(id)?.ok_or(ApiError::NotFound)?;
    if endpoint.tenant_id != key.tenant_id {
        return Err(ApiError::NotFound);
    }
    state.store.delete_webhook_endpoint(id)?;
    Ok(axum::http::StatusCode::NO_CONTENT)
}
