//! Request-scoped auth: pulls the `Authorization: Api-Key <secret>` header,
//! fingerprints it, looks up the owning key, and checks the per-key sliding
//! window, the way `authn/authentication.py::APIKeyAuthentication` and
//! `authn/throttling.py::APIKeyRateThrottle` compose in the original.

use axum::http::HeaderMap;

use crate::api::error::ApiError;
use crate::api::state::AppState;
use crate::auth::fingerprint::fingerprint;
use crate::auth::{require_scope, AuthError};
use crate::domain::{ApiKey, Scope};

pub const API_KEY_PREFIX: &str = "Api-Key ";

/// Authenticates the caller and checks `scope`, returning the owning key.
/// Internal-token-only routes (`/healthz`, `/readyz`, `/metrics`) never
/// call this — see [`crate::api::internal`].
pub async fn authenticate(
    state: &AppState,
    headers: &HeaderMap,
    scope: Scope,
) -> Result<ApiKey, ApiError> {
    let raw = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix(API_KEY_PREFIX))
        .ok_or(AuthError::MissingCredentials)?;

    let fp = fingerprint(state.config.auth.key_secret.as_bytes(), raw);

    if !state.rate_limiter.check(&fp) {
        return Err(AuthError::RateLimited.into());
    }

    let key = state
        .store
        .get_api_key_by_fingerprint(&fp)?
        .ok_or(AuthError::UnknownKey)?;

    if !key.is_active {
        return Err(AuthError::KeyDisabled.into());
    }

    require_scope(&key, scope)?;
    Ok(key)
}
