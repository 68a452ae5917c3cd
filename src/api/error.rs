//! API error taxonomy, grounded on spec.md §7's `{error_code, message}`
//! contract: every variant carries the exact wire code and HTTP status the
//! admission/job-control/auth sections name.

use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;
use thiserror::Error;

use crate::auth::AuthError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("unsupported media type: {0}")]
    UnsupportedMediaType(String),
    #[error("file too large: {0} bytes")]
    FileTooLarge(u64),
    #[error("duplicate document")]
    DuplicateDocument,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
    #[error("job is not cancelable from its current state")]
    NotCancelable,
    #[error("job is not retryable from its current state")]
    NotRetryable,
    #[error("job has exhausted its retry budget")]
    RetryLimit,
    #[error("no source file on disk for this document")]
    MissingSourceFile,
    #[error("resource not found")]
    NotFound,
    #[error("authentication required")]
    Unauthenticated,
    #[error("insufficient scope")]
    Forbidden,
    #[error("rate limit exceeded")]
    RateLimited,
    #[error("invalid request: {0}")]
    BadRequest(String),
    #[error("internal error: {0}")]
    Internal(String),
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    error_code: &'static str,
    message: String,
}

impl ApiError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ApiError::UnsupportedMediaType(_) => StatusCode::UNSUPPORTED_MEDIA_TYPE,
            ApiError::FileTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            ApiError::DuplicateDocument => StatusCode::CONFLICT,
            ApiError::InvalidOptions(_) => StatusCode::BAD_REQUEST,
            ApiError::NotCancelable => StatusCode::BAD_REQUEST,
            ApiError::NotRetryable => StatusCode::BAD_REQUEST,
            ApiError::RetryLimit => StatusCode::BAD_REQUEST,
            ApiError::MissingSourceFile => StatusCode::BAD_REQUEST,
            ApiError::NotFound => StatusCode::NOT_FOUND,
            ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::UnsupportedMediaType(_) => "UNSUPPORTED_MEDIA_TYPE",
            ApiError::FileTooLarge(_) => "FILE_TOO_LARGE",
            ApiError::DuplicateDocument => "DUPLICATE_DOCUMENT",
            ApiError::InvalidOptions(_) => "INVALID_OPTIONS",
            ApiError::NotCancelable => "NOT_CANCELABLE",
            ApiError::NotRetryable => "NOT_RETRYABLE",
            ApiError::RetryLimit => "RETRY_LIMIT",
            ApiError::MissingSourceFile => "MISSING_SOURCE_FILE",
            ApiError::NotFound => "NOT_FOUND",
            ApiError::Unauthenticated => "UNAUTHENTICATED",
            ApiError::Forbidden => "FORBIDDEN",
            ApiError::RateLimited => "RATE_LIMITED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let status = self.status_code();
        let body = ErrorBody { error_code: self.code(), message: self.to_string() };
        (status, Json(json!(body))).into_response()
    }
}

/// Wrong-tenant visibility on an id-addressed resource is opaque 404, per
/// spec.md §7, never a distinguishable 403 — handled by callers comparing
/// `tenant_id` themselves and mapping to this variant.
impl From<StoreError> for ApiError {
    fn from(value: StoreError) -> Self {
        ApiError::Internal(value.to_string())
    }
}

impl From<AuthError> for ApiError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::MissingCredentials | AuthError::UnknownKey | AuthError::KeyDisabled => {
                ApiError::Unauthenticated
            }
            AuthError::MissingScope(_) => ApiError::Forbidden,
            AuthError::RateLimited => ApiError::RateLimited,
            AuthError::InvalidWebhookUrl(msg) => ApiError::BadRequest(msg),
        }
    }
}
