//! Error types for libris-server
//!
//! Every handler returns [`ApiResult`]. Client-correctable failures carry
//! their message to the caller; anything else is logged and reported as an
//! opaque 500.

use axum::{
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;
use tracing::error;

use crate::auth::OAuthError;
use crate::services::catalog::CatalogError;
use crate::services::shelves::ScanError;

/// API error type
#[derive(Debug, Error)]
pub enum ApiError {
    /// Invalid request (400)
    #[error("Invalid request: {0}")]
    BadRequest(String),

    /// Missing or invalid credentials (401)
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed (403)
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Login attempts exhausted (429)
    #[error("Too many failed attempts; retry in {retry_after_secs}s")]
    TooManyAttempts { retry_after_secs: u64 },

    /// Internal server error (500)
    #[error("Internal server error: {0}")]
    Internal(String),

    /// Catalog provider error
    #[error(transparent)]
    Catalog(#[from] CatalogError),

    /// libris-common error
    #[error(transparent)]
    Common(#[from] libris_common::Error),
}

impl ApiError {
    fn parts(&self) -> (StatusCode, &'static str, String) {
        use libris_common::Error as Common;

        match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "BAD_REQUEST", msg.clone()),
            ApiError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED", msg.clone()),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, "FORBIDDEN", msg.clone()),
            ApiError::TooManyAttempts { .. } => (
                StatusCode::TOO_MANY_REQUESTS,
                "TOO_MANY_ATTEMPTS",
                self.to_string(),
            ),
            ApiError::Catalog(err) => {
                let (status, code) = match err {
                    CatalogError::NotFound(_) => (StatusCode::NOT_FOUND, "CATALOG_NOT_FOUND"),
                    CatalogError::Unsupported(_) => {
                        (StatusCode::BAD_REQUEST, "CATALOG_UNSUPPORTED")
                    }
                    CatalogError::Transient(_) => (StatusCode::BAD_GATEWAY, "CATALOG_UNAVAILABLE"),
                    CatalogError::Upstream(_) => (StatusCode::BAD_GATEWAY, "CATALOG_ERROR"),
                };
                (status, code, err.to_string())
            }
            ApiError::Common(Common::Validation(msg)) => {
                (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone())
            }
            ApiError::Common(Common::NotFound(msg)) => {
                (StatusCode::NOT_FOUND, "NOT_FOUND", format!("Not found: {}", msg))
            }
            ApiError::Common(Common::SlotNotFound(msg)) => {
                (StatusCode::NOT_FOUND, "SLOT_NOT_FOUND", msg.clone())
            }
            ApiError::Internal(_) | ApiError::Common(_) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "INTERNAL_ERROR",
                "Internal server error".to_string(),
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_code, message) = self.parts();
        if status.is_server_error() {
            error!(error = %self, "Request failed");
        }

        let body = Json(json!({
            "error": {
                "code": error_code,
                "message": message,
            }
        }));

        let mut response = (status, body).into_response();
        if let ApiError::TooManyAttempts { retry_after_secs } = self {
            if let Ok(value) = HeaderValue::from_str(&retry_after_secs.to_string()) {
                response.headers_mut().insert(header::RETRY_AFTER, value);
            }
        }
        response
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Config(msg) => ApiError::Internal(msg),
            other => ApiError::Unauthorized(other.to_string()),
        }
    }
}

impl From<ScanError> for ApiError {
    fn from(err: ScanError) -> Self {
        match err {
            ScanError::Library(e) => ApiError::Common(e),
            ScanError::Catalog(e) => ApiError::Catalog(e),
        }
    }
}

/// Result type for API handlers
pub type ApiResult<T> = Result<T, ApiError>;
