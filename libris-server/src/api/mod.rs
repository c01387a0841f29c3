//! HTTP API handlers for libris

pub mod catalog;
pub mod health;
pub mod items;
pub mod oauth;
pub mod series;
pub mod session;
pub mod shelves;

use axum::extract::rejection::JsonRejection;
use axum::Json;
use uuid::Uuid;

use libris_common::Error;

use crate::error::{ApiError, ApiResult};

pub use health::health_routes;

/// Unwrap a JSON body, reporting malformed input in the API error shape
pub(crate) fn json_body<T>(payload: Result<Json<T>, JsonRejection>) -> ApiResult<T> {
    payload
        .map(|Json(value)| value)
        .map_err(|e| ApiError::BadRequest(e.body_text()))
}

/// Parse an id path segment
pub(crate) fn parse_id(raw: &str, what: &str) -> ApiResult<Uuid> {
    Uuid::parse_str(raw.trim())
        .map_err(|_| Error::validation(format!("{} is not a valid id: {:?}", what, raw)).into())
}
