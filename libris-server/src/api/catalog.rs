//! Catalog lookup endpoint

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;

use libris_common::Error;

use crate::error::ApiResult;
use crate::services::catalog::{self, CatalogMetadata};
use crate::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct LookupQuery {
    #[serde(default)]
    pub query: String,
    pub category: Option<String>,
}

/// GET /api/catalog/lookup?query=&category=
pub async fn lookup(
    State(state): State<AppState>,
    Query(params): Query<LookupQuery>,
) -> ApiResult<Json<Vec<CatalogMetadata>>> {
    if params.query.trim().is_empty() {
        return Err(Error::validation("query is required").into());
    }
    let results =
        catalog::lookup(state.catalog.as_ref(), &params.query, params.category.as_deref()).await?;
    Ok(Json(results))
}
