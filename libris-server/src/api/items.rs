//! Item endpoints
//!
//! - GET/POST /api/items
//! - GET/PUT/DELETE /api/items/:id
//! - POST /api/items/import (multipart CSV)

use axum::{
    extract::{rejection::JsonRejection, Multipart, Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use libris_common::models::{Item, ItemFilter, ItemInput, ItemPatch, ItemType, ReadingStatus};
use libris_common::Error;

use super::{json_body, parse_id};
use crate::auth::Principal;
use crate::error::{ApiError, ApiResult};
use crate::services::ImportSummary;
use crate::AppState;

/// Query parameters for GET /api/items
#[derive(Debug, Default, Deserialize)]
pub struct ListItemsQuery {
    #[serde(rename = "type")]
    pub item_type: Option<String>,
    pub status: Option<String>,
    pub q: Option<String>,
    pub shelf_id: Option<String>,
}

fn non_blank(raw: Option<String>) -> Option<String> {
    raw.map(|s| s.trim().to_string()).filter(|s| !s.is_empty())
}

impl ListItemsQuery {
    /// Validate the raw parameters into a store filter
    pub fn into_filter(self) -> ApiResult<ItemFilter> {
        let item_type = non_blank(self.item_type)
            .map(|t| ItemType::parse(&t))
            .transpose()?;
        let reading_status = non_blank(self.status)
            .map(|s| ReadingStatus::parse(&s))
            .transpose()?;
        let shelf_id = non_blank(self.shelf_id)
            .map(|id| parse_id(&id, "shelf_id"))
            .transpose()?;

        Ok(ItemFilter {
            item_type,
            reading_status,
            query: non_blank(self.q).map(|q| q.to_lowercase()),
            shelf_id,
        })
    }
}

/// GET /api/items
pub async fn list_items(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ListItemsQuery>,
) -> ApiResult<Json<Vec<Item>>> {
    let filter = query.into_filter()?;
    let items = state.items.list(&principal.owner, &filter).await?;
    Ok(Json(items))
}

/// POST /api/items
pub async fn create_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ItemInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Item>)> {
    let input = json_body(payload)?;
    let item = state.items.create(&principal.owner, input).await?;
    Ok((StatusCode::CREATED, Json(item)))
}

/// GET /api/items/:id
pub async fn get_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<Item>> {
    let id = parse_id(&id, "item id")?;
    Ok(Json(state.items.get(&principal.owner, id).await?))
}

/// PUT /api/items/:id
///
/// Absent fields are left unchanged; `null` clears an optional field.
pub async fn update_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<ItemPatch>, JsonRejection>,
) -> ApiResult<Json<Item>> {
    let id = parse_id(&id, "item id")?;
    let patch = json_body(payload)?;
    Ok(Json(state.items.update(&principal.owner, id, patch).await?))
}

/// DELETE /api/items/:id
pub async fn delete_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id: Uuid = parse_id(&id, "item id")?;
    state.items.delete(&principal.owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Default, Deserialize)]
pub struct ImportQuery {
    #[serde(default)]
    pub enrich: bool,
}

/// POST /api/items/import
///
/// Expects the CSV in the multipart field `file`.
pub async fn import_items(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Query(query): Query<ImportQuery>,
    mut multipart: Multipart,
) -> ApiResult<Json<ImportSummary>> {
    let mut data = None;
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("Malformed multipart body: {}", e)))?
    {
        if field.name() == Some("file") {
            let bytes = field
                .bytes()
                .await
                .map_err(|e| ApiError::BadRequest(format!("Failed to read upload: {}", e)))?;
            data = Some(bytes);
            break;
        }
    }
    let data = data.ok_or_else(|| Error::validation("multipart field 'file' is required"))?;

    let summary = state
        .importer
        .import(&principal.owner, &data, query.enrich)
        .await?;
    Ok(Json(summary))
}
