//! Shelf endpoints
//!
//! Shelf CRUD, layout replacement and slot placement. Every path is scoped
//! to the authenticated owner.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use uuid::Uuid;

use libris_common::models::{
    ItemPlacement, LayoutSlotInput, LayoutUpdate, ScanOutcome, ScanStatus, ShelfDetail,
    ShelfSummary,
};

use super::{json_body, parse_id};
use crate::auth::Principal;
use crate::error::ApiResult;
use crate::services::ShelfInput;
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    pub slots: Vec<LayoutSlotInput>,
}

#[derive(Debug, Deserialize)]
pub struct AssignRequest {
    pub item_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    #[serde(default)]
    pub isbn: String,
}

fn slot_path(shelf_id: &str, slot_id: &str) -> ApiResult<(Uuid, Uuid)> {
    Ok((parse_id(shelf_id, "shelf id")?, parse_id(slot_id, "slot id")?))
}

/// GET /api/shelves
pub async fn list_shelves(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<Vec<ShelfSummary>>> {
    Ok(Json(state.shelves.list(&principal.owner).await?))
}

/// POST /api/shelves
///
/// New shelves get a single full-size slot.
pub async fn create_shelf(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    payload: Result<Json<ShelfInput>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ShelfDetail>)> {
    let input = json_body(payload)?;
    let shelf = state.shelves.create(&principal.owner, input).await?;
    Ok((StatusCode::CREATED, Json(shelf)))
}

/// GET /api/shelves/:id
pub async fn get_shelf(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<Json<ShelfDetail>> {
    let id = parse_id(&id, "shelf id")?;
    Ok(Json(state.shelves.get(&principal.owner, id).await?))
}

/// PUT /api/shelves/:id
pub async fn update_shelf(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<ShelfInput>, JsonRejection>,
) -> ApiResult<Json<ShelfDetail>> {
    let id = parse_id(&id, "shelf id")?;
    let input = json_body(payload)?;
    Ok(Json(state.shelves.update(&principal.owner, id, input).await?))
}

/// DELETE /api/shelves/:id
pub async fn delete_shelf(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "shelf id")?;
    state.shelves.delete(&principal.owner, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// PUT /api/shelves/:id/layout
///
/// Returns the new layout together with placements whose slot was removed.
pub async fn update_layout(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(id): Path<String>,
    payload: Result<Json<LayoutRequest>, JsonRejection>,
) -> ApiResult<Json<LayoutUpdate>> {
    let id = parse_id(&id, "shelf id")?;
    let request = json_body(payload)?;
    let update = state
        .shelves
        .update_layout(&principal.owner, id, &request.slots)
        .await?;
    Ok(Json(update))
}

/// POST /api/shelves/:id/slots/:slot_id/items
pub async fn assign_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((shelf_id, slot_id)): Path<(String, String)>,
    payload: Result<Json<AssignRequest>, JsonRejection>,
) -> ApiResult<Json<ItemPlacement>> {
    let (shelf_id, slot_id) = slot_path(&shelf_id, &slot_id)?;
    let request = json_body(payload)?;
    let placement = state
        .shelves
        .assign(&principal.owner, shelf_id, slot_id, request.item_id)
        .await?;
    Ok(Json(placement))
}

/// DELETE /api/shelves/:id/slots/:slot_id/items/:item_id
///
/// The item stays on the shelf as unplaced.
pub async fn remove_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((shelf_id, slot_id, item_id)): Path<(String, String, String)>,
) -> ApiResult<Json<ItemPlacement>> {
    let (shelf_id, slot_id) = slot_path(&shelf_id, &slot_id)?;
    let item_id = parse_id(&item_id, "item id")?;
    let placement = state
        .shelves
        .remove(&principal.owner, shelf_id, slot_id, item_id)
        .await?;
    Ok(Json(placement))
}

/// POST /api/shelves/:id/slots/:slot_id/scan
pub async fn scan_item(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((shelf_id, slot_id)): Path<(String, String)>,
    payload: Result<Json<ScanRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<ScanOutcome>)> {
    let (shelf_id, slot_id) = slot_path(&shelf_id, &slot_id)?;
    let request = json_body(payload)?;
    let outcome = state
        .shelves
        .scan_and_assign(&principal.owner, shelf_id, slot_id, &request.isbn)
        .await?;
    let status = match outcome.status {
        ScanStatus::Created => StatusCode::CREATED,
        ScanStatus::Present | ScanStatus::Moved => StatusCode::OK,
    };
    Ok((status, Json(outcome)))
}
