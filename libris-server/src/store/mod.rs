//! Catalogue repositories
//!
//! [`Store`] is the seam between the services and persistence. Two
//! implementations exist: [`MemoryStore`] (one `RwLock` over plain maps) and
//! [`SqliteStore`] (sqlx, one transaction per multi-step write). Both enforce
//! owner scoping: a record owned by another principal is reported as
//! not found.
//!
//! Multi-step placement operations (layout replacement, assignment, removal)
//! live here rather than in the services so each one is a single critical
//! section or transaction.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use uuid::Uuid;

use libris_common::models::{
    Item, ItemFilter, ItemPlacement, LayoutSlotInput, PlacedItem, Shelf, ShelfDetail, ShelfLayout,
    ShelfPlacementRef, ShelfSummary,
};
use libris_common::Result;

pub mod memory;
pub mod sqlite;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

/// Persistence operations for items, shelves and placements
#[async_trait]
pub trait Store: Send + Sync {
    async fn insert_item(&self, item: &Item) -> Result<()>;

    async fn get_item(&self, owner: &str, id: Uuid) -> Result<Item>;

    /// Items passing `filter`, sorted by title (case-insensitive)
    async fn list_items(&self, owner: &str, filter: &ItemFilter) -> Result<Vec<Item>>;

    /// First item whose ISBN-13 or ISBN-10 equals one of `keys`
    async fn find_item_by_isbn(&self, owner: &str, keys: &[String]) -> Result<Option<Item>>;

    /// Overwrite an item's fields; the cached shelf placement is kept
    async fn update_item(&self, item: &Item) -> Result<Item>;

    /// Delete an item and its placement
    async fn delete_item(&self, owner: &str, id: Uuid) -> Result<()>;

    async fn insert_shelf(&self, shelf: &Shelf, layout: &ShelfLayout) -> Result<()>;

    async fn list_shelves(&self, owner: &str) -> Result<Vec<ShelfSummary>>;

    async fn get_shelf(&self, owner: &str, id: Uuid) -> Result<ShelfDetail>;

    /// Update shelf metadata and the shelf name cached on placed items
    async fn update_shelf(&self, shelf: &Shelf) -> Result<()>;

    /// Delete a shelf, its layout and placements; clears item caches
    async fn delete_shelf(&self, owner: &str, id: Uuid) -> Result<()>;

    /// Replace the layout wholesale, returning the displaced placements
    async fn replace_layout(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slots: &[LayoutSlotInput],
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemPlacement>>;

    /// Bind an item to a slot, clearing any placement it had elsewhere
    ///
    /// A slot holds at most one item: an item already in the slot is moved
    /// to the shelf's unplaced list.
    async fn assign_item(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemPlacement>;

    /// Clear the slot of an item's placement; the item stays on the shelf
    async fn remove_item(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemPlacement>;
}

/// Cached placement summary for an item
pub(crate) fn placement_ref(
    shelf: &Shelf,
    layout: &ShelfLayout,
    placement: &ItemPlacement,
) -> ShelfPlacementRef {
    let slot = placement.slot_id.and_then(|id| layout.slot(id));
    ShelfPlacementRef {
        shelf_id: shelf.id,
        shelf_name: shelf.name.clone(),
        slot_id: slot.map(|s| s.id),
        row_index: slot.map(|s| s.row_index),
        col_index: slot.map(|s| s.col_index),
    }
}

/// Split a shelf's placements into placed and unplaced lists
///
/// Placed items are ordered by slot position, unplaced items by title.
pub(crate) fn assemble_detail(
    shelf: Shelf,
    mut layout: ShelfLayout,
    placements: Vec<ItemPlacement>,
    items: &HashMap<Uuid, Item>,
) -> ShelfDetail {
    layout.sort();
    let slot_order: HashMap<Uuid, (i64, i64)> =
        layout.slots.iter().map(|s| (s.id, s.key())).collect();

    let mut placed = Vec::new();
    let mut unplaced = Vec::new();
    for placement in placements {
        let Some(item) = items.get(&placement.item_id).cloned() else {
            continue;
        };
        let entry = PlacedItem { placement, item };
        if entry.placement.slot_id.is_some() {
            placed.push(entry);
        } else {
            unplaced.push(entry);
        }
    }

    placed.sort_by_key(|p| {
        (
            p.placement
                .slot_id
                .and_then(|id| slot_order.get(&id).copied())
                .unwrap_or((i64::MAX, i64::MAX)),
            p.item.title.to_lowercase(),
        )
    });
    unplaced.sort_by_key(|p| p.item.title.to_lowercase());

    ShelfDetail {
        shelf,
        layout,
        placements: placed,
        unplaced,
    }
}
