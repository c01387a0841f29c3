//! Shelf, layout and placement models
//!
//! Coordinates are normalized to the shelf photo: `0.0` is the left/top edge,
//! `1.0` the right/bottom edge. Spans are half-open, `[start, end)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use uuid::Uuid;

use super::item::Item;

/// Shelf metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Shelf {
    pub id: Uuid,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub photo_url: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Horizontal band of the shelf photo
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfRow {
    pub id: Uuid,
    pub shelf_id: Uuid,
    pub row_index: i64,
    pub y_start: f64,
    pub y_end: f64,
}

/// Horizontal span within a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfColumn {
    pub id: Uuid,
    pub row_id: Uuid,
    pub col_index: i64,
    pub x_start: f64,
    pub x_end: f64,
}

/// Addressable cell, keyed by `(row_index, col_index)` across edits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfSlot {
    pub id: Uuid,
    pub shelf_id: Uuid,
    pub row_id: Uuid,
    pub column_id: Uuid,
    pub row_index: i64,
    pub col_index: i64,
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
}

impl ShelfSlot {
    pub fn key(&self) -> (i64, i64) {
        (self.row_index, self.col_index)
    }
}

/// An item's association with a shelf; `slot_id == None` means unplaced
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ItemPlacement {
    pub id: Uuid,
    pub item_id: Uuid,
    pub shelf_id: Uuid,
    pub slot_id: Option<Uuid>,
    pub created_at: DateTime<Utc>,
    pub placed_at: DateTime<Utc>,
}

/// Complete layout of one shelf
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ShelfLayout {
    pub rows: Vec<ShelfRow>,
    pub columns: Vec<ShelfColumn>,
    pub slots: Vec<ShelfSlot>,
}

impl ShelfLayout {
    pub fn slot(&self, slot_id: Uuid) -> Option<&ShelfSlot> {
        self.slots.iter().find(|s| s.id == slot_id)
    }

    /// Order rows, columns and slots by their indices
    pub fn sort(&mut self) {
        self.rows.sort_by_key(|r| r.row_index);
        let row_index: HashMap<Uuid, i64> =
            self.rows.iter().map(|r| (r.id, r.row_index)).collect();
        self.columns.sort_by_key(|c| {
            (
                row_index.get(&c.row_id).copied().unwrap_or(i64::MAX),
                c.col_index,
            )
        });
        self.slots.sort_by_key(ShelfSlot::key);
    }
}

/// Placement joined with its item
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PlacedItem {
    #[serde(flatten)]
    pub placement: ItemPlacement,
    pub item: Item,
}

/// Shelf with layout, placed items and unplaced items
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfDetail {
    #[serde(flatten)]
    pub shelf: Shelf,
    pub layout: ShelfLayout,
    pub placements: Vec<PlacedItem>,
    pub unplaced: Vec<PlacedItem>,
}

/// Shelf list entry
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ShelfSummary {
    #[serde(flatten)]
    pub shelf: Shelf,
    pub slot_count: usize,
    pub item_count: usize,
}

/// One slot of a layout submission
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LayoutSlotInput {
    pub row_index: i64,
    pub col_index: i64,
    pub x_start: f64,
    pub x_end: f64,
    pub y_start: f64,
    pub y_end: f64,
}

/// Result of replacing a shelf layout
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayoutUpdate {
    pub shelf: ShelfDetail,
    pub displaced: Vec<ItemPlacement>,
}

/// Outcome of scanning a barcode into a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    /// Already in the slot; nothing written
    Present,
    /// Existing item reassigned to the slot
    Moved,
    /// New item created from catalog metadata
    Created,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanOutcome {
    pub status: ScanStatus,
    pub item: Item,
    pub placement: ItemPlacement,
}
