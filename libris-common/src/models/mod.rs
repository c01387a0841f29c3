//! Domain models shared by the stores and the HTTP layer

pub mod item;
pub mod shelf;

pub use item::{Item, ItemFilter, ItemInput, ItemPatch, ItemType, ReadingStatus, ShelfPlacementRef};
pub use shelf::{
    ItemPlacement, LayoutSlotInput, LayoutUpdate, PlacedItem, ScanOutcome, ScanStatus, Shelf,
    ShelfColumn, ShelfDetail, ShelfLayout, ShelfRow, ShelfSlot, ShelfSummary,
};
