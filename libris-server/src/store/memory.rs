//! In-memory repository
//!
//! All state sits behind one `RwLock`. Every operation takes the lock once,
//! performs its reads and writes, and releases it; nothing awaits while the
//! lock is held.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing::debug;
use uuid::Uuid;

use libris_common::layout::plan_layout;
use libris_common::models::{
    Item, ItemFilter, ItemPlacement, LayoutSlotInput, Shelf, ShelfDetail, ShelfLayout,
    ShelfSummary,
};
use libris_common::{uuid_utils, Error, Result};

use super::{assemble_detail, placement_ref, Store};

#[derive(Default)]
struct State {
    items: HashMap<Uuid, Item>,
    shelves: HashMap<Uuid, Shelf>,
    layouts: HashMap<Uuid, ShelfLayout>,
    /// Keyed by item id: an item has at most one placement
    placements: HashMap<Uuid, ItemPlacement>,
}

impl State {
    fn owned_item(&self, owner: &str, id: Uuid) -> Result<&Item> {
        self.items
            .get(&id)
            .filter(|i| i.owner_id == owner)
            .ok_or_else(|| Error::not_found(format!("item {}", id)))
    }

    fn owned_shelf(&self, owner: &str, id: Uuid) -> Result<&Shelf> {
        self.shelves
            .get(&id)
            .filter(|s| s.owner_id == owner)
            .ok_or_else(|| Error::not_found(format!("shelf {}", id)))
    }

    /// Recompute the cached placement on the item behind `item_id`
    fn refresh_cache(&mut self, item_id: Uuid) {
        let cache = self.placements.get(&item_id).and_then(|placement| {
            let shelf = self.shelves.get(&placement.shelf_id)?;
            let layout = self.layouts.get(&placement.shelf_id)?;
            Some(placement_ref(shelf, layout, placement))
        });
        if let Some(item) = self.items.get_mut(&item_id) {
            item.shelf_placement = cache;
        }
    }

    fn detail(&self, shelf: &Shelf) -> ShelfDetail {
        let layout = self.layouts.get(&shelf.id).cloned().unwrap_or_default();
        let placements: Vec<ItemPlacement> = self
            .placements
            .values()
            .filter(|p| p.shelf_id == shelf.id)
            .cloned()
            .collect();
        let items: HashMap<Uuid, Item> = placements
            .iter()
            .filter_map(|p| self.items.get(&p.item_id).map(|i| (i.id, i.clone())))
            .collect();
        assemble_detail(shelf.clone(), layout, placements, &items)
    }
}

/// Process-local repository guarded by one lock
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        let mut state = self.state.write().await;
        state.items.insert(item.id, item.clone());
        Ok(())
    }

    async fn get_item(&self, owner: &str, id: Uuid) -> Result<Item> {
        let state = self.state.read().await;
        state.owned_item(owner, id).cloned()
    }

    async fn list_items(&self, owner: &str, filter: &ItemFilter) -> Result<Vec<Item>> {
        let state = self.state.read().await;
        let mut items: Vec<Item> = state
            .items
            .values()
            .filter(|i| i.owner_id == owner && filter.matches(i))
            .cloned()
            .collect();
        items.sort_by(|a, b| {
            a.title
                .to_lowercase()
                .cmp(&b.title.to_lowercase())
                .then(a.created_at.cmp(&b.created_at))
        });
        Ok(items)
    }

    async fn find_item_by_isbn(&self, owner: &str, keys: &[String]) -> Result<Option<Item>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let state = self.state.read().await;
        let mut matches: Vec<&Item> = state
            .items
            .values()
            .filter(|i| i.owner_id == owner && i.matches_isbn(keys))
            .collect();
        matches.sort_by_key(|i| i.created_at);
        Ok(matches.first().map(|i| (*i).clone()))
    }

    async fn update_item(&self, item: &Item) -> Result<Item> {
        let mut state = self.state.write().await;
        let cached = state.owned_item(&item.owner_id, item.id)?.shelf_placement.clone();
        let mut stored = item.clone();
        stored.shelf_placement = cached;
        state.items.insert(stored.id, stored.clone());
        Ok(stored)
    }

    async fn delete_item(&self, owner: &str, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_item(owner, id)?;
        state.items.remove(&id);
        state.placements.remove(&id);
        Ok(())
    }

    async fn insert_shelf(&self, shelf: &Shelf, layout: &ShelfLayout) -> Result<()> {
        let mut state = self.state.write().await;
        state.shelves.insert(shelf.id, shelf.clone());
        state.layouts.insert(shelf.id, layout.clone());
        Ok(())
    }

    async fn list_shelves(&self, owner: &str) -> Result<Vec<ShelfSummary>> {
        let state = self.state.read().await;
        let mut shelves: Vec<ShelfSummary> = state
            .shelves
            .values()
            .filter(|s| s.owner_id == owner)
            .map(|s| ShelfSummary {
                shelf: s.clone(),
                slot_count: state.layouts.get(&s.id).map_or(0, |l| l.slots.len()),
                item_count: state.placements.values().filter(|p| p.shelf_id == s.id).count(),
            })
            .collect();
        shelves.sort_by_key(|s| s.shelf.name.to_lowercase());
        Ok(shelves)
    }

    async fn get_shelf(&self, owner: &str, id: Uuid) -> Result<ShelfDetail> {
        let state = self.state.read().await;
        let shelf = state.owned_shelf(owner, id)?;
        Ok(state.detail(shelf))
    }

    async fn update_shelf(&self, shelf: &Shelf) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_shelf(&shelf.owner_id, shelf.id)?;
        state.shelves.insert(shelf.id, shelf.clone());

        let affected: Vec<Uuid> = state
            .placements
            .values()
            .filter(|p| p.shelf_id == shelf.id)
            .map(|p| p.item_id)
            .collect();
        for item_id in affected {
            state.refresh_cache(item_id);
        }
        Ok(())
    }

    async fn delete_shelf(&self, owner: &str, id: Uuid) -> Result<()> {
        let mut state = self.state.write().await;
        state.owned_shelf(owner, id)?;

        let affected: Vec<Uuid> = state
            .placements
            .values()
            .filter(|p| p.shelf_id == id)
            .map(|p| p.item_id)
            .collect();
        state.shelves.remove(&id);
        state.layouts.remove(&id);
        for item_id in affected {
            state.placements.remove(&item_id);
            state.refresh_cache(item_id);
        }
        Ok(())
    }

    async fn replace_layout(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slots: &[LayoutSlotInput],
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemPlacement>> {
        let mut state = self.state.write().await;
        let mut shelf = state.owned_shelf(owner, shelf_id)?.clone();
        let existing = state.layouts.get(&shelf_id).cloned().unwrap_or_default();
        let plan = plan_layout(shelf_id, &existing, slots)?;

        let mut displaced = Vec::new();
        for placement in state.placements.values_mut() {
            let removed = placement
                .slot_id
                .is_some_and(|slot| plan.removed_slot_ids.contains(&slot));
            if placement.shelf_id == shelf_id && removed {
                placement.slot_id = None;
                placement.placed_at = now;
                displaced.push(placement.clone());
            }
        }

        state.layouts.insert(shelf_id, plan.layout);
        shelf.updated_at = now;
        state.shelves.insert(shelf_id, shelf);
        for placement in &displaced {
            state.refresh_cache(placement.item_id);
        }

        debug!(
            shelf_id = %shelf_id,
            removed_slots = plan.removed_slot_ids.len(),
            displaced = displaced.len(),
            "Layout replaced"
        );
        Ok(displaced)
    }

    async fn assign_item(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemPlacement> {
        let mut state = self.state.write().await;
        state.owned_shelf(owner, shelf_id)?;
        let slot_exists = state
            .layouts
            .get(&shelf_id)
            .is_some_and(|l| l.slot(slot_id).is_some());
        if !slot_exists {
            return Err(Error::not_found(format!("slot {} on shelf {}", slot_id, shelf_id)));
        }
        state.owned_item(owner, item_id)?;

        let incumbent = state
            .placements
            .values()
            .find(|p| p.slot_id == Some(slot_id) && p.item_id != item_id)
            .map(|p| p.item_id);
        if let Some(other) = incumbent {
            if let Some(p) = state.placements.get_mut(&other) {
                p.slot_id = None;
                p.placed_at = now;
            }
            state.refresh_cache(other);
        }

        let placement = ItemPlacement {
            id: uuid_utils::generate(),
            item_id,
            shelf_id,
            slot_id: Some(slot_id),
            created_at: now,
            placed_at: now,
        };
        // Replacing the map entry clears any placement on another shelf
        state.placements.insert(item_id, placement.clone());
        state.refresh_cache(item_id);
        Ok(placement)
    }

    async fn remove_item(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
        now: DateTime<Utc>,
    ) -> Result<ItemPlacement> {
        let mut state = self.state.write().await;
        state.owned_shelf(owner, shelf_id)?;

        let placement = state
            .placements
            .get_mut(&item_id)
            .filter(|p| p.shelf_id == shelf_id && p.slot_id == Some(slot_id))
            .ok_or_else(|| {
                Error::SlotNotFound(format!("item {} is not in slot {}", item_id, slot_id))
            })?;
        placement.slot_id = None;
        placement.placed_at = now;
        let placement = placement.clone();

        state.refresh_cache(item_id);
        Ok(placement)
    }
}
