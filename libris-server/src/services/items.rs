//! Item service
//!
//! Validation and the reading-status rules run here; the store only
//! persists what it is handed.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use tracing::info;
use uuid::Uuid;

use libris_common::models::{Item, ItemFilter, ItemInput, ItemPatch};
use libris_common::validation::{validate_item, ItemFields};
use libris_common::{time, uuid_utils, Result};

use crate::store::Store;

/// Build an item record from validated fields
fn build_item(
    id: Uuid,
    owner: &str,
    fields: ItemFields,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
) -> Item {
    Item {
        id,
        owner_id: owner.to_string(),
        title: fields.title,
        creator: fields.creator,
        item_type: fields.item_type,
        release_year: fields.release_year,
        page_count: fields.page_count,
        current_page: fields.current_page,
        isbn13: fields.isbn13,
        isbn10: fields.isbn10,
        description: fields.description,
        cover_image: fields.cover_image,
        platform: fields.platform,
        format: fields.format,
        genre: fields.genre,
        rating: fields.rating,
        google_volume_id: fields.google_volume_id,
        series_name: fields.series_name,
        volume_number: fields.volume_number,
        total_volumes: fields.total_volumes,
        notes: fields.notes,
        reading_status: fields.reading_status,
        read_at: fields.read_at,
        shelf_placement: None,
        created_at,
        updated_at,
    }
}

#[derive(Clone)]
pub struct ItemService {
    store: Arc<dyn Store>,
}

impl ItemService {
    pub fn new(store: Arc<dyn Store>) -> Self {
        Self { store }
    }

    pub async fn create(&self, owner: &str, input: ItemInput) -> Result<Item> {
        let now = time::now();
        let fields = validate_item(input, now)?;
        let item = build_item(uuid_utils::generate(), owner, fields, now, now);

        self.store.insert_item(&item).await?;
        info!(item_id = %item.id, item_type = %item.item_type, "Item created");
        Ok(item)
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> Result<Item> {
        self.store.get_item(owner, id).await
    }

    pub async fn list(&self, owner: &str, filter: &ItemFilter) -> Result<Vec<Item>> {
        self.store.list_items(owner, filter).await
    }

    /// Apply a partial update and re-run validation on the merged record
    pub async fn update(&self, owner: &str, id: Uuid, patch: ItemPatch) -> Result<Item> {
        let current = self.store.get_item(owner, id).await?;
        let mut draft = current.to_input();
        patch.apply_to(&mut draft);

        let now = time::now();
        let fields = validate_item(draft, now)?;
        let item = build_item(current.id, owner, fields, current.created_at, now);

        // The store keeps its own placement cache
        self.store.update_item(&item).await
    }

    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<()> {
        self.store.delete_item(owner, id).await?;
        info!(item_id = %id, "Item deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use libris_common::models::{ItemType, ReadingStatus};
    use libris_common::Error;

    fn service() -> ItemService {
        ItemService::new(Arc::new(MemoryStore::new()))
    }

    fn input(title: &str, item_type: &str) -> ItemInput {
        ItemInput {
            title: title.to_string(),
            item_type: item_type.to_string(),
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_create_trims_and_stamps() {
        let service = service();
        let mut draft = input("  Dune  ", "book");
        draft.creator = Some("   ".to_string());
        draft.reading_status = Some("read".to_string());

        let item = service.create("owner", draft).await.unwrap();
        assert_eq!(item.title, "Dune");
        assert_eq!(item.creator, None);
        assert_eq!(item.reading_status, ReadingStatus::Read);
        assert!(item.read_at.is_some());
    }

    #[tokio::test]
    async fn test_create_rejects_missing_title() {
        let result = service().create("owner", input(" ", "book")).await;
        assert!(matches!(result, Err(Error::Validation(_))));
    }

    #[tokio::test]
    async fn test_update_patch_keeps_untouched_fields() {
        let service = service();
        let mut draft = input("Dune", "book");
        draft.genre = Some("SF".to_string());
        draft.page_count = Some(412);
        let item = service.create("owner", draft).await.unwrap();

        let patch: ItemPatch =
            serde_json::from_str(r#"{"reading_status": "reading", "current_page": 900}"#).unwrap();
        let updated = service.update("owner", item.id, patch).await.unwrap();

        assert_eq!(updated.genre.as_deref(), Some("SF"));
        assert_eq!(updated.reading_status, ReadingStatus::Reading);
        assert_eq!(updated.current_page, Some(412));
        assert_eq!(updated.created_at, item.created_at);
    }

    #[tokio::test]
    async fn test_changing_type_resets_reading_status() {
        let service = service();
        let mut draft = input("Dune", "book");
        draft.reading_status = Some("read".to_string());
        let item = service.create("owner", draft).await.unwrap();

        let patch: ItemPatch = serde_json::from_str(r#"{"type": "movie"}"#).unwrap();
        let updated = service.update("owner", item.id, patch).await.unwrap();
        assert_eq!(updated.item_type, ItemType::Movie);
        assert_eq!(updated.reading_status, ReadingStatus::None);
        assert_eq!(updated.read_at, None);
    }

    #[tokio::test]
    async fn test_other_owner_cannot_update() {
        let service = service();
        let item = service.create("owner", input("Dune", "book")).await.unwrap();
        let result = service.update("intruder", item.id, ItemPatch::default()).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
