//! Shelf layout and placement service

use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error as ThisError;
use tracing::{info, warn};
use uuid::Uuid;

use libris_common::isbn;
use libris_common::layout::default_layout;
use libris_common::models::{
    ItemInput, ItemPlacement, LayoutSlotInput, LayoutUpdate, ScanOutcome, ScanStatus, Shelf,
    ShelfDetail, ShelfSummary,
};
use libris_common::validation::{normalize_text, required_text, sanitize_image, MAX_SHELF_PHOTO_BYTES};
use libris_common::{time, uuid_utils, Error, Result};

use crate::services::catalog::{isbn_query, CatalogError, CatalogLookup, CatalogMetadata};
use crate::services::items::ItemService;
use crate::store::Store;

/// Failure of a barcode scan: either the library or the catalog
#[derive(Debug, ThisError)]
pub enum ScanError {
    #[error(transparent)]
    Library(#[from] Error),

    #[error(transparent)]
    Catalog(#[from] CatalogError),
}

/// Shelf metadata as submitted on create and update
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ShelfInput {
    pub name: String,
    pub description: Option<String>,
    pub photo_url: String,
}

struct ShelfFields {
    name: String,
    description: Option<String>,
    photo_url: String,
}

fn validate_shelf(input: ShelfInput) -> Result<ShelfFields> {
    let name = required_text("name", &input.name)?;
    let photo = required_text("photo_url", &input.photo_url)?;
    Ok(ShelfFields {
        name,
        description: normalize_text(input.description),
        photo_url: sanitize_image("photo_url", &photo, MAX_SHELF_PHOTO_BYTES)?,
    })
}

/// Draft for a book created from a scanned barcode
fn scanned_book(meta: CatalogMetadata, scanned: &str) -> ItemInput {
    let code = isbn::compact(scanned);
    let (scanned13, scanned10) = if code.len() == 13 {
        (Some(code), None)
    } else {
        (None, Some(code))
    };

    ItemInput {
        title: meta.title,
        creator: meta.creator,
        item_type: "book".to_string(),
        release_year: meta.release_year,
        page_count: meta.page_count,
        isbn13: meta.isbn13.or(scanned13),
        isbn10: meta.isbn10.or(scanned10),
        description: meta.description,
        cover_image: meta.cover_image,
        genre: meta.genre,
        google_volume_id: meta.google_volume_id,
        ..Default::default()
    }
}

#[derive(Clone)]
pub struct ShelfService {
    store: Arc<dyn Store>,
    items: ItemService,
    catalog: Arc<dyn CatalogLookup>,
}

impl ShelfService {
    pub fn new(store: Arc<dyn Store>, items: ItemService, catalog: Arc<dyn CatalogLookup>) -> Self {
        Self {
            store,
            items,
            catalog,
        }
    }

    /// Create a shelf with one full-bleed slot
    pub async fn create(&self, owner: &str, input: ShelfInput) -> Result<ShelfDetail> {
        let fields = validate_shelf(input)?;
        let now = time::now();
        let shelf = Shelf {
            id: uuid_utils::generate(),
            owner_id: owner.to_string(),
            name: fields.name,
            description: fields.description,
            photo_url: fields.photo_url,
            created_at: now,
            updated_at: now,
        };

        self.store.insert_shelf(&shelf, &default_layout(shelf.id)).await?;
        info!(shelf_id = %shelf.id, name = %shelf.name, "Shelf created");
        self.store.get_shelf(owner, shelf.id).await
    }

    pub async fn list(&self, owner: &str) -> Result<Vec<ShelfSummary>> {
        self.store.list_shelves(owner).await
    }

    pub async fn get(&self, owner: &str, id: Uuid) -> Result<ShelfDetail> {
        self.store.get_shelf(owner, id).await
    }

    pub async fn update(&self, owner: &str, id: Uuid, input: ShelfInput) -> Result<ShelfDetail> {
        let fields = validate_shelf(input)?;
        let mut shelf = self.store.get_shelf(owner, id).await?.shelf;
        shelf.name = fields.name;
        shelf.description = fields.description;
        shelf.photo_url = fields.photo_url;
        shelf.updated_at = time::now();

        self.store.update_shelf(&shelf).await?;
        self.store.get_shelf(owner, id).await
    }

    pub async fn delete(&self, owner: &str, id: Uuid) -> Result<()> {
        self.store.delete_shelf(owner, id).await?;
        info!(shelf_id = %id, "Shelf deleted");
        Ok(())
    }

    /// Replace the layout; items in removed slots become unplaced
    pub async fn update_layout(
        &self,
        owner: &str,
        id: Uuid,
        slots: &[LayoutSlotInput],
    ) -> Result<LayoutUpdate> {
        let displaced = self.store.replace_layout(owner, id, slots, time::now()).await?;
        if !displaced.is_empty() {
            info!(
                shelf_id = %id,
                displaced = displaced.len(),
                "Layout update displaced placed items"
            );
        }

        Ok(LayoutUpdate {
            shelf: self.store.get_shelf(owner, id).await?,
            displaced,
        })
    }

    pub async fn assign(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
    ) -> Result<ItemPlacement> {
        self.store
            .assign_item(owner, shelf_id, slot_id, item_id, time::now())
            .await
    }

    pub async fn remove(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        item_id: Uuid,
    ) -> Result<ItemPlacement> {
        self.store
            .remove_item(owner, shelf_id, slot_id, item_id, time::now())
            .await
    }

    /// Place the item behind a scanned ISBN into a slot
    ///
    /// An unknown ISBN creates a book from the first catalog result.
    pub async fn scan_and_assign(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slot_id: Uuid,
        raw_isbn: &str,
    ) -> std::result::Result<ScanOutcome, ScanError> {
        let keys = isbn::lookup_keys(raw_isbn);
        if keys.is_empty() {
            return Err(Error::validation("isbn is required").into());
        }

        let shelf = self.store.get_shelf(owner, shelf_id).await?;
        if shelf.layout.slot(slot_id).is_none() {
            return Err(Error::not_found(format!("slot {} on shelf {}", slot_id, shelf_id)).into());
        }

        if let Some(item) = self.store.find_item_by_isbn(owner, &keys).await? {
            let current = shelf.placements.iter().find(|p| p.item.id == item.id);
            if let Some(placed) = current.filter(|p| p.placement.slot_id == Some(slot_id)) {
                return Ok(ScanOutcome {
                    status: ScanStatus::Present,
                    item,
                    placement: placed.placement.clone(),
                });
            }

            let placement = self.assign(owner, shelf_id, slot_id, item.id).await?;
            let item = self.store.get_item(owner, item.id).await?;
            info!(item_id = %item.id, shelf_id = %shelf_id, "Scanned item moved");
            return Ok(ScanOutcome {
                status: ScanStatus::Moved,
                item,
                placement,
            });
        }

        let results = self.catalog.search_books(&isbn_query(raw_isbn)).await.map_err(|e| {
            warn!(isbn = %raw_isbn, error = %e, "Catalog lookup for scanned ISBN failed");
            e
        })?;
        let Some(meta) = results.into_iter().next() else {
            return Err(CatalogError::NotFound(raw_isbn.to_string()).into());
        };

        let created = self.items.create(owner, scanned_book(meta, raw_isbn)).await?;
        let placement = self.assign(owner, shelf_id, slot_id, created.id).await?;
        let item = self.store.get_item(owner, created.id).await?;
        info!(item_id = %item.id, shelf_id = %shelf_id, "Scanned item created");
        Ok(ScanOutcome {
            status: ScanStatus::Created,
            item,
            placement,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::CatalogResult;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    const OWNER: &str = "owner";

    #[derive(Default)]
    struct FakeCatalog {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CatalogLookup for FakeCatalog {
        async fn search_books(&self, query: &str) -> CatalogResult<Vec<CatalogMetadata>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if query == "isbn:9780306406157" {
                Ok(vec![CatalogMetadata {
                    title: "Scanned Book".to_string(),
                    creator: Some("A. Author".to_string()),
                    isbn13: Some("9780306406157".to_string()),
                    ..Default::default()
                }])
            } else {
                Err(CatalogError::NotFound(query.to_string()))
            }
        }
    }

    fn setup() -> (ShelfService, ItemService, Arc<FakeCatalog>) {
        let store: Arc<dyn Store> = Arc::new(MemoryStore::new());
        let items = ItemService::new(store.clone());
        let catalog = Arc::new(FakeCatalog::default());
        let shelves = ShelfService::new(store, items.clone(), catalog.clone());
        (shelves, items, catalog)
    }

    fn shelf_input(name: &str) -> ShelfInput {
        ShelfInput {
            name: name.to_string(),
            description: None,
            photo_url: "https://example.com/shelf.jpg".to_string(),
        }
    }

    fn book(title: &str) -> ItemInput {
        ItemInput {
            title: title.to_string(),
            item_type: "book".to_string(),
            ..Default::default()
        }
    }

    fn slot(row: i64, col: i64, x: (f64, f64)) -> LayoutSlotInput {
        LayoutSlotInput {
            row_index: row,
            col_index: col,
            x_start: x.0,
            x_end: x.1,
            y_start: 0.0,
            y_end: 1.0,
        }
    }

    #[tokio::test]
    async fn test_create_shelf_has_one_full_slot() {
        let (shelves, _, _) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        assert_eq!(shelf.layout.slots.len(), 1);
        let s = &shelf.layout.slots[0];
        assert_eq!((s.x_start, s.x_end, s.y_start, s.y_end), (0.0, 1.0, 0.0, 1.0));
    }

    #[tokio::test]
    async fn test_create_shelf_rejects_bad_photo() {
        let (shelves, _, _) = setup();
        let mut input = shelf_input("Hall");
        input.photo_url = "http://example.com/shelf.jpg".to_string();
        assert!(matches!(
            shelves.create(OWNER, input).await,
            Err(Error::Validation(_))
        ));
        assert!(matches!(
            shelves.create(OWNER, shelf_input("  ")).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_assign_then_displace_by_layout_edit() {
        let (shelves, items, _) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let slot_id = shelf.layout.slots[0].id;
        let a = items.create(OWNER, book("A")).await.unwrap();

        shelves.assign(OWNER, shelf.shelf.id, slot_id, a.id).await.unwrap();
        let detail = shelves.get(OWNER, shelf.shelf.id).await.unwrap();
        assert_eq!(detail.placements.len(), 1);
        assert!(detail.unplaced.is_empty());

        let update = shelves
            .update_layout(OWNER, shelf.shelf.id, &[slot(1, 0, (0.0, 0.5)), slot(1, 1, (0.5, 1.0))])
            .await
            .unwrap();
        assert_eq!(update.displaced.len(), 1);
        assert_eq!(update.displaced[0].item_id, a.id);
        assert!(update.shelf.placements.is_empty());
        assert_eq!(update.shelf.unplaced[0].item.id, a.id);
        assert!(update.shelf.layout.slots.iter().all(|s| s.id != slot_id));
    }

    #[tokio::test]
    async fn test_rejected_layout_keeps_previous() {
        let (shelves, _, _) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let result = shelves
            .update_layout(OWNER, shelf.shelf.id, &[slot(0, 0, (0.0, 0.5)), slot(0, 1, (0.5, 1.5))])
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));
        assert_eq!(shelves.get(OWNER, shelf.shelf.id).await.unwrap().layout, shelf.layout);
    }

    #[tokio::test]
    async fn test_scan_present_writes_nothing() {
        let (shelves, items, catalog) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let slot_id = shelf.layout.slots[0].id;
        let mut input = book("Known");
        input.isbn10 = Some("0306406152".to_string());
        let known = items.create(OWNER, input).await.unwrap();
        let placed = shelves.assign(OWNER, shelf.shelf.id, slot_id, known.id).await.unwrap();

        // The 13-digit barcode of the same book
        let outcome = shelves
            .scan_and_assign(OWNER, shelf.shelf.id, slot_id, "978-0-306-40615-7")
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Present);
        assert_eq!(outcome.placement, placed);
        assert_eq!(catalog.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scan_moves_existing_item() {
        let (shelves, items, _) = setup();
        let hall = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let study = shelves.create(OWNER, shelf_input("Study")).await.unwrap();
        let mut input = book("Known");
        input.isbn13 = Some("9780306406157".to_string());
        let known = items.create(OWNER, input).await.unwrap();
        shelves
            .assign(OWNER, hall.shelf.id, hall.layout.slots[0].id, known.id)
            .await
            .unwrap();

        let target = study.layout.slots[0].id;
        let outcome = shelves
            .scan_and_assign(OWNER, study.shelf.id, target, "9780306406157")
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Moved);
        assert_eq!(outcome.placement.slot_id, Some(target));
        assert_eq!(outcome.item.shelf_placement.unwrap().shelf_name, "Study");
        assert!(shelves.get(OWNER, hall.shelf.id).await.unwrap().placements.is_empty());
    }

    #[tokio::test]
    async fn test_scan_creates_from_catalog() {
        let (shelves, _, _) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let slot_id = shelf.layout.slots[0].id;

        let outcome = shelves
            .scan_and_assign(OWNER, shelf.shelf.id, slot_id, "9780306406157")
            .await
            .unwrap();
        assert_eq!(outcome.status, ScanStatus::Created);
        assert_eq!(outcome.item.title, "Scanned Book");
        assert_eq!(outcome.placement.slot_id, Some(slot_id));
    }

    #[tokio::test]
    async fn test_scan_unknown_isbn_is_not_found() {
        let (shelves, _, _) = setup();
        let shelf = shelves.create(OWNER, shelf_input("Hall")).await.unwrap();
        let slot_id = shelf.layout.slots[0].id;

        let result = shelves.scan_and_assign(OWNER, shelf.shelf.id, slot_id, "0000000000").await;
        assert!(matches!(
            result,
            Err(ScanError::Catalog(CatalogError::NotFound(_)))
        ));
        let blank = shelves.scan_and_assign(OWNER, shelf.shelf.id, slot_id, "  ").await;
        assert!(matches!(
            blank,
            Err(ScanError::Library(Error::Validation(_)))
        ));
    }
}
