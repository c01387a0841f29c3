//! SQLite repository
//!
//! Uuids are stored as TEXT, timestamps through sqlx's chrono encoding. The
//! cached shelf placement is a JSON column on `items`, rewritten inside the
//! same transaction as the placement change that invalidated it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteArguments, SqliteRow};
use sqlx::{Row, Sqlite, SqliteConnection, SqlitePool};
use std::collections::HashMap;
use tracing::debug;
use uuid::Uuid;

use libris_common::layout::plan_layout;
use libris_common::models::{
    Item, ItemFilter, ItemPlacement, ItemType, LayoutSlotInput, ReadingStatus, Shelf, ShelfColumn,
    ShelfDetail, ShelfLayout, ShelfPlacementRef, ShelfRow, ShelfSlot, ShelfSummary,
};
use libris_common::{uuid_utils, Error, Result};

use super::{assemble_detail, Store};

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const ITEM_COLUMNS: &str = "id, owner_id, title, creator, item_type, release_year, page_count, \
     current_page, isbn13, isbn10, description, cover_image, platform, format, genre, rating, \
     google_volume_id, series_name, volume_number, total_volumes, notes, reading_status, read_at, \
     shelf_placement, created_at, updated_at, title_folded, creator_folded";

/// sqlx-backed repository
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Wrap a pool whose schema has already been created
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

}

/// Bind `?1..?27` in column order, leaving out the placement cache
///
/// The folded columns hold Rust's Unicode lowercasing; SQLite's `lower()`
/// only folds ASCII.
fn bind_item<'q>(query: SqliteQuery<'q>, item: &'q Item) -> SqliteQuery<'q> {
    query
        .bind(item.id.to_string())
        .bind(&item.owner_id)
        .bind(&item.title)
        .bind(&item.creator)
        .bind(item.item_type.as_str())
        .bind(item.release_year)
        .bind(item.page_count)
        .bind(item.current_page)
        .bind(&item.isbn13)
        .bind(&item.isbn10)
        .bind(&item.description)
        .bind(&item.cover_image)
        .bind(&item.platform)
        .bind(&item.format)
        .bind(&item.genre)
        .bind(item.rating)
        .bind(&item.google_volume_id)
        .bind(&item.series_name)
        .bind(item.volume_number)
        .bind(item.total_volumes)
        .bind(&item.notes)
        .bind(item.reading_status.as_str())
        .bind(item.read_at)
        .bind(item.created_at)
        .bind(item.updated_at)
        .bind(item.title.to_lowercase())
        .bind(item.creator.as_ref().map(|c| c.to_lowercase()))
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> Error {
    Error::Internal(format!("corrupt {}: {}", what, err))
}

fn item_from_row(row: &SqliteRow) -> Result<Item> {
    let item_type: String = row.try_get("item_type")?;
    let reading_status: String = row.try_get("reading_status")?;
    let shelf_placement = row
        .try_get::<Option<String>, _>("shelf_placement")?
        .map(|json| serde_json::from_str::<ShelfPlacementRef>(&json))
        .transpose()
        .map_err(|e| corrupt("placement cache", e))?;

    Ok(Item {
        id: uuid_utils::parse_stored(row.try_get("id")?)?,
        owner_id: row.try_get("owner_id")?,
        title: row.try_get("title")?,
        creator: row.try_get("creator")?,
        item_type: ItemType::parse(&item_type).map_err(|e| corrupt("item type", e))?,
        release_year: row.try_get("release_year")?,
        page_count: row.try_get("page_count")?,
        current_page: row.try_get("current_page")?,
        isbn13: row.try_get("isbn13")?,
        isbn10: row.try_get("isbn10")?,
        description: row.try_get("description")?,
        cover_image: row.try_get("cover_image")?,
        platform: row.try_get("platform")?,
        format: row.try_get("format")?,
        genre: row.try_get("genre")?,
        rating: row.try_get("rating")?,
        google_volume_id: row.try_get("google_volume_id")?,
        series_name: row.try_get("series_name")?,
        volume_number: row.try_get("volume_number")?,
        total_volumes: row.try_get("total_volumes")?,
        notes: row.try_get("notes")?,
        reading_status: ReadingStatus::parse(&reading_status)
            .map_err(|e| corrupt("reading status", e))?,
        read_at: row.try_get("read_at")?,
        shelf_placement,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn shelf_from_row(row: &SqliteRow) -> Result<Shelf> {
    Ok(Shelf {
        id: uuid_utils::parse_stored(row.try_get("id")?)?,
        owner_id: row.try_get("owner_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        photo_url: row.try_get("photo_url")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn placement_from_row(row: &SqliteRow) -> Result<ItemPlacement> {
    let slot_id: Option<String> = row.try_get("slot_id")?;
    Ok(ItemPlacement {
        id: uuid_utils::parse_stored(row.try_get("id")?)?,
        item_id: uuid_utils::parse_stored(row.try_get("item_id")?)?,
        shelf_id: uuid_utils::parse_stored(row.try_get("shelf_id")?)?,
        slot_id: slot_id.as_deref().map(uuid_utils::parse_stored).transpose()?,
        created_at: row.try_get("created_at")?,
        placed_at: row.try_get("placed_at")?,
    })
}

async fn owned_shelf(conn: &mut SqliteConnection, owner: &str, id: Uuid) -> Result<Shelf> {
    let row = sqlx::query("SELECT * FROM shelves WHERE id = ?1 AND owner_id = ?2")
        .bind(id.to_string())
        .bind(owner)
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::not_found(format!("shelf {}", id)))?;
    shelf_from_row(&row)
}

async fn load_layout(conn: &mut SqliteConnection, shelf_id: Uuid) -> Result<ShelfLayout> {
    let shelf_key = shelf_id.to_string();

    let rows = sqlx::query("SELECT * FROM shelf_rows WHERE shelf_id = ? ORDER BY row_index")
        .bind(&shelf_key)
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| -> Result<ShelfRow> {
            Ok(ShelfRow {
                id: uuid_utils::parse_stored(row.try_get("id")?)?,
                shelf_id,
                row_index: row.try_get("row_index")?,
                y_start: row.try_get("y_start")?,
                y_end: row.try_get("y_end")?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let columns = sqlx::query(
        r#"
        SELECT c.* FROM shelf_columns c
        JOIN shelf_rows r ON r.id = c.row_id
        WHERE r.shelf_id = ?
        ORDER BY r.row_index, c.col_index
        "#,
    )
    .bind(&shelf_key)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|row| -> Result<ShelfColumn> {
        Ok(ShelfColumn {
            id: uuid_utils::parse_stored(row.try_get("id")?)?,
            row_id: uuid_utils::parse_stored(row.try_get("row_id")?)?,
            col_index: row.try_get("col_index")?,
            x_start: row.try_get("x_start")?,
            x_end: row.try_get("x_end")?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    let slots = sqlx::query(
        "SELECT * FROM shelf_slots WHERE shelf_id = ? ORDER BY row_index, col_index",
    )
    .bind(&shelf_key)
    .fetch_all(&mut *conn)
    .await?
    .iter()
    .map(|row| -> Result<ShelfSlot> {
        Ok(ShelfSlot {
            id: uuid_utils::parse_stored(row.try_get("id")?)?,
            shelf_id,
            row_id: uuid_utils::parse_stored(row.try_get("row_id")?)?,
            column_id: uuid_utils::parse_stored(row.try_get("column_id")?)?,
            row_index: row.try_get("row_index")?,
            col_index: row.try_get("col_index")?,
            x_start: row.try_get("x_start")?,
            x_end: row.try_get("x_end")?,
            y_start: row.try_get("y_start")?,
            y_end: row.try_get("y_end")?,
        })
    })
    .collect::<Result<Vec<_>>>()?;

    Ok(ShelfLayout { rows, columns, slots })
}

/// Upsert every row, column and slot of `layout`
async fn write_layout(conn: &mut SqliteConnection, layout: &ShelfLayout) -> Result<()> {
    for row in &layout.rows {
        sqlx::query(
            r#"
            INSERT INTO shelf_rows (id, shelf_id, row_index, y_start, y_end)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                y_start = excluded.y_start,
                y_end = excluded.y_end
            "#,
        )
        .bind(row.id.to_string())
        .bind(row.shelf_id.to_string())
        .bind(row.row_index)
        .bind(row.y_start)
        .bind(row.y_end)
        .execute(&mut *conn)
        .await?;
    }

    for column in &layout.columns {
        sqlx::query(
            r#"
            INSERT INTO shelf_columns (id, row_id, col_index, x_start, x_end)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                x_start = excluded.x_start,
                x_end = excluded.x_end
            "#,
        )
        .bind(column.id.to_string())
        .bind(column.row_id.to_string())
        .bind(column.col_index)
        .bind(column.x_start)
        .bind(column.x_end)
        .execute(&mut *conn)
        .await?;
    }

    for slot in &layout.slots {
        sqlx::query(
            r#"
            INSERT INTO shelf_slots (
                id, shelf_id, row_id, column_id, row_index, col_index,
                x_start, x_end, y_start, y_end
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                x_start = excluded.x_start,
                x_end = excluded.x_end,
                y_start = excluded.y_start,
                y_end = excluded.y_end
            "#,
        )
        .bind(slot.id.to_string())
        .bind(slot.shelf_id.to_string())
        .bind(slot.row_id.to_string())
        .bind(slot.column_id.to_string())
        .bind(slot.row_index)
        .bind(slot.col_index)
        .bind(slot.x_start)
        .bind(slot.x_end)
        .bind(slot.y_start)
        .bind(slot.y_end)
        .execute(&mut *conn)
        .await?;
    }

    Ok(())
}

/// Rewrite the placement cache of one item from its current placement
async fn refresh_cache(conn: &mut SqliteConnection, item_id: Uuid) -> Result<()> {
    let row = sqlx::query(
        r#"
        SELECT p.shelf_id, s.name AS shelf_name, p.slot_id, sl.row_index, sl.col_index
        FROM item_placements p
        JOIN shelves s ON s.id = p.shelf_id
        LEFT JOIN shelf_slots sl ON sl.id = p.slot_id
        WHERE p.item_id = ?
        "#,
    )
    .bind(item_id.to_string())
    .fetch_optional(&mut *conn)
    .await?;

    let cache = match row {
        Some(row) => {
            let slot_id: Option<String> = row.try_get("slot_id")?;
            Some(ShelfPlacementRef {
                shelf_id: uuid_utils::parse_stored(row.try_get("shelf_id")?)?,
                shelf_name: row.try_get("shelf_name")?,
                slot_id: slot_id.as_deref().map(uuid_utils::parse_stored).transpose()?,
                row_index: row.try_get("row_index")?,
                col_index: row.try_get("col_index")?,
            })
        }
        None => None,
    };
    let json = cache
        .map(|c| serde_json::to_string(&c))
        .transpose()
        .map_err(|e| Error::Internal(format!("placement cache encoding failed: {}", e)))?;

    sqlx::query("UPDATE items SET shelf_placement = ? WHERE id = ?")
        .bind(json)
        .bind(item_id.to_string())
        .execute(&mut *conn)
        .await?;
    Ok(())
}

async fn placement_for_item(conn: &mut SqliteConnection, item_id: Uuid) -> Result<ItemPlacement> {
    let row = sqlx::query("SELECT * FROM item_placements WHERE item_id = ?")
        .bind(item_id.to_string())
        .fetch_optional(&mut *conn)
        .await?
        .ok_or_else(|| Error::Internal(format!("placement for item {} vanished", item_id)))?;
    placement_from_row(&row)
}

fn uuid_list(ids: &[Uuid]) -> Vec<String> {
    ids.iter().map(Uuid::to_string).collect()
}

#[async_trait]
impl Store for SqliteStore {
    async fn insert_item(&self, item: &Item) -> Result<()> {
        let sql = format!(
            "INSERT INTO items ({}) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, \
             ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, NULL, ?24, ?25, \
             ?26, ?27)",
            ITEM_COLUMNS
        );
        bind_item(sqlx::query(&sql), item)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_item(&self, owner: &str, id: Uuid) -> Result<Item> {
        let row = sqlx::query("SELECT * FROM items WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found(format!("item {}", id)))?;
        item_from_row(&row)
    }

    async fn list_items(&self, owner: &str, filter: &ItemFilter) -> Result<Vec<Item>> {
        // Status filtering mirrors ItemFilter::matches
        let rows = sqlx::query(
            r#"
            SELECT * FROM items
            WHERE owner_id = ?1
              AND (?2 IS NULL OR item_type = ?2)
              AND (?3 IS NULL
                   OR (item_type = 'book' AND reading_status = ?3)
                   OR (item_type <> 'book' AND (?2 IS NOT NULL OR ?3 = 'none')))
              AND (?4 IS NULL
                   OR instr(title_folded, ?4) > 0
                   OR instr(coalesce(creator_folded, ''), ?4) > 0
                   OR instr(lower(coalesce(isbn13, '')), ?4) > 0
                   OR instr(lower(coalesce(isbn10, '')), ?4) > 0)
              AND (?5 IS NULL
                   OR id IN (SELECT item_id FROM item_placements WHERE shelf_id = ?5))
            ORDER BY title_folded, created_at
            "#,
        )
        .bind(owner)
        .bind(filter.item_type.map(|t| t.as_str()))
        .bind(filter.reading_status.map(|s| s.as_str()))
        .bind(filter.query.as_deref())
        .bind(filter.shelf_id.map(|id| id.to_string()))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(item_from_row).collect()
    }

    async fn find_item_by_isbn(&self, owner: &str, keys: &[String]) -> Result<Option<Item>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let placeholders: Vec<String> = (0..keys.len()).map(|i| format!("?{}", i + 2)).collect();
        let list = placeholders.join(", ");
        let sql = format!(
            "SELECT * FROM items WHERE owner_id = ?1 AND (isbn13 IN ({list}) OR isbn10 IN ({list})) \
             ORDER BY created_at LIMIT 1"
        );

        let mut query = sqlx::query(&sql).bind(owner);
        for key in keys {
            query = query.bind(key.as_str());
        }
        query
            .fetch_optional(&self.pool)
            .await?
            .as_ref()
            .map(item_from_row)
            .transpose()
    }

    async fn update_item(&self, item: &Item) -> Result<Item> {
        let result = bind_item(
            sqlx::query(
                r#"
                UPDATE items SET
                    title = ?3, creator = ?4, item_type = ?5, release_year = ?6,
                    page_count = ?7, current_page = ?8, isbn13 = ?9, isbn10 = ?10,
                    description = ?11, cover_image = ?12, platform = ?13, format = ?14,
                    genre = ?15, rating = ?16, google_volume_id = ?17, series_name = ?18,
                    volume_number = ?19, total_volumes = ?20, notes = ?21,
                    reading_status = ?22, read_at = ?23, updated_at = ?25,
                    title_folded = ?26, creator_folded = ?27
                WHERE id = ?1 AND owner_id = ?2
                "#,
            ),
            item,
        )
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("item {}", item.id)));
        }
        self.get_item(&item.owner_id, item.id).await
    }

    async fn delete_item(&self, owner: &str, id: Uuid) -> Result<()> {
        // item_placements cascades
        let result = sqlx::query("DELETE FROM items WHERE id = ?1 AND owner_id = ?2")
            .bind(id.to_string())
            .bind(owner)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("item {}", id)));
        }
        Ok(())
    }

    async fn insert_shelf(&self, shelf: &Shelf, layout: &ShelfLayout) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        sqlx::query(
            r#"
            INSERT INTO shelves (id, owner_id, name, description, photo_url, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(shelf.id.to_string())
        .bind(&shelf.owner_id)
        .bind(&shelf.name)
        .bind(&shelf.description)
        .bind(&shelf.photo_url)
        .bind(shelf.created_at)
        .bind(shelf.updated_at)
        .execute(&mut *tx)
        .await?;
        write_layout(&mut tx, layout).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn list_shelves(&self, owner: &str) -> Result<Vec<ShelfSummary>> {
        let rows = sqlx::query(
            r#"
            SELECT s.*,
                (SELECT COUNT(*) FROM shelf_slots WHERE shelf_id = s.id) AS slot_count,
                (SELECT COUNT(*) FROM item_placements WHERE shelf_id = s.id) AS item_count
            FROM shelves s
            WHERE s.owner_id = ?
            "#,
        )
        .bind(owner)
        .fetch_all(&self.pool)
        .await?;

        let mut shelves = rows
            .iter()
            .map(|row| -> Result<ShelfSummary> {
                let slot_count: i64 = row.try_get("slot_count")?;
                let item_count: i64 = row.try_get("item_count")?;
                Ok(ShelfSummary {
                    shelf: shelf_from_row(row)?,
                    slot_count: slot_count.max(0) as usize,
                    item_count: item_count.max(0) as usize,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        shelves.sort_by_key(|s| s.shelf.name.to_lowercase());
        Ok(shelves)
    }

    async fn get_shelf(&self, owner: &str, id: Uuid) -> Result<ShelfDetail> {
        let mut conn = self.pool.acquire().await?;
        let shelf = owned_shelf(&mut conn, owner, id).await?;
        let layout = load_layout(&mut conn, id).await?;

        let placements = sqlx::query("SELECT * FROM item_placements WHERE shelf_id = ?")
            .bind(id.to_string())
            .fetch_all(&mut *conn)
            .await?
            .iter()
            .map(placement_from_row)
            .collect::<Result<Vec<_>>>()?;

        let items = sqlx::query(
            r#"
            SELECT i.* FROM items i
            JOIN item_placements p ON p.item_id = i.id
            WHERE p.shelf_id = ?
            "#,
        )
        .bind(id.to_string())
        .fetch_all(&mut *conn)
        .await?
        .iter()
        .map(|row| item_from_row(row).map(|item| (item.id, item)))
        .collect::<Result<HashMap<_, _>>>()?;

        Ok(assemble_detail(shelf, layout, placements, &items))
    }

    async fn update_shelf(&self, shelf: &Shelf) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        let result = sqlx::query(
            r#"
            UPDATE shelves SET name = ?3, description = ?4, photo_url = ?5, updated_at = ?6
            WHERE id = ?1 AND owner_id = ?2
            "#,
        )
        .bind(shelf.id.to_string())
        .bind(&shelf.owner_id)
        .bind(&shelf.name)
        .bind(&shelf.description)
        .bind(&shelf.photo_url)
        .bind(shelf.updated_at)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::not_found(format!("shelf {}", shelf.id)));
        }

        let item_ids: Vec<String> =
            sqlx::query_scalar("SELECT item_id FROM item_placements WHERE shelf_id = ?")
                .bind(shelf.id.to_string())
                .fetch_all(&mut *tx)
                .await?;
        for item_id in item_ids {
            refresh_cache(&mut tx, uuid_utils::parse_stored(&item_id)?).await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn delete_shelf(&self, owner: &str, id: Uuid) -> Result<()> {
        let mut tx = self.pool.begin().await?;
        owned_shelf(&mut tx, owner, id).await?;

        sqlx::query(
            r#"
            UPDATE items SET shelf_placement = NULL
            WHERE id IN (SELECT item_id FROM item_placements WHERE shelf_id = ?)
            "#,
        )
        .bind(id.to_string())
        .execute(&mut *tx)
        .await?;

        // Layout and placements cascade
        sqlx::query("DELETE FROM shelves WHERE id = ?")
            .bind(id.to_string())
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn replace_layout(
        &self,
        owner: &str,
        shelf_id: Uuid,
        slots: &[LayoutSlotInput],
        now: DateTime<Utc>,
    ) -> Result<Vec<ItemPlacement>> {
        let mut tx = self.pool.begin().await?;
        owned_shelf(&mut tx, owner, shelf_id).await?;
        let existing = load_layout(&mut tx, shelf_id).await?;
        let plan = plan_layout(shelf_id, &existing, slots)?;

        let mut displaced = Vec::new();
        for slot_id in uuid_list(&plan.removed_slot_ids) {
            let rows = sqlx::query("SELECT * FROM item_placements WHERE slot_id = ?")
                .bind(&slot_id)
                .fetch_all(&mut *tx)
                .await?;
            for row in &rows {
                let mut placement = placement_from_row(row)?;
                placement.slot_id = None;
                placement.placed_at = now;
                displaced.push(placement);
            }
            sqlx::query("UPDATE item_placements SET slot_id = NULL, placed_at = ? WHERE slot_id = ?")
                .bind(now)
                .bind(&slot_id)
                .execute(&mut *tx)
                .await?;
            sqlx::query("DELETE FROM shelf_slots WHERE id = ?")
                .bind(&slot_id)
                .execute(&mut *tx)
                .await?;
        }
        for column_id in uuid_list(&plan.removed_column_ids) {
            sqlx::query("DELETE FROM shelf_columns WHERE id = ?")
                .bind(column_id)
                .execute(&mut *tx)
                .await?;
        }
        for row_id in uuid_list(&plan.removed_row_ids) {
            sqlx::query("DELETE FROM shelf_rows WHERE id = ?")
                .bind(row_id)
                .execute(&mut *tx)
                .await?;
        }

        write_layout(&mut tx, &plan.layout).await?;
        sqlx::query("UPDATE shelves SET updated_at = ? WHERE id = ?")
            .bind(now)
            .bind(shelf_id.to_string())
            .execute(&mut *tx)
            .await?;
        for placement in &displaced {
            refresh_cache(&mut tx, placement.item_id).await?;
        }

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        owned_shelf(&mut tx, owner, shelf_id).await?;

        let slot: Option<String> =
            sqlx::query_scalar("SELECT id FROM shelf_slots WHERE id = ?1 AND shelf_id = ?2")
                .bind(slot_id.to_string())
                .bind(shelf_id.to_string())
                .fetch_optional(&mut *tx)
                .await?;
        if slot.is_none() {
            return Err(Error::not_found(format!("slot {} on shelf {}", slot_id, shelf_id)));
        }

        let item: Option<String> =
            sqlx::query_scalar("SELECT id FROM items WHERE id = ?1 AND owner_id = ?2")
                .bind(item_id.to_string())
                .bind(owner)
                .fetch_optional(&mut *tx)
                .await?;
        if item.is_none() {
            return Err(Error::not_found(format!("item {}", item_id)));
        }

        let incumbents: Vec<String> = sqlx::query_scalar(
            "SELECT item_id FROM item_placements WHERE slot_id = ?1 AND item_id <> ?2",
        )
        .bind(slot_id.to_string())
        .bind(item_id.to_string())
        .fetch_all(&mut *tx)
        .await?;
        sqlx::query(
            "UPDATE item_placements SET slot_id = NULL, placed_at = ?1 WHERE slot_id = ?2 AND item_id <> ?3",
        )
        .bind(now)
        .bind(slot_id.to_string())
        .bind(item_id.to_string())
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM item_placements WHERE item_id = ?")
            .bind(item_id.to_string())
            .execute(&mut *tx)
            .await?;

        let placement = ItemPlacement {
            id: uuid_utils::generate(),
            item_id,
            shelf_id,
            slot_id: Some(slot_id),
            created_at: now,
            placed_at: now,
        };
        sqlx::query(
            r#"
            INSERT INTO item_placements (id, item_id, shelf_id, slot_id, created_at, placed_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(placement.id.to_string())
        .bind(item_id.to_string())
        .bind(shelf_id.to_string())
        .bind(slot_id.to_string())
        .bind(placement.created_at)
        .bind(placement.placed_at)
        .execute(&mut *tx)
        .await?;

        for incumbent in incumbents {
            refresh_cache(&mut tx, uuid_utils::parse_stored(&incumbent)?).await?;
        }
        refresh_cache(&mut tx, item_id).await?;

        tx.commit().await?;
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
        let mut tx = self.pool.begin().await?;
        owned_shelf(&mut tx, owner, shelf_id).await?;

        let result = sqlx::query(
            r#"
            UPDATE item_placements SET slot_id = NULL, placed_at = ?4
            WHERE item_id = ?1 AND shelf_id = ?2 AND slot_id = ?3
            "#,
        )
        .bind(item_id.to_string())
        .bind(shelf_id.to_string())
        .bind(slot_id.to_string())
        .bind(now)
        .execute(&mut *tx)
        .await?;
        if result.rows_affected() == 0 {
            return Err(Error::SlotNotFound(format!(
                "item {} is not in slot {}",
                item_id, slot_id
            )));
        }

        let placement = placement_for_item(&mut tx, item_id).await?;
        refresh_cache(&mut tx, item_id).await?;
        tx.commit().await?;
        Ok(placement)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use libris_common::db;
    use libris_common::layout::default_layout;

    const OWNER: &str = "owner";

    async fn store() -> SqliteStore {
        SqliteStore::new(db::connect("sqlite::memory:").await.unwrap())
    }

    fn item(title: &str, isbn13: Option<&str>) -> Item {
        let now = Utc::now();
        Item {
            id: Uuid::new_v4(),
            owner_id: OWNER.to_string(),
            title: title.to_string(),
            creator: Some("Ursula K. Le Guin".to_string()),
            item_type: ItemType::Book,
            release_year: Some(1969),
            page_count: Some(304),
            current_page: None,
            isbn13: isbn13.map(str::to_string),
            isbn10: None,
            description: None,
            cover_image: None,
            platform: None,
            format: None,
            genre: None,
            rating: Some(5),
            google_volume_id: None,
            series_name: Some("Hainish Cycle".to_string()),
            volume_number: Some(4),
            total_volumes: None,
            notes: None,
            reading_status: ReadingStatus::Read,
            read_at: Some(now),
            shelf_placement: None,
            created_at: now,
            updated_at: now,
        }
    }

    async fn shelf(store: &SqliteStore, name: &str) -> (Shelf, Uuid) {
        let now = Utc::now();
        let shelf = Shelf {
            id: Uuid::new_v4(),
            owner_id: OWNER.to_string(),
            name: name.to_string(),
            description: Some("living room".to_string()),
            photo_url: "https://example.com/shelf.jpg".to_string(),
            created_at: now,
            updated_at: now,
        };
        let layout = default_layout(shelf.id);
        let slot_id = layout.slots[0].id;
        store.insert_shelf(&shelf, &layout).await.unwrap();
        (shelf, slot_id)
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
    async fn test_item_round_trip_through_columns() {
        let store = store().await;
        let book = item("The Left Hand of Darkness", Some("9780441478125"));
        store.insert_item(&book).await.unwrap();

        let loaded = store.get_item(OWNER, book.id).await.unwrap();
        assert_eq!(loaded.title, book.title);
        assert_eq!(loaded.reading_status, ReadingStatus::Read);
        assert_eq!(loaded.series_name.as_deref(), Some("Hainish Cycle"));
        assert!(loaded.shelf_placement.is_none());
        assert!(matches!(store.get_item("other", book.id).await, Err(Error::NotFound(_))));
    }

    #[tokio::test]
    async fn test_list_filters_and_sorts_by_title() {
        let store = store().await;
        store.insert_item(&item("b side", None)).await.unwrap();
        store.insert_item(&item("A Wizard of Earthsea", None)).await.unwrap();
        let mut game = item("Myst", None);
        game.item_type = ItemType::Game;
        game.reading_status = ReadingStatus::None;
        game.read_at = None;
        store.insert_item(&game).await.unwrap();

        let all = store.list_items(OWNER, &ItemFilter::default()).await.unwrap();
        let titles: Vec<&str> = all.iter().map(|i| i.title.as_str()).collect();
        assert_eq!(titles, vec!["A Wizard of Earthsea", "b side", "Myst"]);

        let none = ItemFilter {
            reading_status: Some(ReadingStatus::None),
            ..Default::default()
        };
        let shown = store.list_items(OWNER, &none).await.unwrap();
        assert_eq!(shown.len(), 1);
        assert_eq!(shown[0].title, "Myst");

        let query = ItemFilter {
            query: Some("wizard".to_string()),
            ..Default::default()
        };
        assert_eq!(store.list_items(OWNER, &query).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_search_and_sort_fold_non_ascii_like_memory_store() {
        let sqlite = store().await;
        let memory = crate::store::MemoryStore::new();
        let mut emile = item("ÉMILE Zola", None);
        emile.creator = Some("Ørsted".to_string());
        for it in [emile.clone(), item("emile", None), item("Zed", None)] {
            sqlite.insert_item(&it).await.unwrap();
            memory.insert_item(&it).await.unwrap();
        }

        let all = ItemFilter::default();
        let sqlite_titles: Vec<String> = sqlite
            .list_items(OWNER, &all)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        let memory_titles: Vec<String> = memory
            .list_items(OWNER, &all)
            .await
            .unwrap()
            .into_iter()
            .map(|i| i.title)
            .collect();
        assert_eq!(sqlite_titles, vec!["emile", "Zed", "ÉMILE Zola"]);
        assert_eq!(sqlite_titles, memory_titles);

        for needle in ["émile", "ørsted"] {
            let filter = ItemFilter {
                query: Some(needle.to_string()),
                ..Default::default()
            };
            let found = sqlite.list_items(OWNER, &filter).await.unwrap();
            assert_eq!(found.len(), 1, "{}", needle);
            assert_eq!(found[0].id, emile.id);
            assert_eq!(memory.list_items(OWNER, &filter).await.unwrap().len(), 1);
        }

        // Folded columns follow updates
        emile.title = "Ça ira".to_string();
        sqlite.update_item(&emile).await.unwrap();
        let filter = ItemFilter {
            query: Some("ça".to_string()),
            ..Default::default()
        };
        assert_eq!(sqlite.list_items(OWNER, &filter).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_find_by_isbn_matches_either_column() {
        let store = store().await;
        let mut book = item("Dune", Some("9780441172719"));
        book.isbn10 = Some("0441172717".to_string());
        store.insert_item(&book).await.unwrap();

        let keys = vec!["0441172717".to_string()];
        let found = store.find_item_by_isbn(OWNER, &keys).await.unwrap();
        assert_eq!(found.map(|i| i.id), Some(book.id));
        assert!(store
            .find_item_by_isbn("other", &keys)
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn test_update_keeps_placement_cache() {
        let store = store().await;
        let mut book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (s, slot_id) = shelf(&store, "Hall").await;
        store.assign_item(OWNER, s.id, slot_id, book.id, Utc::now()).await.unwrap();

        book.title = "Dune Messiah".to_string();
        let updated = store.update_item(&book).await.unwrap();
        assert_eq!(updated.title, "Dune Messiah");
        assert_eq!(updated.shelf_placement.map(|p| p.shelf_name).as_deref(), Some("Hall"));
    }

    #[tokio::test]
    async fn test_layout_replacement_displaces_items() {
        let store = store().await;
        let book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (s, slot_id) = shelf(&store, "Hall").await;
        store.assign_item(OWNER, s.id, slot_id, book.id, Utc::now()).await.unwrap();

        let displaced = store
            .replace_layout(
                OWNER,
                s.id,
                &[slot(1, 0, (0.0, 0.5)), slot(1, 1, (0.5, 1.0))],
                Utc::now(),
            )
            .await
            .unwrap();
        assert_eq!(displaced.len(), 1);
        assert_eq!(displaced[0].item_id, book.id);

        let detail = store.get_shelf(OWNER, s.id).await.unwrap();
        assert_eq!(detail.layout.slots.len(), 2);
        assert_eq!(detail.layout.rows.len(), 1);
        assert!(detail.placements.is_empty());
        assert_eq!(detail.unplaced.len(), 1);

        let cached = store.get_item(OWNER, book.id).await.unwrap().shelf_placement.unwrap();
        assert_eq!(cached.shelf_id, s.id);
        assert_eq!(cached.slot_id, None);
    }

    #[tokio::test]
    async fn test_layout_replacement_keeps_matching_slot() {
        let store = store().await;
        let book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (s, slot_id) = shelf(&store, "Hall").await;
        store.assign_item(OWNER, s.id, slot_id, book.id, Utc::now()).await.unwrap();

        let displaced = store
            .replace_layout(
                OWNER,
                s.id,
                &[slot(0, 0, (0.0, 0.5)), slot(0, 1, (0.5, 1.0))],
                Utc::now(),
            )
            .await
            .unwrap();
        assert!(displaced.is_empty());

        let detail = store.get_shelf(OWNER, s.id).await.unwrap();
        assert_eq!(detail.placements.len(), 1);
        assert_eq!(detail.placements[0].placement.slot_id, Some(slot_id));
        assert_eq!(detail.layout.slot(slot_id).map(|s| s.x_end), Some(0.5));
    }

    #[tokio::test]
    async fn test_rejected_layout_applies_nothing() {
        let store = store().await;
        let (s, slot_id) = shelf(&store, "Hall").await;
        let result = store
            .replace_layout(OWNER, s.id, &[slot(0, 0, (0.7, 0.2))], Utc::now())
            .await;
        assert!(matches!(result, Err(Error::Validation(_))));

        let detail = store.get_shelf(OWNER, s.id).await.unwrap();
        assert_eq!(detail.layout.slots.len(), 1);
        assert_eq!(detail.layout.slots[0].id, slot_id);
    }

    #[tokio::test]
    async fn test_rename_refreshes_cache_and_delete_clears_it() {
        let store = store().await;
        let book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (mut s, slot_id) = shelf(&store, "Hall").await;
        store.assign_item(OWNER, s.id, slot_id, book.id, Utc::now()).await.unwrap();

        s.name = "Study".to_string();
        store.update_shelf(&s).await.unwrap();
        let cached = store.get_item(OWNER, book.id).await.unwrap().shelf_placement.unwrap();
        assert_eq!(cached.shelf_name, "Study");

        let summaries = store.list_shelves(OWNER).await.unwrap();
        assert_eq!(summaries[0].item_count, 1);
        assert_eq!(summaries[0].slot_count, 1);

        store.delete_shelf(OWNER, s.id).await.unwrap();
        assert!(store.get_item(OWNER, book.id).await.unwrap().shelf_placement.is_none());
        assert!(store.list_shelves(OWNER).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_remove_item_not_in_slot() {
        let store = store().await;
        let book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (s, slot_id) = shelf(&store, "Hall").await;

        let result = store.remove_item(OWNER, s.id, slot_id, book.id, Utc::now()).await;
        assert!(matches!(result, Err(Error::SlotNotFound(_))));
    }

    #[tokio::test]
    async fn test_delete_item_cascades_placement() {
        let store = store().await;
        let book = item("Dune", None);
        store.insert_item(&book).await.unwrap();
        let (s, slot_id) = shelf(&store, "Hall").await;
        store.assign_item(OWNER, s.id, slot_id, book.id, Utc::now()).await.unwrap();

        store.delete_item(OWNER, book.id).await.unwrap();
        let detail = store.get_shelf(OWNER, s.id).await.unwrap();
        assert!(detail.placements.is_empty() && detail.unplaced.is_empty());
        assert!(matches!(store.delete_item(OWNER, book.id).await, Err(Error::NotFound(_))));
    }
}
