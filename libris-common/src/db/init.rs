//! Database initialization
//!
//! Creates the connection pool and every table the catalogue needs. Table
//! creation is idempotent, so this runs on every startup.

use crate::Result;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use std::str::FromStr;
use std::time::Duration;
use tracing::info;

/// Connect to `url` and create the schema
///
/// In-memory databases are per-connection in SQLite, so they get a pool of
/// exactly one connection.
pub async fn connect(url: &str) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::from_str(url)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(Duration::from_millis(5000));

    let in_memory = url.contains(":memory:") || url.contains("mode=memory");
    let mut pool_options = SqlitePoolOptions::new().max_connections(if in_memory { 1 } else { 10 });
    if in_memory {
        // Closing the only connection would drop the database
        pool_options = pool_options.idle_timeout(None).max_lifetime(None);
    }
    let pool = pool_options
        .connect_with(options)
        .await?;

    if !in_memory {
        // WAL lets readers proceed while a layout transaction is writing
        sqlx::query("PRAGMA journal_mode = WAL").execute(&pool).await?;
    }

    create_schema(&pool).await?;
    info!("Database ready: {}", url);
    Ok(pool)
}

/// Create all tables and indexes if they do not exist
pub async fn create_schema(pool: &SqlitePool) -> Result<()> {
    create_items_table(pool).await?;
    create_shelves_table(pool).await?;
    create_shelf_rows_table(pool).await?;
    create_shelf_columns_table(pool).await?;
    create_shelf_slots_table(pool).await?;
    create_item_placements_table(pool).await?;
    Ok(())
}

async fn create_items_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS items (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            title TEXT NOT NULL,
            creator TEXT,
            item_type TEXT NOT NULL CHECK (item_type IN ('book', 'game', 'movie', 'music')),
            release_year INTEGER,
            page_count INTEGER,
            current_page INTEGER,
            isbn13 TEXT,
            isbn10 TEXT,
            description TEXT,
            cover_image TEXT,
            platform TEXT,
            format TEXT,
            genre TEXT,
            rating INTEGER,
            google_volume_id TEXT,
            series_name TEXT,
            volume_number INTEGER,
            total_volumes INTEGER,
            notes TEXT,
            reading_status TEXT NOT NULL DEFAULT 'none'
                CHECK (reading_status IN ('none', 'want_to_read', 'reading', 'read')),
            read_at TIMESTAMP,
            shelf_placement TEXT,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL,
            title_folded TEXT NOT NULL,
            creator_folded TEXT
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_owner ON items(owner_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_isbn13 ON items(owner_id, isbn13)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_items_isbn10 ON items(owner_id, isbn10)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_shelves_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shelves (
            id TEXT PRIMARY KEY,
            owner_id TEXT NOT NULL,
            name TEXT NOT NULL,
            description TEXT,
            photo_url TEXT NOT NULL,
            created_at TIMESTAMP NOT NULL,
            updated_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_shelves_owner ON shelves(owner_id)")
        .execute(pool)
        .await?;

    Ok(())
}

async fn create_shelf_rows_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shelf_rows (
            id TEXT PRIMARY KEY,
            shelf_id TEXT NOT NULL REFERENCES shelves(id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            y_start REAL NOT NULL,
            y_end REAL NOT NULL,
            UNIQUE (shelf_id, row_index)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_shelf_columns_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shelf_columns (
            id TEXT PRIMARY KEY,
            row_id TEXT NOT NULL REFERENCES shelf_rows(id) ON DELETE CASCADE,
            col_index INTEGER NOT NULL,
            x_start REAL NOT NULL,
            x_end REAL NOT NULL,
            UNIQUE (row_id, col_index)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_shelf_slots_table(pool: &SqlitePool) -> Result<()> {
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS shelf_slots (
            id TEXT PRIMARY KEY,
            shelf_id TEXT NOT NULL REFERENCES shelves(id) ON DELETE CASCADE,
            row_id TEXT NOT NULL REFERENCES shelf_rows(id) ON DELETE CASCADE,
            column_id TEXT NOT NULL REFERENCES shelf_columns(id) ON DELETE CASCADE,
            row_index INTEGER NOT NULL,
            col_index INTEGER NOT NULL,
            x_start REAL NOT NULL,
            x_end REAL NOT NULL,
            y_start REAL NOT NULL,
            y_end REAL NOT NULL,
            UNIQUE (shelf_id, row_index, col_index)
        )
        "#,
    )
    .execute(pool)
    .await?;
    Ok(())
}

async fn create_item_placements_table(pool: &SqlitePool) -> Result<()> {
    // UNIQUE(item_id): an item is on at most one shelf at a time
    sqlx::query(
        r#"
        CREATE TABLE IF NOT EXISTS item_placements (
            id TEXT PRIMARY KEY,
            item_id TEXT NOT NULL UNIQUE REFERENCES items(id) ON DELETE CASCADE,
            shelf_id TEXT NOT NULL REFERENCES shelves(id) ON DELETE CASCADE,
            slot_id TEXT REFERENCES shelf_slots(id) ON DELETE SET NULL,
            created_at TIMESTAMP NOT NULL,
            placed_at TIMESTAMP NOT NULL
        )
        "#,
    )
    .execute(pool)
    .await?;

    sqlx::query("CREATE INDEX IF NOT EXISTS idx_placements_shelf ON item_placements(shelf_id)")
        .execute(pool)
        .await?;
    sqlx::query("CREATE INDEX IF NOT EXISTS idx_placements_slot ON item_placements(slot_id)")
        .execute(pool)
        .await?;

    Ok(())
}
