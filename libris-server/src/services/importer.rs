//! CSV import
//!
//! Each data row becomes one item creation. Rows that repeat an existing
//! item (by ISBN, or by type + title + creator) are skipped; rows that fail
//! to parse or validate are counted invalid and reported by line number.
//! Nothing a single row does aborts the upload.

use chrono::{DateTime, NaiveDate, Utc};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, info, warn};

use libris_common::models::{Item, ItemFilter, ItemInput, ItemType};
use libris_common::{isbn, Error, Result};

use crate::services::catalog::{isbn_query, title_query, CatalogLookup, CatalogMetadata};
use crate::services::items::ItemService;

const REQUIRED_COLUMNS: [&str; 2] = ["title", "type"];

/// Outcome of one upload
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ImportSummary {
    pub total_rows: usize,
    pub imported: usize,
    pub skipped: usize,
    pub invalid: usize,
    pub errors: Vec<String>,
}

/// Keys already present in the catalogue or seen earlier in the file
#[derive(Default)]
struct SeenKeys {
    isbns: HashSet<String>,
    identities: HashSet<(String, String, String)>,
}

impl SeenKeys {
    fn from_items(items: &[Item]) -> Self {
        let mut seen = Self::default();
        for item in items {
            seen.insert(
                item.item_type.as_str(),
                &item.title,
                item.creator.as_deref(),
                [item.isbn13.as_deref(), item.isbn10.as_deref()],
            );
        }
        seen
    }

    fn isbn_keys(isbns: [Option<&str>; 2]) -> Vec<String> {
        isbns
            .into_iter()
            .flatten()
            .flat_map(isbn::lookup_keys)
            .collect()
    }

    fn identity(item_type: &str, title: &str, creator: Option<&str>) -> (String, String, String) {
        (
            item_type.trim().to_lowercase(),
            title.trim().to_lowercase(),
            creator.unwrap_or_default().trim().to_lowercase(),
        )
    }

    fn contains(&self, item_type: &str, title: &str, creator: Option<&str>, isbns: [Option<&str>; 2]) -> bool {
        Self::isbn_keys(isbns).iter().any(|k| self.isbns.contains(k))
            || self.identities.contains(&Self::identity(item_type, title, creator))
    }

    fn insert(&mut self, item_type: &str, title: &str, creator: Option<&str>, isbns: [Option<&str>; 2]) {
        self.isbns.extend(Self::isbn_keys(isbns));
        self.identities.insert(Self::identity(item_type, title, creator));
    }
}

/// Column positions by lower-cased header name
struct Columns(HashMap<String, usize>);

impl Columns {
    fn from_headers(headers: &csv::StringRecord) -> Result<Self> {
        let map: HashMap<String, usize> = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.trim().trim_start_matches('\u{feff}').to_lowercase(), i))
            .collect();

        let missing: Vec<&str> = REQUIRED_COLUMNS
            .iter()
            .copied()
            .filter(|c| !map.contains_key(*c))
            .collect();
        if !missing.is_empty() {
            return Err(Error::validation(format!(
                "CSV is missing required column(s): {}",
                missing.join(", ")
            )));
        }
        Ok(Self(map))
    }

    fn text(&self, record: &csv::StringRecord, name: &str) -> Option<String> {
        self.0
            .get(name)
            .and_then(|&i| record.get(i))
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(str::to_string)
    }

    fn number(&self, record: &csv::StringRecord, name: &str) -> std::result::Result<Option<i64>, String> {
        match self.text(record, name) {
            Some(raw) => raw
                .parse()
                .map(Some)
                .map_err(|_| format!("{} must be a whole number, got {:?}", name, raw)),
            None => Ok(None),
        }
    }

    fn timestamp(
        &self,
        record: &csv::StringRecord,
        name: &str,
    ) -> std::result::Result<Option<DateTime<Utc>>, String> {
        let Some(raw) = self.text(record, name) else {
            return Ok(None);
        };
        if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
            return Ok(Some(ts.with_timezone(&Utc)));
        }
        NaiveDate::parse_from_str(&raw, "%Y-%m-%d")
            .ok()
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| Some(dt.and_utc()))
            .ok_or_else(|| format!("{} must be an RFC 3339 timestamp or YYYY-MM-DD date", name))
    }

    fn item_input(&self, record: &csv::StringRecord) -> std::result::Result<ItemInput, String> {
        Ok(ItemInput {
            title: self.text(record, "title").unwrap_or_default(),
            creator: self.text(record, "creator"),
            item_type: self.text(record, "type").unwrap_or_default(),
            release_year: self.number(record, "release_year")?,
            page_count: self.number(record, "page_count")?,
            current_page: None,
            isbn13: self.text(record, "isbn13"),
            isbn10: self.text(record, "isbn10"),
            description: self.text(record, "description"),
            cover_image: self.text(record, "cover_image"),
            platform: self.text(record, "platform"),
            format: self.text(record, "format"),
            genre: self.text(record, "genre"),
            rating: self.number(record, "rating")?,
            google_volume_id: None,
            series_name: self.text(record, "series_name"),
            volume_number: self.number(record, "volume_number")?,
            total_volumes: self.number(record, "total_volumes")?,
            notes: self.text(record, "notes"),
            reading_status: self.text(record, "reading_status"),
            read_at: self.timestamp(record, "read_at")?,
        })
    }
}

/// True if a book row lacks any field the catalog can fill
fn needs_enrichment(input: &ItemInput) -> bool {
    input.creator.is_none()
        || input.description.is_none()
        || input.cover_image.is_none()
        || input.page_count.is_none()
        || input.release_year.is_none()
        || input.genre.is_none()
        || input.isbn13.is_none()
        || input.isbn10.is_none()
}

fn backfill(input: &mut ItemInput, meta: CatalogMetadata) {
    fn fill<T>(slot: &mut Option<T>, value: Option<T>) {
        if slot.is_none() {
            *slot = value;
        }
    }
    fill(&mut input.creator, meta.creator);
    fill(&mut input.description, meta.description);
    fill(&mut input.cover_image, meta.cover_image);
    fill(&mut input.page_count, meta.page_count);
    fill(&mut input.release_year, meta.release_year);
    fill(&mut input.genre, meta.genre);
    fill(&mut input.isbn13, meta.isbn13);
    fill(&mut input.isbn10, meta.isbn10);
    fill(&mut input.google_volume_id, meta.google_volume_id);
}

/// CSV importer
pub struct Importer {
    items: ItemService,
    catalog: Arc<dyn CatalogLookup>,
}

impl Importer {
    pub fn new(items: ItemService, catalog: Arc<dyn CatalogLookup>) -> Self {
        Self { items, catalog }
    }

    /// Import every row of `data`; `enrich` backfills books from the catalog
    pub async fn import(&self, owner: &str, data: &[u8], enrich: bool) -> Result<ImportSummary> {
        let mut reader = csv::ReaderBuilder::new()
            .flexible(true)
            .trim(csv::Trim::All)
            .from_reader(data);
        let headers = reader
            .headers()
            .map_err(|e| Error::validation(format!("unreadable CSV header: {}", e)))?
            .clone();
        let columns = Columns::from_headers(&headers)?;

        let existing = self.items.list(owner, &ItemFilter::default()).await?;
        let mut seen = SeenKeys::from_items(&existing);
        let mut summary = ImportSummary::default();

        for (index, record) in reader.records().enumerate() {
            // Line 1 is the header
            let line = index + 2;
            summary.total_rows += 1;

            let record = match record {
                Ok(record) => record,
                Err(e) => {
                    summary.invalid += 1;
                    summary.errors.push(format!("row {}: {}", line, e));
                    continue;
                }
            };
            if record.iter().all(|field| field.is_empty()) {
                summary.total_rows -= 1;
                continue;
            }

            let mut input = match columns.item_input(&record) {
                Ok(input) => input,
                Err(message) => {
                    summary.invalid += 1;
                    summary.errors.push(format!("row {}: {}", line, message));
                    continue;
                }
            };

            let isbns = [input.isbn13.as_deref(), input.isbn10.as_deref()];
            if seen.contains(&input.item_type, &input.title, input.creator.as_deref(), isbns) {
                debug!(line, title = %input.title, "Skipping duplicate row");
                summary.skipped += 1;
                continue;
            }

            let is_book = ItemType::parse(&input.item_type).ok() == Some(ItemType::Book);
            if enrich && is_book && !input.title.is_empty() && needs_enrichment(&input) {
                self.enrich(line, &mut input).await;
            }

            match self.items.create(owner, input).await {
                Ok(item) => {
                    seen.insert(
                        item.item_type.as_str(),
                        &item.title,
                        item.creator.as_deref(),
                        [item.isbn13.as_deref(), item.isbn10.as_deref()],
                    );
                    summary.imported += 1;
                }
                Err(Error::Validation(message)) => {
                    summary.invalid += 1;
                    summary.errors.push(format!("row {}: {}", line, message));
                }
                Err(e) => return Err(e),
            }
        }

        info!(
            total = summary.total_rows,
            imported = summary.imported,
            skipped = summary.skipped,
            invalid = summary.invalid,
            "CSV import finished"
        );
        Ok(summary)
    }

    async fn enrich(&self, line: usize, input: &mut ItemInput) {
        let query = match input.isbn13.as_deref().or(input.isbn10.as_deref()) {
            Some(code) => isbn_query(code),
            None => title_query(&input.title, input.creator.as_deref()),
        };
        match self.catalog.search_books(&query).await {
            Ok(results) => {
                if let Some(meta) = results.into_iter().next() {
                    backfill(input, meta);
                }
            }
            Err(e) => warn!(line, query = %query, error = %e, "Catalog enrichment failed"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::catalog::{CatalogError, CatalogResult};
    use crate::store::MemoryStore;
    use async_trait::async_trait;

    struct FakeCatalog;

    #[async_trait]
    impl CatalogLookup for FakeCatalog {
        async fn search_books(&self, query: &str) -> CatalogResult<Vec<CatalogMetadata>> {
            match query {
                "intitle:Dune inauthor:Frank Herbert" => Ok(vec![CatalogMetadata {
                    title: "Dune".to_string(),
                    creator: Some("Someone Else".to_string()),
                    page_count: Some(412),
                    genre: Some("Fiction".to_string()),
                    ..Default::default()
                }]),
                "intitle:Offline" => Err(CatalogError::Transient("timeout".to_string())),
                _ => Err(CatalogError::NotFound(query.to_string())),
            }
        }
    }

    fn importer() -> Importer {
        let items = ItemService::new(Arc::new(MemoryStore::new()));
        Importer::new(items, Arc::new(FakeCatalog))
    }

    #[tokio::test]
    async fn test_import_counts_rows() {
        let csv = "Title,Type,Creator,ISBN13,Rating\n\
                   Dune,book,Frank Herbert,9780441172719,5\n\
                   Myst,game,Cyan,,\n\
                   ,book,Nobody,,\n\
                   Bad Rating,book,,,9\n";
        let summary = importer().import("owner", csv.as_bytes(), false).await.unwrap();

        assert_eq!(summary.total_rows, 4);
        assert_eq!(summary.imported, 2);
        assert_eq!(summary.invalid, 2);
        assert_eq!(summary.skipped, 0);
        assert!(summary.errors[0].starts_with("row 4:"), "{:?}", summary.errors);
        assert!(summary.errors[1].starts_with("row 5:"), "{:?}", summary.errors);
    }

    #[tokio::test]
    async fn test_import_skips_duplicates() {
        let importer = importer();
        let csv = "title,type,creator,isbn10,isbn13\n\
                   Dune,book,Frank Herbert,,9780306406157\n\
                   DUNE,Book,frank herbert,,\n\
                   Other Title,book,,0306406152,\n";
        let summary = importer.import("owner", csv.as_bytes(), false).await.unwrap();
        assert_eq!(summary.imported, 1);
        assert_eq!(summary.skipped, 2);

        // Re-uploading the same file skips everything
        let again = importer.import("owner", csv.as_bytes(), false).await.unwrap();
        assert_eq!(again.imported, 0);
        assert_eq!(again.skipped, 3);
    }

    #[tokio::test]
    async fn test_import_requires_title_and_type_headers() {
        let result = importer().import("owner", b"name,creator\nDune,Herbert\n", false).await;
        match result {
            Err(Error::Validation(msg)) => assert!(msg.contains("title, type"), "{}", msg),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_import_reports_unparseable_numbers() {
        let csv = "title,type,page_count\nDune,book,many\n";
        let summary = importer().import("owner", csv.as_bytes(), false).await.unwrap();
        assert_eq!(summary.invalid, 1);
        assert!(summary.errors[0].contains("page_count"));
    }

    #[tokio::test]
    async fn test_enrichment_fills_only_missing_fields() {
        let items = ItemService::new(Arc::new(MemoryStore::new()));
        let importer = Importer::new(items.clone(), Arc::new(FakeCatalog));
        let csv = "title,type,creator,genre\n\
                   Dune,book,Frank Herbert,\n\
                   Offline,book,,Mystery\n";
        let summary = importer.import("owner", csv.as_bytes(), true).await.unwrap();
        assert_eq!(summary.imported, 2);

        let all = items.list("owner", &ItemFilter::default()).await.unwrap();
        let dune = all.iter().find(|i| i.title == "Dune").unwrap();
        assert_eq!(dune.creator.as_deref(), Some("Frank Herbert"));
        assert_eq!(dune.page_count, Some(412));
        assert_eq!(dune.genre.as_deref(), Some("Fiction"));

        let offline = all.iter().find(|i| i.title == "Offline").unwrap();
        assert_eq!(offline.genre.as_deref(), Some("Mystery"));
    }

    #[tokio::test]
    async fn test_read_at_accepts_plain_dates() {
        let items = ItemService::new(Arc::new(MemoryStore::new()));
        let importer = Importer::new(items.clone(), Arc::new(FakeCatalog));
        let csv = "title,type,reading_status,read_at\nDune,book,read,2024-03-01\n";
        importer.import("owner", csv.as_bytes(), false).await.unwrap();

        let all = items.list("owner", &ItemFilter::default()).await.unwrap();
        assert_eq!(
            all[0].read_at.map(|t| t.date_naive().to_string()).as_deref(),
            Some("2024-03-01")
        );
    }
}
