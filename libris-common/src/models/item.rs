//! Catalogue item model

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::patch::double_option;
use crate::{Error, Result};

/// Kind of catalogue entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ItemType {
    Book,
    Game,
    Movie,
    Music,
}

impl ItemType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ItemType::Book => "book",
            ItemType::Game => "game",
            ItemType::Movie => "movie",
            ItemType::Music => "music",
        }
    }

    /// Parse a user-supplied type name (case-insensitive, trimmed)
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" => Err(Error::validation("type is required")),
            "book" => Ok(ItemType::Book),
            "game" => Ok(ItemType::Game),
            "movie" => Ok(ItemType::Movie),
            "music" => Ok(ItemType::Music),
            other => Err(Error::validation(format!(
                "unsupported type {:?}; expected book, game, movie or music",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ItemType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Book reading progress
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReadingStatus {
    #[default]
    None,
    WantToRead,
    Reading,
    Read,
}

impl ReadingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReadingStatus::None => "none",
            ReadingStatus::WantToRead => "want_to_read",
            ReadingStatus::Reading => "reading",
            ReadingStatus::Read => "read",
        }
    }

    /// Parse a user-supplied status; blank means `none`
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "" | "none" => Ok(ReadingStatus::None),
            "want_to_read" => Ok(ReadingStatus::WantToRead),
            "reading" => Ok(ReadingStatus::Reading),
            "read" => Ok(ReadingStatus::Read),
            other => Err(Error::validation(format!(
                "unsupported reading status {:?}; expected none, want_to_read, reading or read",
                other
            ))),
        }
    }
}

impl std::fmt::Display for ReadingStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Placement summary cached on the item for list and grid views
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ShelfPlacementRef {
    pub shelf_id: Uuid,
    pub shelf_name: String,
    pub slot_id: Option<Uuid>,
    pub row_index: Option<i64>,
    pub col_index: Option<i64>,
}

/// Catalogue entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Item {
    pub id: Uuid,
    pub owner_id: String,
    pub title: String,
    pub creator: Option<String>,
    #[serde(rename = "type")]
    pub item_type: ItemType,
    pub release_year: Option<i64>,
    pub page_count: Option<i64>,
    pub current_page: Option<i64>,
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub platform: Option<String>,
    pub format: Option<String>,
    pub genre: Option<String>,
    pub rating: Option<i64>,
    pub google_volume_id: Option<String>,
    pub series_name: Option<String>,
    pub volume_number: Option<i64>,
    pub total_volumes: Option<i64>,
    pub notes: Option<String>,
    pub reading_status: ReadingStatus,
    pub read_at: Option<DateTime<Utc>>,
    pub shelf_placement: Option<ShelfPlacementRef>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Item {
    /// True if either stored ISBN equals one of `keys`
    pub fn matches_isbn(&self, keys: &[String]) -> bool {
        keys.iter().any(|key| {
            self.isbn13.as_deref() == Some(key.as_str())
                || self.isbn10.as_deref() == Some(key.as_str())
        })
    }

    /// Unvalidated draft carrying the item's current field values
    pub fn to_input(&self) -> ItemInput {
        ItemInput {
            title: self.title.clone(),
            creator: self.creator.clone(),
            item_type: self.item_type.as_str().to_string(),
            release_year: self.release_year,
            page_count: self.page_count,
            current_page: self.current_page,
            isbn13: self.isbn13.clone(),
            isbn10: self.isbn10.clone(),
            description: self.description.clone(),
            cover_image: self.cover_image.clone(),
            platform: self.platform.clone(),
            format: self.format.clone(),
            genre: self.genre.clone(),
            rating: self.rating,
            google_volume_id: self.google_volume_id.clone(),
            series_name: self.series_name.clone(),
            volume_number: self.volume_number,
            total_volumes: self.total_volumes,
            notes: self.notes.clone(),
            reading_status: Some(self.reading_status.as_str().to_string()),
            read_at: self.read_at,
        }
    }
}

/// Raw item fields as submitted by a client or the importer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ItemInput {
    pub title: String,
    pub creator: Option<String>,
    #[serde(rename = "type", alias = "item_type")]
    pub item_type: String,
    pub release_year: Option<i64>,
    pub page_count: Option<i64>,
    pub current_page: Option<i64>,
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub description: Option<String>,
    pub cover_image: Option<String>,
    pub platform: Option<String>,
    pub format: Option<String>,
    pub genre: Option<String>,
    pub rating: Option<i64>,
    pub google_volume_id: Option<String>,
    pub series_name: Option<String>,
    pub volume_number: Option<i64>,
    pub total_volumes: Option<i64>,
    pub notes: Option<String>,
    pub reading_status: Option<String>,
    pub read_at: Option<DateTime<Utc>>,
}

/// Partial update: absent keys leave a field unchanged, `null` clears it
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct ItemPatch {
    pub title: Option<String>,
    #[serde(rename = "type", alias = "item_type")]
    pub item_type: Option<String>,
    #[serde(deserialize_with = "double_option")]
    pub creator: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub release_year: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub page_count: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub current_page: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub isbn13: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub isbn10: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub description: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub cover_image: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub platform: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub format: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub genre: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub rating: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub google_volume_id: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub series_name: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub volume_number: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub total_volumes: Option<Option<i64>>,
    #[serde(deserialize_with = "double_option")]
    pub notes: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub reading_status: Option<Option<String>>,
    #[serde(deserialize_with = "double_option")]
    pub read_at: Option<Option<DateTime<Utc>>>,
}

fn apply<T>(field: &mut Option<T>, change: Option<Option<T>>) {
    if let Some(value) = change {
        *field = value;
    }
}

impl ItemPatch {
    /// Overlay the patch on a draft
    pub fn apply_to(self, draft: &mut ItemInput) {
        if let Some(title) = self.title {
            draft.title = title;
        }
        if let Some(item_type) = self.item_type {
            draft.item_type = item_type;
        }
        apply(&mut draft.creator, self.creator);
        apply(&mut draft.release_year, self.release_year);
        apply(&mut draft.page_count, self.page_count);
        apply(&mut draft.current_page, self.current_page);
        apply(&mut draft.isbn13, self.isbn13);
        apply(&mut draft.isbn10, self.isbn10);
        apply(&mut draft.description, self.description);
        apply(&mut draft.cover_image, self.cover_image);
        apply(&mut draft.platform, self.platform);
        apply(&mut draft.format, self.format);
        apply(&mut draft.genre, self.genre);
        apply(&mut draft.rating, self.rating);
        apply(&mut draft.google_volume_id, self.google_volume_id);
        apply(&mut draft.series_name, self.series_name);
        apply(&mut draft.volume_number, self.volume_number);
        apply(&mut draft.total_volumes, self.total_volumes);
        apply(&mut draft.notes, self.notes);
        apply(&mut draft.reading_status, self.reading_status);
        apply(&mut draft.read_at, self.read_at);
    }
}

/// List filter for `GET /api/items`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ItemFilter {
    pub item_type: Option<ItemType>,
    pub reading_status: Option<ReadingStatus>,
    /// Lower-cased free-text needle
    pub query: Option<String>,
    pub shelf_id: Option<Uuid>,
}

impl ItemFilter {
    /// Whether `item` passes every filter
    ///
    /// Status filtering only applies to books. Without a type filter, a
    /// `none` status filter still shows every non-book; any other status
    /// shows books only.
    pub fn matches(&self, item: &Item) -> bool {
        if let Some(item_type) = self.item_type {
            if item.item_type != item_type {
                return false;
            }
        }

        if let Some(status) = self.reading_status {
            let status_ok = if item.item_type == ItemType::Book {
                item.reading_status == status
            } else {
                self.item_type.is_some() || status == ReadingStatus::None
            };
            if !status_ok {
                return false;
            }
        }

        if let Some(shelf_id) = self.shelf_id {
            let on_shelf = item
                .shelf_placement
                .as_ref()
                .is_some_and(|p| p.shelf_id == shelf_id);
            if !on_shelf {
                return false;
            }
        }

        if let Some(needle) = &self.query {
            let haystacks = [
                Some(item.title.as_str()),
                item.creator.as_deref(),
                item.isbn13.as_deref(),
                item.isbn10.as_deref(),
            ];
            let hit = haystacks
                .iter()
                .flatten()
                .any(|h| h.to_lowercase().contains(needle.as_str()));
            if !hit {
                return false;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(item_type: ItemType, status: ReadingStatus) -> Item {
        let now = Utc::now();
        Item {
            id: Uuid::new_v4(),
            owner_id: "owner".to_string(),
            title: "Dune".to_string(),
            creator: Some("Frank Herbert".to_string()),
            item_type,
            release_year: None,
            page_count: None,
            current_page: None,
            isbn13: Some("9780441172719".to_string()),
            isbn10: None,
            description: None,
            cover_image: None,
            platform: None,
            format: None,
            genre: None,
            rating: None,
            google_volume_id: None,
            series_name: None,
            volume_number: None,
            total_volumes: None,
            notes: None,
            reading_status: status,
            read_at: None,
            shelf_placement: None,
            created_at: now,
            updated_at: now,
        }
    }

    #[test]
    fn test_item_type_parse() {
        assert_eq!(ItemType::parse(" Book ").unwrap(), ItemType::Book);
        assert!(matches!(ItemType::parse(""), Err(Error::Validation(_))));
        assert!(matches!(ItemType::parse("vinyl"), Err(Error::Validation(_))));
    }

    #[test]
    fn test_reading_status_parse_blank_is_none() {
        assert_eq!(ReadingStatus::parse("").unwrap(), ReadingStatus::None);
        assert_eq!(ReadingStatus::parse("WANT_TO_READ").unwrap(), ReadingStatus::WantToRead);
        assert!(ReadingStatus::parse("skimmed").is_err());
    }

    #[test]
    fn test_all_items_with_status_none_keeps_non_books() {
        let filter = ItemFilter {
            reading_status: Some(ReadingStatus::None),
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemType::Game, ReadingStatus::None)));
        assert!(filter.matches(&item(ItemType::Book, ReadingStatus::None)));
        assert!(!filter.matches(&item(ItemType::Book, ReadingStatus::Reading)));
    }

    #[test]
    fn test_all_items_with_other_status_shows_books_only() {
        let filter = ItemFilter {
            reading_status: Some(ReadingStatus::Reading),
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemType::Book, ReadingStatus::Reading)));
        assert!(!filter.matches(&item(ItemType::Movie, ReadingStatus::None)));
    }

    #[test]
    fn test_typed_filter_ignores_status_for_non_books() {
        let filter = ItemFilter {
            item_type: Some(ItemType::Game),
            reading_status: Some(ReadingStatus::Read),
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemType::Game, ReadingStatus::None)));
        assert!(!filter.matches(&item(ItemType::Book, ReadingStatus::Read)));
    }

    #[test]
    fn test_query_matches_creator_and_isbn() {
        let mut filter = ItemFilter {
            query: Some("herbert".to_string()),
            ..Default::default()
        };
        assert!(filter.matches(&item(ItemType::Book, ReadingStatus::None)));
        filter.query = Some("9780441".to_string());
        assert!(filter.matches(&item(ItemType::Book, ReadingStatus::None)));
        filter.query = Some("asimov".to_string());
        assert!(!filter.matches(&item(ItemType::Book, ReadingStatus::None)));
    }

    #[test]
    fn test_patch_distinguishes_absent_and_null() {
        let patch: ItemPatch =
            serde_json::from_str(r#"{"title": "Dune Messiah", "creator": null}"#).unwrap();
        let mut draft = item(ItemType::Book, ReadingStatus::None).to_input();
        draft.genre = Some("SF".to_string());
        patch.apply_to(&mut draft);

        assert_eq!(draft.title, "Dune Messiah");
        assert_eq!(draft.creator, None);
        assert_eq!(draft.genre.as_deref(), Some("SF"));
    }
}
