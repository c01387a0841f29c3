//! Input normalization and validation
//!
//! Every write path (HTTP handlers, CSV import, barcode scan) funnels item
//! and shelf fields through here before anything reaches a store.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use chrono::{DateTime, Utc};

use crate::isbn;
use crate::models::{ItemInput, ItemType, ReadingStatus};
use crate::{Error, Result};

/// Longest accepted image URL
pub const MAX_IMAGE_URL_LEN: usize = 4096;

/// Decoded size cap for inline cover images
pub const MAX_COVER_BYTES: usize = 500 * 1024;

/// Decoded size cap for inline shelf photos
pub const MAX_SHELF_PHOTO_BYTES: usize = 5 * 1024 * 1024;

/// MIME types accepted in `data:` URIs
pub const ALLOWED_IMAGE_TYPES: [&str; 4] = ["image/png", "image/jpeg", "image/gif", "image/webp"];

/// Trim; blank becomes `None`
pub fn normalize_text(value: Option<String>) -> Option<String> {
    value.and_then(|v| {
        let trimmed = v.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}

/// Trim and require a value
pub fn required_text(field: &str, value: &str) -> Result<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(Error::validation(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

/// Validate an image reference: an HTTPS URL or a base64 `data:` URI
///
/// `field` names the input in error messages; `max_bytes` caps the decoded
/// payload of data URIs.
pub fn sanitize_image(field: &str, raw: &str, max_bytes: usize) -> Result<String> {
    let value = raw.trim();

    if let Some(rest) = value.strip_prefix("data:") {
        let (meta, payload) = rest
            .split_once(',')
            .ok_or_else(|| Error::validation(format!("{} data URI is malformed", field)))?;
        let (mime, encoding) = meta
            .split_once(';')
            .ok_or_else(|| Error::validation(format!("{} data URI must be base64 encoded", field)))?;
        let mime = mime.to_ascii_lowercase();
        if !ALLOWED_IMAGE_TYPES.contains(&mime.as_str()) {
            return Err(Error::validation(format!(
                "{} must be a valid image type (png, jpeg, gif or webp)",
                field
            )));
        }
        if !encoding.eq_ignore_ascii_case("base64") {
            return Err(Error::validation(format!("{} data URI must be base64 encoded", field)));
        }

        // Reject on the encoded length before decoding anything large.
        if payload.len() / 4 * 3 > max_bytes + 3 {
            return Err(too_large(field, max_bytes));
        }
        let decoded = STANDARD
            .decode(payload)
            .map_err(|_| Error::validation(format!("{} data URI is not valid base64", field)))?;
        if decoded.is_empty() {
            return Err(Error::validation(format!("{} data URI is empty", field)));
        }
        if decoded.len() > max_bytes {
            return Err(too_large(field, max_bytes));
        }
        return Ok(format!("data:{};base64,{}", mime, payload));
    }

    if value.len() > MAX_IMAGE_URL_LEN {
        return Err(Error::validation(format!(
            "{} URL exceeds {} characters",
            field, MAX_IMAGE_URL_LEN
        )));
    }
    let lower = value.to_ascii_lowercase();
    let host = lower
        .strip_prefix("https://")
        .ok_or_else(|| Error::validation(format!("{} must be an https URL or an image data URI", field)))?;
    if host.is_empty() || host.starts_with('/') || value.chars().any(char::is_whitespace) {
        return Err(Error::validation(format!("{} URL is malformed", field)));
    }
    Ok(value.to_string())
}

fn too_large(field: &str, max_bytes: usize) -> Error {
    Error::validation(format!(
        "{} exceeds the {}KB size limit",
        field,
        max_bytes / 1024
    ))
}

/// Validated item fields, ready to be stored
#[derive(Debug, Clone, PartialEq)]
pub struct ItemFields {
    pub title: String,
    pub creator: Option<String>,
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
}

fn non_negative(field: &str, value: Option<i64>) -> Result<Option<i64>> {
    match value {
        Some(v) if v < 0 => Err(Error::validation(format!("{} must not be negative", field))),
        other => Ok(other),
    }
}

fn at_least_one(field: &str, value: Option<i64>) -> Result<Option<i64>> {
    match value {
        Some(v) if v < 1 => Err(Error::validation(format!("{} must be at least 1", field))),
        other => Ok(other),
    }
}

/// Normalize and validate a draft item
///
/// `now` stamps `read_at` when a book is marked read without a timestamp.
pub fn validate_item(input: ItemInput, now: DateTime<Utc>) -> Result<ItemFields> {
    let title = required_text("title", &input.title)?;
    let item_type = ItemType::parse(&input.item_type)?;

    let cover_image = match normalize_text(input.cover_image) {
        Some(raw) => Some(sanitize_image("cover image", &raw, MAX_COVER_BYTES)?),
        None => None,
    };

    let isbn13 = match input.isbn13.as_deref() {
        Some(raw) => isbn::normalize_isbn13(raw)?,
        None => None,
    };
    let isbn10 = match input.isbn10.as_deref() {
        Some(raw) => isbn::normalize_isbn10(raw)?,
        None => None,
    };

    let rating = match input.rating {
        Some(r) if !(1..=5).contains(&r) => {
            return Err(Error::validation("rating must be between 1 and 5"))
        }
        other => other,
    };

    let page_count = non_negative("page_count", input.page_count)?;
    let release_year = non_negative("release_year", input.release_year)?;
    let volume_number = at_least_one("volume_number", input.volume_number)?;
    let total_volumes = at_least_one("total_volumes", input.total_volumes)?;

    let (reading_status, current_page, read_at) = if item_type == ItemType::Book {
        let status = match normalize_text(input.reading_status) {
            Some(raw) => ReadingStatus::parse(&raw)?,
            None => ReadingStatus::None,
        };
        reading_state(status, input.current_page, page_count, input.read_at, now)?
    } else {
        (ReadingStatus::None, None, None)
    };

    Ok(ItemFields {
        title,
        creator: normalize_text(input.creator),
        item_type,
        release_year,
        page_count,
        current_page,
        isbn13,
        isbn10,
        description: normalize_text(input.description),
        cover_image,
        platform: normalize_text(input.platform),
        format: normalize_text(input.format),
        genre: normalize_text(input.genre),
        rating,
        google_volume_id: normalize_text(input.google_volume_id),
        series_name: normalize_text(input.series_name),
        volume_number,
        total_volumes,
        notes: normalize_text(input.notes),
        reading_status,
        read_at,
    })
}

/// Apply the reading-status rules for books
fn reading_state(
    status: ReadingStatus,
    current_page: Option<i64>,
    page_count: Option<i64>,
    read_at: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
) -> Result<(ReadingStatus, Option<i64>, Option<DateTime<Utc>>)> {
    match status {
        ReadingStatus::Reading => {
            let page = non_negative("current_page", current_page)?;
            let page = match (page, page_count) {
                (Some(p), Some(total)) => Some(p.min(total)),
                (p, _) => p,
            };
            Ok((status, page, None))
        }
        ReadingStatus::Read => Ok((status, None, Some(read_at.unwrap_or(now)))),
        ReadingStatus::None | ReadingStatus::WantToRead => Ok((status, None, None)),
    }
}
