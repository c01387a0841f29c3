//! Google Books catalog client
//!
//! Volumes are mapped into item metadata. Only the `book` category is
//! backed by a provider; other categories fail as unsupported.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, info};

use libris_common::isbn;

pub const GOOGLE_BOOKS_BASE_URL: &str = "https://www.googleapis.com/books/v1";
const USER_AGENT: &str = concat!("Libris/", env!("CARGO_PKG_VERSION"));
const MAX_RESULTS: &str = "10";

/// Catalog lookup errors
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("No catalog results for {0:?}")]
    NotFound(String),

    #[error("Unsupported catalog category: {0}")]
    Unsupported(String),

    /// Network failure, timeout, 429 or 5xx
    #[error("Catalog temporarily unavailable: {0}")]
    Transient(String),

    /// Any other non-success status or a malformed body
    #[error("Catalog error: {0}")]
    Upstream(String),
}

pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Metadata for one catalog volume, shaped like item fields
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogMetadata {
    pub title: String,
    pub creator: Option<String>,
    pub description: Option<String>,
    pub page_count: Option<i64>,
    pub release_year: Option<i64>,
    pub genre: Option<String>,
    pub isbn13: Option<String>,
    pub isbn10: Option<String>,
    pub cover_image: Option<String>,
    pub google_volume_id: Option<String>,
}

/// Metadata provider seam; tests substitute a fake
#[async_trait]
pub trait CatalogLookup: Send + Sync {
    /// Search books; an empty result set is `NotFound`
    async fn search_books(&self, query: &str) -> CatalogResult<Vec<CatalogMetadata>>;
}

/// Look up `query` in `category` (`book` when absent)
pub async fn lookup(
    catalog: &dyn CatalogLookup,
    query: &str,
    category: Option<&str>,
) -> CatalogResult<Vec<CatalogMetadata>> {
    let category = category
        .map(|c| c.trim().to_ascii_lowercase())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| "book".to_string());
    if category != "book" {
        return Err(CatalogError::Unsupported(category));
    }
    catalog.search_books(query.trim()).await
}

/// Query string for an exact ISBN search
pub fn isbn_query(raw: &str) -> String {
    format!("isbn:{}", isbn::compact(raw))
}

/// Query string for a title (and optional author) search
pub fn title_query(title: &str, creator: Option<&str>) -> String {
    match creator.map(str::trim).filter(|c| !c.is_empty()) {
        Some(creator) => format!("intitle:{} inauthor:{}", title.trim(), creator),
        None => format!("intitle:{}", title.trim()),
    }
}

#[derive(Debug, Deserialize)]
struct VolumesResponse {
    #[serde(default)]
    items: Vec<Volume>,
}

#[derive(Debug, Deserialize)]
struct Volume {
    id: String,
    #[serde(rename = "volumeInfo")]
    volume_info: VolumeInfo,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct VolumeInfo {
    title: Option<String>,
    authors: Vec<String>,
    description: Option<String>,
    page_count: Option<i64>,
    published_date: Option<String>,
    categories: Vec<String>,
    industry_identifiers: Vec<IndustryIdentifier>,
    image_links: Option<ImageLinks>,
}

#[derive(Debug, Deserialize)]
struct IndustryIdentifier {
    #[serde(rename = "type")]
    kind: String,
    identifier: String,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ImageLinks {
    thumbnail: Option<String>,
    small_thumbnail: Option<String>,
}

impl Volume {
    fn into_metadata(self) -> CatalogMetadata {
        let info = self.volume_info;
        let identifier = |kind: &str| {
            info.industry_identifiers
                .iter()
                .find(|i| i.kind == kind)
                .map(|i| isbn::compact(&i.identifier))
        };
        let isbn13 = identifier("ISBN_13");
        let isbn10 = identifier("ISBN_10");

        // Google serves thumbnails over plain http; covers must be https
        let cover_image = info
            .image_links
            .and_then(|links| links.thumbnail.or(links.small_thumbnail))
            .map(|url| match url.strip_prefix("http://") {
                Some(rest) => format!("https://{}", rest),
                None => url,
            });

        CatalogMetadata {
            title: info.title.unwrap_or_default(),
            creator: (!info.authors.is_empty()).then(|| info.authors.join(", ")),
            description: info.description,
            page_count: info.page_count,
            release_year: info.published_date.as_deref().and_then(parse_year),
            genre: info.categories.into_iter().next(),
            isbn13,
            isbn10,
            cover_image,
            google_volume_id: Some(self.id),
        }
    }
}

/// Leading four-digit year of a `YYYY[-MM[-DD]]` date
fn parse_year(date: &str) -> Option<i64> {
    date.get(..4).and_then(|y| y.parse().ok())
}

/// Google Books volumes API client
pub struct GoogleBooksClient {
    http_client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl GoogleBooksClient {
    pub fn new(api_key: Option<String>) -> CatalogResult<Self> {
        Self::with_base_url(GOOGLE_BOOKS_BASE_URL, api_key)
    }

    /// Client against an alternative API root
    pub fn with_base_url(base_url: &str, api_key: Option<String>) -> CatalogResult<Self> {
        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| CatalogError::Upstream(e.to_string()))?;

        Ok(Self {
            http_client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }
}

fn request_error(err: reqwest::Error) -> CatalogError {
    if err.is_timeout() || err.is_connect() || err.is_request() {
        CatalogError::Transient(err.to_string())
    } else {
        CatalogError::Upstream(err.to_string())
    }
}

#[async_trait]
impl CatalogLookup for GoogleBooksClient {
    async fn search_books(&self, query: &str) -> CatalogResult<Vec<CatalogMetadata>> {
        let url = format!("{}/volumes", self.base_url);
        let mut params = vec![("q", query), ("maxResults", MAX_RESULTS)];
        if let Some(key) = &self.api_key {
            params.push(("key", key.as_str()));
        }

        debug!(query = %query, "Querying Google Books");

        let response = self
            .http_client
            .get(&url)
            .query(&params)
            .send()
            .await
            .map_err(request_error)?;

        let status = response.status();
        if status.as_u16() == 429 || status.is_server_error() {
            return Err(CatalogError::Transient(format!("Google Books returned {}", status)));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CatalogError::Upstream(format!(
                "Google Books returned {}: {}",
                status, body
            )));
        }

        let volumes: VolumesResponse = response
            .json()
            .await
            .map_err(|e| CatalogError::Upstream(format!("malformed response: {}", e)))?;

        if volumes.items.is_empty() {
            return Err(CatalogError::NotFound(query.to_string()));
        }

        let results: Vec<CatalogMetadata> =
            volumes.items.into_iter().map(Volume::into_metadata).collect();
        info!(query = %query, results = results.len(), "Catalog lookup succeeded");
        Ok(results)
    }
}
