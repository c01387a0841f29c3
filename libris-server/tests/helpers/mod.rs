//! Shared fixtures for router-level integration tests
#![allow(dead_code)]

use async_trait::async_trait;
use axum::{
    body::Body,
    http::{header, HeaderMap, Request, StatusCode},
    Router,
};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tower::ServiceExt;

use libris_common::config::{DataStoreKind, Settings};
use libris_server::auth::{IdentityProvider, OAuthError, VerifiedIdentity};
use libris_server::services::catalog::{CatalogError, CatalogMetadata, CatalogResult};
use libris_server::services::CatalogLookup;
use libris_server::store::{MemoryStore, Store};
use libris_server::{build_router, AppState};

pub const TOKEN: &str = "test-token";
pub const OWNER: &str = "owner";

/// Catalog answering from a fixed query → results table
#[derive(Default)]
pub struct FakeCatalog {
    pub results: HashMap<String, Vec<CatalogMetadata>>,
    pub calls: AtomicUsize,
}

impl FakeCatalog {
    pub fn with(mut self, query: &str, meta: CatalogMetadata) -> Self {
        self.results.entry(query.to_string()).or_default().push(meta);
        self
    }
}

#[async_trait]
impl CatalogLookup for FakeCatalog {
    async fn search_books(&self, query: &str) -> CatalogResult<Vec<CatalogMetadata>> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if query == "outage" {
            return Err(CatalogError::Transient("connection refused".to_string()));
        }
        self.results
            .get(query)
            .cloned()
            .ok_or_else(|| CatalogError::NotFound(query.to_string()))
    }
}

/// Identity provider accepting code `good` as the configured email
pub struct FakeIdentity {
    pub email: String,
}

#[async_trait]
impl IdentityProvider for FakeIdentity {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        Ok(format!("https://accounts.example.com/auth?state={}", state))
    }

    async fn exchange(&self, code: &str) -> Result<VerifiedIdentity, OAuthError> {
        match code {
            "good" => Ok(VerifiedIdentity {
                email: self.email.clone(),
            }),
            "unverified" => Err(OAuthError::Unverified),
            other => Err(OAuthError::Exchange(format!("bad code {}", other))),
        }
    }
}

pub fn dune_metadata() -> CatalogMetadata {
    CatalogMetadata {
        title: "Dune".to_string(),
        creator: Some("Frank Herbert".to_string()),
        description: Some("Desert planet".to_string()),
        page_count: Some(412),
        release_year: Some(1965),
        genre: Some("Fiction".to_string()),
        isbn13: Some("9780441172719".to_string()),
        isbn10: Some("0441172717".to_string()),
        cover_image: Some("https://books.example.com/dune.jpg".to_string()),
        google_volume_id: Some("B1hSG45JCX4C".to_string()),
    }
}

pub fn settings(api_token: Option<&str>) -> Settings {
    Settings {
        bind_addr: ([127, 0, 0, 1], 0).into(),
        data_store: DataStoreKind::Memory,
        database_url: None,
        allowed_origins: Vec::new(),
        api_token: api_token.map(str::to_string),
        token_owner: OWNER.to_string(),
        allowed_emails: vec!["reader@example.com".to_string()],
        session_ttl: Duration::from_secs(3600),
        cookie_secure: false,
        frontend_url: "/library".to_string(),
        google_oauth: None,
        google_books_api_key: None,
    }
}

pub struct TestApp {
    pub router: Router,
    pub state: AppState,
    pub catalog: Arc<FakeCatalog>,
}

pub struct TestResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Value,
}

impl TestResponse {
    pub fn set_cookies(&self) -> Vec<String> {
        self.headers
            .get_all(header::SET_COOKIE)
            .iter()
            .filter_map(|v| v.to_str().ok())
            .map(str::to_string)
            .collect()
    }

    /// `name=value` pair of a cookie set by this response
    pub fn cookie(&self, name: &str) -> Option<String> {
        self.set_cookies()
            .into_iter()
            .filter_map(|c| c.split(';').next().map(str::to_string))
            .find(|pair| pair.starts_with(&format!("{}=", name)))
    }
}

impl TestApp {
    pub fn new() -> Self {
        Self::build(
            settings(Some(TOKEN)),
            Arc::new(MemoryStore::new()),
            FakeCatalog::default(),
            None,
        )
    }

    pub fn with_catalog(catalog: FakeCatalog) -> Self {
        Self::build(
            settings(Some(TOKEN)),
            Arc::new(MemoryStore::new()),
            catalog,
            None,
        )
    }

    pub fn build(
        settings: Settings,
        store: Arc<dyn Store>,
        catalog: FakeCatalog,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let catalog = Arc::new(catalog);
        let state = AppState::new(settings, store, catalog.clone(), identity);
        Self {
            router: build_router(state.clone()),
            state,
            catalog,
        }
    }

    pub async fn send(&self, request: Request<Body>) -> TestResponse {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let headers = response.headers().clone();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        let body = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes)
                .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(&bytes).to_string()))
        };
        TestResponse {
            status,
            headers,
            body,
        }
    }

    /// Authenticated JSON request
    pub async fn call(&self, method: &str, uri: &str, body: Option<Value>) -> TestResponse {
        self.send(authed(method, uri, body)).await
    }
}

pub fn authed(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN));
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

pub fn anonymous(method: &str, uri: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder().method(method).uri(uri);
    match body {
        Some(json) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Multipart body carrying `csv` in the `file` field
pub fn multipart_csv(uri: &str, csv: &str) -> Request<Body> {
    let boundary = "libris-test-boundary";
    let body = format!(
        "--{b}\r\nContent-Disposition: form-data; name=\"file\"; filename=\"items.csv\"\r\nContent-Type: text/csv\r\n\r\n{csv}\r\n--{b}--\r\n",
        b = boundary,
        csv = csv
    );
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {}", TOKEN))
        .header(
            header::CONTENT_TYPE,
            format!("multipart/form-data; boundary={}", boundary),
        )
        .body(Body::from(body))
        .unwrap()
}
