//! libris-server library - personal library catalogue service
//!
//! REST/JSON API over items, shelves with slot layouts, series and a Google
//! Books catalog, with token, session and Google OAuth authentication.

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::sync::Arc;
use std::time::Duration;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};
use tracing::warn;

use libris_common::config::Settings;

pub mod api;
pub mod auth;
pub mod error;
pub mod services;
pub mod store;

pub use error::{ApiError, ApiResult};

use auth::{IdentityProvider, LoginLimiter, SessionStore};
use services::{CatalogLookup, Importer, ItemService, ShelfService};
use store::Store;

/// Largest accepted request body (shelf photos travel as data URIs)
pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

/// Per-request deadline
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// Application state shared across HTTP handlers
#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub store: Arc<dyn Store>,
    pub items: ItemService,
    pub shelves: ShelfService,
    pub importer: Arc<Importer>,
    pub catalog: Arc<dyn CatalogLookup>,
    pub sessions: Arc<SessionStore>,
    pub limiter: Arc<LoginLimiter>,
    /// Present when Google OAuth is configured
    pub identity: Option<Arc<dyn IdentityProvider>>,
}

impl AppState {
    /// Wire services over a store and external providers
    pub fn new(
        settings: Settings,
        store: Arc<dyn Store>,
        catalog: Arc<dyn CatalogLookup>,
        identity: Option<Arc<dyn IdentityProvider>>,
    ) -> Self {
        let items = ItemService::new(store.clone());
        let shelves = ShelfService::new(store.clone(), items.clone(), catalog.clone());
        let importer = Arc::new(Importer::new(items.clone(), catalog.clone()));
        let sessions = Arc::new(SessionStore::new(settings.session_ttl));

        Self {
            settings: Arc::new(settings),
            store,
            items,
            shelves,
            importer,
            catalog,
            sessions,
            limiter: Arc::new(LoginLimiter::default()),
            identity,
        }
    }
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::AUTHORIZATION, header::CONTENT_TYPE])
        .allow_credentials(true)
}

/// Build application router
///
/// `/health`, `/api/session` and the OAuth endpoints are public; everything
/// else passes through [`auth::require_auth`].
pub fn build_router(state: AppState) -> Router {
    let protected = Router::new()
        .route("/api/items", get(api::items::list_items).post(api::items::create_item))
        .route("/api/items/import", post(api::items::import_items))
        .route(
            "/api/items/:id",
            get(api::items::get_item)
                .put(api::items::update_item)
                .delete(api::items::delete_item),
        )
        .route("/api/catalog/lookup", get(api::catalog::lookup))
        .route("/api/series", get(api::series::get_series))
        .route(
            "/api/shelves",
            get(api::shelves::list_shelves).post(api::shelves::create_shelf),
        )
        .route(
            "/api/shelves/:id",
            get(api::shelves::get_shelf)
                .put(api::shelves::update_shelf)
                .delete(api::shelves::delete_shelf),
        )
        .route("/api/shelves/:id/layout", put(api::shelves::update_layout))
        .route(
            "/api/shelves/:id/slots/:slot_id/items",
            post(api::shelves::assign_item),
        )
        .route(
            "/api/shelves/:id/slots/:slot_id/items/:item_id",
            delete(api::shelves::remove_item),
        )
        .route(
            "/api/shelves/:id/slots/:slot_id/scan",
            post(api::shelves::scan_item),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth::require_auth,
        ));

    let public = Router::new()
        .route(
            "/api/session",
            post(api::session::login)
                .get(api::session::whoami)
                .delete(api::session::logout),
        )
        .route("/api/auth/google", get(api::oauth::start))
        .route("/api/auth/google/callback", get(api::oauth::callback))
        .merge(api::health_routes());

    let cors = cors_layer(&state.settings.allowed_origins);

    Router::new()
        .merge(protected)
        .merge(public)
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(TimeoutLayer::new(REQUEST_TIMEOUT))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
}
