//! libris - personal library catalogue service
//!
//! Settings resolve from command line, environment, an optional TOML file
//! and compiled defaults, in that order.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use libris_common::config::{
    default_config_path, CliOverrides, DataStoreKind, ProcessEnv, Settings, TomlConfig,
};
use libris_common::db;
use libris_server::auth::{GoogleIdentityProvider, IdentityProvider};
use libris_server::services::{CatalogLookup, GoogleBooksClient};
use libris_server::store::{MemoryStore, SqliteStore, Store};
use libris_server::{build_router, AppState};

#[derive(Parser, Debug)]
#[command(name = "libris")]
#[command(about = "Personal library catalogue service")]
#[command(version)]
struct Args {
    /// TOML config file (defaults to the platform config directory)
    #[arg(short, long, env = "LIBRIS_CONFIG")]
    config: Option<PathBuf>,

    /// Listen address, e.g. 127.0.0.1:8080
    #[arg(short, long)]
    bind: Option<SocketAddr>,

    /// Repository backend: memory or sqlite
    #[arg(long)]
    data_store: Option<String>,

    /// SQLite URL, e.g. sqlite://libris.db
    #[arg(long)]
    database_url: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting libris v{}", env!("CARGO_PKG_VERSION"));

    let args = Args::parse();

    let toml = match args.config.clone().or_else(default_config_path) {
        Some(path) => TomlConfig::load(&path)?,
        None => TomlConfig::default(),
    };
    let cli = CliOverrides {
        bind_addr: args.bind,
        data_store: args.data_store,
        database_url: args.database_url,
    };
    let settings = Settings::resolve(&cli, &ProcessEnv, &toml)?;

    let store: Arc<dyn Store> = match settings.data_store {
        DataStoreKind::Memory => {
            info!("Using in-memory store; data is lost on exit");
            Arc::new(MemoryStore::new())
        }
        DataStoreKind::Sqlite => {
            let url = settings
                .database_url
                .as_deref()
                .context("LIBRIS_DATABASE_URL is required for the sqlite store")?;
            let pool = db::connect(url)
                .await
                .with_context(|| format!("failed to open database {}", url))?;
            info!("✓ Connected to database");
            Arc::new(SqliteStore::new(pool))
        }
    };

    let catalog: Arc<dyn CatalogLookup> =
        Arc::new(GoogleBooksClient::new(settings.google_books_api_key.clone())?);

    let identity: Option<Arc<dyn IdentityProvider>> = match settings.google_oauth.clone() {
        Some(oauth) => {
            info!("Google sign-in enabled");
            Some(Arc::new(GoogleIdentityProvider::new(oauth)?))
        }
        None => None,
    };

    if !settings.auth_enabled() {
        warn!("No API token or Google OAuth configured; authentication is DISABLED");
    }
    if settings.google_oauth.is_some() && settings.allowed_emails.is_empty() {
        warn!("LIBRIS_ALLOWED_EMAILS is empty; every Google sign-in will be refused");
    }

    let bind_addr = settings.bind_addr;
    let state = AppState::new(settings, store, catalog, identity);
    let app = build_router(state);

    let listener = tokio::net::TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", bind_addr))?;
    info!("libris listening on http://{}", bind_addr);
    info!("Health check: http://{}/health", bind_addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await?;

    Ok(())
}
