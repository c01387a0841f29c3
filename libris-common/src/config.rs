//! Configuration loading
//!
//! Each setting resolves in priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable, or its `_FILE` variant naming a secret file
//! 3. TOML config file
//! 4. Compiled default (fallback)

use serde::Deserialize;
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

use crate::{Error, Result};

pub const DEFAULT_BIND_ADDR: &str = "127.0.0.1:8080";
pub const DEFAULT_TOKEN_OWNER: &str = "owner";
pub const DEFAULT_SESSION_TTL_HOURS: u64 = 168;

/// Source of environment variables
///
/// Lets resolution run against a plain map in tests instead of the process
/// environment.
pub trait EnvSource {
    fn var(&self, key: &str) -> Option<String>;
}

/// The real process environment
pub struct ProcessEnv;

impl EnvSource for ProcessEnv {
    fn var(&self, key: &str) -> Option<String> {
        std::env::var(key).ok()
    }
}

impl EnvSource for HashMap<String, String> {
    fn var(&self, key: &str) -> Option<String> {
        self.get(key).cloned()
    }
}

/// Read `key`, or the trimmed contents of the file named by `{key}_FILE`
///
/// Empty values count as unset. Setting both forms is an error.
pub fn read_env(env: &dyn EnvSource, key: &str) -> Result<Option<String>> {
    let file_key = format!("{}_FILE", key);
    let direct = env.var(key).filter(|v| !v.trim().is_empty());
    let file = env.var(&file_key).filter(|v| !v.trim().is_empty());

    match (direct, file) {
        (Some(_), Some(_)) => Err(Error::Config(format!(
            "both {} and {} are set; use only one",
            key, file_key
        ))),
        (Some(value), None) => Ok(Some(value.trim().to_string())),
        (None, Some(path)) => {
            let contents = std::fs::read_to_string(path.trim()).map_err(|e| {
                Error::Config(format!("failed to read {} ({}): {}", file_key, path.trim(), e))
            })?;
            let value = contents.trim().to_string();
            Ok(if value.is_empty() { None } else { Some(value) })
        }
        (None, None) => Ok(None),
    }
}

/// Split a comma-separated list, dropping blanks
pub fn split_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_bool(key: &str, raw: &str) -> Result<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => Err(Error::Config(format!("{} must be a boolean, got {:?}", key, other))),
    }
}

/// Which repository backs the service
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataStoreKind {
    Memory,
    Sqlite,
}

impl DataStoreKind {
    pub fn parse(raw: &str) -> Result<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "memory" | "inmemory" | "in-memory" => Ok(DataStoreKind::Memory),
            "sqlite" => Ok(DataStoreKind::Sqlite),
            other => Err(Error::Config(format!(
                "unknown data store {:?}; expected memory or sqlite",
                other
            ))),
        }
    }
}

/// Optional TOML config file contents
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub bind_addr: Option<String>,
    pub data_store: Option<String>,
    pub database_url: Option<String>,
    pub allowed_origins: Option<Vec<String>>,
    pub api_token: Option<String>,
    pub token_owner: Option<String>,
    pub allowed_emails: Option<Vec<String>>,
    pub session_ttl_hours: Option<u64>,
    pub cookie_secure: Option<bool>,
    pub frontend_url: Option<String>,
    pub google_client_id: Option<String>,
    pub google_client_secret: Option<String>,
    pub google_redirect_url: Option<String>,
    pub google_books_api_key: Option<String>,
}

impl TomlConfig {
    /// Load a config file; a missing file yields defaults with a warning
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            warn!("Config file not found: {} (using defaults)", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))?;
        info!("Loaded config file: {}", path.display());
        Ok(config)
    }
}

/// Platform config file location, e.g. `~/.config/libris/config.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("libris").join("config.toml"))
}

/// Values given on the command line
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub bind_addr: Option<SocketAddr>,
    pub data_store: Option<String>,
    pub database_url: Option<String>,
}

/// Google OAuth client credentials
#[derive(Debug, Clone, PartialEq)]
pub struct GoogleOAuthSettings {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_url: String,
}

/// Fully resolved service settings
#[derive(Debug, Clone)]
pub struct Settings {
    pub bind_addr: SocketAddr,
    pub data_store: DataStoreKind,
    pub database_url: Option<String>,
    pub allowed_origins: Vec<String>,
    pub api_token: Option<String>,
    pub token_owner: String,
    pub allowed_emails: Vec<String>,
    pub session_ttl: Duration,
    pub cookie_secure: bool,
    pub frontend_url: String,
    pub google_oauth: Option<GoogleOAuthSettings>,
    pub google_books_api_key: Option<String>,
}

impl Settings {
    /// Resolve every setting from CLI, environment, TOML and defaults
    pub fn resolve(cli: &CliOverrides, env: &dyn EnvSource, toml: &TomlConfig) -> Result<Self> {
        let bind_addr = match cli.bind_addr {
            Some(addr) => addr,
            None => {
                let raw = read_env(env, "LIBRIS_BIND_ADDR")?
                    .or_else(|| toml.bind_addr.clone())
                    .unwrap_or_else(|| DEFAULT_BIND_ADDR.to_string());
                raw.parse()
                    .map_err(|e| Error::Config(format!("invalid bind address {:?}: {}", raw, e)))?
            }
        };

        let data_store_raw = match cli.data_store.clone() {
            Some(raw) => Some(raw),
            None => read_env(env, "LIBRIS_DATA_STORE")?.or_else(|| toml.data_store.clone()),
        };
        let data_store = match data_store_raw {
            Some(raw) => DataStoreKind::parse(&raw)?,
            None => DataStoreKind::Memory,
        };

        let database_url = match cli.database_url.clone() {
            Some(url) => Some(url),
            None => read_env(env, "LIBRIS_DATABASE_URL")?.or_else(|| toml.database_url.clone()),
        };
        if data_store == DataStoreKind::Sqlite && database_url.is_none() {
            return Err(Error::Config(
                "LIBRIS_DATABASE_URL is required when the sqlite data store is selected".to_string(),
            ));
        }

        let allowed_origins = match read_env(env, "LIBRIS_ALLOWED_ORIGINS")? {
            Some(raw) => split_list(&raw),
            None => toml.allowed_origins.clone().unwrap_or_default(),
        };

        let allowed_emails = match read_env(env, "LIBRIS_ALLOWED_EMAILS")? {
            Some(raw) => split_list(&raw),
            None => toml.allowed_emails.clone().unwrap_or_default(),
        }
        .into_iter()
        .map(|e| e.to_ascii_lowercase())
        .collect();

        let session_ttl_hours = match read_env(env, "LIBRIS_SESSION_TTL_HOURS")? {
            Some(raw) => raw.parse::<u64>().map_err(|e| {
                Error::Config(format!("LIBRIS_SESSION_TTL_HOURS must be a number: {}", e))
            })?,
            None => toml.session_ttl_hours.unwrap_or(DEFAULT_SESSION_TTL_HOURS),
        };
        if session_ttl_hours == 0 {
            return Err(Error::Config("LIBRIS_SESSION_TTL_HOURS must be positive".to_string()));
        }

        let cookie_secure = match read_env(env, "LIBRIS_COOKIE_SECURE")? {
            Some(raw) => parse_bool("LIBRIS_COOKIE_SECURE", &raw)?,
            None => toml.cookie_secure.unwrap_or(true),
        };

        let google_oauth = resolve_google(env, toml)?;

        Ok(Self {
            bind_addr,
            data_store,
            database_url,
            allowed_origins,
            api_token: read_env(env, "LIBRIS_API_TOKEN")?.or_else(|| toml.api_token.clone()),
            token_owner: read_env(env, "LIBRIS_TOKEN_OWNER")?
                .or_else(|| toml.token_owner.clone())
                .unwrap_or_else(|| DEFAULT_TOKEN_OWNER.to_string()),
            allowed_emails,
            session_ttl: crate::time::hours_to_duration(session_ttl_hours),
            cookie_secure,
            frontend_url: read_env(env, "LIBRIS_FRONTEND_URL")?
                .or_else(|| toml.frontend_url.clone())
                .unwrap_or_else(|| "/".to_string()),
            google_oauth,
            google_books_api_key: read_env(env, "GOOGLE_BOOKS_API_KEY")?
                .or_else(|| toml.google_books_api_key.clone()),
        })
    }

    /// Authentication is off when no credential source is configured
    pub fn auth_enabled(&self) -> bool {
        self.api_token.is_some() || self.google_oauth.is_some()
    }
}

fn resolve_google(env: &dyn EnvSource, toml: &TomlConfig) -> Result<Option<GoogleOAuthSettings>> {
    let client_id =
        read_env(env, "GOOGLE_OAUTH_CLIENT_ID")?.or_else(|| toml.google_client_id.clone());
    let client_secret =
        read_env(env, "GOOGLE_OAUTH_CLIENT_SECRET")?.or_else(|| toml.google_client_secret.clone());
    let redirect_url =
        read_env(env, "GOOGLE_OAUTH_REDIRECT_URL")?.or_else(|| toml.google_redirect_url.clone());

    match (client_id, client_secret, redirect_url) {
        (Some(client_id), Some(client_secret), Some(redirect_url)) => Ok(Some(GoogleOAuthSettings {
            client_id,
            client_secret,
            redirect_url,
        })),
        (None, None, None) => Ok(None),
        _ => Err(Error::Config(
            "Google OAuth needs GOOGLE_OAUTH_CLIENT_ID, GOOGLE_OAUTH_CLIENT_SECRET and GOOGLE_OAUTH_REDIRECT_URL together"
                .to_string(),
        )),
    }
}
