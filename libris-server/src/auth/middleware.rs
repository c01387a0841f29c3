//! Request authentication
//!
//! A request is authenticated by `Authorization: Bearer <token>` matching the
//! configured API token, or by a live `libris_session` cookie. The resolved
//! [`Principal`] is attached to the request extensions for handlers.

use axum::{
    extract::{Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use serde::Serialize;
use sha2::{Digest, Sha256};

use crate::error::ApiError;
use crate::AppState;

pub const SESSION_COOKIE: &str = "libris_session";
pub const OAUTH_STATE_COOKIE: &str = "libris_oauth_state";

/// How the principal was established
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    Token,
    Session,
    /// No credentials are configured
    Disabled,
}

/// The authenticated caller; owner of everything it reads and writes
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Principal {
    pub owner: String,
    pub method: AuthMethod,
}

/// Compare secrets in constant time
///
/// Both sides are hashed first so the comparison length never depends on the
/// input.
pub fn tokens_match(provided: &str, expected: &str) -> bool {
    let a = Sha256::digest(provided.as_bytes());
    let b = Sha256::digest(expected.as_bytes());
    a.iter().zip(b.iter()).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    scheme
        .eq_ignore_ascii_case("bearer")
        .then(|| token.trim())
        .filter(|t| !t.is_empty())
}

/// Value of cookie `name` from the `Cookie` headers
pub fn cookie_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim().to_string())
        .filter(|v| !v.is_empty())
}

/// `Set-Cookie` value for an HttpOnly cookie
pub fn set_cookie(name: &str, value: &str, max_age_secs: u64, secure: bool) -> String {
    let mut cookie = format!(
        "{}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={}",
        name, value, max_age_secs
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

/// `Set-Cookie` value that deletes cookie `name`
pub fn clear_cookie(name: &str, secure: bool) -> String {
    set_cookie(name, "", 0, secure)
}

/// Resolve the caller from request headers
pub async fn authenticate(state: &AppState, headers: &HeaderMap) -> Option<Principal> {
    let settings = &state.settings;
    if !settings.auth_enabled() {
        return Some(Principal {
            owner: settings.token_owner.clone(),
            method: AuthMethod::Disabled,
        });
    }

    if let (Some(provided), Some(expected)) = (bearer_token(headers), settings.api_token.as_deref()) {
        if tokens_match(provided, expected) {
            return Some(Principal {
                owner: settings.token_owner.clone(),
                method: AuthMethod::Token,
            });
        }
    }

    let token = cookie_value(headers, SESSION_COOKIE)?;
    let session = state.sessions.validate(&token).await?;
    Some(Principal {
        owner: session.owner,
        method: AuthMethod::Session,
    })
}

/// Reject unauthenticated requests with 401
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let principal = authenticate(&state, request.headers())
        .await
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))?;
    request.extensions_mut().insert(principal);
    Ok(next.run(request).await)
}
