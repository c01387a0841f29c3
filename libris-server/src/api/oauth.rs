//! Google sign-in endpoints

use axum::{
    extract::{Query, State},
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use libris_common::Error;

use super::session::with_cookies;
use crate::auth::middleware::{
    clear_cookie, cookie_value, set_cookie, tokens_match, OAUTH_STATE_COOKIE, SESSION_COOKIE,
};
use crate::auth::IdentityProvider;
use crate::error::{ApiError, ApiResult};
use crate::AppState;

/// Lifetime of the anti-forgery state cookie
const STATE_MAX_AGE_SECS: u64 = 10 * 60;

#[derive(Debug, Default, Deserialize)]
pub struct CallbackQuery {
    pub code: Option<String>,
    pub state: Option<String>,
    pub error: Option<String>,
}

fn provider(state: &AppState) -> ApiResult<Arc<dyn IdentityProvider>> {
    state
        .identity
        .clone()
        .ok_or_else(|| Error::not_found("Google sign-in is not configured").into())
}

/// Whether `email` is on the allow-list; an empty list admits nobody
pub fn email_allowed(allowed: &[String], email: &str) -> bool {
    allowed.iter().any(|a| a.trim().eq_ignore_ascii_case(email.trim()))
}

/// GET /api/auth/google
pub async fn start(State(state): State<AppState>) -> ApiResult<Response> {
    let identity = provider(&state)?;

    let mut bytes = [0u8; 16];
    rand::thread_rng().fill_bytes(&mut bytes);
    let nonce = URL_SAFE_NO_PAD.encode(bytes);

    let url = identity.authorize_url(&nonce)?;
    let cookie = set_cookie(
        OAUTH_STATE_COOKIE,
        &nonce,
        STATE_MAX_AGE_SECS,
        state.settings.cookie_secure,
    );
    with_cookies(Redirect::to(&url).into_response(), &[cookie])
}

/// GET /api/auth/google/callback
pub async fn callback(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<CallbackQuery>,
) -> ApiResult<Response> {
    let identity = provider(&state)?;

    if let Some(error) = query.error {
        warn!(error = %error, "Google sign-in was declined");
        return Err(ApiError::Unauthorized(format!("sign-in failed: {}", error)));
    }

    let expected = cookie_value(&headers, OAUTH_STATE_COOKIE);
    let state_ok = match (query.state.as_deref(), expected.as_deref()) {
        (Some(given), Some(expected)) => tokens_match(given, expected),
        _ => false,
    };
    if !state_ok {
        warn!("OAuth callback state mismatch");
        return Err(ApiError::Unauthorized("invalid OAuth state".to_string()));
    }

    let code = query
        .code
        .filter(|c| !c.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing authorization code".to_string()))?;
    let verified = identity.exchange(&code).await?;

    if !email_allowed(&state.settings.allowed_emails, &verified.email) {
        warn!(email = %verified.email, "Google account is not on the allow-list");
        return Err(ApiError::Forbidden(
            "this account is not allowed to sign in".to_string(),
        ));
    }

    let owner = verified.email.to_lowercase();
    let token = state.sessions.create(&owner).await;
    info!(owner = %owner, "Google sign-in");

    let secure = state.settings.cookie_secure;
    let cookies = [
        set_cookie(SESSION_COOKIE, &token, state.sessions.ttl().as_secs(), secure),
        clear_cookie(OAUTH_STATE_COOKIE, secure),
    ];
    with_cookies(
        Redirect::to(&state.settings.frontend_url).into_response(),
        &cookies,
    )
}
