//! Session endpoints
//!
//! - POST /api/session: trade the API token for a session cookie
//! - GET /api/session: current principal
//! - DELETE /api/session: log out

use axum::{
    extract::{rejection::JsonRejection, ConnectInfo, State},
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use tracing::{info, warn};

use super::json_body;
use crate::auth::middleware::{
    authenticate, clear_cookie, cookie_value, set_cookie, tokens_match, SESSION_COOKIE,
};
use crate::auth::{AuthMethod, Principal};
use crate::error::{ApiError, ApiResult};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub token: String,
}

/// Peer address of the connection; forwarded headers are not trusted
pub(crate) fn client_ip(connect: Option<ConnectInfo<SocketAddr>>) -> IpAddr {
    connect
        .map(|ConnectInfo(addr)| addr.ip())
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

/// Append `Set-Cookie` headers to a response
pub(crate) fn with_cookies(mut response: Response, cookies: &[String]) -> ApiResult<Response> {
    for cookie in cookies {
        let value = HeaderValue::from_str(cookie)
            .map_err(|e| ApiError::Internal(format!("invalid cookie header: {}", e)))?;
        response.headers_mut().append(header::SET_COOKIE, value);
    }
    Ok(response)
}

fn retry_after(lockout: std::time::Duration) -> ApiError {
    ApiError::TooManyAttempts {
        retry_after_secs: lockout.as_secs().max(1),
    }
}

/// POST /api/session
pub async fn login(
    State(state): State<AppState>,
    connect: Option<ConnectInfo<SocketAddr>>,
    payload: Result<Json<LoginRequest>, JsonRejection>,
) -> ApiResult<Response> {
    let client = client_ip(connect);
    if let Some(remaining) = state.limiter.locked_for(client).await {
        return Err(retry_after(remaining));
    }

    let request = json_body(payload)?;
    let Some(expected) = state.settings.api_token.as_deref() else {
        return Err(ApiError::Unauthorized(
            "token login is not configured".to_string(),
        ));
    };

    if !tokens_match(request.token.trim(), expected) {
        warn!(client = %client, "Rejected session login");
        if let Some(lockout) = state.limiter.record_failure(client).await {
            return Err(retry_after(lockout));
        }
        return Err(ApiError::Unauthorized("invalid token".to_string()));
    }

    state.limiter.record_success(client).await;
    let owner = state.settings.token_owner.clone();
    let token = state.sessions.create(&owner).await;
    info!(client = %client, owner = %owner, "Session login");

    let cookie = set_cookie(
        SESSION_COOKIE,
        &token,
        state.sessions.ttl().as_secs(),
        state.settings.cookie_secure,
    );
    let body = Json(Principal {
        owner,
        method: AuthMethod::Session,
    });
    with_cookies(body.into_response(), &[cookie])
}

/// GET /api/session
pub async fn whoami(
    State(state): State<AppState>,
    headers: HeaderMap,
) -> ApiResult<Json<Principal>> {
    authenticate(&state, &headers)
        .await
        .map(Json)
        .ok_or_else(|| ApiError::Unauthorized("authentication required".to_string()))
}

/// DELETE /api/session
pub async fn logout(State(state): State<AppState>, headers: HeaderMap) -> ApiResult<Response> {
    if let Some(token) = cookie_value(&headers, SESSION_COOKIE) {
        if state.sessions.revoke(&token).await {
            info!("Session logout");
        }
    }
    let cookie = clear_cookie(SESSION_COOKIE, state.settings.cookie_secure);
    with_cookies(StatusCode::NO_CONTENT.into_response(), &[cookie])
}
