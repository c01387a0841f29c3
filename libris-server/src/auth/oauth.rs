//! Google OAuth sign-in

use async_trait::async_trait;
use reqwest::Url;
use serde::Deserialize;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

use libris_common::config::GoogleOAuthSettings;

const AUTHORIZE_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
const TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
const USERINFO_URL: &str = "https://openidconnect.googleapis.com/v1/userinfo";

#[derive(Debug, Error)]
pub enum OAuthError {
    #[error("OAuth configuration error: {0}")]
    Config(String),

    #[error("OAuth code exchange failed: {0}")]
    Exchange(String),

    #[error("Google account email is not verified")]
    Unverified,
}

/// Identity asserted by the provider
#[derive(Debug, Clone, PartialEq)]
pub struct VerifiedIdentity {
    /// Lower-cased email address
    pub email: String,
}

/// OAuth provider seam; tests substitute a fake
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent-screen URL carrying `state`
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError>;

    /// Trade an authorization code for a verified identity
    async fn exchange(&self, code: &str) -> Result<VerifiedIdentity, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
}

#[derive(Debug, Deserialize)]
struct UserInfo {
    email: Option<String>,
    #[serde(default)]
    email_verified: bool,
}

pub struct GoogleIdentityProvider {
    http_client: reqwest::Client,
    settings: GoogleOAuthSettings,
}

impl GoogleIdentityProvider {
    pub fn new(settings: GoogleOAuthSettings) -> Result<Self, OAuthError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| OAuthError::Config(e.to_string()))?;
        Ok(Self {
            http_client,
            settings,
        })
    }
}

#[async_trait]
impl IdentityProvider for GoogleIdentityProvider {
    fn authorize_url(&self, state: &str) -> Result<String, OAuthError> {
        let url = Url::parse_with_params(
            AUTHORIZE_URL,
            &[
                ("client_id", self.settings.client_id.as_str()),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("response_type", "code"),
                ("scope", "openid email"),
                ("state", state),
                ("prompt", "select_account"),
            ],
        )
        .map_err(|e| OAuthError::Config(e.to_string()))?;
        Ok(url.into())
    }

    async fn exchange(&self, code: &str) -> Result<VerifiedIdentity, OAuthError> {
        let token: TokenResponse = self
            .http_client
            .post(TOKEN_URL)
            .form(&[
                ("code", code),
                ("client_id", self.settings.client_id.as_str()),
                ("client_secret", self.settings.client_secret.as_str()),
                ("redirect_uri", self.settings.redirect_url.as_str()),
                ("grant_type", "authorization_code"),
            ])
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OAuthError::Exchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(format!("malformed token response: {}", e)))?;

        let info: UserInfo = self
            .http_client
            .get(USERINFO_URL)
            .bearer_auth(&token.access_token)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| OAuthError::Exchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| OAuthError::Exchange(format!("malformed userinfo response: {}", e)))?;

        match info.email {
            Some(email) if info.email_verified => {
                debug!(email = %email, "Google identity verified");
                Ok(VerifiedIdentity {
                    email: email.trim().to_lowercase(),
                })
            }
            _ => Err(OAuthError::Unverified),
        }
    }
}
