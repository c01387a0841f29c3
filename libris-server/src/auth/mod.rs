//! Authentication: bearer token, session cookies and Google OAuth

pub mod limiter;
pub mod middleware;
pub mod oauth;
pub mod sessions;

pub use limiter::LoginLimiter;
pub use middleware::{require_auth, AuthMethod, Principal};
pub use oauth::{GoogleIdentityProvider, IdentityProvider, OAuthError, VerifiedIdentity};
pub use sessions::SessionStore;
