//! In-process session store
//!
//! Clients hold a random token; the store keeps only its SHA-256 digest.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::RngCore;
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::RwLock;
use tracing::debug;

const TOKEN_BYTES: usize = 32;

/// An authenticated browser session
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub owner: String,
    created: Instant,
}

fn digest(token: &str) -> String {
    URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()))
}

pub struct SessionStore {
    ttl: Duration,
    sessions: RwLock<HashMap<String, Session>>,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            sessions: RwLock::new(HashMap::new()),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    fn expired(&self, session: &Session) -> bool {
        session.created.elapsed() >= self.ttl
    }

    /// Start a session for `owner`, returning the client token
    pub async fn create(&self, owner: &str) -> String {
        let mut bytes = [0u8; TOKEN_BYTES];
        rand::thread_rng().fill_bytes(&mut bytes);
        let token = URL_SAFE_NO_PAD.encode(bytes);

        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, s| s.created.elapsed() < self.ttl);
        sessions.insert(
            digest(&token),
            Session {
                owner: owner.to_string(),
                created: Instant::now(),
            },
        );
        debug!(owner = %owner, active = sessions.len(), "Session created");
        token
    }

    /// Session for `token`, purging it if it has expired
    pub async fn validate(&self, token: &str) -> Option<Session> {
        let key = digest(token);
        {
            let sessions = self.sessions.read().await;
            match sessions.get(&key) {
                Some(session) if !self.expired(session) => return Some(session.clone()),
                Some(_) => {}
                None => return None,
            }
        }
        self.sessions.write().await.remove(&key);
        None
    }

    /// Forget a session; true if it existed
    pub async fn revoke(&self, token: &str) -> bool {
        self.sessions.write().await.remove(&digest(token)).is_some()
    }
}
