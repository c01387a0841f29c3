//! Per-client login failure limiter

use std::collections::HashMap;
use std::net::IpAddr;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::warn;

pub const DEFAULT_MAX_FAILURES: u32 = 5;
pub const DEFAULT_LOCKOUT: Duration = Duration::from_secs(15 * 60);

#[derive(Debug)]
struct Attempts {
    failures: u32,
    first_failure: Instant,
    locked_until: Option<Instant>,
}

impl Attempts {
    fn new(now: Instant) -> Self {
        Self {
            failures: 0,
            first_failure: now,
            locked_until: None,
        }
    }

    /// Failures count within one window; an expired lockout also ends the entry
    fn is_stale(&self, now: Instant, window: Duration) -> bool {
        match self.locked_until {
            Some(until) => until <= now,
            None => now.duration_since(self.first_failure) >= window,
        }
    }
}

/// Locks a client out after repeated failed logins
///
/// Failures older than the lockout duration are forgotten.
pub struct LoginLimiter {
    max_failures: u32,
    lockout: Duration,
    clients: Mutex<HashMap<IpAddr, Attempts>>,
}

impl Default for LoginLimiter {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_FAILURES, DEFAULT_LOCKOUT)
    }
}

impl LoginLimiter {
    pub fn new(max_failures: u32, lockout: Duration) -> Self {
        Self {
            max_failures,
            lockout,
            clients: Mutex::new(HashMap::new()),
        }
    }

    /// Remaining lockout for `client`, if any
    pub async fn locked_for(&self, client: IpAddr) -> Option<Duration> {
        let mut clients = self.clients.lock().await;
        let attempts = clients.get(&client)?;
        let until = attempts.locked_until?;
        let now = Instant::now();
        if until > now {
            return Some(until - now);
        }
        clients.remove(&client);
        None
    }

    /// Count a failure; returns the lockout if this one triggered it
    pub async fn record_failure(&self, client: IpAddr) -> Option<Duration> {
        let now = Instant::now();
        let mut clients = self.clients.lock().await;
        clients.retain(|_, attempts| !attempts.is_stale(now, self.lockout));

        let attempts = clients.entry(client).or_insert_with(|| Attempts::new(now));
        attempts.failures += 1;
        if attempts.failures >= self.max_failures {
            attempts.locked_until = Some(now + self.lockout);
            warn!(client = %client, failures = attempts.failures, "Client locked out after failed logins");
            return Some(self.lockout);
        }
        None
    }

    pub async fn record_success(&self, client: IpAddr) {
        self.clients.lock().await.remove(&client);
    }
}
