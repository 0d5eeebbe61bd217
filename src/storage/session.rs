//! Local session store.
//!
//! Holds the login session hydrated from the shared cache, keyed by the
//! browser's `sid` cookie. Entries expire after an idle period that is
//! refreshed on every read.
//!
//! ## Security: Zeroizing Sensitive Data
//!
//! Session ids are generated from 32 random bytes held in a `Zeroizing`
//! buffer, so the raw entropy is cleared once encoded.

use super::Sweep;
use crate::models::{LoginSession, SessionSource};
use async_trait::async_trait;
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;
use zeroize::Zeroizing;

/// Generate a random local session id.
///
/// Returns a URL-safe base64 string (43 characters) from 32 random bytes,
/// usable as a cookie value without escaping.
pub fn generate_session_id() -> String {
    let mut bytes = Zeroizing::new([0u8; 32]);
    rand::rng().fill(&mut bytes[..]);
    URL_SAFE_NO_PAD.encode(&bytes[..])
}

#[derive(Debug)]
struct LocalEntry {
    login: LoginSession,
    expires_at: Instant,
}

#[derive(Debug)]
pub struct LocalSessionStore {
    entries: RwLock<HashMap<String, LocalEntry>>,
    idle_ttl: Duration,
}

impl LocalSessionStore {
    pub fn new(idle_ttl: Duration) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            idle_ttl,
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        self.idle_ttl
    }

    /// Get the login held for `sid`, refreshing its idle expiry.
    ///
    /// The returned session is tagged [`SessionSource::Local`].
    pub async fn get(&self, sid: &str) -> Option<LoginSession> {
        let now = Instant::now();
        let mut entries = self.entries.write().await;

        match entries.get_mut(sid) {
            Some(entry) if entry.expires_at > now => {
                entry.expires_at = now + self.idle_ttl;
                Some(LoginSession {
                    source: SessionSource::Local,
                    ..entry.login.clone()
                })
            }
            Some(_) => {
                entries.remove(sid);
                None
            }
            None => None,
        }
    }

    /// Store a login for `sid`, replacing any previous one.
    pub async fn put(&self, sid: &str, login: LoginSession) {
        let entry = LocalEntry {
            login,
            expires_at: Instant::now() + self.idle_ttl,
        };
        self.entries.write().await.insert(sid.to_string(), entry);
    }

    /// Drop the login for `sid`.
    ///
    /// Returns true if a session was removed.
    pub async fn clear(&self, sid: &str) -> bool {
        self.entries.write().await.remove(sid).is_some()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[async_trait]
impl Sweep for LocalSessionStore {
    fn name(&self) -> &'static str {
        "local_sessions"
    }

    async fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().await;
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        before - entries.len()
    }
}
