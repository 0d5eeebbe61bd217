//! Cache layer for session records and replay markers.
//!
//! Two stores back the gate:
//! - the shared cache ([`SharedCache`]), external and TTL-based, which is the
//!   source of truth for live sessions (keyed by token) and replay markers;
//! - the local session store ([`session::LocalSessionStore`]), in-process,
//!   keyed by the `sid` cookie.
//!
//! Shared cache lookups are three-valued ([`CacheLookup`]) so callers can tell
//! a miss from an outage and apply the configured failure policy.

pub mod memory;
pub mod redis_cache;
pub mod session;

pub use memory::InMemoryCache;
pub use redis_cache::RedisCache;
pub use session::LocalSessionStore;

use async_trait::async_trait;

/// Errors raised by shared cache backends.
#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Cache operation timed out after {0}ms")]
    Timeout(u64),
}

/// Result of a shared cache read.
#[derive(Debug)]
pub enum CacheLookup {
    Found(String),
    NotFound,
    Unavailable(CacheError),
}

impl CacheLookup {
    pub fn is_found(&self) -> bool {
        matches!(self, CacheLookup::Found(_))
    }
}

impl From<Result<Option<String>, CacheError>> for CacheLookup {
    fn from(result: Result<Option<String>, CacheError>) -> Self {
        match result {
            Ok(Some(value)) => CacheLookup::Found(value),
            Ok(None) => CacheLookup::NotFound,
            Err(e) => CacheLookup::Unavailable(e),
        }
    }
}

/// External key-value store with per-key TTL, shared by every gate instance.
///
/// Implementations must be safe for concurrent use from many requests; no
/// application-level locking is done on top of them.
#[async_trait]
pub trait SharedCache: Send + Sync {
    /// Read a key. `Ok(None)` when the key is absent or expired.
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    /// Write a key with a TTL, overwriting any existing value.
    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;

    /// Write a key with a TTL only if it is absent.
    ///
    /// Returns `true` when this call created the key. The check and the write
    /// happen as one operation, so of any number of concurrent callers for the
    /// same key exactly one observes `true`.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, CacheError>;

    /// Three-valued read used by the guards.
    async fn lookup(&self, key: &str) -> CacheLookup {
        self.get(key).await.into()
    }
}

/// A store holding entries that expire and need periodic purging.
#[async_trait]
pub trait Sweep: Send + Sync {
    /// Short name used in sweep logs.
    fn name(&self) -> &'static str;

    /// Drop expired entries, returning how many were removed.
    async fn purge_expired(&self) -> usize;
}
