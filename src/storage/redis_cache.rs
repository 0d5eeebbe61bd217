//! Redis-backed shared cache.
//!
//! Redis key patterns:
//! - `{token}`: session payload written by the login flow (TTL owned there)
//! - `url_{target}|timespan|timespan_{tsp}`: replay marker (TTL = remaining validity of the timestamp)
//!
//! Every operation opens a multiplexed connection and runs under a bounded
//! timeout; a timeout surfaces as [`CacheError::Timeout`].

use super::{CacheError, SharedCache};
use async_trait::async_trait;
use redis::AsyncCommands;
use std::future::Future;
use std::time::Duration;

#[derive(Clone)]
pub struct RedisCache {
    client: redis::Client,
    timeout: Duration,
}

impl RedisCache {
    pub fn new(client: redis::Client, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    /// Open a client for `url`. Does not connect.
    pub fn open(url: &str, timeout: Duration) -> Result<Self, CacheError> {
        let client = redis::Client::open(url)?;
        Ok(Self::new(client, timeout))
    }

    /// Round-trip a PING to verify the server is reachable.
    pub async fn ping(&self) -> Result<(), CacheError> {
        self.bounded(async {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            redis::cmd("PING").query_async::<String>(&mut con).await?;
            Ok(())
        })
        .await
    }

    async fn bounded<T>(
        &self,
        op: impl Future<Output = Result<T, redis::RedisError>>,
    ) -> Result<T, CacheError> {
        match tokio::time::timeout(self.timeout, op).await {
            Ok(result) => Ok(result?),
            Err(_) => Err(CacheError::Timeout(self.timeout.as_millis() as u64)),
        }
    }
}

#[async_trait]
impl SharedCache for RedisCache {
    async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.bounded(async {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            let value: Option<String> = con.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        self.bounded(async {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            con.set_ex::<_, _, ()>(key, value, ttl_secs).await
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, CacheError> {
        self.bounded(async {
            let mut con = self.client.get_multiplexed_async_connection().await?;
            // SET NX EX replies OK when the key was written and nil otherwise.
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(ttl_secs)
                .query_async(&mut con)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }
}
