use async_trait::async_trait;
use redis::AsyncCommands;
use serde::{de::DeserializeOwned, Serialize};

/// Durable JSON cache with TTL, used for best-effort persistence of cost
/// and metrics aggregates across restarts. In-memory state stays
/// authoritative for the life of the process; cache failures are logged by
/// callers and swallowed.
#[async_trait]
pub trait KvCache: Send + Sync {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError>;
    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError>;
    async fn delete(&self, key: &str) -> Result<(), CacheError>;
}

/// Typed helpers over the raw string interface.
pub async fn get_json<T: DeserializeOwned>(
    cache: &dyn KvCache,
    key: &str,
) -> Result<Option<T>, CacheError> {
    match cache.get_raw(key).await? {
        Some(raw) => Ok(serde_json::from_str(&raw).ok()),
        None => Ok(None),
    }
}

pub async fn set_json<T: Serialize>(
    cache: &dyn KvCache,
    key: &str,
    value: &T,
    ttl_secs: u64,
) -> Result<(), CacheError> {
    let raw = serde_json::to_string(value)?;
    cache.set_raw(key, &raw, ttl_secs).await
}

/// Redis-backed implementation.
pub struct RedisCache {
    client: redis::Client,
}

impl RedisCache {
    pub fn new(redis_url: &str) -> Result<Self, CacheError> {
        Ok(Self {
            client: redis::Client::open(redis_url)?,
        })
    }
}

#[async_trait]
impl KvCache for RedisCache {
    async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        Ok(conn.get(key).await?)
    }

    async fn set_raw(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.set_ex(key, value, ttl_secs).await?;
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<(), CacheError> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        let _: () = conn.del(key).await?;
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum CacheError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

/// In-memory cache for tests.
#[cfg(test)]
pub mod memory {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;

    #[derive(Default)]
    pub struct MemoryCache {
        entries: Mutex<HashMap<String, String>>,
    }

    #[async_trait]
    impl KvCache for MemoryCache {
        async fn get_raw(&self, key: &str) -> Result<Option<String>, CacheError> {
            Ok(self.entries.lock().unwrap().get(key).cloned())
        }

        async fn set_raw(&self, key: &str, value: &str, _ttl_secs: u64) -> Result<(), CacheError> {
            self.entries
                .lock()
                .unwrap()
                .insert(key.to_string(), value.to_string());
            Ok(())
        }

        async fn delete(&self, key: &str) -> Result<(), CacheError> {
            self.entries.lock().unwrap().remove(key);
            Ok(())
        }
    }
}
