//! Redis-backed cache of rendered metadata responses.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;
use rand::Rng;

use crate::domain::ports::{MetadataCacheKey, ResponseCache, ResponseCacheError};

use super::RedisPool;

/// Base expiry plus a random spread so entries written together do not
/// expire together.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CacheTtl {
    pub base: Duration,
    pub jitter: Duration,
}

impl Default for CacheTtl {
    fn default() -> Self {
        Self {
            base: Duration::from_secs(600),
            jitter: Duration::from_secs(60),
        }
    }
}

impl CacheTtl {
    /// Expiry in whole seconds drawn from `[base, base + jitter]`.
    pub fn sample(&self, rng: &mut impl Rng) -> u64 {
        let base = self.base.as_secs().max(1);
        let jitter = self.jitter.as_secs();
        if jitter == 0 {
            return base;
        }
        base + rng.gen_range(0..=jitter)
    }
}

/// [`ResponseCache`] storing bodies under their metadata cache key.
#[derive(Clone)]
pub struct RedisResponseCache {
    pool: RedisPool,
    ttl: CacheTtl,
}

impl RedisResponseCache {
    pub fn new(pool: RedisPool, ttl: CacheTtl) -> Self {
        Self { pool, ttl }
    }
}

#[async_trait]
impl ResponseCache for RedisResponseCache {
    async fn get(&self, key: &MetadataCacheKey) -> Result<Option<String>, ResponseCacheError> {
        let mut conn = self.pool.get().await.map_err(ResponseCacheError::backend)?;
        conn.get(key.as_str())
            .await
            .map_err(|err| ResponseCacheError::backend(err.to_string()))
    }

    async fn put(&self, key: &MetadataCacheKey, body: &str) -> Result<(), ResponseCacheError> {
        let seconds = self.ttl.sample(&mut rand::thread_rng());
        let mut conn = self.pool.get().await.map_err(ResponseCacheError::backend)?;
        conn.set_ex::<_, _, ()>(key.as_str(), body, seconds)
            .await
            .map_err(|err| ResponseCacheError::backend(err.to_string()))
    }
}
