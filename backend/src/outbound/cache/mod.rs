//! Redis adapters for the job-status store and the metadata response cache.
//!
//! Both share one `bb8-redis` pool. Keys are namespaced so several services
//! can share a Redis instance.

mod redis_job_status_store;
mod redis_response_cache;

use bb8_redis::RedisConnectionManager;
use bb8_redis::bb8::{Pool, PooledConnection};
use tracing::info;

pub use redis_job_status_store::RedisJobStatusStore;
pub use redis_response_cache::{CacheTtl, RedisResponseCache};

/// Cloneable handle to a Redis connection pool.
#[derive(Clone)]
pub struct RedisPool {
    inner: Pool<RedisConnectionManager>,
}

impl RedisPool {
    /// Connect to `redis_url` with at most `max_size` connections.
    ///
    /// # Errors
    ///
    /// Returns the Redis error message when the URL is invalid or the first
    /// connection cannot be opened.
    pub async fn connect(redis_url: &str, max_size: u32) -> Result<Self, String> {
        let manager = RedisConnectionManager::new(redis_url).map_err(|err| err.to_string())?;
        let inner = Pool::builder()
            .max_size(max_size.max(1))
            .build(manager)
            .await
            .map_err(|err| err.to_string())?;
        info!(max_size, "redis pool ready");
        Ok(Self { inner })
    }

    pub(crate) async fn get(
        &self,
    ) -> Result<PooledConnection<'_, RedisConnectionManager>, String> {
        self.inner.get().await.map_err(|err| err.to_string())
    }
}
