//! Port for caching rendered metadata responses.
use async_trait::async_trait;

use super::{MetadataCacheKey, define_port_error};

define_port_error! {
    /// Errors surfaced by the caching adapter.
    pub enum ResponseCacheError {
        /// Cache backend is unavailable or timing out.
        Backend { message: String } => "response cache backend failure: {message}",
    }
}

/// Cache of serialised JSON bodies.
///
/// Callers treat every error as a miss.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ResponseCache: Send + Sync {
    /// Read a cached body for the given key.
    async fn get(&self, key: &MetadataCacheKey) -> Result<Option<String>, ResponseCacheError>;

    /// Store a body using the supplied key.
    async fn put(&self, key: &MetadataCacheKey, body: &str) -> Result<(), ResponseCacheError>;
}

/// Cache that never stores anything, used when Redis is not configured.
#[derive(Debug, Default, Clone, Copy)]
pub struct DisabledResponseCache;

#[async_trait]
impl ResponseCache for DisabledResponseCache {
    async fn get(&self, _key: &MetadataCacheKey) -> Result<Option<String>, ResponseCacheError> {
        Ok(None)
    }

    async fn put(&self, _key: &MetadataCacheKey, _body: &str) -> Result<(), ResponseCacheError> {
        Ok(())
    }
}
