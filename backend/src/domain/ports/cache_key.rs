//! Cache key type shared by metadata response cache adapters.
use sha2::{Digest, Sha256};
use thiserror::Error;

/// Namespace prepended to every metadata cache key.
pub const METADATA_CACHE_NAMESPACE: &str = "sensornet:v1";

/// Cache key identifying one rendered metadata response.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MetadataCacheKey(String);

impl MetadataCacheKey {
    /// Construct a cache key after validating that it is non-empty and trimmed.
    pub fn new(value: impl Into<String>) -> Result<Self, MetadataCacheKeyValidationError> {
        let raw = value.into();
        if raw.trim().is_empty() {
            return Err(MetadataCacheKeyValidationError::Empty);
        }
        if raw.chars().any(char::is_whitespace) {
            return Err(MetadataCacheKeyValidationError::ContainsWhitespace);
        }
        Ok(Self(raw))
    }

    /// Fingerprint a request path and raw query string.
    ///
    /// # Examples
    /// ```
    /// use sensornet::domain::ports::MetadataCacheKey;
    ///
    /// let key = MetadataCacheKey::for_request("/sensor-networks", "");
    /// assert!(key.as_str().starts_with("sensornet:v1:"));
    /// assert_eq!(key.as_str().len(), "sensornet:v1:".len() + 64);
    /// ```
    pub fn for_request(path: &str, query: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(path.as_bytes());
        hasher.update(b"?");
        hasher.update(query.as_bytes());
        Self(format!(
            "{METADATA_CACHE_NAMESPACE}:{}",
            hex::encode(hasher.finalize())
        ))
    }

    /// Borrow the underlying key as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl std::fmt::Display for MetadataCacheKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl AsRef<str> for MetadataCacheKey {
    fn as_ref(&self) -> &str {
        self.as_str()
    }
}

/// Validation errors returned when constructing [`MetadataCacheKey`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MetadataCacheKeyValidationError {
    /// Key is empty after trimming whitespace.
    #[error("metadata cache key must not be empty")]
    Empty,
    /// Key contains whitespace anywhere.
    #[error("metadata cache key must not contain whitespace")]
    ContainsWhitespace,
}
