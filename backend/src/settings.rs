//! Service configuration loaded via OrthoConfig.
//!
//! Every field may come from the command line, a `SENSORNET_*` environment
//! variable or a configuration file. Unset values fall back to the defaults
//! exposed by the accessor methods.

use std::net::SocketAddr;
use std::time::Duration;

use ortho_config::OrthoConfig;
use serde::Deserialize;

use crate::domain::{DatadumpConfig, FanOutConfig, TableNaming};
use crate::outbound::cache::CacheTtl;

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_POOL_SIZE: u32 = 10;
const DEFAULT_REDIS_POOL_SIZE: u32 = 8;
const DEFAULT_MAX_CONCURRENT_QUERIES: usize = 8;
const DEFAULT_CACHE_TTL_SECS: u64 = 600;
const DEFAULT_CACHE_JITTER_SECS: u64 = 60;
const DEFAULT_WORKER_POLL_MILLIS: u64 = 1000;

/// Settings for the HTTP service and its inline datadump worker.
#[derive(Debug, Clone, Default, Deserialize, OrthoConfig)]
#[ortho_config(prefix = "SENSORNET")]
pub struct ServiceSettings {
    /// Socket address the HTTP server binds to.
    pub bind_addr: Option<String>,
    /// Metadata, queue and chunk database. In-memory stores are used when
    /// unset.
    pub database_url: Option<String>,
    /// Observation warehouse; defaults to the metadata database.
    pub warehouse_url: Option<String>,
    /// Redis for job status and the metadata cache.
    pub redis_url: Option<String>,
    pub pool_size: Option<u32>,
    pub redis_pool_size: Option<u32>,
    /// Upper bound on concurrent table queries per request.
    pub max_concurrent_queries: Option<usize>,
    /// Per-table query deadline; unset waits indefinitely.
    pub query_timeout_secs: Option<u64>,
    /// Records per datadump chunk.
    pub chunk_size: Option<u64>,
    /// Public URL root used in job status and download links.
    pub url_root: Option<String>,
    pub cache_ttl_secs: Option<u64>,
    pub cache_jitter_secs: Option<u64>,
    /// `feature` or `network_prefixed`.
    pub table_naming: Option<String>,
    /// Run a datadump worker inside the HTTP process.
    #[ortho_config(default = false)]
    pub inline_worker: bool,
    pub worker_poll_millis: Option<u64>,
}

impl ServiceSettings {
    /// Parsed bind address.
    ///
    /// # Errors
    ///
    /// Returns the parse error when the configured address is malformed.
    pub fn bind_addr(&self) -> Result<SocketAddr, std::net::AddrParseError> {
        self.bind_addr
            .as_deref()
            .unwrap_or(DEFAULT_BIND_ADDR)
            .parse()
    }

    /// Warehouse URL, falling back to the metadata database.
    pub fn warehouse_url(&self) -> Option<&str> {
        self.warehouse_url
            .as_deref()
            .or(self.database_url.as_deref())
    }

    pub fn pool_size(&self) -> u32 {
        self.pool_size.unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn redis_pool_size(&self) -> u32 {
        self.redis_pool_size.unwrap_or(DEFAULT_REDIS_POOL_SIZE)
    }

    pub fn fan_out(&self) -> FanOutConfig {
        FanOutConfig {
            max_concurrency: self
                .max_concurrent_queries
                .unwrap_or(DEFAULT_MAX_CONCURRENT_QUERIES)
                .max(1),
            query_timeout: self.query_timeout_secs.map(Duration::from_secs),
        }
    }

    pub fn datadump(&self) -> DatadumpConfig {
        let defaults = DatadumpConfig::default();
        let chunk_size = self.chunk_size.unwrap_or(defaults.chunk_size).max(1);
        DatadumpConfig {
            chunk_size,
            window_size: chunk_size,
            ..defaults
        }
    }

    pub fn cache_ttl(&self) -> CacheTtl {
        CacheTtl {
            base: Duration::from_secs(self.cache_ttl_secs.unwrap_or(DEFAULT_CACHE_TTL_SECS)),
            jitter: Duration::from_secs(
                self.cache_jitter_secs.unwrap_or(DEFAULT_CACHE_JITTER_SECS),
            ),
        }
    }

    /// Configured table naming scheme.
    ///
    /// # Errors
    ///
    /// Returns a message naming the unknown scheme.
    pub fn table_naming(&self) -> Result<TableNaming, String> {
        self.table_naming
            .as_deref()
            .map_or(Ok(TableNaming::default()), str::parse)
    }

    pub fn worker_poll_interval(&self) -> Duration {
        Duration::from_millis(self.worker_poll_millis.unwrap_or(DEFAULT_WORKER_POLL_MILLIS))
    }
}
