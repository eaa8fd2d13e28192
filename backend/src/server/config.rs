//! HTTP server configuration object and helpers.

use std::io;
use std::net::SocketAddr;
use std::time::Duration;

use sensornet::domain::{DatadumpConfig, FanOutConfig, TableNaming};
use sensornet::outbound::cache::{CacheTtl, RedisPool};
use sensornet::outbound::persistence::{DbPool, PoolConfig, run_migrations};
use sensornet::settings::ServiceSettings;
use tracing::{info, warn};

#[cfg(feature = "metrics")]
use actix_web_prom::PrometheusMetrics;

/// Connected backing stores. Without them the server runs on empty
/// in-memory adapters.
#[derive(Clone)]
pub struct StoreHandles {
    pub(crate) metadata: DbPool,
    pub(crate) warehouse: DbPool,
    pub(crate) redis: Option<RedisPool>,
}

/// Builder-style configuration for creating the HTTP server.
pub struct ServerConfig {
    pub(crate) bind_addr: SocketAddr,
    pub(crate) stores: Option<StoreHandles>,
    pub(crate) fan_out: FanOutConfig,
    pub(crate) datadump: DatadumpConfig,
    pub(crate) table_naming: TableNaming,
    pub(crate) cache_ttl: CacheTtl,
    pub(crate) url_root: Option<String>,
    pub(crate) inline_worker: bool,
    pub(crate) worker_poll_interval: Duration,
    #[cfg(feature = "metrics")]
    pub(crate) prometheus: Option<PrometheusMetrics>,
}

impl ServerConfig {
    /// Construct a configuration with default tuning and no stores.
    #[must_use]
    pub fn new(bind_addr: SocketAddr) -> Self {
        Self {
            bind_addr,
            stores: None,
            fan_out: FanOutConfig::default(),
            datadump: DatadumpConfig::default(),
            table_naming: TableNaming::default(),
            cache_ttl: CacheTtl::default(),
            url_root: None,
            inline_worker: false,
            worker_poll_interval: Duration::from_secs(1),
            #[cfg(feature = "metrics")]
            prometheus: None,
        }
    }

    /// Apply service settings, leaving stores unconnected.
    ///
    /// # Errors
    /// Returns [`io::ErrorKind::InvalidInput`] for a malformed bind address or
    /// an unknown table naming scheme.
    pub fn from_settings(settings: &ServiceSettings) -> io::Result<Self> {
        let bind_addr = settings
            .bind_addr()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        let table_naming = settings
            .table_naming()
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidInput, err))?;
        Ok(Self {
            fan_out: settings.fan_out(),
            datadump: settings.datadump(),
            table_naming,
            cache_ttl: settings.cache_ttl(),
            url_root: settings.url_root.clone(),
            inline_worker: settings.inline_worker,
            worker_poll_interval: settings.worker_poll_interval(),
            ..Self::new(bind_addr)
        })
    }

    /// Attach connected stores for the Diesel and Redis adapters.
    #[must_use]
    pub fn with_stores(mut self, stores: StoreHandles) -> Self {
        self.stores = Some(stores);
        self
    }

    /// Return the socket address the server will bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        self.bind_addr
    }

    #[cfg(feature = "metrics")]
    /// Attach Prometheus middleware to the configuration.
    #[must_use]
    pub fn with_metrics(mut self, prometheus: Option<PrometheusMetrics>) -> Self {
        self.prometheus = prometheus;
        self
    }
}

/// Run migrations and open the pools named by `settings`.
///
/// Returns `None` when no database is configured.
///
/// # Errors
/// Propagates migration, pool and Redis connection failures.
pub async fn connect_stores(settings: &ServiceSettings) -> io::Result<Option<StoreHandles>> {
    let Some(database_url) = settings.database_url.as_deref() else {
        warn!("no database configured; serving from empty in-memory stores");
        return Ok(None);
    };
    run_migrations(database_url)
        .await
        .map_err(|err| io::Error::other(format!("run migrations: {err}")))?;

    let metadata = DbPool::new(
        PoolConfig::new(database_url)
            .with_label("metadata")
            .with_max_size(settings.pool_size()),
    )
    .await
    .map_err(|err| io::Error::other(format!("create metadata pool: {err}")))?;
    let warehouse = match settings.warehouse_url() {
        Some(url) if url != database_url => DbPool::new(
            PoolConfig::new(url)
                .with_label("warehouse")
                .with_max_size(settings.pool_size()),
        )
        .await
        .map_err(|err| io::Error::other(format!("create warehouse pool: {err}")))?,
        _ => metadata.clone(),
    };
    let redis = match settings.redis_url.as_deref() {
        Some(url) => Some(
            RedisPool::connect(url, settings.redis_pool_size())
                .await
                .map_err(|err| io::Error::other(format!("connect to redis: {err}")))?,
        ),
        None => None,
    };
    info!(
        separate_warehouse = settings.warehouse_url() != Some(database_url),
        redis = redis.is_some(),
        "stores connected"
    );
    Ok(Some(StoreHandles {
        metadata,
        warehouse,
        redis,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    fn settings_flow_into_the_config() {
        let settings = ServiceSettings {
            bind_addr: Some("127.0.0.1:0".into()),
            chunk_size: Some(250),
            url_root: Some("https://plenar.io/v1/api".into()),
            inline_worker: true,
            ..ServiceSettings::default()
        };

        let config = ServerConfig::from_settings(&settings).expect("valid settings");

        assert_eq!(config.bind_addr().port(), 0);
        assert_eq!(config.datadump.chunk_size, 250);
        assert_eq!(config.url_root.as_deref(), Some("https://plenar.io/v1/api"));
        assert!(config.inline_worker);
        assert!(config.stores.is_none());
    }

    #[rstest]
    #[case(ServiceSettings { bind_addr: Some("not an address".into()), ..ServiceSettings::default() })]
    #[case(ServiceSettings { table_naming: Some("sharded".into()), ..ServiceSettings::default() })]
    fn invalid_settings_are_rejected(#[case] settings: ServiceSettings) {
        let Err(err) = ServerConfig::from_settings(&settings) else {
            panic!("settings should be rejected");
        };
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
    }

    #[rstest]
    #[tokio::test]
    async fn missing_database_means_in_memory_stores() {
        let stores = connect_stores(&ServiceSettings::default())
            .await
            .expect("nothing to connect");
        assert!(stores.is_none());
    }
}
