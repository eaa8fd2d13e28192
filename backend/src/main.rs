//! Backend entry-point: loads settings, connects stores and serves the
//! sensor-network API.

mod server;

use actix_web::web;
#[cfg(feature = "metrics")]
use actix_web_prom::{PrometheusMetrics, PrometheusMetricsBuilder};
use ortho_config::OrthoConfig as _;
use tracing::warn;
use tracing_subscriber::{EnvFilter, fmt};

use sensornet::inbound::http::health::HealthState;
use sensornet::settings::ServiceSettings;
use server::{ServerConfig, connect_stores, create_server};

/// Build Prometheus middleware, logging and discarding a failed build.
#[cfg(feature = "metrics")]
fn initialize_metrics<F, E>(make: F) -> Option<PrometheusMetrics>
where
    F: FnOnce() -> Result<PrometheusMetrics, E>,
    E: std::fmt::Display,
{
    match make() {
        Ok(metrics) => Some(metrics),
        Err(error) => {
            warn!(%error, "prometheus metrics disabled");
            None
        }
    }
}

/// Application bootstrap.
#[actix_web::main]
async fn main() -> std::io::Result<()> {
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let settings = ServiceSettings::load_from_iter(std::env::args_os())
        .map_err(|err| std::io::Error::other(format!("load settings: {err}")))?;
    let mut config = ServerConfig::from_settings(&settings)?;
    if let Some(stores) = connect_stores(&settings).await? {
        config = config.with_stores(stores);
    }

    #[cfg(feature = "metrics")]
    let config = config.with_metrics(initialize_metrics(|| {
        PrometheusMetricsBuilder::new("sensornet")
            .endpoint("/metrics")
            .build()
    }));

    let health_state = web::Data::new(HealthState::new());
    create_server(health_state, config)?.await
}
