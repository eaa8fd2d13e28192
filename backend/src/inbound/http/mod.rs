//! HTTP inbound adapter exposing the sensor-network REST endpoints.

pub mod cache_control;
pub mod error;
pub mod health;
pub mod jobs;
pub mod metadata;
pub mod observations;
pub mod schemas;
pub mod state;
pub mod validation;

pub use error::{ApiError, ApiResult};

use actix_web::web;

use crate::domain::Error;

/// Register every sensor-network and datadump endpoint.
///
/// Literal `query` segments are registered ahead of the `{node}` patterns
/// they would otherwise match. Malformed query strings are answered with
/// the error envelope.
///
/// # Examples
/// ```ignore
/// let app = App::new().app_data(state).configure(routes);
/// ```
pub fn routes(cfg: &mut web::ServiceConfig) {
    let query_config = web::QueryConfig::default().error_handler(|err, _req| {
        ApiError::from(Error::invalid_request(format!("Malformed query string: {err}"))).into()
    });
    cfg.app_data(query_config)
        .service(observations::query_network)
        .service(observations::query_nodes)
        .service(observations::query_node)
        .service(observations::download)
        .service(observations::aggregate)
        .service(metadata::list_networks)
        .service(metadata::get_network)
        .service(metadata::list_nodes)
        .service(metadata::get_node)
        .service(metadata::list_features)
        .service(metadata::get_feature)
        .service(metadata::list_sensors)
        .service(metadata::get_sensor)
        .service(jobs::job_status)
        .service(jobs::datadump_part);
}
