//! Server construction and middleware wiring.

mod config;
#[cfg(feature = "metrics")]
mod metrics;
mod state_builders;

pub use config::{ServerConfig, connect_stores};

#[cfg(feature = "metrics")]
use metrics::MetricsLayer;
use state_builders::{BuiltServices, build_services};

use actix_web::dev::{Server, ServiceFactory, ServiceRequest, ServiceResponse};
use actix_web::{App, HttpServer, web};
use tracing::info;

use sensornet::Trace;
#[cfg(debug_assertions)]
use sensornet::doc::ApiDoc;
use sensornet::inbound::http::health::{HealthState, live, ready};
use sensornet::inbound::http::routes;
use sensornet::inbound::http::state::HttpState;
#[cfg(debug_assertions)]
use utoipa::OpenApi;
#[cfg(debug_assertions)]
use utoipa_swagger_ui::SwaggerUi;

#[derive(Clone)]
struct AppDependencies {
    health_state: web::Data<HealthState>,
    http_state: web::Data<HttpState>,
}

fn build_app(
    deps: AppDependencies,
) -> App<
    impl ServiceFactory<
        ServiceRequest,
        Config = (),
        Response = ServiceResponse,
        Error = actix_web::Error,
        InitError = (),
    >,
> {
    let AppDependencies {
        health_state,
        http_state,
    } = deps;

    let app = App::new()
        .app_data(health_state)
        .app_data(http_state)
        .wrap(Trace)
        .configure(routes)
        .service(ready)
        .service(live);

    #[cfg(debug_assertions)]
    let app = app.service(SwaggerUi::new("/docs").url("/api-docs/openapi.json", ApiDoc::openapi()));
    #[cfg(not(debug_assertions))]
    let app = app;

    app
}

/// Construct an Actix HTTP server using the provided health state and configuration.
///
/// When the configuration asks for it, or the job queue only exists in this
/// process, a datadump worker is spawned on the current runtime alongside
/// the listener.
///
/// # Errors
/// Propagates [`std::io::Error`] when binding the socket or starting the server fails.
pub fn create_server(
    health_state: web::Data<HealthState>,
    config: ServerConfig,
) -> std::io::Result<Server> {
    let server_health_state = health_state.clone();
    let BuiltServices { http_state, worker } = build_services(&config);
    let poll_interval = config.worker_poll_interval;

    #[cfg(feature = "metrics")]
    let metrics_layer = MetricsLayer::from_option(config.prometheus);

    let server = HttpServer::new(move || {
        let app = build_app(AppDependencies {
            health_state: server_health_state.clone(),
            http_state: http_state.clone(),
        });

        #[cfg(feature = "metrics")]
        let app = app.wrap(metrics_layer.clone());

        app
    })
    .bind(config.bind_addr)?
    .run();

    if let Some(worker) = worker {
        info!(worker = worker.worker_id(), "spawning inline datadump worker");
        actix_web::rt::spawn(async move {
            worker
                .run_until(poll_interval, std::future::pending::<()>())
                .await;
        });
    }

    health_state.mark_ready();
    Ok(server)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::test as actix_test;
    use rstest::rstest;

    fn deps() -> AppDependencies {
        let config = ServerConfig::new("127.0.0.1:0".parse().expect("literal address"));
        AppDependencies {
            health_state: web::Data::new(HealthState::new()),
            http_state: build_services(&config).http_state,
        }
    }

    #[rstest]
    #[case("/health/live", StatusCode::OK)]
    #[case("/health/ready", StatusCode::SERVICE_UNAVAILABLE)]
    #[case("/sensor-networks", StatusCode::OK)]
    #[case("/sensor-networks/atlantis", StatusCode::BAD_REQUEST)]
    #[actix_web::test]
    async fn app_serves_probes_and_the_api(#[case] uri: &str, #[case] expected: StatusCode) {
        let app = actix_test::init_service(build_app(deps())).await;

        let response =
            actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request())
                .await;

        assert_eq!(response.status(), expected, "{uri}");
    }

    #[rstest]
    #[actix_web::test]
    async fn responses_carry_a_trace_id() {
        let app = actix_test::init_service(build_app(deps())).await;

        let response = actix_test::call_service(
            &app,
            actix_test::TestRequest::get().uri("/health/live").to_request(),
        )
        .await;

        assert!(
            response
                .headers()
                .contains_key(sensornet::domain::TRACE_ID_HEADER)
        );
    }
}
