//! Prometheus request metrics that can be switched off at startup.
//!
//! `actix-web-prom` middleware is wrapped so a failed registry build leaves
//! the app type unchanged: the disabled layer only boxes the response body.

use actix_service::{
    Service, ServiceExt as _, Transform,
    boxed::{self, BoxService},
};
use actix_web::body::BoxBody;
use actix_web::dev::{ServiceRequest, ServiceResponse};
use actix_web::middleware::Compat;
use actix_web_prom::PrometheusMetrics;
use futures_util::future::LocalBoxFuture;
use std::sync::Arc;

#[derive(Clone)]
pub(crate) enum MetricsLayer {
    Enabled(Arc<PrometheusMetrics>),
    Disabled,
}

impl MetricsLayer {
    #[must_use]
    pub(crate) fn from_option(metrics: Option<PrometheusMetrics>) -> Self {
        metrics.map_or(Self::Disabled, |metrics| Self::Enabled(Arc::new(metrics)))
    }

    pub(crate) fn is_enabled(&self) -> bool {
        matches!(self, Self::Enabled(_))
    }
}

type BoxedRequestService = BoxService<ServiceRequest, ServiceResponse<BoxBody>, actix_web::Error>;

impl<S, B> Transform<S, ServiceRequest> for MetricsLayer
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = actix_web::Error> + 'static,
    B: actix_web::body::MessageBody + 'static,
{
    type Response = ServiceResponse<BoxBody>;
    type Error = actix_web::Error;
    type InitError = ();
    type Transform = BoxedRequestService;
    type Future = LocalBoxFuture<'static, Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        match self {
            Self::Enabled(metrics) => {
                let pending = Compat::new(PrometheusMetrics::clone(metrics)).new_transform(service);
                Box::pin(async move { Ok(boxed::service(pending.await?)) })
            }
            Self::Disabled => {
                let boxed_body = service.map(ServiceResponse::map_into_boxed_body);
                Box::pin(async move { Ok(boxed::service(boxed_body)) })
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::{App, HttpResponse, http::StatusCode, test, web};
    use actix_web_prom::PrometheusMetricsBuilder;
    use rstest::rstest;

    fn metrics() -> PrometheusMetrics {
        PrometheusMetricsBuilder::new("sensornet_test")
            .endpoint("/metrics")
            .build()
            .expect("metrics build")
    }

    #[rstest]
    #[case(None, StatusCode::NOT_FOUND)]
    #[case(Some(metrics()), StatusCode::OK)]
    #[actix_web::test]
    async fn metrics_endpoint_follows_the_layer(
        #[case] prometheus: Option<PrometheusMetrics>,
        #[case] expected: StatusCode,
    ) {
        let layer = MetricsLayer::from_option(prometheus);
        assert_eq!(layer.is_enabled(), expected == StatusCode::OK);
        let app = test::init_service(
            App::new()
                .wrap(layer)
                .route("/ping", web::get().to(|| async { HttpResponse::Ok().finish() })),
        )
        .await;

        let ping = test::call_service(&app, test::TestRequest::get().uri("/ping").to_request()).await;
        assert_eq!(ping.status(), StatusCode::OK);
        let scrape =
            test::call_service(&app, test::TestRequest::get().uri("/metrics").to_request()).await;
        assert_eq!(scrape.status(), expected);
    }
}
