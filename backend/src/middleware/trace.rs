//! Tracing middleware attaching a request-scoped trace identifier.
//!
//! A caller-supplied `trace-id` header is reused when it holds a UUID;
//! otherwise a fresh identifier is generated. The identifier lives in
//! task-local storage for the duration of the request and is echoed on the
//! response. Fan-out tasks inherit it via [`TraceId::propagate`].

use std::task::{Context, Poll};
use std::time::Instant;

use actix_web::Error;
use actix_web::dev::{Service, ServiceRequest, ServiceResponse, Transform};
use actix_web::http::header::{HeaderName, HeaderValue};
use futures_util::future::{LocalBoxFuture, Ready, ready};
use tracing::{debug, error};

use crate::domain::{TRACE_ID_HEADER, TraceId};

/// Tracing middleware attaching a request-scoped UUID and adding a
/// `trace-id` header to every response.
///
/// # Examples
/// ```
/// use actix_web::App;
/// use sensornet::middleware::Trace;
///
/// let app = App::new().wrap(Trace);
/// ```
#[derive(Clone)]
pub struct Trace;

impl<S, B> Transform<S, ServiceRequest> for Trace
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type InitError = ();
    type Transform = TraceMiddleware<S>;
    type Future = Ready<Result<Self::Transform, Self::InitError>>;

    fn new_transform(&self, service: S) -> Self::Future {
        ready(Ok(TraceMiddleware { service }))
    }
}

/// Service wrapper produced by [`Trace`].
pub struct TraceMiddleware<S> {
    service: S,
}

fn inbound_trace_id(req: &ServiceRequest) -> Option<TraceId> {
    req.headers()
        .get(TRACE_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.parse().ok())
}

impl<S, B> Service<ServiceRequest> for TraceMiddleware<S>
where
    S: Service<ServiceRequest, Response = ServiceResponse<B>, Error = Error> + 'static,
    S::Future: 'static,
    B: 'static,
{
    type Response = ServiceResponse<B>;
    type Error = Error;
    type Future = LocalBoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&self, req: ServiceRequest) -> Self::Future {
        let trace_id = inbound_trace_id(&req).unwrap_or_else(TraceId::generate);
        let method = req.method().clone();
        let path = req.path().to_owned();
        let started = Instant::now();
        let header_value = trace_id.to_string();
        let fut = self.service.call(req);
        Box::pin(TraceId::scope(trace_id, async move {
            let mut res = fut.await?;
            match HeaderValue::from_str(&header_value) {
                Ok(value) => {
                    res.response_mut()
                        .headers_mut()
                        .insert(HeaderName::from_static(TRACE_ID_HEADER), value);
                }
                Err(error) => {
                    error!(%error, %trace_id, "failed to encode trace identifier header");
                }
            }
            debug!(
                %method,
                %path,
                status = res.status().as_u16(),
                elapsed_ms = started.elapsed().as_millis(),
                %trace_id,
                "request handled"
            );
            Ok(res)
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Error as DomainError;
    use crate::inbound::http::ApiResult;
    use actix_web::{App, HttpResponse, test, web};
    use rstest::rstest;

    async fn call_with_trace<F, Fut, Res>(
        handler: F,
        inbound: Option<&str>,
    ) -> (ServiceResponse<actix_web::body::BoxBody>, String)
    where
        F: Fn() -> Fut + Clone + 'static,
        Fut: std::future::Future<Output = Res> + 'static,
        Res: actix_web::Responder + 'static,
    {
        let app =
            test::init_service(App::new().wrap(Trace).route("/", web::get().to(handler))).await;
        let mut req = test::TestRequest::get().uri("/");
        if let Some(id) = inbound {
            req = req.insert_header((TRACE_ID_HEADER, id));
        }
        let res = test::call_service(&app, req.to_request()).await;
        let trace_id = res
            .headers()
            .get(TRACE_ID_HEADER)
            .expect("trace id header")
            .to_str()
            .expect("header is ascii")
            .to_owned();
        (res, trace_id)
    }

    #[rstest]
    #[actix_web::test]
    async fn handlers_see_the_response_trace_id() {
        let (res, trace_id) = call_with_trace(
            || async move {
                let id = TraceId::current().expect("trace id in scope");
                HttpResponse::Ok().body(id.to_string())
            },
            None,
        )
        .await;
        let body = test::read_body(res).await;
        assert_eq!(std::str::from_utf8(&body).expect("utf8 body"), trace_id);
    }

    #[rstest]
    #[actix_web::test]
    async fn caller_trace_ids_are_reused() {
        let inbound = "6a0f2b9c-3c1d-4a8e-9f4e-2d7b1c0e5a11";
        let (_, trace_id) =
            call_with_trace(|| async { HttpResponse::Ok().finish() }, Some(inbound)).await;
        assert_eq!(trace_id, inbound);
    }

    #[rstest]
    #[actix_web::test]
    async fn malformed_caller_ids_are_replaced() {
        let (_, trace_id) =
            call_with_trace(|| async { HttpResponse::Ok().finish() }, Some("not-a-uuid")).await;
        assert!(trace_id.parse::<TraceId>().is_ok());
    }

    #[rstest]
    #[actix_web::test]
    async fn error_envelopes_carry_the_same_trace_id() {
        let (res, trace_id) = call_with_trace(
            || async move { ApiResult::<HttpResponse>::Err(DomainError::internal("boom").into()) },
            None,
        )
        .await;
        assert_eq!(res.status(), actix_web::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body: serde_json::Value = test::read_body_json(res).await;
        assert_eq!(body["meta"]["status"], "error");
        assert!(!trace_id.is_empty());
    }
}
