//! Tests for HTTP error mapping.

use super::*;
use actix_web::ResponseError;
use actix_web::body::to_bytes;
use actix_web::http::StatusCode;
use rstest::{fixture, rstest};
use serde_json::json;

const TRACE_ID: &str = "00000000-0000-0000-0000-000000000000";

#[fixture]
fn echoed() -> EchoedQuery {
    EchoedQuery::default()
        .with("network_name", json!("array_of_things_chicago"))
        .with("features_of_interest", json!(["gas_concentration"]))
}

#[rstest]
#[case(Error::invalid_request("bad"), StatusCode::BAD_REQUEST)]
#[case(Error::missing_table("gas_concentration"), StatusCode::BAD_REQUEST)]
#[case(Error::not_found("no such job"), StatusCode::NOT_FOUND)]
#[case(Error::unprocessable("too many buckets"), StatusCode::UNPROCESSABLE_ENTITY)]
#[case(Error::service_unavailable("redis down"), StatusCode::SERVICE_UNAVAILABLE)]
#[case(Error::internal("boom"), StatusCode::INTERNAL_SERVER_ERROR)]
fn status_code_matches_error_code(#[case] error: Error, #[case] status: StatusCode) {
    assert_eq!(ResponseError::status_code(&ApiError::from(error)), status);
}

async fn body_of(error: &ApiError) -> (StatusCode, Option<String>, Value) {
    let response = ResponseError::error_response(error);
    let status = response.status();
    let trace = response
        .headers()
        .get(TRACE_ID_HEADER)
        .map(|value| value.to_str().expect("trace header is ASCII").to_owned());
    let bytes = to_bytes(response.into_body())
        .await
        .expect("reading response body succeeds");
    let body = serde_json::from_slice(&bytes).expect("error body is JSON");
    (status, trace, body)
}

#[rstest]
#[actix_web::test]
async fn missing_tables_render_the_error_envelope(echoed: EchoedQuery) {
    let error = ApiError::new(Error::missing_table("gas_concentration"), echoed);

    let (status, _, body) = body_of(&error).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(
        body,
        json!({
            "meta": {
                "status": "error",
                "message": "Table gas_concentration not found",
                "query": {
                    "network_name": "array_of_things_chicago",
                    "features_of_interest": ["gas_concentration"]
                }
            },
            "objects": [],
            "errors": { "table": "gas_concentration" }
        })
    );
}

#[rstest]
#[actix_web::test]
async fn field_details_are_listed_beside_the_envelope() {
    let error = ApiError::from(
        Error::invalid_request("limit: must be at most 10000")
            .with_details(json!([{ "field": "limit", "code": "out_of_range" }])),
    );

    let (_, _, body) = body_of(&error).await;

    assert_eq!(body["errors"][0]["field"], json!("limit"));
    assert_eq!(body["meta"]["status"], json!("error"));
}

#[rstest]
#[actix_web::test]
async fn internal_errors_keep_their_debug_message() {
    let error = ApiError::from(Error::internal_with_debug("fan-out failed", &"socket closed"));

    let (status, _, body) = body_of(&error).await;

    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
    let message = body["meta"]["message"].as_str().expect("message");
    assert!(message.starts_with("fan-out failed\nDebug:\n"));
}

#[rstest]
#[actix_web::test]
async fn trace_ids_are_echoed_as_a_header() {
    let error = ApiError::from(Error::invalid_request("bad").with_trace_id(TRACE_ID));

    let (_, trace, _) = body_of(&error).await;

    assert_eq!(trace.as_deref(), Some(TRACE_ID));
}

#[rstest]
#[actix_web::test]
async fn errors_without_trace_id_omit_the_header() {
    let (_, trace, body) = body_of(&ApiError::from(Error::not_found("gone"))).await;

    assert!(trace.is_none());
    assert!(body.get("errors").is_none());
}

#[rstest]
fn echoing_wraps_only_failures(echoed: EchoedQuery) {
    let ok: Result<u8, Error> = Ok(1);
    assert_eq!(ok.echoing(&echoed), Ok(1));

    let failed: Result<u8, Error> = Err(Error::unprocessable("no sensors"));
    let err = failed.echoing(&echoed).expect_err("error is kept");
    assert_eq!(err.query(), &echoed);
    assert_eq!(err.error().code(), ErrorCode::Unprocessable);
}

#[test]
fn actix_errors_become_internal_errors() {
    let err: ApiError = actix_web::error::ErrorBadRequest("boom").into();

    assert_eq!(err.error().code(), ErrorCode::InternalError);
    assert!(err.query().keys().next().is_none());
}
