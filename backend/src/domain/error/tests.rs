//! Tests for domain error construction and serialisation.

use super::*;
use rstest::rstest;
use serde_json::json;
use uuid::Uuid;

#[rstest]
fn invalid_request_constructor_sets_code() {
    let err = Error::invalid_request("bad");
    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[rstest]
fn try_new_rejects_empty_messages() {
    let result = Error::try_new(ErrorCode::InvalidRequest, "   ");
    assert!(matches!(result, Err(ErrorValidationError::EmptyMessage)));
}

#[rstest]
fn missing_table_names_the_table() {
    let err = Error::missing_table("array_of_things__humidity");
    assert_eq!(err.code(), ErrorCode::MissingTable);
    assert!(err.message().contains("array_of_things__humidity"));
    assert_eq!(
        err.details(),
        Some(&json!({ "table": "array_of_things__humidity" }))
    );
}

#[rstest]
fn internal_with_debug_embeds_cause() {
    let cause = std::io::Error::other("socket closed");
    let err = Error::internal_with_debug("observation query failed", &cause);
    assert_eq!(err.code(), ErrorCode::InternalError);
    assert!(err.message().starts_with("observation query failed\nDebug:\n"));
    assert!(err.message().contains("socket closed"));
}

#[rstest]
fn new_has_no_trace_id_out_of_scope() {
    let error = Error::internal("boom");
    assert!(error.trace_id().is_none());
}

#[tokio::test]
async fn new_captures_trace_id_in_scope() {
    let trace_id = TraceId::from_uuid(Uuid::nil());
    let error = TraceId::scope(trace_id, async { Error::not_found("missing") }).await;
    assert_eq!(error.trace_id(), Some(Uuid::nil().to_string().as_str()));
}

#[rstest]
#[case(ErrorCode::InvalidRequest, "invalid_request")]
#[case(ErrorCode::MissingTable, "missing_table")]
#[case(ErrorCode::Unprocessable, "unprocessable")]
#[case(ErrorCode::ServiceUnavailable, "service_unavailable")]
fn codes_serialise_as_snake_case(#[case] code: ErrorCode, #[case] expected: &str) {
    let value = serde_json::to_value(code).expect("code serialises");
    assert_eq!(value, json!(expected));
}
