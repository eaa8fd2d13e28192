//! Tests for windowed aggregation.

use rstest::{fixture, rstest};
use serde_json::json;

use super::*;
use crate::domain::ErrorCode;
use crate::test_support::sensor_network::{
    CHICAGO, NODE_DENVER, NODE_LOOP, NODE_OHARE, NODE_SOUTH, chicago_catalog, chicago_warehouse,
    feature_name, jan_first, network_name, node_id, sensor_name,
};

#[fixture]
fn service() -> AggregationService {
    AggregationService::new(
        chicago_catalog(),
        Arc::new(chicago_warehouse()),
        TableNaming::default(),
    )
}

fn request(node: &str, feature: &str, function: AggregateFunction) -> AggregateRequest {
    AggregateRequest {
        network: network_name(CHICAGO),
        node: node_id(node),
        function,
        feature: feature_name(feature),
        window: TimeWindow::new(jan_first(0, 0), jan_first(4, 0)).expect("window"),
        interval: AggregateInterval::Hour,
        sensors: None,
    }
}

#[rstest]
#[tokio::test]
async fn averages_every_reporting_sensor_per_bucket(service: AggregationService) {
    let buckets = service
        .aggregate(&request(NODE_LOOP, "temperature", AggregateFunction::Avg))
        .await
        .expect("aggregate");

    assert_eq!(buckets.len(), 4);
    assert_eq!(buckets[0].time_bucket, jan_first(0, 0));
    assert_eq!(buckets[0].count, 2);
    assert_eq!(buckets[0].values.get("temperature"), Some(&json!(21.25)));
}

#[rstest]
#[tokio::test]
async fn sensor_filter_narrows_the_inputs(service: AggregationService) {
    let mut req = request(NODE_LOOP, "temperature", AggregateFunction::Max);
    req.sensors = Some(vec![sensor_name("tmp112")]);

    let buckets = service.aggregate(&req).await.expect("aggregate");

    assert_eq!(buckets[1].count, 1);
    assert_eq!(buckets[1].values.get("temperature"), Some(&json!(21.5)));
}

#[rstest]
#[tokio::test]
async fn count_accepts_non_numeric_features(service: AggregationService) {
    let buckets = service
        .aggregate(&request(NODE_LOOP, "image", AggregateFunction::Count))
        .await
        .expect("aggregate");

    assert_eq!(buckets.len(), 4);
    assert_eq!(buckets[0].values.get("label"), Some(&json!(1)));
}

#[rstest]
#[case::node_outside_network(request(NODE_DENVER, "temperature", AggregateFunction::Avg))]
#[case::feature_outside_network(request(NODE_LOOP, "magnetic_field", AggregateFunction::Avg))]
#[case::no_reporting_sensor(request(NODE_SOUTH, "relative_humidity", AggregateFunction::Avg))]
#[case::non_numeric_feature(request(NODE_LOOP, "image", AggregateFunction::Avg))]
#[tokio::test]
async fn unanswerable_requests_are_unprocessable(
    service: AggregationService,
    #[case] req: AggregateRequest,
) {
    let err = service.aggregate(&req).await.expect_err("unprocessable");
    assert_eq!(err.code(), ErrorCode::Unprocessable);
}

#[rstest]
#[tokio::test]
async fn too_many_buckets_are_unprocessable(service: AggregationService) {
    let mut req = request(NODE_LOOP, "temperature", AggregateFunction::Avg);
    req.interval = AggregateInterval::Minute;
    req.window = TimeWindow::new(jan_first(0, 0), jan_first(0, 0) + Duration::days(4))
        .expect("window");

    let err = service.aggregate(&req).await.expect_err("too many buckets");

    assert_eq!(err.code(), ErrorCode::Unprocessable);
}

#[rstest]
#[tokio::test]
async fn features_without_tables_are_reported(service: AggregationService) {
    let err = service
        .aggregate(&request(NODE_OHARE, "gas_concentration", AggregateFunction::Avg))
        .await
        .expect_err("missing table");

    assert_eq!(err.code(), ErrorCode::MissingTable);
}

#[rstest]
#[tokio::test]
async fn unknown_networks_are_invalid(service: AggregationService) {
    let mut req = request(NODE_LOOP, "temperature", AggregateFunction::Avg);
    req.network = network_name("nowhere");

    let err = service.aggregate(&req).await.expect_err("unknown network");

    assert_eq!(err.code(), ErrorCode::InvalidRequest);
}

#[rstest]
#[case(AggregateFunction::Avg, Some(2.5))]
#[case(AggregateFunction::Count, Some(4.0))]
#[case(AggregateFunction::Max, Some(4.0))]
#[case(AggregateFunction::Min, Some(1.0))]
#[case(AggregateFunction::Sum, Some(10.0))]
fn functions_match_sql_semantics(#[case] function: AggregateFunction, #[case] expected: Option<f64>) {
    assert_eq!(function.apply(&[4.0, 1.0, 3.0, 2.0]), expected);
}

#[rstest]
fn sample_variance_needs_two_values() {
    let var = AggregateFunction::Var.apply(&[1.0, 2.0, 3.0, 4.0]).expect("variance");
    assert!((var - 5.0 / 3.0).abs() < 1e-9);
    assert_eq!(AggregateFunction::Std.apply(&[1.0]), None);
    assert_eq!(AggregateFunction::Avg.apply(&[]), None);
    assert_eq!(AggregateFunction::Count.apply(&[]), Some(0.0));
}

#[rstest]
#[case(AggregateInterval::Minute, "2016-01-06T13:47:00")]
#[case(AggregateInterval::Hour, "2016-01-06T13:00:00")]
#[case(AggregateInterval::Day, "2016-01-06T00:00:00")]
#[case(AggregateInterval::Week, "2016-01-04T00:00:00")]
#[case(AggregateInterval::Month, "2016-01-01T00:00:00")]
#[case(AggregateInterval::Year, "2016-01-01T00:00:00")]
fn truncation_follows_date_trunc(#[case] interval: AggregateInterval, #[case] expected: &str) {
    let value = NaiveDate::from_ymd_opt(2016, 1, 6)
        .and_then(|d| d.and_hms_micro_opt(13, 47, 12, 500))
        .expect("timestamp");
    let expected: NaiveDateTime = expected.parse().expect("expected timestamp");
    assert_eq!(interval.truncate(value), expected);
}

#[rstest]
fn bucket_count_stops_past_the_cap() {
    let window = TimeWindow::new(jan_first(0, 30), jan_first(3, 0)).expect("window");
    assert_eq!(AggregateInterval::Hour.bucket_count(&window, 10), 3);
    assert_eq!(AggregateInterval::Minute.bucket_count(&window, 10), 11);
}

#[rstest]
fn names_parse_case_insensitively() {
    assert_eq!("STD".parse::<AggregateFunction>(), Ok(AggregateFunction::Std));
    assert_eq!(" Week ".parse::<AggregateInterval>(), Ok(AggregateInterval::Week));
    assert!("median".parse::<AggregateFunction>().is_err());
    assert!("fortnight".parse::<AggregateInterval>().is_err());
}

#[rstest]
fn buckets_serialise_flat() {
    let bucket = AggregateBucket {
        time_bucket: jan_first(1, 0),
        count: 3,
        values: json!({ "temperature": 20.5 })
            .as_object()
            .cloned()
            .expect("object"),
    };
    assert_eq!(
        serde_json::to_value(&bucket).expect("serialise"),
        json!({ "time_bucket": "2016-01-01T01:00:00", "count": 3, "temperature": 20.5 })
    );
}
