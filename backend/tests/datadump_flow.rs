//! Datadump lifecycle over HTTP: submission, worker drain, status polling
//! and chunk retrieval.

use actix_web::http::{StatusCode, header};
use actix_web::{App, test as actix_test, web};
use rstest::rstest;
use serde_json::{Value, json};

use sensornet::domain::PollOutcome;
use sensornet::inbound::http::routes;
use sensornet::test_support::http::{
    FixtureServices, FixtureServicesBuilder, URL_ROOT, WORKER_ID, fixture_services,
};
use sensornet::test_support::sensor_network::CHICAGO;

const TEMPERATURE_ON_JAN_FIRST: &str = "features_of_interest=temperature&start_datetime=2016-01-01T00:00:00&end_datetime=2016-01-02T00:00:00";

async fn call(services: &FixtureServices, uri: &str) -> (StatusCode, Option<String>, Value) {
    let app = actix_test::init_service(
        App::new()
            .app_data(web::Data::new(services.state.clone()))
            .configure(routes),
    )
    .await;
    let response =
        actix_test::call_service(&app, actix_test::TestRequest::get().uri(uri).to_request()).await;
    let status = response.status();
    let cache_control = response
        .headers()
        .get(header::CACHE_CONTROL)
        .and_then(|value| value.to_str().ok())
        .map(str::to_owned);
    (status, cache_control, actix_test::read_body_json(response).await)
}

async fn submit(services: &FixtureServices, query: &str) -> String {
    let (status, _, body) =
        call(services, &format!("/sensor-networks/{CHICAGO}/download?{query}")).await;
    assert_eq!(status, StatusCode::OK, "{body}");
    body["ticket"]
        .as_str()
        .map(str::to_owned)
        .unwrap_or_else(|| panic!("ticket missing from {body}"))
}

async fn drain(services: &FixtureServices) {
    let outcome = services.worker.poll_once().await.expect("worker poll");
    assert!(matches!(outcome, PollOutcome::Completed(_)), "job should complete");
}

#[rstest]
#[actix_web::test]
async fn submission_returns_a_status_link_and_queues_a_job() {
    let services = fixture_services();

    let (status, _, body) = call(
        &services,
        &format!("/sensor-networks/{CHICAGO}/download?{TEMPERATURE_ON_JAN_FIRST}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK, "{body}");
    let ticket = body["ticket"].as_str().expect("ticket");
    assert_eq!(body["url"], format!("{URL_ROOT}/jobs/{ticket}"));
    assert_eq!(services.queue.pending_len(), 1);

    let (status, _, job) = call(&services, &format!("/jobs/{ticket}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["meta"]["state"], "created");
    assert!(job.get("progress").is_none());
}

#[rstest]
#[actix_web::test]
async fn drained_jobs_report_progress_and_a_download_link() {
    let services = FixtureServicesBuilder::default().chunk_size(50).build();
    let ticket = submit(&services, TEMPERATURE_ON_JAN_FIRST).await;

    drain(&services).await;

    let (status, cache_control, job) = call(&services, &format!("/jobs/{ticket}")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cache_control.is_some());
    assert_eq!(job["meta"]["state"], "complete");
    assert_eq!(job["meta"]["workers"], json!([WORKER_ID]));
    assert_eq!(job["meta"]["features"], json!(["temperature"]));
    assert_eq!(job["progress"], json!({ "done": 3, "total": 3 }));
    assert_eq!(job["result"]["url"], format!("{URL_ROOT}/datadump/{ticket}"));
    assert!(job["meta"]["startTime"].is_string());
    assert!(job["meta"]["endTime"].is_string());
}

#[rstest]
#[actix_web::test]
async fn parts_hold_every_record_once() {
    let services = FixtureServicesBuilder::default().chunk_size(50).build();
    let ticket = submit(&services, TEMPERATURE_ON_JAN_FIRST).await;
    drain(&services).await;

    let mut sizes = Vec::new();
    let mut last_datetime = String::new();
    for part in 1..=3 {
        let (status, _, body) = call(&services, &format!("/datadump/{ticket}?part={part}")).await;
        assert_eq!(status, StatusCode::OK, "part {part}: {body}");
        assert_eq!(body["part"], part);
        assert_eq!(body["total"], 3);
        let records = body["data"].as_array().expect("records");
        for record in records {
            let datetime = record["datetime"].as_str().expect("datetime").to_owned();
            assert!(datetime >= last_datetime, "records are ordered across parts");
            last_datetime = datetime;
        }
        sizes.push(records.len());
    }
    assert_eq!(sizes, vec![50, 50, 20]);
    assert_eq!(services.chunks.parts(&ticket.parse().expect("ticket")), vec![0, 1, 2, 3]);

    let (status, _, body) = call(&services, &format!("/datadump/{ticket}?part=4")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["meta"]["status"], "error");
}

#[rstest]
#[actix_web::test]
async fn part_zero_is_the_manifest() {
    let services = FixtureServicesBuilder::default().chunk_size(50).build();
    let ticket = submit(&services, TEMPERATURE_ON_JAN_FIRST).await;
    drain(&services).await;

    let (status, _, body) = call(&services, &format!("/datadump/{ticket}")).await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["part"], 0);
    assert_eq!(body["total"], 3);
    assert_eq!(body["data"]["workers"], json!([WORKER_ID]));
    assert_eq!(body["data"]["features"], json!(["temperature"]));
    assert!(body["data"]["endTime"].is_string());
}

#[rstest]
#[actix_web::test]
async fn explicit_limits_cap_the_export() {
    let services = FixtureServicesBuilder::default().chunk_size(50).build();
    let ticket = submit(&services, &format!("{TEMPERATURE_ON_JAN_FIRST}&limit=60")).await;
    drain(&services).await;

    let (_, _, job) = call(&services, &format!("/jobs/{ticket}")).await;
    assert_eq!(job["progress"], json!({ "done": 2, "total": 2 }));
    let (_, _, last) = call(&services, &format!("/datadump/{ticket}?part=2")).await;
    assert_eq!(last["data"].as_array().map(Vec::len), Some(10));
}

#[rstest]
#[actix_web::test]
async fn missing_tables_reject_the_submission_before_queueing() {
    let services = fixture_services();
    let query = "start_datetime=2016-01-01T00:00:00&end_datetime=2016-01-02T00:00:00";

    let (status, _, body) =
        call(&services, &format!("/sensor-networks/{CHICAGO}/download?{query}")).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["meta"]["message"], "Table gas_concentration not found");
    assert_eq!(services.queue.pending_len(), 0);
}

#[rstest]
#[actix_web::test]
async fn links_follow_the_request_host_without_a_configured_root() {
    let services = FixtureServicesBuilder::default().request_url_root().build();

    let (status, _, body) = call(
        &services,
        &format!("/sensor-networks/{CHICAGO}/download?{TEMPERATURE_ON_JAN_FIRST}"),
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    let ticket = body["ticket"].as_str().expect("ticket");
    let url = body["url"].as_str().expect("url");
    assert!(url.starts_with("http://"), "{url}");
    assert!(url.ends_with(&format!("/jobs/{ticket}")), "{url}");
    assert!(!url.starts_with(URL_ROOT));
}

#[rstest]
#[case("/jobs/3fa85f64-5717-4562-b3fc-2c963f66afa6", StatusCode::NOT_FOUND)]
#[case("/jobs/not-a-ticket", StatusCode::BAD_REQUEST)]
#[case("/datadump/3fa85f64-5717-4562-b3fc-2c963f66afa6", StatusCode::NOT_FOUND)]
#[case("/datadump/3fa85f64-5717-4562-b3fc-2c963f66afa6?part=first", StatusCode::BAD_REQUEST)]
#[actix_web::test]
async fn unknown_or_malformed_tickets_are_rejected(#[case] uri: &str, #[case] expected: StatusCode) {
    let services = fixture_services();

    let (status, _, body) = call(&services, uri).await;

    assert_eq!(status, expected, "{body}");
    assert_eq!(body["meta"]["status"], "error");
    assert_eq!(body["objects"], json!([]));
}

#[rstest]
#[actix_web::test]
async fn failed_jobs_expose_their_error() {
    let services = fixture_services();
    let ticket = submit(&services, TEMPERATURE_ON_JAN_FIRST).await;
    services.warehouse.drop_table("temperature");

    let outcome = services.worker.poll_once().await.expect("worker poll");

    assert!(matches!(outcome, PollOutcome::Failed(_)));
    let (status, _, job) = call(&services, &format!("/jobs/{ticket}")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["meta"]["state"], "failed");
    assert!(job["error"].as_str().is_some_and(|e| e.contains("temperature")), "{job}");
}
