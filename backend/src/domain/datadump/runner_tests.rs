//! Tests for the chunked datadump runner.

use std::sync::Arc;

use rstest::{fixture, rstest};
use serde_json::Value;

use super::*;
use crate::domain::ports::{ChunkStore, MockChunkStore, MockObservationWarehouse};
use crate::domain::{
    ErrorCode, JobState, ObservationRequest, ObservationRow, TableNaming, TimeWindow,
};
use crate::outbound::memory::{
    InMemoryChunkStore, InMemoryJobStatusStore, InMemoryObservationWarehouse,
};
use crate::test_support::clock::{MutableClock, fixture_now};
use crate::test_support::sensor_network::{
    CHICAGO, NODE_LOOP, chicago_catalog, chicago_warehouse, feature_name, jan_first, network_name,
};

const URL_ROOT: &str = "http://localhost:8080/v1/api";
const WORKER: &str = "worker-1";

struct Harness {
    runner: DatadumpRunner,
    chunks: InMemoryChunkStore,
    status: InMemoryJobStatusStore,
}

fn config() -> DatadumpConfig {
    DatadumpConfig {
        chunk_size: 50,
        window_size: 7,
        ..DatadumpConfig::default()
    }
}

fn runner_with(chunks: Arc<dyn ChunkStore>, status: InMemoryJobStatusStore) -> DatadumpRunner {
    runner_over(Arc::new(chicago_warehouse()), chunks, status, config())
}

fn runner_over(
    warehouse: Arc<dyn ObservationWarehouse>,
    chunks: Arc<dyn ChunkStore>,
    status: InMemoryJobStatusStore,
    config: DatadumpConfig,
) -> DatadumpRunner {
    let planner = ObservationQueryPlanner::new(
        chicago_catalog(),
        warehouse.clone(),
        TableNaming::default(),
    );
    DatadumpRunner::new(
        planner,
        warehouse,
        chunks,
        Arc::new(status),
        Arc::new(MutableClock::new(fixture_now())),
        config,
    )
}

#[fixture]
fn harness() -> Harness {
    let chunks = InMemoryChunkStore::default();
    let status = InMemoryJobStatusStore::default();
    Harness {
        runner: runner_with(Arc::new(chunks.clone()), status.clone()),
        chunks,
        status,
    }
}

/// Chicago `relative_humidity` (48 rows) and `temperature` (120 rows) for
/// 2016-01-01.
fn job(features: &[&str]) -> DatadumpJob {
    let window = TimeWindow::new(jan_first(0, 0), jan_first(23, 59)).expect("window");
    let mut request = ObservationRequest::for_network(network_name(CHICAGO), window);
    request.features = Some(features.iter().map(|f| feature_name(f)).collect());
    DatadumpJob {
        ticket: JobTicket::generate(),
        request,
        url_root: URL_ROOT.into(),
    }
}

async fn chunk_records(chunks: &InMemoryChunkStore, ticket: &JobTicket, part: u32) -> Vec<Value> {
    let chunk = chunks
        .find_chunk(ticket, part)
        .await
        .expect("read chunk")
        .expect("chunk stored");
    serde_json::from_str(&chunk.data).expect("chunk is a JSON array")
}

#[rstest]
#[tokio::test]
async fn writes_every_chunk_then_the_manifest(harness: Harness) {
    let job = job(&["relative_humidity", "temperature"]);

    let outcome = harness.runner.run(&job, WORKER).await.expect("run succeeds");

    assert_eq!(outcome.total, 4);
    assert_eq!(outcome.written, 4);
    assert_eq!(outcome.url, format!("{URL_ROOT}/datadump/{}", job.ticket));
    assert_eq!(harness.chunks.parts(&job.ticket), vec![0, 1, 2, 3, 4]);

    let mut total_records = 0;
    for part in 1..=4 {
        total_records += chunk_records(&harness.chunks, &job.ticket, part).await.len();
    }
    assert_eq!(total_records, 168);

    let status = harness
        .status
        .get_status(&job.ticket)
        .await
        .expect("status read")
        .expect("status written");
    assert_eq!(status.meta.state, JobState::Complete);
    assert_eq!(status.progress, Some(JobProgress { done: 4, total: 4 }));
    assert_eq!(status.meta.workers, vec![WORKER.to_owned()]);
    assert_eq!(
        status.result.as_ref().and_then(|r| r.get("url")),
        Some(&Value::from(outcome.url.clone()))
    );
    assert_eq!(
        harness.status.flag(&job.ticket.suppress_cleanup_key()),
        Some(true)
    );
}

#[rstest]
#[tokio::test]
async fn manifest_lists_workers_and_features(harness: Harness) {
    let job = job(&["relative_humidity", "temperature"]);
    harness.runner.run(&job, WORKER).await.expect("run succeeds");

    let manifest = harness
        .chunks
        .find_chunk(&job.ticket, 0)
        .await
        .expect("read")
        .expect("manifest stored");
    let manifest: Value = serde_json::from_str(&manifest.data).expect("manifest JSON");

    assert_eq!(manifest["workers"], serde_json::json!([WORKER]));
    assert_eq!(
        manifest["features"],
        serde_json::json!(["relative_humidity", "temperature"])
    );
    assert!(manifest.get("startTime").is_some_and(|v| !v.is_null()));
    assert!(manifest.get("endTime").is_some_and(|v| !v.is_null()));
}

#[rstest]
#[tokio::test]
async fn limit_caps_rows_and_chunk_total(harness: Harness) {
    let mut job = job(&["temperature"]);
    job.request.limit = Some(70);

    let outcome = harness.runner.run(&job, WORKER).await.expect("run succeeds");

    assert_eq!(outcome.total, 2);
    let first = chunk_records(&harness.chunks, &job.ticket, 1).await;
    let second = chunk_records(&harness.chunks, &job.ticket, 2).await;
    assert_eq!(first.len() + second.len(), 70);
}

#[rstest]
#[tokio::test]
async fn resuming_skips_completed_chunks(harness: Harness) {
    let reference = job(&["relative_humidity", "temperature"]);
    harness.runner.run(&reference, WORKER).await.expect("reference run");

    let mut resumed = job(&["relative_humidity", "temperature"]);
    resumed.ticket = JobTicket::generate();
    let mut status = JobStatus::created();
    status.progress = Some(JobProgress { done: 1, total: 4 });
    harness
        .status
        .set_status(&resumed.ticket, &status)
        .await
        .expect("seed status");

    let outcome = harness.runner.run(&resumed, "worker-2").await.expect("resume");

    assert_eq!(outcome.written, 3);
    assert_eq!(harness.chunks.parts(&resumed.ticket), vec![0, 2, 3, 4]);
    for part in 2..=4 {
        assert_eq!(
            chunk_records(&harness.chunks, &resumed.ticket, part).await,
            chunk_records(&harness.chunks, &reference.ticket, part).await,
            "part {part} should match an uninterrupted run"
        );
    }
}

#[rstest]
#[tokio::test]
async fn already_stored_parts_are_kept(harness: Harness) {
    let job = job(&["temperature"]);
    harness
        .chunks
        .store_chunk(&DatadumpChunk {
            ticket: job.ticket,
            part: 2,
            total: 3,
            data: "[]".into(),
        })
        .await
        .expect("seed chunk");

    let outcome = harness.runner.run(&job, WORKER).await.expect("run succeeds");

    assert_eq!(outcome.total, 3);
    assert_eq!(outcome.written, 2);
    assert!(chunk_records(&harness.chunks, &job.ticket, 2).await.is_empty());
}

#[rstest]
#[tokio::test]
async fn missing_tables_fail_before_any_write(harness: Harness) {
    let job = job(&["gas_concentration"]);

    let err = harness.runner.run(&job, WORKER).await.expect_err("missing table");

    assert_eq!(err.code(), ErrorCode::MissingTable);
    assert!(harness.chunks.parts(&job.ticket).is_empty());
    assert!(
        harness
            .status
            .get_status(&job.ticket)
            .await
            .expect("status read")
            .is_none()
    );
}

#[rstest]
#[tokio::test]
async fn chunk_failures_leave_progress_for_a_resume() {
    let mut chunks = MockChunkStore::new();
    chunks.expect_store_chunk().returning(|chunk| {
        if chunk.part == 2 {
            Err(ChunkStoreError::connection("datadumps table unreachable"))
        } else {
            Ok(())
        }
    });
    let status = InMemoryJobStatusStore::default();
    let runner = runner_with(Arc::new(chunks), status.clone());
    let job = job(&["relative_humidity", "temperature"]);

    let err = runner.run(&job, WORKER).await.expect_err("chunk write fails");
    assert_eq!(err.code(), ErrorCode::ServiceUnavailable);

    runner.fail(&job.ticket, &err).await.expect("record failure");
    let recorded = status
        .get_status(&job.ticket)
        .await
        .expect("status read")
        .expect("status written");
    assert_eq!(recorded.meta.state, JobState::Failed);
    assert_eq!(recorded.progress, Some(JobProgress { done: 1, total: 4 }));
    assert_eq!(recorded.error.as_deref(), Some(err.message()));
}

#[rstest]
#[tokio::test]
async fn rows_sharing_a_sort_key_are_all_exported() {
    let warehouse = InMemoryObservationWarehouse::default();
    let duplicate = ObservationRow {
        node_id: NODE_LOOP.into(),
        datetime: jan_first(1, 0),
        meta_id: None,
        sensor: "tmp112".into(),
        values: serde_json::json!({ "temperature": 20.0 })
            .as_object()
            .cloned()
            .expect("object"),
        row_key: 0,
    };
    warehouse.create_table(
        "temperature",
        vec!["temperature".into()],
        vec![duplicate.clone(), duplicate.clone(), duplicate],
    );
    let chunks = InMemoryChunkStore::default();
    let runner = runner_over(
        Arc::new(warehouse),
        Arc::new(chunks.clone()),
        InMemoryJobStatusStore::default(),
        DatadumpConfig {
            chunk_size: 50,
            window_size: 1,
            ..DatadumpConfig::default()
        },
    );
    let job = job(&["temperature"]);

    let outcome = runner.run(&job, WORKER).await.expect("run succeeds");

    assert_eq!(outcome.total, 1);
    assert_eq!(chunk_records(&chunks, &job.ticket, 1).await.len(), 3);
}

#[rstest]
#[tokio::test]
async fn tables_shorter_than_their_count_fail_the_job() {
    let mut warehouse = MockObservationWarehouse::new();
    warehouse
        .expect_describe_table()
        .returning(|_| Ok(Some(vec!["temperature".to_owned()])));
    warehouse.expect_count().returning(|_| Ok(10));
    warehouse.expect_fetch_window().returning(|_, _| Ok(Vec::new()));
    let status = InMemoryJobStatusStore::default();
    let runner = runner_over(
        Arc::new(warehouse),
        Arc::new(InMemoryChunkStore::default()),
        status.clone(),
        config(),
    );
    let job = job(&["temperature"]);

    let err = runner.run(&job, WORKER).await.expect_err("short table");

    assert_eq!(err.code(), ErrorCode::InternalError);
    assert!(err.message().contains("temperature"), "{}", err.message());
    let recorded = status
        .get_status(&job.ticket)
        .await
        .expect("status read")
        .expect("status written");
    assert_ne!(recorded.meta.state, JobState::Complete);
}

#[rstest]
#[case(0, 50, 0)]
#[case(1, 50, 1)]
#[case(50, 50, 1)]
#[case(51, 50, 2)]
#[case(2500, 1000, 3)]
fn chunk_total_rounds_up(#[case] rows: u64, #[case] chunk_size: u64, #[case] expected: u32) {
    assert_eq!(chunk_total(rows, chunk_size), expected);
}
