//! Concurrent execution of a [`QueryPlan`].
//!
//! Every table query runs in its own Tokio task, gated by a semaphore so at
//! most `max_concurrency` queries are in flight. Each task owns its output
//! buffer; results are concatenated in plan order once all tasks have joined
//! and then stably sorted by `datetime`. A failing table never truncates the
//! response silently: every failure is reported together.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use super::ports::ObservationWarehouse;
use super::warehouse_errors::map_warehouse_error;
use super::{Error, ErrorCode, ObservationRecord, QueryPlan, TableQuery, TraceId};

/// Concurrency and timeout limits for the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FanOutConfig {
    pub max_concurrency: usize,
    /// Per-table timeout; `None` waits indefinitely.
    pub query_timeout: Option<Duration>,
}

impl Default for FanOutConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 8,
            query_timeout: None,
        }
    }
}

#[derive(Debug)]
struct TableFailure {
    table: String,
    error: Error,
}

/// Runs the table queries of a plan in parallel.
#[derive(Clone)]
pub struct FanOutExecutor {
    warehouse: Arc<dyn ObservationWarehouse>,
    config: FanOutConfig,
}

impl FanOutExecutor {
    pub fn new(warehouse: Arc<dyn ObservationWarehouse>, config: FanOutConfig) -> Self {
        Self { warehouse, config }
    }

    /// Execute `plan`, returning every record ordered by `datetime`.
    ///
    /// Records with equal timestamps keep plan order (feature name), then the
    /// page order of their table.
    pub async fn execute(&self, plan: &QueryPlan) -> Result<Vec<ObservationRecord>, Error> {
        if plan.is_empty() {
            return Ok(Vec::new());
        }
        let bound = plan.queries.len().min(self.config.max_concurrency.max(1));
        let permits = Arc::new(Semaphore::new(bound));

        let mut handles = Vec::with_capacity(plan.queries.len());
        for query in plan.queries.iter().cloned() {
            let warehouse = Arc::clone(&self.warehouse);
            let permits = Arc::clone(&permits);
            let timeout = self.config.query_timeout;
            handles.push(tokio::spawn(TraceId::propagate(async move {
                let _permit = permits
                    .acquire_owned()
                    .await
                    .map_err(|_| Error::internal("fan-out semaphore closed"))?;
                run_table(warehouse.as_ref(), &query, timeout).await
            })));
        }

        let mut buffers = Vec::with_capacity(handles.len());
        let mut failures = Vec::new();
        for (query, handle) in plan.queries.iter().zip(handles) {
            let table = query.table.name.clone();
            match handle.await {
                Ok(Ok(records)) => buffers.push(records),
                Ok(Err(error)) => failures.push(TableFailure { table, error }),
                Err(join_error) => failures.push(TableFailure {
                    table,
                    error: Error::internal_with_debug("table query task aborted", &join_error),
                }),
            }
        }

        if !failures.is_empty() {
            return Err(aggregate_failures(plan.queries.len(), failures));
        }
        let mut records: Vec<ObservationRecord> = buffers.into_iter().flatten().collect();
        records.sort_by_key(|record| record.datetime);
        debug!(
            tables = plan.queries.len(),
            records = records.len(),
            concurrency = bound,
            "fan-out complete"
        );
        Ok(records)
    }
}

async fn run_table(
    warehouse: &dyn ObservationWarehouse,
    query: &TableQuery,
    timeout: Option<Duration>,
) -> Result<Vec<ObservationRecord>, Error> {
    let fetch = warehouse.fetch(query);
    let rows = match timeout {
        Some(limit) => tokio::time::timeout(limit, fetch).await.map_err(|_| {
            Error::service_unavailable(format!(
                "query against {} timed out after {} ms",
                query.table.name,
                limit.as_millis()
            ))
        })?,
        None => fetch.await,
    }
    .map_err(|err| map_warehouse_error(&query.table.name, err))?;
    Ok(rows
        .into_iter()
        .map(|row| ObservationRecord::from_row(row, &query.table))
        .collect())
}

fn aggregate_failures(total: usize, failures: Vec<TableFailure>) -> Error {
    for failure in &failures {
        warn!(table = %failure.table, error = %failure.error, "table query failed");
    }
    let all_unavailable = failures
        .iter()
        .all(|failure| failure.error.code() == ErrorCode::ServiceUnavailable);
    let message = format!("{} of {total} table queries failed", failures.len());
    let details = json!({
        "failures": failures
            .iter()
            .map(|failure| json!({
                "table": failure.table,
                "message": failure.error.message(),
            }))
            .collect::<Vec<_>>(),
    });
    let error = if all_unavailable {
        Error::service_unavailable(message)
    } else {
        Error::internal(message)
    };
    error.with_details(details)
}

#[cfg(test)]
#[path = "fan_out_tests.rs"]
mod tests;
