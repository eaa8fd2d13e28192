//! Chunked job runner.
//!
//! Runs inside a worker task, paging through each planned table in turn
//! with keyset windows so memory stays bounded by one chunk plus one window.

use std::sync::Arc;
use std::time::Duration;

use mockable::Clock;
use serde_json::json;
use tracing::{debug, info, warn};

use super::{
    DatadumpChunk, DatadumpJob, DatadumpManifest, JobProgress, JobState, JobStatus, JobTicket,
};
use crate::domain::ports::{
    ChunkStore, ChunkStoreError, JobStatusStore, JobStatusStoreError, ObservationWarehouse,
};
use crate::domain::warehouse_errors::map_warehouse_error;
use crate::domain::{Error, ObservationQueryPlanner, ObservationRecord, TableQuery, WindowPage};

/// Records per chunk unless configured otherwise.
pub const DEFAULT_CHUNK_SIZE: u64 = 1000;
/// Cleanup suppression extended after every chunk.
pub const CLEANUP_SUPPRESSION_TTL: Duration = Duration::from_secs(3 * 60 * 60);

/// Tuning knobs for [`DatadumpRunner`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DatadumpConfig {
    pub chunk_size: u64,
    /// Rows requested per keyset page.
    pub window_size: u64,
    pub cleanup_suppression_ttl: Duration,
}

impl Default for DatadumpConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            window_size: DEFAULT_CHUNK_SIZE,
            cleanup_suppression_ttl: CLEANUP_SUPPRESSION_TTL,
        }
    }
}

/// Summary of one successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadumpOutcome {
    pub total: u32,
    /// Chunks written by this invocation (excludes the manifest).
    pub written: u32,
    pub url: String,
}

/// Executes datadump jobs against the warehouse and the chunk/status stores.
#[derive(Clone)]
pub struct DatadumpRunner {
    planner: ObservationQueryPlanner,
    warehouse: Arc<dyn ObservationWarehouse>,
    chunks: Arc<dyn ChunkStore>,
    status: Arc<dyn JobStatusStore>,
    clock: Arc<dyn Clock>,
    config: DatadumpConfig,
}

/// Running state of the chunk buffer.
struct ChunkCursor<'a> {
    job: &'a DatadumpJob,
    status: JobStatus,
    total: u32,
    next_part: u32,
    written: u32,
    buffer: Vec<ObservationRecord>,
}

impl DatadumpRunner {
    pub fn new(
        planner: ObservationQueryPlanner,
        warehouse: Arc<dyn ObservationWarehouse>,
        chunks: Arc<dyn ChunkStore>,
        status: Arc<dyn JobStatusStore>,
        clock: Arc<dyn Clock>,
        config: DatadumpConfig,
    ) -> Self {
        Self {
            planner,
            warehouse,
            chunks,
            status,
            clock,
            config,
        }
    }

    /// Run `job` to completion, resuming from its recorded progress.
    ///
    /// On error every chunk persisted so far stays in place and the status
    /// reflects the last chunk whose status write succeeded.
    pub async fn run(&self, job: &DatadumpJob, worker_id: &str) -> Result<DatadumpOutcome, Error> {
        let chunk_size = self.config.chunk_size.max(1);
        let mut status = self
            .status
            .get_status(&job.ticket)
            .await
            .map_err(map_status_error)?
            .unwrap_or_else(JobStatus::created);

        let plan = self.planner.plan(&job.request).await?;
        let mut counts = Vec::with_capacity(plan.queries.len());
        for query in &plan.queries {
            let count = self
                .warehouse
                .count(query)
                .await
                .map_err(|err| map_warehouse_error(&query.table.name, err))?;
            counts.push(count);
        }
        let mut row_count: u64 = counts.iter().sum();
        if let Some(limit) = job.request.limit {
            row_count = row_count.min(limit);
        }

        let (done, total) = match status.progress {
            Some(progress) => (progress.done, progress.total),
            None => (0, chunk_total(row_count, chunk_size)),
        };
        let budget = row_count.min(u64::from(total) * chunk_size);
        let skip = u64::from(done) * chunk_size;

        status.meta.state = JobState::Running;
        status.meta.start_time.get_or_insert_with(|| self.clock.utc());
        if !status.meta.workers.iter().any(|w| w == worker_id) {
            status.meta.workers.push(worker_id.to_owned());
        }
        status.meta.features = plan.queries.iter().map(|q| q.table.name.clone()).collect();
        status.progress = Some(JobProgress { done, total });
        status.error = None;
        self.status
            .set_status(&job.ticket, &status)
            .await
            .map_err(map_status_error)?;
        info!(
            ticket = %job.ticket,
            worker = worker_id,
            rows = row_count,
            total,
            resume_from = done,
            "datadump started"
        );

        let mut cursor = ChunkCursor {
            job,
            status,
            total,
            next_part: done + 1,
            written: 0,
            buffer: Vec::with_capacity(usize::try_from(chunk_size).unwrap_or(0)),
        };
        self.drain(&plan.queries, &counts, skip, budget.saturating_sub(skip), &mut cursor)
            .await?;
        if !cursor.buffer.is_empty() {
            self.persist_chunk(&mut cursor).await?;
        }
        self.finish(cursor).await
    }

    /// Record `error` on the job status, keeping its progress for a resume.
    pub async fn fail(&self, ticket: &JobTicket, error: &Error) -> Result<(), Error> {
        let mut status = self
            .status
            .get_status(ticket)
            .await
            .map_err(map_status_error)?
            .unwrap_or_else(JobStatus::created);
        status.meta.state = JobState::Failed;
        status.meta.end_time = Some(self.clock.utc());
        status.error = Some(error.message().to_owned());
        self.status
            .set_status(ticket, &status)
            .await
            .map_err(map_status_error)
    }

    async fn drain(
        &self,
        queries: &[TableQuery],
        counts: &[u64],
        mut skip: u64,
        mut budget: u64,
        cursor: &mut ChunkCursor<'_>,
    ) -> Result<(), Error> {
        let chunk_size = usize::try_from(self.config.chunk_size.max(1)).unwrap_or(usize::MAX);
        for (query, &count) in queries.iter().zip(counts) {
            if budget == 0 {
                break;
            }
            if skip >= count {
                skip -= count;
                continue;
            }
            let mut remaining = (count - skip).min(budget);
            let mut page = WindowPage {
                after: None,
                offset: query.offset + skip,
                size: 0,
            };
            skip = 0;
            while remaining > 0 {
                page.size = remaining.min(self.config.window_size.max(1));
                let rows = self
                    .warehouse
                    .fetch_window(query, &page)
                    .await
                    .map_err(|err| map_warehouse_error(&query.table.name, err))?;
                let Some(last) = rows.last() else {
                    warn!(table = %query.table.name, remaining, "table drained before its counted rows");
                    return Err(Error::internal(format!(
                        "table {} returned {remaining} fewer rows than counted",
                        query.table.name
                    )));
                };
                page.after = Some(last.cursor());
                page.offset = 0;
                let fetched = u64::try_from(rows.len()).unwrap_or(u64::MAX);
                remaining = remaining.saturating_sub(fetched);
                budget = budget.saturating_sub(fetched);
                for row in rows {
                    cursor.buffer.push(ObservationRecord::from_row(row, &query.table));
                    if cursor.buffer.len() >= chunk_size {
                        self.persist_chunk(cursor).await?;
                    }
                }
            }
        }
        Ok(())
    }

    async fn persist_chunk(&self, cursor: &mut ChunkCursor<'_>) -> Result<(), Error> {
        let part = cursor.next_part;
        let data = serde_json::to_string(&cursor.buffer)
            .map_err(|err| Error::internal_with_debug("failed to encode datadump chunk", &err))?;
        let chunk = DatadumpChunk {
            ticket: cursor.job.ticket,
            part,
            total: cursor.total,
            data,
        };
        match self.chunks.store_chunk(&chunk).await {
            Ok(()) => cursor.written += 1,
            Err(ChunkStoreError::Duplicate { .. }) => {
                warn!(ticket = %cursor.job.ticket, part, "chunk already stored; keeping existing part");
            }
            Err(err) => return Err(map_chunk_error(err)),
        }
        cursor.buffer.clear();
        cursor.next_part += 1;

        cursor.status.progress = Some(JobProgress {
            done: part,
            total: cursor.total,
        });
        self.status
            .set_status(&cursor.job.ticket, &cursor.status)
            .await
            .map_err(map_status_error)?;
        self.status
            .set_flag(
                &cursor.job.ticket.suppress_cleanup_key(),
                true,
                self.config.cleanup_suppression_ttl,
            )
            .await
            .map_err(map_status_error)?;
        debug!(ticket = %cursor.job.ticket, part, total = cursor.total, "chunk persisted");
        Ok(())
    }

    async fn finish(&self, cursor: ChunkCursor<'_>) -> Result<DatadumpOutcome, Error> {
        let ChunkCursor {
            job,
            mut status,
            total,
            written,
            ..
        } = cursor;
        let end_time = self.clock.utc();
        let manifest = DatadumpManifest {
            start_time: status.meta.start_time,
            end_time,
            workers: status.meta.workers.clone(),
            features: status.meta.features.clone(),
        };
        let data = serde_json::to_string(&manifest)
            .map_err(|err| Error::internal_with_debug("failed to encode datadump manifest", &err))?;
        let manifest_chunk = DatadumpChunk {
            ticket: job.ticket,
            part: 0,
            total,
            data,
        };
        match self.chunks.store_chunk(&manifest_chunk).await {
            Ok(()) | Err(ChunkStoreError::Duplicate { .. }) => {}
            Err(err) => return Err(map_chunk_error(err)),
        }

        let url = job.download_url();
        status.meta.state = JobState::Complete;
        status.meta.end_time = Some(end_time);
        status.result = Some(json!({ "url": url }));
        self.status
            .set_status(&job.ticket, &status)
            .await
            .map_err(map_status_error)?;
        info!(ticket = %job.ticket, total, written, "datadump complete");
        Ok(DatadumpOutcome {
            total,
            written,
            url,
        })
    }
}

/// `ceil(rows / chunk_size)`, saturating at `u32::MAX`.
pub(crate) fn chunk_total(rows: u64, chunk_size: u64) -> u32 {
    u32::try_from(rows.div_ceil(chunk_size.max(1))).unwrap_or(u32::MAX)
}

pub(crate) fn map_status_error(error: JobStatusStoreError) -> Error {
    match error {
        JobStatusStoreError::Backend { message } => {
            Error::service_unavailable(format!("job status store unavailable: {message}"))
        }
        JobStatusStoreError::Serialization { .. } => {
            Error::internal_with_debug("job status could not be encoded", &error)
        }
    }
}

pub(crate) fn map_chunk_error(error: ChunkStoreError) -> Error {
    match error {
        ChunkStoreError::Connection { message } => {
            Error::service_unavailable(format!("chunk store unavailable: {message}"))
        }
        other => Error::internal_with_debug("chunk store write failed", &other),
    }
}

#[cfg(test)]
#[path = "runner_tests.rs"]
mod tests;
