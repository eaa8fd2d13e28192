//! Datadump submission and retrieval.

use std::sync::Arc;

use tracing::{info, warn};

use super::runner::{map_chunk_error, map_status_error};
use super::{DatadumpChunk, DatadumpJob, JobStatus, JobTicket};
use crate::domain::ports::{ChunkStore, DatadumpQueue, DatadumpQueueError, JobStatusStore};
use crate::domain::{Error, ObservationQueryPlanner, ObservationRequest};

/// Result of accepting a datadump request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadumpSubmission {
    pub ticket: JobTicket,
    /// Where the caller can poll the job status.
    pub url: String,
}

/// Validates, queues and serves datadump jobs.
#[derive(Clone)]
pub struct DatadumpService {
    planner: ObservationQueryPlanner,
    queue: Arc<dyn DatadumpQueue>,
    status: Arc<dyn JobStatusStore>,
    chunks: Arc<dyn ChunkStore>,
}

impl DatadumpService {
    pub fn new(
        planner: ObservationQueryPlanner,
        queue: Arc<dyn DatadumpQueue>,
        status: Arc<dyn JobStatusStore>,
        chunks: Arc<dyn ChunkStore>,
    ) -> Self {
        Self {
            planner,
            queue,
            status,
            chunks,
        }
    }

    /// Queue a datadump of `request`.
    ///
    /// The request is planned first so an unknown name or a missing feature
    /// table is reported synchronously and nothing is queued. The `created`
    /// status is written before enqueueing, so a worker never sees a job
    /// without one, and is removed again when the job cannot be queued.
    pub async fn submit(
        &self,
        request: ObservationRequest,
        url_root: &str,
    ) -> Result<DatadumpSubmission, Error> {
        let plan = self.planner.plan(&request).await?;
        let job = DatadumpJob {
            ticket: JobTicket::generate(),
            request,
            url_root: url_root.to_owned(),
        };
        self.status
            .set_status(&job.ticket, &JobStatus::created())
            .await
            .map_err(map_status_error)?;
        if let Err(queue_error) = self.queue.enqueue(&job).await {
            if let Err(status_error) = self.status.clear_status(&job.ticket).await {
                warn!(
                    ticket = %job.ticket,
                    error = %status_error,
                    "orphaned job status left behind"
                );
            }
            return Err(map_queue_error(queue_error));
        }
        info!(ticket = %job.ticket, tables = plan.queries.len(), "datadump queued");
        Ok(DatadumpSubmission {
            ticket: job.ticket,
            url: job.status_url(),
        })
    }

    /// Current status of `ticket`.
    pub async fn status(&self, ticket: &JobTicket) -> Result<JobStatus, Error> {
        self.status
            .get_status(ticket)
            .await
            .map_err(map_status_error)?
            .ok_or_else(|| Error::not_found(format!("Unknown job ticket: {ticket}")))
    }

    /// Chunk `part` of `ticket`; part `0` is the manifest.
    pub async fn chunk(&self, ticket: &JobTicket, part: u32) -> Result<DatadumpChunk, Error> {
        self.chunks
            .find_chunk(ticket, part)
            .await
            .map_err(map_chunk_error)?
            .ok_or_else(|| Error::not_found(format!("No part {part} stored for job {ticket}")))
    }
}

pub(crate) fn map_queue_error(error: DatadumpQueueError) -> Error {
    match error {
        DatadumpQueueError::Unavailable { message } => {
            Error::service_unavailable(format!("datadump queue unavailable: {message}"))
        }
        other => Error::internal_with_debug("datadump job rejected", &other),
    }
}

#[cfg(test)]
#[path = "service_tests.rs"]
mod tests;
