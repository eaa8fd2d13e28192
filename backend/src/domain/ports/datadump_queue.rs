//! Port describing queue semantics for datadump jobs.
use async_trait::async_trait;

use crate::domain::{DatadumpJob, JobTicket};

use super::define_port_error;

define_port_error! {
    /// Errors surfaced by the queue adapter.
    pub enum DatadumpQueueError {
        /// Queue infrastructure is unavailable.
        Unavailable { message: String } => "datadump queue is unavailable: {message}",
        /// The job could not be persisted or claimed.
        Rejected { message: String } => "datadump job was rejected: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait DatadumpQueue: Send + Sync {
    /// Enqueue a job for a worker to pick up.
    async fn enqueue(&self, job: &DatadumpJob) -> Result<(), DatadumpQueueError>;

    /// Claim the oldest unclaimed job for `worker_id`, if any.
    ///
    /// A job claimed by one worker is never handed to another until it is
    /// released by [`DatadumpQueue::mark_finished`] with `succeeded = false`
    /// or its claim lease lapses without a [`DatadumpQueue::renew_claim`].
    /// A lapsed claim counts as a spent attempt.
    async fn claim_next(&self, worker_id: &str) -> Result<Option<DatadumpJob>, DatadumpQueueError>;

    /// Extend the lease `worker_id` holds on a claimed job.
    ///
    /// Fails with `Rejected` once the claim has lapsed or moved to another
    /// worker.
    async fn renew_claim(
        &self,
        ticket: &JobTicket,
        worker_id: &str,
    ) -> Result<(), DatadumpQueueError>;

    /// Record the outcome of a claimed job.
    ///
    /// Failed jobs return to the queue so a later claim resumes them, until
    /// the adapter's attempt budget is spent.
    async fn mark_finished(
        &self,
        ticket: &JobTicket,
        succeeded: bool,
    ) -> Result<(), DatadumpQueueError>;
}
