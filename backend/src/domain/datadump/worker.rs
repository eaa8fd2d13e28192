//! Queue consumer driving [`DatadumpRunner`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use super::service::map_queue_error;
use super::{DatadumpJob, DatadumpOutcome, DatadumpRunner, JobTicket};
use crate::domain::Error;
use crate::domain::ports::DatadumpQueue;

/// What one poll of the queue achieved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    /// The queue held no claimable job.
    Idle,
    Completed(JobTicket),
    /// The job failed and was released for a later resume.
    Failed(JobTicket),
}

/// Interval between claim renewals while a job runs.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(60);

/// Claims queued jobs one at a time and runs them to completion.
///
/// The claim is renewed every heartbeat while the job runs, so the heartbeat
/// must stay well inside the queue's claim lease.
#[derive(Clone)]
pub struct DatadumpWorker {
    queue: Arc<dyn DatadumpQueue>,
    runner: DatadumpRunner,
    worker_id: String,
    heartbeat: Duration,
}

impl DatadumpWorker {
    pub fn new(
        queue: Arc<dyn DatadumpQueue>,
        runner: DatadumpRunner,
        worker_id: impl Into<String>,
    ) -> Self {
        Self {
            queue,
            runner,
            worker_id: worker_id.into(),
            heartbeat: DEFAULT_HEARTBEAT_INTERVAL,
        }
    }

    pub fn with_heartbeat(mut self, heartbeat: Duration) -> Self {
        self.heartbeat = heartbeat.max(Duration::from_millis(1));
        self
    }

    pub fn worker_id(&self) -> &str {
        &self.worker_id
    }

    /// Claim and run at most one job.
    ///
    /// A failing job is recorded on its status and handed back to the queue,
    /// so the returned error only covers queue failures.
    pub async fn poll_once(&self) -> Result<PollOutcome, Error> {
        let Some(job) = self
            .queue
            .claim_next(&self.worker_id)
            .await
            .map_err(map_queue_error)?
        else {
            return Ok(PollOutcome::Idle);
        };

        match self.run_with_heartbeat(&job).await {
            Ok(outcome) => {
                self.queue
                    .mark_finished(&job.ticket, true)
                    .await
                    .map_err(map_queue_error)?;
                info!(
                    ticket = %job.ticket,
                    worker = %self.worker_id,
                    total = outcome.total,
                    written = outcome.written,
                    "datadump complete"
                );
                Ok(PollOutcome::Completed(job.ticket))
            }
            Err(run_error) => {
                warn!(
                    ticket = %job.ticket,
                    worker = %self.worker_id,
                    error = %run_error,
                    "datadump failed"
                );
                if let Err(status_error) = self.runner.fail(&job.ticket, &run_error).await {
                    error!(ticket = %job.ticket, error = %status_error, "recording failure failed");
                }
                self.queue
                    .mark_finished(&job.ticket, false)
                    .await
                    .map_err(map_queue_error)?;
                Ok(PollOutcome::Failed(job.ticket))
            }
        }
    }

    async fn run_with_heartbeat(&self, job: &DatadumpJob) -> Result<DatadumpOutcome, Error> {
        let run = self.runner.run(job, &self.worker_id);
        tokio::pin!(run);
        let mut heartbeat = tokio::time::interval(self.heartbeat);
        heartbeat.tick().await;
        loop {
            tokio::select! {
                result = &mut run => return result,
                _ = heartbeat.tick() => {
                    if let Err(err) = self.queue.renew_claim(&job.ticket, &self.worker_id).await {
                        warn!(ticket = %job.ticket, error = %err, "datadump claim renewal failed");
                    }
                }
            }
        }
    }

    /// Poll until `shutdown` resolves, sleeping `idle_interval` whenever the
    /// queue is empty or unreachable.
    pub async fn run_until(&self, idle_interval: Duration, shutdown: impl Future<Output = ()>) {
        tokio::pin!(shutdown);
        info!(worker = %self.worker_id, "datadump worker started");
        loop {
            let outcome = tokio::select! {
                () = &mut shutdown => break,
                outcome = self.poll_once() => outcome,
            };
            let idle = match outcome {
                Ok(PollOutcome::Idle) => true,
                Ok(_) => false,
                Err(err) => {
                    warn!(worker = %self.worker_id, error = %err, "queue poll failed");
                    true
                }
            };
            if idle {
                debug!(worker = %self.worker_id, "queue idle");
                tokio::select! {
                    () = &mut shutdown => break,
                    () = tokio::time::sleep(idle_interval) => {}
                }
            }
        }
        info!(worker = %self.worker_id, "datadump worker stopped");
    }
}

#[cfg(test)]
#[path = "worker_tests.rs"]
mod tests;
