//! In-process datadump queue with a per-job attempt budget and claim lease.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::warn;

use crate::domain::ports::{DatadumpQueue, DatadumpQueueError};
use crate::domain::{DatadumpJob, JobTicket};

/// Attempts a job gets before it is dropped from the queue.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// How long a claim survives without renewal.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(10 * 60);

#[derive(Debug)]
struct Claim {
    job: DatadumpJob,
    attempts: u32,
    worker: String,
    renewed_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    pending: VecDeque<(DatadumpJob, u32)>,
    claimed: HashMap<JobTicket, Claim>,
}

/// FIFO queue; a released job goes to the back of the line and a lapsed
/// claim goes to the front.
#[derive(Debug, Clone)]
pub struct InMemoryDatadumpQueue {
    state: Arc<Mutex<QueueState>>,
    max_attempts: u32,
    lease: Duration,
}

impl Default for InMemoryDatadumpQueue {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ATTEMPTS)
    }
}

impl InMemoryDatadumpQueue {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            state: Arc::new(Mutex::new(QueueState::default())),
            max_attempts: max_attempts.max(1),
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }

    /// Jobs waiting to be claimed.
    pub fn pending_len(&self) -> usize {
        self.state.lock().map(|state| state.pending.len()).unwrap_or(0)
    }

    fn lock(&self) -> Result<std::sync::MutexGuard<'_, QueueState>, DatadumpQueueError> {
        self.state
            .lock()
            .map_err(|_| DatadumpQueueError::unavailable("queue lock poisoned"))
    }

    /// Requeue claims whose lease lapsed, dropping those out of attempts.
    fn reclaim_lapsed(&self, state: &mut QueueState) {
        let now = Instant::now();
        let lapsed: Vec<JobTicket> = state
            .claimed
            .iter()
            .filter(|(_, claim)| now.duration_since(claim.renewed_at) >= self.lease)
            .map(|(ticket, _)| *ticket)
            .collect();
        for ticket in lapsed {
            let Some(claim) = state.claimed.remove(&ticket) else {
                continue;
            };
            if claim.attempts >= self.max_attempts {
                warn!(
                    %ticket,
                    attempts = claim.attempts,
                    worker = claim.worker,
                    "datadump job exhausted its attempts"
                );
                continue;
            }
            warn!(%ticket, worker = claim.worker, "datadump claim lapsed; requeueing");
            state.pending.push_front((claim.job, claim.attempts));
        }
    }
}

#[async_trait]
impl DatadumpQueue for InMemoryDatadumpQueue {
    async fn enqueue(&self, job: &DatadumpJob) -> Result<(), DatadumpQueueError> {
        let mut state = self.lock()?;
        let queued = state.pending.iter().any(|(pending, _)| pending.ticket == job.ticket)
            || state.claimed.contains_key(&job.ticket);
        if queued {
            return Err(DatadumpQueueError::rejected(format!(
                "job {} is already queued",
                job.ticket
            )));
        }
        state.pending.push_back((job.clone(), 0));
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<DatadumpJob>, DatadumpQueueError> {
        let mut state = self.lock()?;
        self.reclaim_lapsed(&mut state);
        let Some((job, attempts)) = state.pending.pop_front() else {
            return Ok(None);
        };
        state.claimed.insert(
            job.ticket,
            Claim {
                job: job.clone(),
                attempts: attempts + 1,
                worker: worker_id.to_owned(),
                renewed_at: Instant::now(),
            },
        );
        Ok(Some(job))
    }

    async fn renew_claim(
        &self,
        ticket: &JobTicket,
        worker_id: &str,
    ) -> Result<(), DatadumpQueueError> {
        let mut state = self.lock()?;
        match state.claimed.get_mut(ticket) {
            Some(claim) if claim.worker == worker_id => {
                claim.renewed_at = Instant::now();
                Ok(())
            }
            _ => Err(DatadumpQueueError::rejected(format!(
                "job {ticket} is not claimed by {worker_id}"
            ))),
        }
    }

    async fn mark_finished(
        &self,
        ticket: &JobTicket,
        succeeded: bool,
    ) -> Result<(), DatadumpQueueError> {
        let mut state = self.lock()?;
        let Some(Claim {
            job,
            attempts,
            worker,
            ..
        }) = state.claimed.remove(ticket)
        else {
            return Err(DatadumpQueueError::rejected(format!(
                "job {ticket} is not claimed"
            )));
        };
        if succeeded {
            return Ok(());
        }
        if attempts >= self.max_attempts {
            warn!(%ticket, attempts, worker, "datadump job exhausted its attempts");
            return Ok(());
        }
        state.pending.push_back((job, attempts));
        Ok(())
    }
}
