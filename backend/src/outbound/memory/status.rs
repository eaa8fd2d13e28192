//! In-process job-status store with expiring flags.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use async_trait::async_trait;

use crate::domain::ports::{JobStatusStore, JobStatusStoreError};
use crate::domain::{JobStatus, JobTicket};

#[derive(Debug, Default)]
struct StatusState {
    statuses: HashMap<JobTicket, JobStatus>,
    flags: HashMap<String, (bool, Instant)>,
}

#[derive(Debug, Default, Clone)]
pub struct InMemoryJobStatusStore {
    state: Arc<RwLock<StatusState>>,
}

impl InMemoryJobStatusStore {
    /// Value of `key` unless it has expired.
    pub fn flag(&self, key: &str) -> Option<bool> {
        let state = self.state.read().ok()?;
        let (value, expires_at) = state.flags.get(key)?;
        (*expires_at > Instant::now()).then_some(*value)
    }

    fn poisoned() -> JobStatusStoreError {
        JobStatusStoreError::backend("job status lock poisoned")
    }
}

#[async_trait]
impl JobStatusStore for InMemoryJobStatusStore {
    async fn get_status(&self, ticket: &JobTicket) -> Result<Option<JobStatus>, JobStatusStoreError> {
        let state = self.state.read().map_err(|_| Self::poisoned())?;
        Ok(state.statuses.get(ticket).cloned())
    }

    async fn set_status(
        &self,
        ticket: &JobTicket,
        status: &JobStatus,
    ) -> Result<(), JobStatusStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.statuses.insert(*ticket, status.clone());
        Ok(())
    }

    async fn clear_status(&self, ticket: &JobTicket) -> Result<(), JobStatusStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state.statuses.remove(ticket);
        Ok(())
    }

    async fn set_flag(
        &self,
        key: &str,
        value: bool,
        ttl: Duration,
    ) -> Result<(), JobStatusStoreError> {
        let mut state = self.state.write().map_err(|_| Self::poisoned())?;
        state
            .flags
            .insert(key.to_owned(), (value, Instant::now() + ttl));
        Ok(())
    }
}
