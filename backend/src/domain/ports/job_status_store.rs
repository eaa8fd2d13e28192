//! Port for the shared datadump job-status record and expiring flags.
//!
//! Writes are last-writer-wins. The runner writes status after each chunk,
//! so a crash between the two leaves progress understated, never overstated.

use std::time::Duration;

use async_trait::async_trait;

use crate::domain::{JobStatus, JobTicket};

use super::define_port_error;

define_port_error! {
    /// Errors raised by job-status adapters.
    pub enum JobStatusStoreError {
        /// Store backend is unavailable or timing out.
        Backend { message: String } => "job status backend failure: {message}",
        /// Stored status could not be encoded or decoded.
        Serialization { message: String } => "job status serialisation failed: {message}",
    }
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait JobStatusStore: Send + Sync {
    /// Current status for `ticket`, if one was ever written.
    async fn get_status(&self, ticket: &JobTicket) -> Result<Option<JobStatus>, JobStatusStoreError>;

    /// Replace the status for `ticket`.
    async fn set_status(&self, ticket: &JobTicket, status: &JobStatus)
    -> Result<(), JobStatusStoreError>;

    /// Remove the status for `ticket`; a missing record is not an error.
    async fn clear_status(&self, ticket: &JobTicket) -> Result<(), JobStatusStoreError>;

    /// Set a boolean flag that expires after `ttl`.
    async fn set_flag(&self, key: &str, value: bool, ttl: Duration)
    -> Result<(), JobStatusStoreError>;
}
