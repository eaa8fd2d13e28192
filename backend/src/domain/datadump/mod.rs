//! Datadump jobs: chunked, resumable exports of observation queries.
//!
//! A job moves `created → running → complete` (or `failed`). The runner
//! persists chunks `1..=total` followed by the manifest as part `0`, and
//! after every chunk it updates the shared status record and extends the
//! cleanup-suppression flag.

mod runner;
mod service;
mod worker;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use super::ObservationRequest;

pub use runner::{DatadumpConfig, DatadumpOutcome, DatadumpRunner};
pub use service::{DatadumpService, DatadumpSubmission};
pub use worker::{DatadumpWorker, PollOutcome};

/// Identifier of one datadump job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobTicket(Uuid);

impl JobTicket {
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    pub fn as_uuid(&self) -> &Uuid {
        &self.0
    }

    /// Key of the flag that keeps the cleanup job away from this ticket.
    pub fn suppress_cleanup_key(&self) -> String {
        format!("{}_suppresscleanup", self.0)
    }
}

impl std::fmt::Display for JobTicket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.0.fmt(f)
    }
}

impl std::str::FromStr for JobTicket {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(Uuid::parse_str(s.trim())?))
    }
}

/// Lifecycle state of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    Created,
    Running,
    Complete,
    Failed,
}

/// Chunks persisted so far out of the fixed total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobProgress {
    pub done: u32,
    pub total: u32,
}

/// Descriptive part of a job status.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobMeta {
    pub state: JobState,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    #[serde(default)]
    pub workers: Vec<String>,
    #[serde(default)]
    pub features: Vec<String>,
}

/// Shared job-status record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobStatus {
    pub meta: JobMeta,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<JobProgress>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl JobStatus {
    /// Fresh status for a job that has been queued but not started.
    pub fn created() -> Self {
        Self {
            meta: JobMeta {
                state: JobState::Created,
                start_time: None,
                end_time: None,
                workers: Vec::new(),
                features: Vec::new(),
            },
            progress: None,
            result: None,
            error: None,
        }
    }
}

/// One persisted page of a datadump. Part `0` holds the manifest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DatadumpChunk {
    pub ticket: JobTicket,
    pub part: u32,
    pub total: u32,
    /// Serialised JSON array of observation records, or the manifest object.
    pub data: String,
}

/// Manifest stored as part `0` once every chunk is written.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DatadumpManifest {
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: DateTime<Utc>,
    pub workers: Vec<String>,
    pub features: Vec<String>,
}

/// Queue payload describing one datadump.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatadumpJob {
    pub ticket: JobTicket,
    pub request: ObservationRequest,
    /// Public URL root used to build the download link.
    pub url_root: String,
}

impl DatadumpJob {
    /// Link to the manifest of this job.
    pub fn download_url(&self) -> String {
        format!("{}/datadump/{}", self.url_root.trim_end_matches('/'), self.ticket)
    }

    /// Link to the status record of this job.
    pub fn status_url(&self) -> String {
        format!("{}/jobs/{}", self.url_root.trim_end_matches('/'), self.ticket)
    }
}
