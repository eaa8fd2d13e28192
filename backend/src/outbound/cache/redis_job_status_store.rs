//! Redis-backed job status records and expiring flags.

use std::time::Duration;

use async_trait::async_trait;
use bb8_redis::redis::AsyncCommands;

use crate::domain::ports::{JobStatusStore, JobStatusStoreError};
use crate::domain::{JobStatus, JobTicket};

use super::RedisPool;

const STATUS_KEY_PREFIX: &str = "sensornet:job:";

fn status_key(ticket: &JobTicket) -> String {
    format!("{STATUS_KEY_PREFIX}{ticket}")
}

/// [`JobStatusStore`] keeping one JSON document per ticket.
///
/// Flags are stored verbatim under the caller's key with `SET .. EX`.
#[derive(Clone)]
pub struct RedisJobStatusStore {
    pool: RedisPool,
}

impl RedisJobStatusStore {
    pub fn new(pool: RedisPool) -> Self {
        Self { pool }
    }
}

fn encode(status: &JobStatus) -> Result<String, JobStatusStoreError> {
    serde_json::to_string(status).map_err(|err| JobStatusStoreError::serialization(err.to_string()))
}

fn decode(raw: &str) -> Result<JobStatus, JobStatusStoreError> {
    serde_json::from_str(raw).map_err(|err| JobStatusStoreError::serialization(err.to_string()))
}

fn ttl_seconds(ttl: Duration) -> u64 {
    ttl.as_secs().max(1)
}

#[async_trait]
impl JobStatusStore for RedisJobStatusStore {
    async fn get_status(&self, ticket: &JobTicket) -> Result<Option<JobStatus>, JobStatusStoreError> {
        let mut conn = self.pool.get().await.map_err(JobStatusStoreError::backend)?;
        let raw: Option<String> = conn
            .get(status_key(ticket))
            .await
            .map_err(|err| JobStatusStoreError::backend(err.to_string()))?;
        raw.as_deref().map(decode).transpose()
    }

    async fn set_status(
        &self,
        ticket: &JobTicket,
        status: &JobStatus,
    ) -> Result<(), JobStatusStoreError> {
        let body = encode(status)?;
        let mut conn = self.pool.get().await.map_err(JobStatusStoreError::backend)?;
        conn.set::<_, _, ()>(status_key(ticket), body)
            .await
            .map_err(|err| JobStatusStoreError::backend(err.to_string()))
    }

    async fn clear_status(&self, ticket: &JobTicket) -> Result<(), JobStatusStoreError> {
        let mut conn = self.pool.get().await.map_err(JobStatusStoreError::backend)?;
        conn.del::<_, ()>(status_key(ticket))
            .await
            .map_err(|err| JobStatusStoreError::backend(err.to_string()))
    }

    async fn set_flag(
        &self,
        key: &str,
        value: bool,
        ttl: Duration,
    ) -> Result<(), JobStatusStoreError> {
        let mut conn = self.pool.get().await.map_err(JobStatusStoreError::backend)?;
        conn.set_ex::<_, _, ()>(key, value.to_string(), ttl_seconds(ttl))
            .await
            .map_err(|err| JobStatusStoreError::backend(err.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobProgress, JobState};
    use rstest::rstest;

    #[rstest]
    fn status_keys_are_namespaced() {
        let ticket: JobTicket = "6f1c2a5e-1f4b-4c1e-9a57-3f7f1d3b9c10".parse().expect("ticket");
        assert_eq!(
            status_key(&ticket),
            "sensornet:job:6f1c2a5e-1f4b-4c1e-9a57-3f7f1d3b9c10"
        );
    }

    #[rstest]
    fn statuses_survive_encoding() {
        let mut status = JobStatus::created();
        status.meta.state = JobState::Running;
        status.progress = Some(JobProgress { done: 2, total: 5 });

        let decoded = decode(&encode(&status).expect("encode")).expect("decode");

        assert_eq!(decoded, status);
    }

    #[rstest]
    fn corrupt_records_are_serialisation_errors() {
        let err = decode("{\"meta\":").expect_err("truncated");
        assert!(matches!(err, JobStatusStoreError::Serialization { .. }));
    }

    #[rstest]
    #[case(Duration::from_secs(10_800), 10_800)]
    #[case(Duration::from_millis(200), 1)]
    fn flag_ttls_round_to_whole_seconds(#[case] ttl: Duration, #[case] expected: u64) {
        assert_eq!(ttl_seconds(ttl), expected);
    }
}
