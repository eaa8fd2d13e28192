//! PostgreSQL-backed datadump job queue.
//!
//! Jobs live in `datadump_jobs`. Claims use `FOR UPDATE SKIP LOCKED` so
//! concurrent workers never receive the same job, and a failed job returns
//! to `queued` until its attempt budget is spent, after which it is parked
//! as `dead`. A claim not renewed within the lease is offered again, so a
//! crashed or interrupted worker's job resumes elsewhere.

use std::time::Duration;

use diesel::QueryableByName;
use diesel::sql_query;
use diesel::sql_types::{Bool, Double, Integer, Jsonb, Text, Uuid as SqlUuid};
use diesel_async::RunQueryDsl;
use serde_json::Value;
use tracing::{debug, warn};

use crate::domain::ports::{DatadumpQueue, DatadumpQueueError};
use crate::domain::{DatadumpJob, JobTicket};

use super::diesel_helpers::{
    is_unique_violation, map_diesel_error_message, map_pool_error_message, to_integer,
};
use super::models::NewDatadumpJobRow;
use super::pool::{DbPool, PoolError};
use super::schema::datadump_jobs;

/// Attempts before a repeatedly failing job is parked.
const DEFAULT_MAX_ATTEMPTS: u32 = 3;
/// How long a claim survives without renewal.
pub const DEFAULT_CLAIM_LEASE: Duration = Duration::from_secs(10 * 60);

/// Diesel-backed implementation of [`DatadumpQueue`].
#[derive(Clone)]
pub struct DieselDatadumpQueue {
    pool: DbPool,
    max_attempts: u32,
    lease: Duration,
}

impl DieselDatadumpQueue {
    pub fn new(pool: DbPool) -> Self {
        Self {
            pool,
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            lease: DEFAULT_CLAIM_LEASE,
        }
    }

    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn with_lease(mut self, lease: Duration) -> Self {
        self.lease = lease;
        self
    }
}

/// Park lapsed claims that have no attempts left.
///
/// Binds: `$1` lease in seconds, `$2` attempt budget.
const BURY_LAPSED_SQL: &str = r#"
UPDATE datadump_jobs
SET state = 'dead', worker = NULL
WHERE state = 'claimed'
  AND claimed_at < now() - make_interval(secs => $1)
  AND attempts >= $2
RETURNING ticket
"#;

/// Claim the oldest queued job or lapsed claim.
///
/// Binds: `$1` worker, `$2` lease in seconds.
const CLAIM_SQL: &str = r#"
UPDATE datadump_jobs
SET state = 'claimed', worker = $1, attempts = attempts + 1, claimed_at = now()
WHERE ticket = (
    SELECT ticket
    FROM datadump_jobs
    WHERE state = 'queued'
       OR (state = 'claimed' AND claimed_at < now() - make_interval(secs => $2))
    ORDER BY enqueued_at
    FOR UPDATE SKIP LOCKED
    LIMIT 1
)
RETURNING ticket, payload
"#;

const RENEW_SQL: &str = r#"
UPDATE datadump_jobs
SET claimed_at = now()
WHERE ticket = $1 AND state = 'claimed' AND worker = $2
RETURNING ticket
"#;

const BURY_SQL: &str = r#"
UPDATE datadump_jobs
SET state = 'dead', worker = NULL
WHERE ticket = $1
"#;

const FINISH_SQL: &str = r#"
UPDATE datadump_jobs
SET state = CASE
        WHEN $2 THEN 'done'
        WHEN attempts >= $3 THEN 'dead'
        ELSE 'queued'
    END,
    worker = NULL
WHERE ticket = $1 AND state = 'claimed'
RETURNING state
"#;

#[derive(Debug, QueryableByName)]
struct ClaimedRow {
    #[diesel(sql_type = SqlUuid)]
    ticket: uuid::Uuid,
    #[diesel(sql_type = Jsonb)]
    payload: Value,
}

#[derive(Debug, QueryableByName)]
struct TicketRow {
    #[diesel(sql_type = SqlUuid)]
    ticket: uuid::Uuid,
}

#[derive(Debug, QueryableByName)]
struct FinishedRow {
    #[diesel(sql_type = Text)]
    state: String,
}

fn map_pool_error(error: PoolError) -> DatadumpQueueError {
    DatadumpQueueError::unavailable(map_pool_error_message(error))
}

fn map_diesel_error(operation: &'static str) -> impl Fn(diesel::result::Error) -> DatadumpQueueError {
    move |error| {
        if is_unique_violation(&error) {
            return DatadumpQueueError::rejected(format!("{operation}: job already queued"));
        }
        DatadumpQueueError::unavailable(format!(
            "{operation}: {}",
            map_diesel_error_message(&error, operation)
        ))
    }
}

fn lease_secs(lease: Duration) -> f64 {
    lease.as_secs_f64()
}

fn decode_payload(payload: Value) -> Result<DatadumpJob, DatadumpQueueError> {
    serde_json::from_value(payload)
        .map_err(|err| DatadumpQueueError::rejected(format!("undecodable job payload: {err}")))
}

#[async_trait::async_trait]
impl DatadumpQueue for DieselDatadumpQueue {
    async fn enqueue(&self, job: &DatadumpJob) -> Result<(), DatadumpQueueError> {
        let payload = serde_json::to_value(job)
            .map_err(|err| DatadumpQueueError::rejected(format!("job payload: {err}")))?;
        let row = NewDatadumpJobRow {
            ticket: *job.ticket.as_uuid(),
            payload,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        diesel::insert_into(datadump_jobs::table)
            .values(&row)
            .execute(&mut conn)
            .await
            .map_err(map_diesel_error("enqueue"))?;
        debug!(ticket = %job.ticket, "datadump job queued");
        Ok(())
    }

    async fn claim_next(&self, worker_id: &str) -> Result<Option<DatadumpJob>, DatadumpQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let buried: Vec<TicketRow> = sql_query(BURY_LAPSED_SQL)
            .bind::<Double, _>(lease_secs(self.lease))
            .bind::<Integer, _>(to_integer(self.max_attempts))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("bury lapsed claims"))?;
        for row in buried {
            warn!(ticket = %row.ticket, "lapsed datadump claim exhausted its attempts");
        }

        let claimed: Vec<ClaimedRow> = sql_query(CLAIM_SQL)
            .bind::<Text, _>(worker_id)
            .bind::<Double, _>(lease_secs(self.lease))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("claim"))?;
        let Some(row) = claimed.into_iter().next() else {
            return Ok(None);
        };
        match decode_payload(row.payload) {
            Ok(job) => Ok(Some(job)),
            Err(err) => {
                warn!(ticket = %row.ticket, error = %err, "burying undecodable datadump job");
                sql_query(BURY_SQL)
                    .bind::<SqlUuid, _>(row.ticket)
                    .execute(&mut conn)
                    .await
                    .map_err(map_diesel_error("bury undecodable job"))?;
                Err(err)
            }
        }
    }

    async fn renew_claim(
        &self,
        ticket: &JobTicket,
        worker_id: &str,
    ) -> Result<(), DatadumpQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let renewed: Vec<TicketRow> = sql_query(RENEW_SQL)
            .bind::<SqlUuid, _>(ticket.as_uuid())
            .bind::<Text, _>(worker_id)
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("renew claim"))?;
        if renewed.is_empty() {
            return Err(DatadumpQueueError::rejected(format!(
                "job {ticket} is not claimed by {worker_id}"
            )));
        }
        Ok(())
    }

    async fn mark_finished(
        &self,
        ticket: &JobTicket,
        succeeded: bool,
    ) -> Result<(), DatadumpQueueError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let finished: Vec<FinishedRow> = sql_query(FINISH_SQL)
            .bind::<SqlUuid, _>(ticket.as_uuid())
            .bind::<Bool, _>(succeeded)
            .bind::<Integer, _>(to_integer(self.max_attempts))
            .load(&mut conn)
            .await
            .map_err(map_diesel_error("mark finished"))?;
        let Some(row) = finished.into_iter().next() else {
            return Err(DatadumpQueueError::rejected(format!(
                "job {ticket} is not claimed"
            )));
        };
        if row.state == "dead" {
            warn!(%ticket, attempts = self.max_attempts, "datadump job exhausted its attempts");
        }
        Ok(())
    }
}
