//! PostgreSQL-backed datadump chunk store.

use diesel::OptionalExtension;
use diesel::prelude::*;
use diesel_async::RunQueryDsl;

use crate::domain::ports::{ChunkStore, ChunkStoreError};
use crate::domain::{DatadumpChunk, JobTicket};

use super::diesel_helpers::{
    is_unique_violation, map_basic_diesel_error, map_pool_error_message, to_integer,
};
use super::models::{DatadumpRow, NewDatadumpRow};
use super::pool::{DbPool, PoolError};
use super::schema::datadumps;

/// Diesel-backed implementation of [`ChunkStore`].
#[derive(Clone)]
pub struct DieselChunkStore {
    pool: DbPool,
}

impl DieselChunkStore {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn map_pool_error(error: PoolError) -> ChunkStoreError {
    ChunkStoreError::connection(map_pool_error_message(error))
}

fn map_diesel_error(error: &diesel::result::Error, operation: &str) -> ChunkStoreError {
    map_basic_diesel_error(
        error,
        operation,
        ChunkStoreError::query,
        ChunkStoreError::connection,
    )
}

fn map_store_error(part: u32) -> impl Fn(diesel::result::Error) -> ChunkStoreError {
    move |error| {
        if is_unique_violation(&error) {
            ChunkStoreError::duplicate(part)
        } else {
            map_diesel_error(&error, "store chunk")
        }
    }
}

fn into_chunk(row: DatadumpRow) -> Result<DatadumpChunk, ChunkStoreError> {
    let part = u32::try_from(row.part)
        .map_err(|_| ChunkStoreError::query(format!("negative chunk part {}", row.part)))?;
    let total = u32::try_from(row.total)
        .map_err(|_| ChunkStoreError::query(format!("negative chunk total {}", row.total)))?;
    Ok(DatadumpChunk {
        ticket: JobTicket::from_uuid(row.request),
        part,
        total,
        data: row.data,
    })
}

#[async_trait::async_trait]
impl ChunkStore for DieselChunkStore {
    async fn store_chunk(&self, chunk: &DatadumpChunk) -> Result<(), ChunkStoreError> {
        use diesel_async::AsyncConnection as _;
        use diesel_async::scoped_futures::ScopedFutureExt as _;

        let row = NewDatadumpRow {
            request: *chunk.ticket.as_uuid(),
            part: to_integer(chunk.part),
            total: to_integer(chunk.total),
            data: &chunk.data,
        };
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        conn.transaction(|conn| {
            async move {
                diesel::insert_into(datadumps::table)
                    .values(&row)
                    .execute(conn)
                    .await
                    .map(|_| ())
            }
            .scope_boxed()
        })
        .await
        .map_err(map_store_error(chunk.part))
    }

    async fn find_chunk(
        &self,
        ticket: &JobTicket,
        part: u32,
    ) -> Result<Option<DatadumpChunk>, ChunkStoreError> {
        let mut conn = self.pool.get().await.map_err(map_pool_error)?;
        let row = datadumps::table
            .filter(datadumps::request.eq(ticket.as_uuid()))
            .filter(datadumps::part.eq(to_integer(part)))
            .select(DatadumpRow::as_select())
            .first::<DatadumpRow>(&mut conn)
            .await
            .optional()
            .map_err(|err| map_diesel_error(&err, "find chunk"))?;
        row.map(into_chunk).transpose()
    }
}
