//! Port for persisted datadump chunks keyed by `(ticket, part)`.

use async_trait::async_trait;

use crate::domain::{DatadumpChunk, JobTicket};

use super::define_port_error;

define_port_error! {
    /// Errors raised by chunk store adapters.
    pub enum ChunkStoreError {
        /// Store connection could not be established.
        Connection { message: String } => "chunk store connection failed: {message}",
        /// Write or read failed; a failed write is rolled back.
        Query { message: String } => "chunk store query failed: {message}",
        /// A chunk with the same part number already exists for the ticket.
        Duplicate { part: u32 } => "chunk part {part} already stored",
    }
}

/// Append-only chunk storage.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ChunkStore: Send + Sync {
    /// Persist one chunk atomically.
    async fn store_chunk(&self, chunk: &DatadumpChunk) -> Result<(), ChunkStoreError>;

    /// Load chunk `part` of `ticket`; part `0` is the manifest.
    async fn find_chunk(
        &self,
        ticket: &JobTicket,
        part: u32,
    ) -> Result<Option<DatadumpChunk>, ChunkStoreError>;
}
