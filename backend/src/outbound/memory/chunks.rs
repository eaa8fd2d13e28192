//! In-process chunk store.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;

use crate::domain::ports::{ChunkStore, ChunkStoreError};
use crate::domain::{DatadumpChunk, JobTicket};

/// Chunks keyed by `(ticket, part)`.
#[derive(Debug, Default, Clone)]
pub struct InMemoryChunkStore {
    chunks: Arc<RwLock<BTreeMap<(JobTicket, u32), DatadumpChunk>>>,
}

impl InMemoryChunkStore {
    /// Part numbers stored for `ticket`, ascending.
    pub fn parts(&self, ticket: &JobTicket) -> Vec<u32> {
        self.chunks
            .read()
            .map(|chunks| {
                chunks
                    .keys()
                    .filter(|(stored, _)| stored == ticket)
                    .map(|(_, part)| *part)
                    .collect()
            })
            .unwrap_or_default()
    }
}

#[async_trait]
impl ChunkStore for InMemoryChunkStore {
    async fn store_chunk(&self, chunk: &DatadumpChunk) -> Result<(), ChunkStoreError> {
        let mut chunks = self
            .chunks
            .write()
            .map_err(|_| ChunkStoreError::connection("chunk store lock poisoned"))?;
        let key = (chunk.ticket, chunk.part);
        if chunks.contains_key(&key) {
            return Err(ChunkStoreError::duplicate(chunk.part));
        }
        chunks.insert(key, chunk.clone());
        Ok(())
    }

    async fn find_chunk(
        &self,
        ticket: &JobTicket,
        part: u32,
    ) -> Result<Option<DatadumpChunk>, ChunkStoreError> {
        let chunks = self
            .chunks
            .read()
            .map_err(|_| ChunkStoreError::connection("chunk store lock poisoned"))?;
        Ok(chunks.get(&(*ticket, part)).cloned())
    }
}
