//! Domain ports and supporting types for the hexagonal boundary.
//!
//! Each trait exposes a strongly typed error generated by
//! `define_port_error!`, so adapters map their failures into predictable
//! variants and services decide how each variant surfaces to callers.

mod macros;
pub(crate) use macros::define_port_error;

mod cache_key;
mod chunk_store;
mod datadump_queue;
mod job_status_store;
mod observation_warehouse;
mod response_cache;
mod sensor_catalog_repository;

pub use cache_key::{METADATA_CACHE_NAMESPACE, MetadataCacheKey, MetadataCacheKeyValidationError};
#[cfg(test)]
pub use chunk_store::MockChunkStore;
pub use chunk_store::{ChunkStore, ChunkStoreError};
#[cfg(test)]
pub use datadump_queue::MockDatadumpQueue;
pub use datadump_queue::{DatadumpQueue, DatadumpQueueError};
#[cfg(test)]
pub use job_status_store::MockJobStatusStore;
pub use job_status_store::{JobStatusStore, JobStatusStoreError};
#[cfg(test)]
pub use observation_warehouse::MockObservationWarehouse;
pub use observation_warehouse::{
    AggregateQuery, AggregateRow, ObservationWarehouse, ObservationWarehouseError,
};
#[cfg(test)]
pub use response_cache::MockResponseCache;
pub use response_cache::{DisabledResponseCache, ResponseCache, ResponseCacheError};
#[cfg(test)]
pub use sensor_catalog_repository::MockSensorCatalogRepository;
pub use sensor_catalog_repository::{
    NodeFilter, SensorCatalogRepository, SensorCatalogRepositoryError,
};
