//! PostgreSQL persistence adapters using Diesel.
//!
//! Concrete implementations of the metadata, warehouse, chunk-store and
//! queue ports backed by PostgreSQL through `diesel-async` and `bb8` pools.
//!
//! # Architecture
//!
//! - **Thin adapters**: repositories only translate between rows and
//!   domain types. Planning and merging stay in the domain.
//! - **Internal models**: Diesel row structs (`models.rs`) and table
//!   definitions (`schema.rs`) never leave this module.
//! - **Runtime tables**: sensor metadata and per-feature observation tables
//!   are read with `sql_query` and quoted identifiers.
//! - **Strongly typed errors**: database failures map to each port's error.
//!
//! # Example
//!
//! ```ignore
//! use sensornet::outbound::persistence::{DbPool, DieselChunkStore, PoolConfig};
//!
//! let pool = DbPool::new(PoolConfig::new("postgres://localhost/sensors")).await?;
//! let chunks = DieselChunkStore::new(pool);
//! ```

pub(crate) mod diesel_helpers;
mod diesel_chunk_store;
mod diesel_datadump_queue;
mod diesel_observation_warehouse;
mod diesel_sensor_catalog_repository;
mod migrations;
mod models;
mod pool;
mod schema;

pub use diesel_chunk_store::DieselChunkStore;
pub use diesel_datadump_queue::DieselDatadumpQueue;
pub use diesel_observation_warehouse::DieselObservationWarehouse;
pub use diesel_sensor_catalog_repository::DieselSensorCatalogRepository;
pub use migrations::run_migrations;
pub use pool::{DbPool, PoolConfig, PoolError};
