//! Outbound adapters implementing domain ports for external infrastructure.
//!
//! - **persistence**: PostgreSQL adapters built on Diesel for the metadata
//!   catalog, the observation warehouse, the chunk store and the job queue
//! - **cache**: Redis adapters for job status and metadata responses
//! - **memory**: in-process adapters for fixture mode and tests
//!
//! Adapters are thin translators that convert between domain types and
//! infrastructure-specific representations. They contain no business logic.

pub mod cache;
pub mod memory;
pub mod persistence;
