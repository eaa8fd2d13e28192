//! In-process adapters.
//!
//! These back the fixture server mode and the test suites. Each adapter
//! keeps its state behind `Arc<RwLock<..>>` (or a `Mutex` where every call
//! mutates) so clones share one store.

mod catalog;
mod chunks;
mod queue;
mod status;
mod warehouse;

pub use catalog::InMemorySensorCatalog;
pub use chunks::InMemoryChunkStore;
pub use queue::{DEFAULT_MAX_ATTEMPTS, InMemoryDatadumpQueue};
pub use status::InMemoryJobStatusStore;
pub use warehouse::InMemoryObservationWarehouse;
