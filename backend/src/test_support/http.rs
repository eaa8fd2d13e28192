//! In-memory wiring of [`HttpState`] over the Chicago fixtures.

use std::sync::Arc;

use mockable::Clock;

use crate::domain::ports::{DisabledResponseCache, ResponseCache};
use crate::domain::{
    AggregationService, DatadumpConfig, DatadumpRunner, DatadumpService, DatadumpWorker,
    FanOutConfig, FanOutExecutor, ObservationQueryPlanner, ObservationQueryService, TableNaming,
};
use crate::inbound::http::state::HttpState;
use crate::outbound::memory::{
    InMemoryChunkStore, InMemoryDatadumpQueue, InMemoryJobStatusStore,
    InMemoryObservationWarehouse,
};

use super::clock::{MutableClock, fixture_now};
use super::sensor_network::{chicago_catalog, chicago_warehouse};

pub const URL_ROOT: &str = "http://localhost:8080/v1/api";
pub const WORKER_ID: &str = "fixture-worker";

/// Handler state plus the stores behind it.
pub struct FixtureServices {
    pub state: HttpState,
    pub warehouse: InMemoryObservationWarehouse,
    pub queue: InMemoryDatadumpQueue,
    pub status: InMemoryJobStatusStore,
    pub chunks: InMemoryChunkStore,
    pub worker: DatadumpWorker,
    pub clock: Arc<MutableClock>,
}

/// Builder for [`FixtureServices`].
pub struct FixtureServicesBuilder {
    cache: Arc<dyn ResponseCache>,
    datadump: DatadumpConfig,
    url_root: Option<String>,
}

impl Default for FixtureServicesBuilder {
    fn default() -> Self {
        Self {
            cache: Arc::new(DisabledResponseCache),
            datadump: DatadumpConfig::default(),
            url_root: Some(URL_ROOT.to_owned()),
        }
    }
}

impl FixtureServicesBuilder {
    pub fn cache(mut self, cache: Arc<dyn ResponseCache>) -> Self {
        self.cache = cache;
        self
    }

    pub fn chunk_size(mut self, chunk_size: u64) -> Self {
        self.datadump.chunk_size = chunk_size;
        self.datadump.window_size = chunk_size;
        self
    }

    /// Derive link roots from each request instead of a fixed root.
    pub fn request_url_root(mut self) -> Self {
        self.url_root = None;
        self
    }

    pub fn build(self) -> FixtureServices {
        let warehouse = chicago_warehouse();
        let queue = InMemoryDatadumpQueue::default();
        let status = InMemoryJobStatusStore::default();
        let chunks = InMemoryChunkStore::default();
        let clock = Arc::new(MutableClock::new(fixture_now()));
        let catalog = chicago_catalog();

        let warehouse_port = Arc::new(warehouse.clone());
        let planner = ObservationQueryPlanner::new(
            catalog.clone(),
            warehouse_port.clone(),
            TableNaming::default(),
        );
        let observations = ObservationQueryService::new(
            planner.clone(),
            FanOutExecutor::new(warehouse_port.clone(), FanOutConfig::default()),
        );
        let aggregation = AggregationService::new(
            catalog.clone(),
            warehouse_port.clone(),
            TableNaming::default(),
        );
        let datadumps = DatadumpService::new(
            planner.clone(),
            Arc::new(queue.clone()),
            Arc::new(status.clone()),
            Arc::new(chunks.clone()),
        );
        let runner = DatadumpRunner::new(
            planner,
            warehouse_port,
            Arc::new(chunks.clone()),
            Arc::new(status.clone()),
            clock.clone() as Arc<dyn Clock>,
            self.datadump,
        );
        let worker = DatadumpWorker::new(Arc::new(queue.clone()), runner, WORKER_ID);

        FixtureServices {
            state: HttpState {
                catalog,
                observations,
                aggregation,
                datadumps,
                cache: self.cache,
                clock: clock.clone(),
                url_root: self.url_root,
            },
            warehouse,
            queue,
            status,
            chunks,
            worker,
            clock,
        }
    }
}

/// Fixture services with default settings.
pub fn fixture_services() -> FixtureServices {
    FixtureServicesBuilder::default().build()
}
