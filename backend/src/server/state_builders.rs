//! Builders for HTTP state and the optional in-process datadump worker.

use std::sync::Arc;

use actix_web::web;
use mockable::DefaultClock;
use tracing::{info, warn};

use sensornet::domain::ports::{
    ChunkStore, DatadumpQueue, DisabledResponseCache, JobStatusStore, ObservationWarehouse,
    ResponseCache, SensorCatalogRepository,
};
use sensornet::domain::{
    AggregationService, DatadumpRunner, DatadumpService, DatadumpWorker, FanOutExecutor,
    ObservationQueryPlanner, ObservationQueryService, SensorCatalog,
};
use sensornet::inbound::http::state::HttpState;
use sensornet::outbound::cache::{CacheTtl, RedisJobStatusStore, RedisResponseCache};
use sensornet::outbound::memory::{
    InMemoryChunkStore, InMemoryDatadumpQueue, InMemoryJobStatusStore,
    InMemoryObservationWarehouse, InMemorySensorCatalog,
};
use sensornet::outbound::persistence::{
    DieselChunkStore, DieselDatadumpQueue, DieselObservationWarehouse,
    DieselSensorCatalogRepository,
};

use super::ServerConfig;
use super::config::StoreHandles;

/// Port implementations selected for one server instance.
struct Ports {
    catalog: Arc<dyn SensorCatalogRepository>,
    warehouse: Arc<dyn ObservationWarehouse>,
    queue: Arc<dyn DatadumpQueue>,
    status: Arc<dyn JobStatusStore>,
    chunks: Arc<dyn ChunkStore>,
    cache: Arc<dyn ResponseCache>,
    /// Queue lives in this process, so only an inline worker can drain it.
    process_local_queue: bool,
}

fn redis_ports(
    stores: &StoreHandles,
    ttl: CacheTtl,
) -> (Arc<dyn JobStatusStore>, Arc<dyn ResponseCache>) {
    match &stores.redis {
        Some(redis) => (
            Arc::new(RedisJobStatusStore::new(redis.clone())),
            Arc::new(RedisResponseCache::new(redis.clone(), ttl)),
        ),
        None => {
            warn!("redis not configured; job status is process-local and metadata caching is off");
            (
                Arc::new(InMemoryJobStatusStore::default()),
                Arc::new(DisabledResponseCache),
            )
        }
    }
}

fn build_ports(config: &ServerConfig) -> Ports {
    match &config.stores {
        Some(stores) => {
            let (status, cache) = redis_ports(stores, config.cache_ttl);
            Ports {
                catalog: Arc::new(DieselSensorCatalogRepository::new(stores.metadata.clone())),
                warehouse: Arc::new(DieselObservationWarehouse::new(stores.warehouse.clone())),
                queue: Arc::new(DieselDatadumpQueue::new(stores.metadata.clone())),
                status,
                chunks: Arc::new(DieselChunkStore::new(stores.metadata.clone())),
                cache,
                process_local_queue: false,
            }
        }
        None => Ports {
            catalog: Arc::new(InMemorySensorCatalog::default()),
            warehouse: Arc::new(InMemoryObservationWarehouse::default()),
            queue: Arc::new(InMemoryDatadumpQueue::default()),
            status: Arc::new(InMemoryJobStatusStore::default()),
            chunks: Arc::new(InMemoryChunkStore::default()),
            cache: Arc::new(DisabledResponseCache),
            process_local_queue: true,
        },
    }
}

/// Handler state plus the worker to spawn alongside the server, if any.
pub(super) struct BuiltServices {
    pub(super) http_state: web::Data<HttpState>,
    pub(super) worker: Option<DatadumpWorker>,
}

/// Build the shared HTTP state from the configured stores.
pub(super) fn build_services(config: &ServerConfig) -> BuiltServices {
    let ports = build_ports(config);
    let catalog = SensorCatalog::new(ports.catalog);
    let planner =
        ObservationQueryPlanner::new(catalog.clone(), ports.warehouse.clone(), config.table_naming);
    let observations = ObservationQueryService::new(
        planner.clone(),
        FanOutExecutor::new(ports.warehouse.clone(), config.fan_out),
    );
    let aggregation =
        AggregationService::new(catalog.clone(), ports.warehouse.clone(), config.table_naming);
    let datadumps = DatadumpService::new(
        planner.clone(),
        ports.queue.clone(),
        ports.status.clone(),
        ports.chunks.clone(),
    );

    let worker = (config.inline_worker || ports.process_local_queue).then(|| {
        let runner = DatadumpRunner::new(
            planner,
            ports.warehouse,
            ports.chunks,
            ports.status,
            Arc::new(DefaultClock),
            config.datadump,
        );
        let worker_id = format!("inline-{}", std::process::id());
        info!(worker = %worker_id, "inline datadump worker enabled");
        DatadumpWorker::new(ports.queue, runner, worker_id)
    });

    BuiltServices {
        http_state: web::Data::new(HttpState {
            catalog,
            observations,
            aggregation,
            datadumps,
            cache: ports.cache,
            clock: Arc::new(DefaultClock),
            url_root: config.url_root.clone(),
        }),
        worker,
    }
}
