//! Drain the datadump queue: claim pending jobs, export their records in
//! numbered chunks and publish job status until interrupted.
#![cfg_attr(not(any(test, doctest)), deny(clippy::unwrap_used))]
#![cfg_attr(not(any(test, doctest)), deny(clippy::expect_used))]

use std::env;
use std::io;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use mockable::DefaultClock;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, fmt};

use sensornet::domain::{
    DatadumpConfig, DatadumpRunner, DatadumpWorker, ObservationQueryPlanner, SensorCatalog,
    TableNaming,
};
use sensornet::outbound::cache::{RedisJobStatusStore, RedisPool};
use sensornet::outbound::persistence::{
    DbPool, DieselChunkStore, DieselDatadumpQueue, DieselObservationWarehouse,
    DieselSensorCatalogRepository, PoolConfig,
};

/// `datadump-worker` command arguments.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "datadump-worker",
    about = "Consume queued datadump jobs and write their chunks",
    version
)]
struct CliArgs {
    /// Identifier recorded in job status `workers`. Defaults to `worker-<pid>`.
    #[arg(long = "worker-id", value_name = "id")]
    worker_id: Option<String>,
    /// Delay between polls of an empty queue.
    #[arg(long = "poll-interval-ms", value_name = "millis", default_value_t = 1000)]
    poll_interval_ms: u64,
    /// Records per chunk.
    #[arg(long = "chunk-size", value_name = "rows", default_value_t = 1000)]
    chunk_size: u64,
    /// Seconds a claimed job survives without renewal before another worker
    /// may take it over. Claims are renewed at a quarter of this.
    #[arg(long = "claim-lease-secs", value_name = "secs", default_value_t = 600)]
    claim_lease_secs: u64,
    /// Feature-to-table naming scheme: `feature` or `network_prefixed`.
    #[arg(long = "table-naming", value_name = "scheme", default_value = "feature")]
    table_naming: TableNaming,
    /// Metadata database URL. Falls back to `DATABASE_URL` when omitted.
    #[arg(long = "database-url", value_name = "url")]
    database_url: Option<String>,
    /// Warehouse database URL. Falls back to `WAREHOUSE_URL`, then the
    /// metadata database.
    #[arg(long = "warehouse-url", value_name = "url")]
    warehouse_url: Option<String>,
    /// Redis URL for job status. Falls back to `REDIS_URL`.
    #[arg(long = "redis-url", value_name = "url")]
    redis_url: Option<String>,
}

fn main() -> Result<()> {
    color_eyre::install()?;
    if let Err(e) = fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .json()
        .try_init()
    {
        warn!(error = %e, "tracing init failed");
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .wrap_err("failed to build datadump worker runtime")?;
    runtime.block_on(async_main())
}

async fn async_main() -> Result<()> {
    let args = CliArgs::try_parse()?;
    let database_url = resolve_url(args.database_url, "DATABASE_URL", "--database-url")?;
    let warehouse_url = resolve_optional_url(args.warehouse_url, "WAREHOUSE_URL")?;
    let redis_url = resolve_url(args.redis_url, "REDIS_URL", "--redis-url")?;

    let metadata = DbPool::new(PoolConfig::new(&database_url).with_label("metadata"))
        .await
        .wrap_err("failed to create metadata pool")?;
    let warehouse = match warehouse_url {
        Some(url) if url != database_url => {
            DbPool::new(PoolConfig::new(url).with_label("warehouse"))
                .await
                .wrap_err("failed to create warehouse pool")?
        }
        _ => metadata.clone(),
    };
    let redis = RedisPool::connect(&redis_url, 4)
        .await
        .map_err(|message| eyre!("failed to connect to redis: {message}"))?;

    let warehouse = Arc::new(DieselObservationWarehouse::new(warehouse));
    let chunks = Arc::new(DieselChunkStore::new(metadata.clone()));
    let catalog = SensorCatalog::new(Arc::new(DieselSensorCatalogRepository::new(
        metadata.clone(),
    )));
    let planner = ObservationQueryPlanner::new(catalog, warehouse.clone(), args.table_naming);
    let chunk_size = args.chunk_size.max(1);
    let runner = DatadumpRunner::new(
        planner,
        warehouse,
        chunks,
        Arc::new(RedisJobStatusStore::new(redis)),
        Arc::new(DefaultClock),
        DatadumpConfig {
            chunk_size,
            window_size: chunk_size,
            ..DatadumpConfig::default()
        },
    );
    let worker_id = args
        .worker_id
        .unwrap_or_else(|| format!("worker-{}", std::process::id()));
    let lease = Duration::from_secs(args.claim_lease_secs.max(4));
    let worker = DatadumpWorker::new(
        Arc::new(DieselDatadumpQueue::new(metadata).with_lease(lease)),
        runner,
        worker_id,
    )
    .with_heartbeat(lease / 4);

    info!(worker = worker.worker_id(), chunk_size, "datadump worker started");
    worker
        .run_until(Duration::from_millis(args.poll_interval_ms), async {
            if let Err(error) = tokio::signal::ctrl_c().await {
                warn!(%error, "failed to listen for shutdown signal");
                std::future::pending::<()>().await;
            }
        })
        .await;
    info!(worker = worker.worker_id(), "datadump worker stopped");
    Ok(())
}

fn non_empty(value: String, source: &str) -> io::Result<String> {
    if value.trim().is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{source} must not be empty"),
        ));
    }
    Ok(value)
}

fn resolve_optional_url(explicit: Option<String>, env_key: &str) -> io::Result<Option<String>> {
    match explicit {
        Some(value) => non_empty(value, "URL argument").map(Some),
        None => env::var(env_key)
            .ok()
            .map(|value| non_empty(value, env_key))
            .transpose(),
    }
}

fn resolve_url(explicit: Option<String>, env_key: &str, flag: &str) -> io::Result<String> {
    resolve_optional_url(explicit, env_key)?.ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("URL missing: set {flag} or {env_key}"),
        )
    })
}
