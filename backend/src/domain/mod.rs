//! Domain primitives, ports and services of the observation query engine.
//!
//! Purpose: keep every rule about networks, observations and datadumps free
//! of transport and storage concerns. Inbound adapters translate requests
//! into these types; outbound adapters implement the traits in [`ports`].
//!
//! Public surface:
//! - Error / ErrorCode: transport-agnostic failure payload.
//! - Sensor-network model: names, nodes, sensors, features, geometry.
//! - SensorCatalog / NetworkView: metadata lookups for one network.
//! - ObservationQueryPlanner: one bounded table query per feature.
//! - FanOutExecutor: bounded concurrent execution and merge.
//! - ObservationQueryService: planner plus executor for interactive queries.
//! - AggregationService: windowed aggregates for one node.
//! - DatadumpService / DatadumpRunner / DatadumpWorker: chunked, resumable
//!   exports and the queue consumer that drives them.

pub mod aggregation;
pub mod catalog;
pub mod datadump;
pub mod envelope;
pub mod error;
pub mod fan_out;
pub mod observation;
pub mod observation_query;
pub mod planner;
pub mod ports;
pub mod sensor_network;
pub mod trace_id;
mod warehouse_errors;

pub use self::aggregation::{
    AggregateBucket, AggregateFunction, AggregateInterval, AggregateRequest, AggregationService,
    MAX_BUCKETS,
};
pub use self::catalog::{NetworkSummary, NetworkView, SensorCatalog};
pub use self::datadump::{
    DatadumpChunk, DatadumpConfig, DatadumpJob, DatadumpManifest, DatadumpOutcome, DatadumpRunner,
    DatadumpService, DatadumpSubmission, DatadumpWorker, JobMeta, JobProgress, JobState, JobStatus,
    JobTicket, PollOutcome,
};
pub use self::envelope::{EchoedQuery, EnvelopeMeta, EnvelopeStatus, ResponseEnvelope};
pub use self::error::{Error, ErrorCode, ErrorValidationError};
pub use self::fan_out::{FanOutConfig, FanOutExecutor};
pub use self::observation::{
    DATETIME_FORMAT, FeatureTable, InvalidTimeWindow, KEY_COLUMNS, ObservationCursor,
    ObservationRecord, ObservationRequest, ObservationRow, TableQuery, TimeWindow, WindowPage,
    format_datetime,
};
pub use self::observation_query::{ObservationQueryResult, ObservationQueryService};
pub use self::planner::{ObservationQueryPlanner, QueryPlan, TableNaming};
pub use self::sensor_network::{
    Feature, FeatureName, FeatureProperty, GeoPoint, GeoPolygon, Network, NetworkName, Node,
    NodeId, ObservedPropertyDef, PropertyType, Sensor, SensorName, SensorNetworkValidationError,
};
pub use self::trace_id::{TRACE_ID_HEADER, TraceId};

/// Convenient result alias for domain services.
///
/// # Examples
/// ```
/// use sensornet::domain::{DomainResult, Error};
///
/// fn lookup() -> DomainResult<u32> {
///     Err(Error::not_found("no such job"))
/// }
/// assert!(lookup().is_err());
/// ```
pub type DomainResult<T> = Result<T, Error>;
