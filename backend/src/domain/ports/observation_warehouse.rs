//! Port for the columnar observation warehouse.
//!
//! One table per feature-of-interest holds the key columns `node_id`,
//! `datetime`, `meta_id` and `sensor` plus one column per observed property.

use async_trait::async_trait;
use chrono::NaiveDateTime;
use serde_json::{Map, Value};

use crate::domain::{
    AggregateFunction, AggregateInterval, NodeId, ObservationRow, SensorName, TableQuery,
    TimeWindow, WindowPage,
};

use super::define_port_error;

define_port_error! {
    /// Errors raised by warehouse adapters.
    pub enum ObservationWarehouseError {
        /// Warehouse connection could not be established.
        Connection { message: String } =>
            "warehouse connection failed: {message}",
        /// Query failed during execution or row conversion.
        Query { message: String } =>
            "warehouse query failed: {message}",
    }
}

/// Bucketed aggregation over one node's observations in one table.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateQuery {
    pub table: String,
    pub node: NodeId,
    pub sensors: Vec<SensorName>,
    pub window: TimeWindow,
    pub interval: AggregateInterval,
    pub function: AggregateFunction,
    /// Property columns the function is applied to.
    pub properties: Vec<String>,
}

/// One non-empty bucket of an aggregation.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub bucket: NaiveDateTime,
    pub count: u64,
    pub values: Map<String, Value>,
}

/// Port for reading observation tables.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ObservationWarehouse: Send + Sync {
    /// Column names of `table`, or `None` when the table does not exist.
    async fn describe_table(
        &self,
        table: &str,
    ) -> Result<Option<Vec<String>>, ObservationWarehouseError>;

    /// Rows matching `query`, honouring its limit and offset.
    async fn fetch(&self, query: &TableQuery) -> Result<Vec<ObservationRow>, ObservationWarehouseError>;

    /// One keyset page of rows matching `query`, in page order.
    ///
    /// The query's own limit and offset are ignored; the page carries them.
    async fn fetch_window(
        &self,
        query: &TableQuery,
        page: &WindowPage,
    ) -> Result<Vec<ObservationRow>, ObservationWarehouseError>;

    /// Number of rows `fetch` would return for `query`.
    async fn count(&self, query: &TableQuery) -> Result<u64, ObservationWarehouseError>;

    /// Buckets for `query`, ordered by bucket start.
    async fn aggregate(
        &self,
        query: &AggregateQuery,
    ) -> Result<Vec<AggregateRow>, ObservationWarehouseError>;
}
