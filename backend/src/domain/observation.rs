//! Observation requests, per-table queries and result records.

use std::cmp::Ordering;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};

use super::{FeatureName, GeoPolygon, NetworkName, NodeId, SensorName};

/// Rendering used for every observation timestamp: ISO-8601 without offset.
pub const DATETIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%.f";

/// Render a UTC timestamp the way observation records carry it.
pub fn format_datetime(value: &NaiveDateTime) -> String {
    value.format(DATETIME_FORMAT).to_string()
}

fn serialize_datetime<S: Serializer>(value: &NaiveDateTime, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_str(&format_datetime(value))
}

/// Half-open `[start, end)` interval in UTC.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    start: NaiveDateTime,
    end: NaiveDateTime,
}

/// Raised when a window would be empty or inverted.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("start_datetime must be before end_datetime")]
pub struct InvalidTimeWindow;

impl TimeWindow {
    pub fn new(start: NaiveDateTime, end: NaiveDateTime) -> Result<Self, InvalidTimeWindow> {
        if start >= end {
            return Err(InvalidTimeWindow);
        }
        Ok(Self { start, end })
    }

    pub fn start(&self) -> NaiveDateTime {
        self.start
    }

    pub fn end(&self) -> NaiveDateTime {
        self.end
    }

    pub fn contains(&self, value: &NaiveDateTime) -> bool {
        *value >= self.start && *value < self.end
    }
}

/// Validated, defaulted observation filter set.
///
/// Optional filters stay `None` when the caller did not supply them so the
/// response can echo only what was asked for.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ObservationRequest {
    pub network: NetworkName,
    pub node_id: Option<NodeId>,
    pub nodes: Option<Vec<NodeId>>,
    pub within: Option<GeoPolygon>,
    pub sensors: Option<Vec<SensorName>>,
    pub features: Option<Vec<FeatureName>>,
    pub window: TimeWindow,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl ObservationRequest {
    /// Request covering a whole network over `window` with no other filters.
    pub fn for_network(network: NetworkName, window: TimeWindow) -> Self {
        Self {
            network,
            node_id: None,
            nodes: None,
            within: None,
            sensors: None,
            features: None,
            window,
            limit: None,
            offset: 0,
        }
    }
}

/// Physical observation table backing one feature-of-interest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureTable {
    pub name: String,
    pub feature: FeatureName,
    /// Property columns, i.e. everything except the key columns.
    pub columns: Vec<String>,
}

/// Key columns shared by every observation table.
pub const KEY_COLUMNS: [&str; 4] = ["node_id", "datetime", "meta_id", "sensor"];

/// One bounded range query against one feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct TableQuery {
    pub table: FeatureTable,
    pub window: TimeWindow,
    pub nodes: Vec<NodeId>,
    pub sensors: Vec<SensorName>,
    pub limit: Option<u64>,
    pub offset: u64,
}

/// Position after the last row of a datadump page.
///
/// Rows are ordered by `(datetime, node_id, sensor, meta_id, row_key)` with a
/// missing `meta_id` sorting first. Observation tables carry no primary key,
/// so `row_key` is what makes the order total.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationCursor {
    pub datetime: NaiveDateTime,
    pub node_id: String,
    pub sensor: String,
    pub meta_id: Option<f64>,
    pub row_key: u64,
}

impl ObservationCursor {
    /// Compare a row against this cursor in page order.
    pub fn cmp_row(&self, row: &ObservationRow) -> Ordering {
        row.datetime
            .cmp(&self.datetime)
            .then_with(|| row.node_id.cmp(&self.node_id))
            .then_with(|| row.sensor.cmp(&self.sensor))
            .then_with(|| cmp_meta(row.meta_id, self.meta_id))
            .then_with(|| row.row_key.cmp(&self.row_key))
    }
}

fn cmp_meta(left: Option<f64>, right: Option<f64>) -> Ordering {
    left.unwrap_or(f64::NEG_INFINITY)
        .total_cmp(&right.unwrap_or(f64::NEG_INFINITY))
}

/// Keyset page request used by the datadump runner.
#[derive(Debug, Clone, PartialEq)]
pub struct WindowPage {
    pub after: Option<ObservationCursor>,
    pub offset: u64,
    pub size: u64,
}

/// Raw row as read from a feature table.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRow {
    pub node_id: String,
    pub datetime: NaiveDateTime,
    pub meta_id: Option<f64>,
    pub sensor: String,
    pub values: Map<String, Value>,
    /// Physical position of the row within its table, unique per table.
    pub row_key: u64,
}

impl ObservationRow {
    pub fn cursor(&self) -> ObservationCursor {
        ObservationCursor {
            datetime: self.datetime,
            node_id: self.node_id.clone(),
            sensor: self.sensor.clone(),
            meta_id: self.meta_id,
            row_key: self.row_key,
        }
    }

    /// Page order used by datadump windows.
    pub fn page_order(&self, other: &Self) -> Ordering {
        other.cursor().cmp_row(self)
    }
}

/// Uniform observation record returned to clients and stored in chunks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservationRecord {
    pub node_id: String,
    pub meta_id: Option<f64>,
    #[serde(serialize_with = "serialize_datetime")]
    pub datetime: NaiveDateTime,
    pub sensor: String,
    /// Name of the table the row was read from.
    pub feature_of_interest: String,
    pub results: Map<String, Value>,
}

impl ObservationRecord {
    /// Normalise a raw row read from `table`.
    pub fn from_row(row: ObservationRow, table: &FeatureTable) -> Self {
        Self {
            node_id: row.node_id,
            meta_id: row.meta_id,
            datetime: row.datetime,
            sensor: row.sensor,
            feature_of_interest: table.name.clone(),
            results: row.values,
        }
    }
}
