//! Windowed aggregation of one node's observations for one feature.
//!
//! Observations are grouped into calendar buckets (`date_trunc` semantics)
//! and a named function is applied per property. Requests that parse but
//! cannot be answered are rejected as unprocessable.

use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use serde::ser::{Serialize, SerializeMap, Serializer};
use serde_json::{Map, Value};
use tracing::{debug, info};

use super::observation::format_datetime;
use super::planner::TableNaming;
use super::ports::{AggregateQuery, ObservationWarehouse};
use super::warehouse_errors::map_warehouse_error;
use super::{
    Error, FeatureName, NetworkName, NodeId, SensorCatalog, SensorName, TimeWindow,
};

/// Upper bound on buckets per request.
pub const MAX_BUCKETS: u64 = 5000;

/// Aggregate function names accepted by the `function` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AggregateFunction {
    Avg,
    Count,
    Max,
    Min,
    Sum,
    Std,
    Var,
}

impl AggregateFunction {
    pub const ALL: [Self; 7] = [
        Self::Avg,
        Self::Count,
        Self::Max,
        Self::Min,
        Self::Sum,
        Self::Std,
        Self::Var,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Avg => "avg",
            Self::Count => "count",
            Self::Max => "max",
            Self::Min => "min",
            Self::Sum => "sum",
            Self::Std => "std",
            Self::Var => "var",
        }
    }

    /// PostgreSQL aggregate implementing the function.
    pub fn sql_name(self) -> &'static str {
        match self {
            Self::Std => "stddev_samp",
            Self::Var => "var_samp",
            other => other.as_str(),
        }
    }

    /// Every function except `count` needs numeric inputs.
    pub fn requires_numeric(self) -> bool {
        !matches!(self, Self::Count)
    }

    /// Apply the function to the non-null values of one bucket.
    ///
    /// Returns `None` where SQL would yield `NULL`.
    pub fn apply(self, values: &[f64]) -> Option<f64> {
        let n = values.len();
        if n == 0 {
            return match self {
                Self::Count => Some(0.0),
                _ => None,
            };
        }
        let sum: f64 = values.iter().sum();
        let mean = sum / n as f64;
        let variance = || {
            (n > 1).then(|| {
                values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1) as f64
            })
        };
        match self {
            Self::Avg => Some(mean),
            Self::Count => Some(n as f64),
            Self::Max => values.iter().copied().reduce(f64::max),
            Self::Min => values.iter().copied().reduce(f64::min),
            Self::Sum => Some(sum),
            Self::Std => variance().map(f64::sqrt),
            Self::Var => variance(),
        }
    }
}

impl std::str::FromStr for AggregateFunction {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.as_str() == lowered)
            .ok_or_else(|| {
                format!(
                    "function must be one of avg, count, max, min, sum, std, var; got {s}"
                )
            })
    }
}

/// Bucket width accepted by the `agg` parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AggregateInterval {
    Minute,
    #[default]
    Hour,
    Day,
    Week,
    Month,
    Year,
}

impl AggregateInterval {
    pub const ALL: [Self; 6] = [
        Self::Minute,
        Self::Hour,
        Self::Day,
        Self::Week,
        Self::Month,
        Self::Year,
    ];

    /// Field name understood by PostgreSQL's `date_trunc`.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Minute => "minute",
            Self::Hour => "hour",
            Self::Day => "day",
            Self::Week => "week",
            Self::Month => "month",
            Self::Year => "year",
        }
    }

    /// Start of the bucket containing `value`; weeks start on Monday.
    pub fn truncate(self, value: NaiveDateTime) -> NaiveDateTime {
        let date = value.date();
        let midnight = |d: NaiveDate| d.and_time(NaiveTime::MIN);
        match self {
            Self::Minute => value
                .with_second(0)
                .and_then(|v| v.with_nanosecond(0))
                .unwrap_or(value),
            Self::Hour => value
                .with_minute(0)
                .and_then(|v| v.with_second(0))
                .and_then(|v| v.with_nanosecond(0))
                .unwrap_or(value),
            Self::Day => midnight(date),
            Self::Week => midnight(
                date - Duration::days(i64::from(date.weekday().num_days_from_monday())),
            ),
            Self::Month => midnight(date.with_day(1).unwrap_or(date)),
            Self::Year => midnight(date.with_ordinal(1).unwrap_or(date)),
        }
    }

    /// Start of the bucket after the one starting at `bucket`.
    pub fn next(self, bucket: NaiveDateTime) -> Option<NaiveDateTime> {
        match self {
            Self::Minute => bucket.checked_add_signed(Duration::minutes(1)),
            Self::Hour => bucket.checked_add_signed(Duration::hours(1)),
            Self::Day => bucket.checked_add_signed(Duration::days(1)),
            Self::Week => bucket.checked_add_signed(Duration::weeks(1)),
            Self::Month => bucket.checked_add_months(Months::new(1)),
            Self::Year => bucket.checked_add_months(Months::new(12)),
        }
    }

    /// Number of buckets overlapping `window`, counting at most `cap + 1`.
    pub fn bucket_count(self, window: &TimeWindow, cap: u64) -> u64 {
        let mut bucket = self.truncate(window.start());
        let mut count = 0;
        while bucket < window.end() && count <= cap {
            count += 1;
            match self.next(bucket) {
                Some(next) => bucket = next,
                None => break,
            }
        }
        count
    }
}

impl std::str::FromStr for AggregateInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lowered = s.trim().to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|i| i.as_str() == lowered)
            .ok_or_else(|| {
                format!("agg must be one of minute, hour, day, week, month, year; got {s}")
            })
    }
}

/// Validated aggregation request.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRequest {
    pub network: NetworkName,
    pub node: NodeId,
    pub function: AggregateFunction,
    pub feature: FeatureName,
    pub window: TimeWindow,
    pub interval: AggregateInterval,
    pub sensors: Option<Vec<SensorName>>,
}

/// One time bucket of an aggregation result.
///
/// Serialises flat: `{"time_bucket": ..., "count": ..., "<property>": ...}`.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateBucket {
    pub time_bucket: NaiveDateTime,
    pub count: u64,
    pub values: Map<String, Value>,
}

impl Serialize for AggregateBucket {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.values.len() + 2))?;
        map.serialize_entry("time_bucket", &format_datetime(&self.time_bucket))?;
        map.serialize_entry("count", &self.count)?;
        for (key, value) in &self.values {
            map.serialize_entry(key, value)?;
        }
        map.end()
    }
}

/// Service answering `GET /sensor-networks/{network}/aggregate`.
#[derive(Clone)]
pub struct AggregationService {
    catalog: SensorCatalog,
    warehouse: Arc<dyn ObservationWarehouse>,
    naming: TableNaming,
}

impl AggregationService {
    pub fn new(
        catalog: SensorCatalog,
        warehouse: Arc<dyn ObservationWarehouse>,
        naming: TableNaming,
    ) -> Self {
        Self {
            catalog,
            warehouse,
            naming,
        }
    }

    pub async fn aggregate(&self, request: &AggregateRequest) -> Result<Vec<AggregateBucket>, Error> {
        let view = self.catalog.require_view(&request.network).await?;
        if view.node(&request.node).is_none() {
            return Err(Error::unprocessable(format!(
                "Node {} does not exist in network {}",
                request.node, request.network
            )));
        }
        let Some(feature) = view.feature(&request.feature) else {
            return Err(Error::unprocessable(format!(
                "Feature {} is not reported in network {}",
                request.feature, request.network
            )));
        };

        let reporting: BTreeSet<SensorName> = view
            .sensors_on_node(&request.node)
            .into_iter()
            .filter(|sensor| sensor.reports_on(&feature.name))
            .map(|sensor| sensor.name.clone())
            .collect();
        let sensors: Vec<SensorName> = match &request.sensors {
            Some(requested) => requested
                .iter()
                .filter(|name| reporting.contains(name))
                .cloned()
                .collect(),
            None => reporting.into_iter().collect(),
        };
        if sensors.is_empty() {
            return Err(Error::unprocessable(format!(
                "Node {} has no sensors reporting on {}",
                request.node, feature.name
            )));
        }

        let properties: Vec<String> = if request.function.requires_numeric() {
            feature.numeric_properties().map(|p| p.name.clone()).collect()
        } else {
            feature
                .observed_properties
                .iter()
                .map(|p| p.name.clone())
                .collect()
        };
        if properties.is_empty() {
            return Err(Error::unprocessable(format!(
                "Function {} requires numeric properties but {} has none",
                request.function.as_str(),
                feature.name
            )));
        }

        let buckets = request.interval.bucket_count(&request.window, MAX_BUCKETS);
        if buckets > MAX_BUCKETS {
            return Err(Error::unprocessable(format!(
                "Aggregating by {} over this window exceeds {MAX_BUCKETS} buckets",
                request.interval.as_str()
            )));
        }

        let table = self.naming.table_name(&request.network, &feature.name);
        let columns = self
            .warehouse
            .describe_table(&table)
            .await
            .map_err(|err| map_warehouse_error(&table, err))?;
        if columns.is_none() {
            return Err(Error::missing_table(&table));
        }

        let query = AggregateQuery {
            table: table.clone(),
            node: request.node.clone(),
            sensors,
            window: request.window,
            interval: request.interval,
            function: request.function,
            properties,
        };
        debug!(%table, node = %request.node, function = request.function.as_str(), "running aggregate");
        let rows = self
            .warehouse
            .aggregate(&query)
            .await
            .map_err(|err| map_warehouse_error(&table, err))?;
        info!(%table, buckets = rows.len(), "aggregate complete");
        Ok(rows
            .into_iter()
            .map(|row| AggregateBucket {
                time_bucket: row.bucket,
                count: row.count,
                values: row.values,
            })
            .collect())
    }
}

#[cfg(test)]
#[path = "aggregation_tests.rs"]
mod tests;
