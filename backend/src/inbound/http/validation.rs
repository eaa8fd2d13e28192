//! Query-string validation for the sensor-network endpoints.
//!
//! Every parser works on the raw key/value map Actix extracts from the query
//! string, collects every field-level failure before giving up, and returns
//! the typed request together with the query to echo in the envelope. Names
//! are lower-cased here; list parameters are comma separated.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use serde_json::{Value, json};

use super::error::ApiError;
use crate::domain::{
    AggregateFunction, AggregateInterval, AggregateRequest, EchoedQuery, Error, FeatureName,
    GeoPolygon, JobTicket, NetworkName, NodeId, ObservationRequest, SensorName,
    SensorNetworkValidationError, TimeWindow, format_datetime,
};

/// Raw query-string parameters.
pub type RawQuery = BTreeMap<String, String>;

/// Default page size for interactive observation queries.
pub const DEFAULT_LIMIT: u64 = 1000;
/// Largest page an interactive observation query may request.
pub const MAX_LIMIT: u64 = 10_000;

const OBSERVATION_SPAN_DAYS: i64 = 7;
const AGGREGATE_SPAN_DAYS: i64 = 1;

/// Validation error codes for HTTP request failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum ErrorCode {
    MissingField,
    InvalidName,
    InvalidTimestamp,
    InvalidNumber,
    OutOfRange,
    InvalidGeometry,
    InvalidWindow,
    InvalidChoice,
}

impl ErrorCode {
    fn as_str(self) -> &'static str {
        match self {
            ErrorCode::MissingField => "missing_field",
            ErrorCode::InvalidName => "invalid_name",
            ErrorCode::InvalidTimestamp => "invalid_timestamp",
            ErrorCode::InvalidNumber => "invalid_number",
            ErrorCode::OutOfRange => "out_of_range",
            ErrorCode::InvalidGeometry => "invalid_geometry",
            ErrorCode::InvalidWindow => "invalid_window",
            ErrorCode::InvalidChoice => "invalid_choice",
        }
    }
}

/// Newtype wrapper for HTTP field names to provide type safety.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct FieldName(&'static str);

impl FieldName {
    pub(crate) const fn new(name: &'static str) -> Self {
        Self(name)
    }

    fn as_str(self) -> &'static str {
        self.0
    }
}

pub(crate) const NETWORK_NAME: FieldName = FieldName::new("network_name");
pub(crate) const NODE_ID: FieldName = FieldName::new("node_id");
pub(crate) const NODES: FieldName = FieldName::new("nodes");
pub(crate) const SENSORS: FieldName = FieldName::new("sensors");
pub(crate) const FEATURES: FieldName = FieldName::new("features_of_interest");
pub(crate) const FEATURE: FieldName = FieldName::new("feature");
pub(crate) const START: FieldName = FieldName::new("start_datetime");
pub(crate) const END: FieldName = FieldName::new("end_datetime");
pub(crate) const LIMIT: FieldName = FieldName::new("limit");
pub(crate) const OFFSET: FieldName = FieldName::new("offset");
pub(crate) const WITHIN: FieldName = FieldName::new("location_geom__within");
pub(crate) const NODE: FieldName = FieldName::new("node");
pub(crate) const FUNCTION: FieldName = FieldName::new("function");
pub(crate) const AGG: FieldName = FieldName::new("agg");
pub(crate) const PART: FieldName = FieldName::new("part");
pub(crate) const TICKET: FieldName = FieldName::new("ticket");

/// One rejected field.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct FieldError {
    field: FieldName,
    code: ErrorCode,
    message: String,
    value: Option<String>,
}

impl FieldError {
    fn new(field: FieldName, code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            field,
            code,
            message: message.into(),
            value: None,
        }
    }

    fn with_value(mut self, value: impl Into<String>) -> Self {
        self.value = Some(value.into());
        self
    }

    fn to_json(&self) -> Value {
        let mut detail = json!({
            "field": self.field.as_str(),
            "code": self.code.as_str(),
            "message": self.message,
        });
        if let (Some(value), Some(map)) = (&self.value, detail.as_object_mut()) {
            map.insert("value".into(), json!(value));
        }
        detail
    }
}

/// Accumulates field errors so a response can list all of them at once.
#[derive(Debug, Default)]
pub(crate) struct FieldErrors(Vec<FieldError>);

impl FieldErrors {
    /// Keep the value of `result`, recording its error if it failed.
    pub(crate) fn capture<T>(&mut self, result: Result<T, FieldError>) -> Option<T> {
        result.map_err(|err| self.0.push(err)).ok()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Convert the collected failures into a single validation error.
    pub(crate) fn into_error(self) -> Error {
        let message = self
            .0
            .iter()
            .map(|err| format!("{}: {}", err.field.as_str(), err.message))
            .collect::<Vec<_>>()
            .join("; ");
        let details = self.0.iter().map(FieldError::to_json).collect::<Vec<_>>();
        Error::invalid_request(message).with_details(Value::Array(details))
    }

    fn finish(self) -> Result<(), Error> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.into_error())
        }
    }
}

/// Catalog names accepted as query parameters.
pub(crate) trait QueryName: Sized {
    fn parse(value: &str) -> Result<Self, SensorNetworkValidationError>;
}

macro_rules! query_name {
    ($($name:ty),+) => {
        $(impl QueryName for $name {
            fn parse(value: &str) -> Result<Self, SensorNetworkValidationError> {
                Self::new(value)
            }
        })+
    };
}

query_name!(NetworkName, NodeId, SensorName, FeatureName);

fn name_error(field: FieldName, raw: &str, err: &SensorNetworkValidationError) -> FieldError {
    FieldError::new(field, ErrorCode::InvalidName, err.to_string()).with_value(raw)
}

fn missing(field: FieldName) -> FieldError {
    FieldError::new(
        field,
        ErrorCode::MissingField,
        format!("missing required field: {}", field.as_str()),
    )
}

fn raw_value<'a>(raw: &'a RawQuery, field: FieldName) -> Option<&'a str> {
    raw.get(field.as_str())
        .map(|value| value.trim())
        .filter(|value| !value.is_empty())
}

pub(crate) fn parse_name<T: QueryName>(
    value: &str,
    field: FieldName,
) -> Result<T, FieldError> {
    T::parse(value).map_err(|err| name_error(field, value, &err))
}

fn parse_optional_name<T: QueryName>(
    raw: &RawQuery,
    field: FieldName,
) -> Result<Option<T>, FieldError> {
    raw_value(raw, field)
        .map(|value| parse_name(value, field))
        .transpose()
}

/// Parse a comma-separated list of names; an absent or blank value is `None`.
fn parse_name_list<T: QueryName>(
    raw: &RawQuery,
    field: FieldName,
) -> Result<Option<Vec<T>>, FieldError> {
    let Some(value) = raw_value(raw, field) else {
        return Ok(None);
    };
    let names = value
        .split(',')
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(|item| parse_name(item, field))
        .collect::<Result<Vec<_>, _>>()?;
    Ok((!names.is_empty()).then_some(names))
}

/// Parse a naive ISO-8601 datetime or an RFC 3339 timestamp (converted to UTC).
pub(crate) fn parse_datetime(value: &str, field: FieldName) -> Result<NaiveDateTime, FieldError> {
    if let Ok(timestamp) = DateTime::parse_from_rfc3339(value) {
        return Ok(timestamp.with_timezone(&Utc).naive_utc());
    }
    const NAIVE_FORMATS: [&str; 3] = [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%dT%H:%M",
    ];
    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .or_else(|| {
            NaiveDate::parse_from_str(value, "%Y-%m-%d")
                .ok()
                .map(|date| date.and_time(NaiveTime::MIN))
        })
        .ok_or_else(|| {
            FieldError::new(
                field,
                ErrorCode::InvalidTimestamp,
                format!("{} must be an ISO 8601 datetime", field.as_str()),
            )
            .with_value(value)
        })
}

fn parse_optional_datetime(
    raw: &RawQuery,
    field: FieldName,
) -> Result<Option<NaiveDateTime>, FieldError> {
    raw_value(raw, field)
        .map(|value| parse_datetime(value, field))
        .transpose()
}

pub(crate) fn parse_number<T: FromStr>(value: &str, field: FieldName) -> Result<T, FieldError> {
    value.parse().map_err(|_| {
        FieldError::new(
            field,
            ErrorCode::InvalidNumber,
            format!("{} must be a non-negative integer", field.as_str()),
        )
        .with_value(value)
    })
}

fn parse_optional_number<T: FromStr>(
    raw: &RawQuery,
    field: FieldName,
) -> Result<Option<T>, FieldError> {
    raw_value(raw, field)
        .map(|value| parse_number(value, field))
        .transpose()
}

fn parse_geometry(raw: &RawQuery) -> Result<Option<GeoPolygon>, FieldError> {
    raw_value(raw, WITHIN)
        .map(|value| {
            GeoPolygon::from_geojson(value).map_err(|err| {
                FieldError::new(WITHIN, ErrorCode::InvalidGeometry, err.to_string())
            })
        })
        .transpose()
}

/// Resolve the `[start, end)` window, defaulting `end` to `now` and `start`
/// to `span` before `end`.
fn resolve_window(
    start: Option<NaiveDateTime>,
    end: Option<NaiveDateTime>,
    now: NaiveDateTime,
    span: Duration,
) -> Result<TimeWindow, FieldError> {
    let end = end.unwrap_or(now);
    let start = start.unwrap_or(end - span);
    TimeWindow::new(start, end).map_err(|_| {
        FieldError::new(
            START,
            ErrorCode::InvalidWindow,
            "start_datetime must be earlier than end_datetime",
        )
        .with_value(format_datetime(&start))
    })
}

/// How `limit` is defaulted and bounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LimitPolicy {
    /// Default [`DEFAULT_LIMIT`], at most [`MAX_LIMIT`].
    Interactive,
    /// No default and no upper bound.
    Datadump,
}

impl LimitPolicy {
    fn resolve(self, limit: Option<u64>) -> Result<Option<u64>, FieldError> {
        match (self, limit) {
            (_, Some(0)) => Err(FieldError::new(
                LIMIT,
                ErrorCode::OutOfRange,
                "limit must be at least 1",
            )),
            (Self::Interactive, None) => Ok(Some(DEFAULT_LIMIT)),
            (Self::Interactive, Some(value)) if value > MAX_LIMIT => Err(FieldError::new(
                LIMIT,
                ErrorCode::OutOfRange,
                format!("limit must be at most {MAX_LIMIT}"),
            )
            .with_value(value.to_string())),
            (_, value) => Ok(value),
        }
    }
}

/// Echo of the caller's raw query, used when validation fails.
pub(crate) fn raw_echo(network: Option<&str>, raw: &RawQuery) -> EchoedQuery {
    let echoed = EchoedQuery::from_raw(raw);
    match network {
        Some(name) => echoed.with(NETWORK_NAME.as_str(), json!(name.to_lowercase())),
        None => echoed,
    }
}

/// Validate an observation query for `network` (and optionally one node).
pub fn parse_observation_request(
    network: &str,
    node_id: Option<&str>,
    raw: &RawQuery,
    now: NaiveDateTime,
    limits: LimitPolicy,
) -> Result<(ObservationRequest, EchoedQuery), ApiError> {
    let fail = |error: Error| ApiError::new(error, raw_echo(Some(network), raw));
    let mut errors = FieldErrors::default();

    let network = errors.capture(parse_name::<NetworkName>(network, NETWORK_NAME));
    let node_id = match node_id {
        Some(value) => errors.capture(parse_name::<NodeId>(value, NODE_ID)),
        None => errors
            .capture(parse_optional_name::<NodeId>(raw, NODE_ID))
            .flatten(),
    };
    let nodes = errors
        .capture(parse_name_list::<NodeId>(raw, NODES))
        .flatten();
    let sensors = errors
        .capture(parse_name_list::<SensorName>(raw, SENSORS))
        .flatten();
    let features = errors
        .capture(parse_name_list::<FeatureName>(raw, FEATURES))
        .flatten();
    let within = errors.capture(parse_geometry(raw)).flatten();
    let start = errors.capture(parse_optional_datetime(raw, START)).flatten();
    let end = errors.capture(parse_optional_datetime(raw, END)).flatten();
    let limit = errors
        .capture(parse_optional_number::<u64>(raw, LIMIT))
        .and_then(|limit| errors.capture(limits.resolve(limit)));
    let offset = errors
        .capture(parse_optional_number::<u64>(raw, OFFSET))
        .map(Option::unwrap_or_default);

    let window = if errors.is_empty() {
        errors.capture(resolve_window(start, end, now, Duration::days(OBSERVATION_SPAN_DAYS)))
    } else {
        None
    };

    let (Some(network), Some(window), Some(limit), Some(offset)) = (network, window, limit, offset)
    else {
        return Err(fail(errors.into_error()));
    };

    let request = ObservationRequest {
        network,
        node_id,
        nodes,
        within,
        sensors,
        features,
        window,
        limit,
        offset,
    };
    let echoed = echo_observation_request(&request);
    Ok((request, echoed))
}

/// Echo the resolved request; absent filters never appear.
pub fn echo_observation_request(request: &ObservationRequest) -> EchoedQuery {
    EchoedQuery::default()
        .with(NETWORK_NAME.as_str(), json!(request.network))
        .with_opt(NODE_ID.as_str(), request.node_id.as_ref())
        .with_opt(NODES.as_str(), request.nodes.as_ref())
        .with_opt(SENSORS.as_str(), request.sensors.as_ref())
        .with_opt(FEATURES.as_str(), request.features.as_ref())
        .with_opt(WITHIN.as_str(), request.within.as_ref())
        .with(START.as_str(), json!(format_datetime(&request.window.start())))
        .with(END.as_str(), json!(format_datetime(&request.window.end())))
        .with_opt(LIMIT.as_str(), request.limit.as_ref())
        .with(OFFSET.as_str(), json!(request.offset))
}

fn parse_choice<T: FromStr<Err = String>>(value: &str, field: FieldName) -> Result<T, FieldError> {
    value.to_lowercase().parse().map_err(|message: String| {
        FieldError::new(field, ErrorCode::InvalidChoice, message).with_value(value)
    })
}

fn single_feature(raw: &RawQuery) -> Result<FeatureName, FieldError> {
    let features =
        parse_name_list::<FeatureName>(raw, FEATURES)?.ok_or_else(|| missing(FEATURES))?;
    match <[FeatureName; 1]>::try_from(features) {
        Ok([feature]) => Ok(feature),
        Err(features) => Err(FieldError::new(
            FEATURES,
            ErrorCode::OutOfRange,
            format!("exactly one feature is required, got {}", features.len()),
        )),
    }
}

/// Validate an aggregate query for `network`.
pub fn parse_aggregate_request(
    network: &str,
    raw: &RawQuery,
    now: NaiveDateTime,
) -> Result<(AggregateRequest, EchoedQuery), ApiError> {
    let fail = |error: Error| ApiError::new(error, raw_echo(Some(network), raw));
    let mut errors = FieldErrors::default();

    let network = errors.capture(parse_name::<NetworkName>(network, NETWORK_NAME));
    let node = errors.capture(
        raw_value(raw, NODE)
            .ok_or_else(|| missing(NODE))
            .and_then(|value| parse_name::<NodeId>(value, NODE)),
    );
    let function = errors.capture(
        raw_value(raw, FUNCTION)
            .ok_or_else(|| missing(FUNCTION))
            .and_then(|value| parse_choice::<AggregateFunction>(value, FUNCTION)),
    );
    let feature = errors.capture(single_feature(raw));
    let interval = errors.capture(
        raw_value(raw, AGG)
            .map(|value| parse_choice::<AggregateInterval>(value, AGG))
            .transpose()
            .map(Option::unwrap_or_default),
    );
    let sensors = errors
        .capture(parse_name_list::<SensorName>(raw, SENSORS))
        .flatten();
    let start = errors.capture(parse_optional_datetime(raw, START)).flatten();
    let end = errors.capture(parse_optional_datetime(raw, END)).flatten();
    let window = if errors.is_empty() {
        errors.capture(resolve_window(start, end, now, Duration::days(AGGREGATE_SPAN_DAYS)))
    } else {
        None
    };

    let (Some(network), Some(node), Some(function), Some(feature), Some(interval), Some(window)) =
        (network, node, function, feature, interval, window)
    else {
        return Err(fail(errors.into_error()));
    };

    let echoed = EchoedQuery::default()
        .with(NETWORK_NAME.as_str(), json!(network))
        .with(NODE.as_str(), json!(node))
        .with(FUNCTION.as_str(), json!(function.as_str()))
        .with(FEATURES.as_str(), json!([feature]))
        .with(START.as_str(), json!(format_datetime(&window.start())))
        .with(END.as_str(), json!(format_datetime(&window.end())))
        .with(AGG.as_str(), json!(interval.as_str()))
        .with_opt(SENSORS.as_str(), sensors.as_ref());
    let request = AggregateRequest {
        network,
        node,
        function,
        feature,
        window,
        interval,
        sensors,
    };
    Ok((request, echoed))
}

/// Filters accepted by the sensor metadata endpoint.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SensorFilters {
    pub feature: Option<FeatureName>,
    pub node_id: Option<NodeId>,
}

pub fn parse_sensor_filters(network: &str, raw: &RawQuery) -> Result<SensorFilters, ApiError> {
    let mut errors = FieldErrors::default();
    let feature = errors
        .capture(parse_optional_name::<FeatureName>(raw, FEATURE))
        .flatten();
    let node_id = errors
        .capture(parse_optional_name::<NodeId>(raw, NODE_ID))
        .flatten();
    errors
        .finish()
        .map_err(|error| ApiError::new(error, raw_echo(Some(network), raw)))?;
    Ok(SensorFilters { feature, node_id })
}

/// Optional `location_geom__within` filter of the node listing.
pub fn parse_node_filters(network: &str, raw: &RawQuery) -> Result<Option<GeoPolygon>, ApiError> {
    parse_geometry(raw).map_err(|err| {
        let mut errors = FieldErrors::default();
        errors.capture::<()>(Err(err));
        ApiError::new(errors.into_error(), raw_echo(Some(network), raw))
    })
}

/// Parse a job ticket path segment and the optional `part` parameter.
pub fn parse_chunk_address(ticket: &str, raw: &RawQuery) -> Result<(JobTicket, u32), ApiError> {
    let mut errors = FieldErrors::default();
    let ticket = errors.capture(JobTicket::from_str(ticket).map_err(|_| {
        FieldError::new(TICKET, ErrorCode::InvalidName, "ticket must be a valid UUID")
            .with_value(ticket)
    }));
    let part = errors.capture(parse_optional_number::<u32>(raw, PART).map(Option::unwrap_or_default));
    match (ticket, part) {
        (Some(ticket), Some(part)) => Ok((ticket, part)),
        _ => Err(ApiError::new(errors.into_error(), raw_echo(None, raw))),
    }
}

/// Parse a job ticket path segment.
pub fn parse_ticket(ticket: &str) -> Result<JobTicket, ApiError> {
    parse_chunk_address(ticket, &RawQuery::new()).map(|(ticket, _)| ticket)
}

#[cfg(test)]
#[path = "validation_tests.rs"]
mod tests;
